//! The contract between a session and the engine it hosts.

use std::ffi::c_void;
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use crate::audio::AudioDeviceSession;
use crate::config::{GameType, ScalingOption, SessionConfigRef};
use crate::error::Result;
use crate::events::{GameEvent, GameOption, InputEvent, ShaderKind};
use crate::graphics::GraphicsContextSession;
use crate::handoff::{SurfaceEvent, SurfaceHandoff};
use crate::platform::{AudioPlatform, DisplayPlatform, RawGraphicsHandles};
use crate::scorer::ConfigurationCandidate;

/// Fire-and-forget commands into the engine.
///
/// Unlike [`Engine`] itself, these are called from the UI thread while the
/// engine's entry point is running on the worker thread, so implementations
/// must be safe to call from any thread.
pub trait EngineControl: Send + Sync {
    /// Pauses the engine and all of its native threads
    fn set_pause(&self, paused: bool);
    fn set_touchpad_mode(&self, enabled: bool);
    fn enable_zoning(&self, enabled: bool);
    fn save_game(&self, slot: i32, force: bool);
    fn load_game(&self, slot: i32);
    fn check_load_conditions(&self) -> bool;
    fn set_auto_load_slot(&self, slot: i32);
    fn push_event(&self, event: InputEvent);
    fn game_event(&self, event: GameEvent);
    /// Hands over an encoded image the engine refers to by `name`
    fn add_bitmap_resource(&self, name: &str, bitmap: &[u8]);
    fn add_shader_source(&self, kind: ShaderKind, source: &[u8]);
}

/// Requests the engine makes of its host (usually the UI layer).
///
/// These are invoked on the engine worker thread; implementations that need
/// to touch UI state must redispatch to their own thread.
pub trait EngineHost: Send + Sync {
    /// Horizontal and vertical display density
    fn dpi(&self) -> (f32, f32);

    /// Shows a transient on-screen message
    fn display_message(&self, message: &str);

    fn set_window_caption(&self, caption: &str);

    fn plugin_directories(&self) -> Vec<PathBuf>;

    fn show_virtual_keyboard(&self, visible: bool);

    fn on_game_option(&self, _option: GameOption) {}

    fn on_game_display_started(&self) {}

    fn on_game_event(&self, _event: GameEvent) {}

    fn sys_archives(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// The engine hosted by a session.
///
/// All methods run on the session's worker thread. `create` is called once
/// the first surface is bound, `run` is the engine's main loop and only
/// returns when the game ends, and `destroy` follows before any device is
/// released.
pub trait Engine<D: DisplayPlatform, A: AudioPlatform>: Send + 'static {
    fn control(&self) -> Arc<dyn EngineControl>;

    fn create(&mut self, _ctx: &mut EngineContext<'_, D, A>) {}

    fn run(&mut self, ctx: &mut EngineContext<'_, D, A>) -> i32;

    fn destroy(&mut self) {}
}

/// A surface change, after it has been applied to the graphics session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceChange {
    /// A new or resized surface is bound and current
    Resized { width: u32, height: u32 },
    /// The surface is gone; nothing is current until the next `Resized`
    Lost,
}

/// Forwards engine requests to the host, recording shader test outcomes in
/// the session configuration on the way.
pub(crate) struct HostBridge {
    host: Arc<dyn EngineHost>,
    config: SessionConfigRef,
}

impl HostBridge {
    pub(crate) fn new(host: Arc<dyn EngineHost>, config: SessionConfigRef) -> Self {
        Self { host, config }
    }
}

impl EngineHost for HostBridge {
    fn dpi(&self) -> (f32, f32) {
        self.host.dpi()
    }

    fn display_message(&self, message: &str) {
        log::info!("OSD: {message}");
        self.host.display_message(message)
    }

    fn set_window_caption(&self, caption: &str) {
        self.host.set_window_caption(caption)
    }

    fn plugin_directories(&self) -> Vec<PathBuf> {
        self.host.plugin_directories()
    }

    fn show_virtual_keyboard(&self, visible: bool) {
        self.host.show_virtual_keyboard(visible)
    }

    fn on_game_option(&self, option: GameOption) {
        self.host.on_game_option(option)
    }

    fn on_game_display_started(&self) {
        self.host.on_game_display_started()
    }

    fn on_game_event(&self, event: GameEvent) {
        log::debug!("Game event from engine: {event:?}");
        self.config.apply_game_event(event);
        self.host.on_game_event(event)
    }

    fn sys_archives(&self) -> Vec<PathBuf> {
        self.host.sys_archives()
    }
}

/// What an engine gets to work with for the duration of a run
pub struct EngineContext<'a, D: DisplayPlatform, A: AudioPlatform> {
    pub(crate) graphics: &'a mut GraphicsContextSession<D>,
    pub(crate) audio: &'a AudioDeviceSession<A>,
    pub(crate) handoff: &'a SurfaceHandoff<D::Window>,
    pub(crate) host: Arc<HostBridge>,
    pub(crate) scaling_option: ScalingOption,
    pub(crate) game_type: GameType,
    pub(crate) args: &'a [String],
    pub(crate) surface_size: (u32, u32),
}

impl<'a, D: DisplayPlatform, A: AudioPlatform> EngineContext<'a, D, A> {
    pub fn audio_device(&self) -> Option<&A::Device> {
        self.audio.device()
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn buffer_size(&self) -> u32 {
        self.audio.buffer_size()
    }

    pub fn display(&self) -> Option<&D::Display> {
        self.graphics.display()
    }

    pub fn context(&self) -> Option<&D::Context> {
        self.graphics.context()
    }

    pub fn config(&self) -> Option<&D::Config> {
        self.graphics.config()
    }

    pub fn chosen_candidate(&self) -> Option<&ConfigurationCandidate> {
        self.graphics.chosen_candidate()
    }

    /// The display, config and context as native pointers
    pub fn raw_graphics_handles(&self) -> RawGraphicsHandles {
        match (self.graphics.display(), self.graphics.config(), self.graphics.context()) {
            (Some(display), Some(config), Some(context)) => self
                .graphics
                .platform()
                .raw_handles(display, config, context),
            _ => RawGraphicsHandles::default(),
        }
    }

    pub fn raw_audio_device(&self) -> *mut c_void {
        self.audio
            .device()
            .map_or(ptr::null_mut(), |device| self.audio.platform().raw_device(device))
    }

    pub fn is_surface_bound(&self) -> bool {
        self.graphics.is_surface_bound()
    }

    /// Size of the bound surface, `(0, 0)` while there is none
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    pub fn scaling_option(&self) -> ScalingOption {
        self.scaling_option
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn args(&self) -> &[String] {
        self.args
    }

    pub fn host(&self) -> &dyn EngineHost {
        &*self.host
    }

    /// An owned handle on the host, for engines that need to call back from
    /// outside a borrow of this context
    pub fn host_handle(&self) -> Arc<dyn EngineHost> {
        self.host.clone()
    }

    /// Applies the latest surface change published by the UI thread, if
    /// there is one, then reports it through `callback`.
    ///
    /// Must be polled regularly by the engine's main loop. Changes published
    /// while the session was restarting never get here; anything queued
    /// before that is still applied. An error means a new surface couldn't
    /// be bound, which is fatal to the run.
    pub fn poll_surface_events<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(SurfaceChange),
    {
        let event = match self.handoff.take_pending() {
            Some(event) => event,
            None => return Ok(()),
        };
        match event {
            SurfaceEvent::Changed {
                window,
                width,
                height,
            } => {
                log::debug!("Binding changed surface: {width}x{height}");
                self.graphics.unbind_surface();
                self.surface_size = (0, 0);
                self.graphics.bind_surface(&window)?;
                self.surface_size = (width, height);
                callback(SurfaceChange::Resized { width, height });
            }
            SurfaceEvent::Destroyed => {
                log::debug!("Unbinding destroyed surface");
                self.graphics.unbind_surface();
                self.surface_size = (0, 0);
                callback(SurfaceChange::Lost);
            }
        }
        Ok(())
    }
}
