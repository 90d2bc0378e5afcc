//! Runs one engine on a dedicated worker thread.
//!
//! The worker thread owns every device resource for the whole run: it opens
//! the audio device, then the display and rendering context, blocks until
//! the UI thread publishes a first surface, hands everything to the engine
//! and, once the engine returns, releases it all again in reverse order.
//!
//! The UI thread only ever talks to the worker through the
//! [`SurfaceHandoff`] slot and the engine's [`EngineControl`] commands.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::audio::AudioDeviceSession;
use crate::config::{ScalingOption, SessionConfig, SessionConfigRef};
use crate::engine::{Engine, EngineContext, EngineControl, EngineHost, HostBridge};
use crate::error::{EngineSetupError, Error, ProgrammingError, Result};
use crate::events::{GameEvent, InputEvent, ShaderKind};
use crate::graphics::GraphicsContextSession;
use crate::handoff::SurfaceHandoff;
use crate::platform::{AudioPlatform, DisplayPlatform};
use crate::scorer::{ConfigChooser, RenderableTypes};
use crate::util::log_panic;

const SHADER_TEST_MESSAGE: &str = "Testing graphics performance, please wait...";

/// Lifecycle of an [`EngineSession`]
///
/// ```text
/// Idle → Starting → Running → Stopping → Completed
///            ↘ Failed
/// ```
///
/// Commands are only forwarded to the engine while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// The worker thread is acquiring devices or waiting for a surface
    Starting,
    /// The engine's entry point is running
    Running,
    /// The engine has returned and devices are being released
    Stopping,
    Completed,
    /// Setup failed before the engine ran
    Failed,
}

/// How the engine's entry point ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Panicked,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

/// Called on the worker thread once a run has completed and all of its
/// devices have been released
pub type CompletionListener = Box<dyn FnOnce(ExitStatus) + Send + 'static>;

struct SessionShared<W> {
    handoff: SurfaceHandoff<W>,
    phase: Mutex<SessionPhase>,
    restarting: AtomicBool,
}

impl<W> SessionShared<W> {
    fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap()
    }

    fn set_phase(&self, phase: SessionPhase) {
        let mut guard = self.phase.lock().unwrap();
        log::trace!("Session phase {:?} -> {phase:?}", *guard);
        *guard = phase;
    }
}

/// The UI thread's handle on an engine run.
///
/// `W` is the platform's window type, as handed out by the UI toolkit on
/// every surface change.
pub struct EngineSession<W> {
    shared: Arc<SessionShared<W>>,
    config: SessionConfigRef,
    host: Arc<dyn EngineHost>,
    listener: Option<CompletionListener>,
    control: Option<Arc<dyn EngineControl>>,
    thread: Option<JoinHandle<std::result::Result<ExitStatus, EngineSetupError>>>,
}

impl<W: Clone + Send + 'static> EngineSession<W> {
    pub fn new(config: SessionConfigRef, host: Arc<dyn EngineHost>) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                handoff: SurfaceHandoff::new(),
                phase: Mutex::new(SessionPhase::Idle),
                restarting: AtomicBool::new(false),
            }),
            config,
            host,
            listener: None,
            control: None,
            thread: None,
        }
    }

    pub fn config(&self) -> &SessionConfigRef {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    /// Replaces any previously registered listener. Only takes effect if
    /// registered before [`Self::start`].
    pub fn set_on_completion_listener<F>(&mut self, listener: F)
    where
        F: FnOnce(ExitStatus) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    /// Spawns the worker thread that sets up devices and runs `engine`.
    ///
    /// Returns as soon as the thread is spawned; setup failures are reported
    /// through [`Self::join`].
    pub fn start<D, A, E>(&mut self, display: D, audio: A, engine: E, args: Vec<String>) -> Result<()>
    where
        D: DisplayPlatform<Window = W>,
        A: AudioPlatform,
        E: Engine<D, A>,
    {
        {
            let mut phase = self.shared.phase.lock().unwrap();
            if *phase != SessionPhase::Idle {
                return Err(ProgrammingError::AlreadyStarted.into());
            }
            *phase = SessionPhase::Starting;
        }

        let control = engine.control();
        self.control = Some(control.clone());

        let config = self.config.copy();
        let mut builder = thread::Builder::new();
        if let Some(name) = &config.thread_name {
            builder = builder.name(name.clone());
        }

        let worker = Worker {
            shared: self.shared.clone(),
            host: Arc::new(HostBridge::new(self.host.clone(), self.config.clone())),
            listener: self.listener.take(),
            control,
            config,
            args,
        };
        match builder.spawn(move || worker.run(display, audio, engine)) {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.set_phase(SessionPhase::Failed);
                Err(Error::Spawn(err.to_string()))
            }
        }
    }

    /// Waits for the worker thread to finish. Returns `None` if the session
    /// was never started or has already been joined.
    pub fn join(&mut self) -> Option<std::result::Result<ExitStatus, EngineSetupError>> {
        let handle = self.thread.take()?;
        Some(handle.join().unwrap_or_else(|panic| {
            log_panic(panic);
            self.shared.set_phase(SessionPhase::Failed);
            Err(EngineSetupError::WorkerPanicked)
        }))
    }

    /// Whether the worker thread has exited (`false` if it was never started)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(false, |handle| handle.is_finished())
    }

    /// Marks the session as being torn down on purpose, so that the UI's
    /// surface notifications no longer reach the engine
    pub fn set_restarting(&self) {
        self.shared.restarting.store(true, Ordering::Release);
    }

    pub fn is_restarting(&self) -> bool {
        self.shared.restarting.load(Ordering::Acquire)
    }

    /// Releases a worker still waiting for its first surface; the run then
    /// fails with [`EngineSetupError::SurfaceWaitCancelled`]. Has no effect
    /// once the engine is running.
    pub fn abort_startup(&self) {
        log::debug!("Aborting engine startup");
        self.shared.handoff.cancel();
    }

    ///////////////////////////////
    // Surface lifecycle (UI thread)
    ///////////////////////////////

    pub fn notify_surface_changed(&self, window: W, width: u32, height: u32) {
        if self.config.landscape_only() && height > width {
            log::debug!("Ignoring surfaceChanged: {width}x{height}");
            return;
        }
        log::debug!("surfaceChanged: {width}x{height}");
        self.shared
            .handoff
            .notify_changed(window, width, height, !self.is_restarting());
    }

    pub fn notify_surface_destroyed(&self) {
        log::debug!("surfaceDestroyed");
        self.shared.handoff.notify_destroyed(!self.is_restarting());
    }

    ///////////////////////////////
    // Engine commands (UI thread)
    ///////////////////////////////

    fn running_control(&self, operation: &'static str) -> Result<&dyn EngineControl> {
        let phase = self.shared.phase();
        match (&self.control, phase) {
            (Some(control), SessionPhase::Running) => Ok(&**control),
            _ => Err(ProgrammingError::NotRunning { operation, phase }.into()),
        }
    }

    pub fn set_pause(&self, paused: bool) -> Result<()> {
        self.running_control("set_pause")?.set_pause(paused);
        Ok(())
    }

    pub fn set_touchpad_mode(&self, enabled: bool) -> Result<()> {
        self.running_control("set_touchpad_mode")?
            .set_touchpad_mode(enabled);
        Ok(())
    }

    pub fn enable_zoning(&self, enabled: bool) -> Result<()> {
        self.running_control("enable_zoning")?.enable_zoning(enabled);
        Ok(())
    }

    pub fn save_game(&self, slot: i32, force: bool) -> Result<()> {
        self.running_control("save_game")?.save_game(slot, force);
        Ok(())
    }

    pub fn load_game(&self, slot: i32) -> Result<()> {
        self.running_control("load_game")?.load_game(slot);
        Ok(())
    }

    pub fn check_load_conditions(&self) -> Result<bool> {
        Ok(self
            .running_control("check_load_conditions")?
            .check_load_conditions())
    }

    pub fn set_auto_load_slot(&self, slot: i32) -> Result<()> {
        self.running_control("set_auto_load_slot")?
            .set_auto_load_slot(slot);
        Ok(())
    }

    pub fn push_event(&self, event: InputEvent) -> Result<()> {
        self.running_control("push_event")?.push_event(event);
        Ok(())
    }

    pub fn game_event(&self, event: GameEvent) -> Result<()> {
        self.running_control("game_event")?.game_event(event);
        Ok(())
    }

    /// Asks the engine to leave its main loop
    pub fn quit(&self) -> Result<()> {
        self.running_control("quit")?.push_event(InputEvent::quit());
        Ok(())
    }
}

/// Everything moved onto the worker thread
struct Worker<W> {
    shared: Arc<SessionShared<W>>,
    host: Arc<HostBridge>,
    listener: Option<CompletionListener>,
    control: Arc<dyn EngineControl>,
    config: SessionConfig,
    args: Vec<String>,
}

fn required_api(api_version: u8) -> RenderableTypes {
    match api_version {
        1 => RenderableTypes::OPENGL_ES,
        3 => RenderableTypes::OPENGL_ES3,
        _ => RenderableTypes::OPENGL_ES2,
    }
}

fn setup_graphics<D: DisplayPlatform>(graphics: &mut GraphicsContextSession<D>, api_version: u8) -> Result<()> {
    graphics.open()?;
    let chosen = graphics.choose_config()?;
    log::debug!("Chose config {chosen}");
    graphics.create_context(api_version)
}

fn read_asset(path: &Path) -> std::result::Result<Vec<u8>, EngineSetupError> {
    fs::read(path).map_err(|source| EngineSetupError::Assets {
        path: path.to_owned(),
        source,
    })
}

fn load_bitmap_resources(
    resources: &[(String, PathBuf)],
) -> std::result::Result<Vec<(String, Vec<u8>)>, EngineSetupError> {
    resources
        .iter()
        .map(|(name, path)| {
            log::debug!("Loading bitmap {name} from {}", path.display());
            read_asset(path).map(|bitmap| (name.clone(), bitmap))
        })
        .collect()
}

fn load_shader_sources(
    sources: &[(ShaderKind, PathBuf)],
) -> std::result::Result<Vec<(ShaderKind, Vec<u8>)>, EngineSetupError> {
    sources
        .iter()
        .map(|(kind, path)| {
            log::debug!("Loading {kind:?} shader from {}", path.display());
            read_asset(path).map(|source| (*kind, source))
        })
        .collect()
}

impl<W: Clone + Send + 'static> Worker<W> {
    fn fail(&self, err: EngineSetupError) -> std::result::Result<ExitStatus, EngineSetupError> {
        log::error!("{err}");
        self.shared.set_phase(SessionPhase::Failed);
        Err(err)
    }

    fn run<D, A, E>(self, display: D, audio: A, mut engine: E) -> std::result::Result<ExitStatus, EngineSetupError>
    where
        D: DisplayPlatform<Window = W>,
        A: AudioPlatform,
        E: Engine<D, A>,
    {
        let mut audio = AudioDeviceSession::new(audio);
        if let Err(err) = audio.open() {
            audio.close();
            return self.fail(EngineSetupError::Audio(err));
        }

        let chooser = ConfigChooser::new(self.config.bit_targets, required_api(self.config.api_version));
        let mut graphics = GraphicsContextSession::new(display, chooser);
        if let Err(err) = setup_graphics(&mut graphics, self.config.api_version) {
            graphics.destroy();
            audio.close();
            return self.fail(EngineSetupError::Graphics(err));
        }

        log::debug!("Waiting for surface");
        let surface = match self.shared.handoff.wait_for_surface() {
            Ok(surface) => surface,
            Err(_) => {
                graphics.destroy();
                audio.close();
                return self.fail(EngineSetupError::SurfaceWaitCancelled);
            }
        };
        if let Err(err) = graphics.bind_surface(&surface.window) {
            graphics.destroy();
            audio.close();
            return self.fail(EngineSetupError::Graphics(err));
        }

        let assets = load_bitmap_resources(&self.config.bitmap_resources).and_then(|bitmaps| {
            load_shader_sources(&self.config.shader_sources).map(|shaders| (bitmaps, shaders))
        });
        let (bitmaps, shader_sources) = match assets {
            Ok(assets) => assets,
            Err(err) => {
                graphics.destroy();
                audio.close();
                return self.fail(err);
            }
        };

        let scaling_option = self.config.scaling_option;
        let mut ctx = EngineContext {
            graphics: &mut graphics,
            audio: &audio,
            handoff: &self.shared.handoff,
            host: self.host.clone(),
            scaling_option,
            game_type: self.config.game_type,
            args: &self.args,
            surface_size: (surface.width, surface.height),
        };

        // Engine panics are contained so that devices still get released in
        // order and the listener still hears about the run ending
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            engine.create(&mut ctx);

            if scaling_option.uses_shader() && !self.config.shader_tested {
                self.control.game_event(GameEvent::ShouldTestShader);
                self.host.display_message(SHADER_TEST_MESSAGE);
            }
            if self.config.ultra_mode_supported && scaling_option == ScalingOption::Shader {
                self.control.game_event(GameEvent::UseUltraMode);
            }
            for (name, bitmap) in &bitmaps {
                self.control.add_bitmap_resource(name, bitmap);
            }
            for (kind, source) in &shader_sources {
                self.control.add_shader_source(*kind, source);
            }

            self.shared.set_phase(SessionPhase::Running);
            log::info!("Starting engine with args {:?}", self.args);
            engine.run(&mut ctx)
        }));
        drop(ctx);
        self.shared.set_phase(SessionPhase::Stopping);

        let status = match outcome {
            Ok(status) => {
                log::info!("Engine exited with status {status}");
                ExitStatus::Exited(status)
            }
            Err(panic) => {
                log_panic(panic);
                ExitStatus::Panicked
            }
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| engine.destroy())) {
            log_panic(panic);
        }
        graphics.destroy();
        audio.close();

        if let Some(listener) = self.listener {
            listener(status);
        }
        self.shared.set_phase(SessionPhase::Completed);

        Ok(status)
    }
}
