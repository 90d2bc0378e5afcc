//! In-memory display and audio platforms.
//!
//! Nothing here touches a real device: the "driver" is a scripted list of
//! configurations and audio capabilities, optionally told to fail at a given
//! step. Every call is appended to a shared [`Journal`] so a run can be
//! inspected afterwards, which makes these backends useful both for desktop
//! runs without a GPU and for exercising the session's ordering guarantees.

use std::sync::{Arc, Mutex};

use crate::error::DeviceError;
use crate::platform::{AudioCaps, AudioDeviceState, AudioPlatform, DisplayPlatform};
use crate::scorer::{Caveat, ConfigurationCandidate, RenderableTypes, SurfaceTypes};

/// A device call made through one of the headless platforms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    QueryAudioCaps,
    OpenAudioStream { sample_rate: u32, buffer_size: u32 },
    CloseAudioStream,
    OpenDisplay,
    QueryConfigs,
    CreateContext { config_id: i32, api_version: u8 },
    BindWindow { window: u32 },
    Unbind { surface: Option<u32> },
    DestroyContext,
    TerminateDisplay,
}

/// An append-only, shareable log of [`Call`]s
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn record(&self, call: Call) {
        log::trace!("headless: {call:?}");
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contains(&self, predicate: impl Fn(&Call) -> bool) -> bool {
        self.calls.lock().unwrap().iter().any(predicate)
    }

    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(predicate)
    }
}

/// A stand-in for a platform window; only its identity matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessWindow {
    pub id: u32,
}

impl HeadlessWindow {
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessDisplayHandle(());

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessContext {
    pub config_id: i32,
    pub api_version: u8,
}

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessSurface {
    pub window: HeadlessWindow,
}

#[derive(Debug, Clone)]
pub struct HeadlessDisplay {
    journal: Journal,
    candidates: Vec<ConfigurationCandidate>,
    fail_open_display: bool,
    fail_create_context: bool,
    fail_bind_window: bool,
}

impl HeadlessDisplay {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            candidates: Self::typical_candidates(),
            fail_open_display: false,
            fail_create_context: false,
            fail_bind_window: false,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<ConfigurationCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn fail_open_display(mut self) -> Self {
        self.fail_open_display = true;
        self
    }

    pub fn fail_create_context(mut self) -> Self {
        self.fail_create_context = true;
        self
    }

    pub fn fail_bind_window(mut self) -> Self {
        self.fail_bind_window = true;
        self
    }

    /// Roughly what a mid-range phone GPU advertises
    pub fn typical_candidates() -> Vec<ConfigurationCandidate> {
        let window_gles2 = ConfigurationCandidate {
            surface_types: SurfaceTypes::WINDOW | SurfaceTypes::PBUFFER,
            renderable_types: RenderableTypes::OPENGL_ES | RenderableTypes::OPENGL_ES2,
            ..Default::default()
        };
        vec![
            ConfigurationCandidate {
                id: 1,
                red_bits: 8,
                green_bits: 8,
                blue_bits: 8,
                alpha_bits: 8,
                depth_bits: 24,
                stencil_bits: 8,
                samples: 4,
                ..window_gles2
            },
            ConfigurationCandidate {
                id: 2,
                red_bits: 8,
                green_bits: 8,
                blue_bits: 8,
                alpha_bits: 8,
                depth_bits: 24,
                stencil_bits: 8,
                ..window_gles2
            },
            ConfigurationCandidate {
                id: 3,
                red_bits: 5,
                green_bits: 6,
                blue_bits: 5,
                depth_bits: 16,
                ..window_gles2
            },
            ConfigurationCandidate {
                id: 4,
                red_bits: 5,
                green_bits: 6,
                blue_bits: 5,
                caveat: Caveat::Slow,
                ..window_gles2
            },
            ConfigurationCandidate {
                id: 5,
                red_bits: 5,
                green_bits: 6,
                blue_bits: 5,
                surface_types: SurfaceTypes::PBUFFER,
                ..window_gles2
            },
        ]
    }
}

impl DisplayPlatform for HeadlessDisplay {
    type Display = HeadlessDisplayHandle;
    type Config = i32;
    type Context = HeadlessContext;
    type Surface = HeadlessSurface;
    type Window = HeadlessWindow;

    fn open_display(&mut self) -> Result<Self::Display, DeviceError> {
        self.journal.record(Call::OpenDisplay);
        if self.fail_open_display {
            return Err(DeviceError::Display("no display available".into()));
        }
        Ok(HeadlessDisplayHandle(()))
    }

    fn query_configs(
        &mut self,
        _display: &Self::Display,
    ) -> Result<Vec<(Self::Config, ConfigurationCandidate)>, DeviceError> {
        self.journal.record(Call::QueryConfigs);
        Ok(self.candidates.iter().map(|c| (c.id, *c)).collect())
    }

    fn create_context(
        &mut self,
        _display: &Self::Display,
        config: &Self::Config,
        api_version: u8,
    ) -> Result<Self::Context, DeviceError> {
        self.journal.record(Call::CreateContext {
            config_id: *config,
            api_version,
        });
        if self.fail_create_context {
            return Err(DeviceError::Context("context creation rejected".into()));
        }
        Ok(HeadlessContext {
            config_id: *config,
            api_version,
        })
    }

    fn bind_window(
        &mut self,
        _display: &Self::Display,
        _config: &Self::Config,
        _context: &mut Self::Context,
        window: &Self::Window,
    ) -> Result<Self::Surface, DeviceError> {
        self.journal.record(Call::BindWindow { window: window.id });
        if self.fail_bind_window {
            return Err(DeviceError::Surface(format!(
                "window {} can't be rendered to",
                window.id
            )));
        }
        Ok(HeadlessSurface { window: *window })
    }

    fn unbind(
        &mut self,
        _display: &Self::Display,
        _context: &mut Self::Context,
        surface: Option<Self::Surface>,
    ) {
        self.journal.record(Call::Unbind {
            surface: surface.map(|s| s.window.id),
        });
    }

    fn destroy_context(&mut self, _display: &Self::Display, _context: Self::Context) {
        self.journal.record(Call::DestroyContext);
    }

    fn terminate_display(&mut self, _display: Self::Display) {
        self.journal.record(Call::TerminateDisplay);
    }

    fn describe(&self, _display: &Self::Display) -> Option<String> {
        Some("headless display".to_owned())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessAudioDevice {
    pub sample_rate: u32,
    pub buffer_size: u32,
}

#[derive(Debug, Clone)]
pub struct HeadlessAudio {
    journal: Journal,
    caps: AudioCaps,
    device_state: AudioDeviceState,
    fail_query: bool,
}

impl HeadlessAudio {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            caps: AudioCaps {
                native_sample_rate: 44100,
                min_buffer_size: 4096,
            },
            device_state: AudioDeviceState::Initialized,
            fail_query: false,
        }
    }

    pub fn with_caps(mut self, native_sample_rate: u32, min_buffer_size: u32) -> Self {
        self.caps = AudioCaps {
            native_sample_rate,
            min_buffer_size,
        };
        self
    }

    /// Makes opened streams report an uninitialized device
    pub fn uninitialized(mut self, state: i32) -> Self {
        self.device_state = AudioDeviceState::Uninitialized(state);
        self
    }

    pub fn fail_query(mut self) -> Self {
        self.fail_query = true;
        self
    }
}

impl AudioPlatform for HeadlessAudio {
    type Device = HeadlessAudioDevice;

    fn query_caps(&mut self) -> Result<AudioCaps, DeviceError> {
        self.journal.record(Call::QueryAudioCaps);
        if self.fail_query {
            return Err(DeviceError::Audio("no audio output".into()));
        }
        Ok(self.caps)
    }

    fn open_stream(
        &mut self,
        sample_rate: u32,
        buffer_size: u32,
    ) -> Result<(Self::Device, AudioDeviceState), DeviceError> {
        self.journal.record(Call::OpenAudioStream {
            sample_rate,
            buffer_size,
        });
        Ok((
            HeadlessAudioDevice {
                sample_rate,
                buffer_size,
            },
            self.device_state,
        ))
    }

    fn close_stream(&mut self, _device: Self::Device) {
        self.journal.record(Call::CloseAudioStream);
    }
}
