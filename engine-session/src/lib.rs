//! Hosts a game engine on a dedicated worker thread, owning the audio output
//! device and the rendering context it draws with, and handing it the
//! drawable surface as the UI toolkit creates and destroys it.
//!
//! The core is platform agnostic: device access goes through the
//! [`DisplayPlatform`] and [`AudioPlatform`] traits, implemented for Android
//! in [`android`] and in memory in [`headless`].

mod audio;
pub use audio::{buffer_size_for, AudioDeviceSession};

mod config;
pub use config::{GameType, ScalingOption, SessionConfig, SessionConfigRef};

mod engine;
pub use engine::{Engine, EngineContext, EngineControl, EngineHost, SurfaceChange};

mod error;
pub use error::{ConfigurationError, DeviceError, EngineSetupError, Error, ProgrammingError, Result};

mod events;
pub use events::{GameEvent, GameOption, InputEvent, InputEventType, ShaderKind};

mod graphics;
pub use graphics::{GraphicsContextSession, GraphicsState};

mod handoff;
pub use handoff::{PublishedSurface, SurfaceEvent, SurfaceHandoff, WaitCancelled};

mod platform;
pub use platform::{AudioCaps, AudioDeviceState, AudioPlatform, DisplayPlatform, RawGraphicsHandles};

mod scorer;
pub use scorer::{
    BitTargets, Caveat, ConfigChooser, ConfigurationCandidate, RenderableTypes, SurfaceTypes,
    BASE_SCORE,
};

mod session;
pub use session::{CompletionListener, EngineSession, ExitStatus, SessionPhase};

mod util;

#[cfg(unix)]
pub mod ffi;
pub mod headless;

#[cfg(target_os = "android")]
pub mod android;

#[test]
fn test_session_is_send_sync() {
    fn needs_send<T: Send>() {}
    fn needs_send_sync<T: Send + Sync>() {}
    needs_send::<EngineSession<headless::HeadlessWindow>>();
    needs_send_sync::<SessionConfigRef>();
    needs_send_sync::<SurfaceHandoff<headless::HeadlessWindow>>();
}
