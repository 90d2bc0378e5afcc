use std::path::PathBuf;

use thiserror::Error;

use crate::graphics::GraphicsState;
use crate::session::SessionPhase;

/// Failure to acquire or drive an audio or graphics device resource.
///
/// These are fatal to the current engine run and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to open display connection: {0}")]
    Display(String),

    #[error("Failed to create rendering context: {0}")]
    Context(String),

    #[error("Failed to create window surface: {0}")]
    Surface(String),

    #[error("Failed to make context current: {0}")]
    MakeCurrent(String),

    #[error("Audio device error: {0}")]
    Audio(String),

    #[error("Error initializing audio output device (state = {state})")]
    AudioNotInitialized { state: i32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No display configurations reported by the platform")]
    NoConfigurations,
}

/// A call made against an object in a state that doesn't allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgrammingError {
    #[error("`{operation}` is not valid in graphics state {state:?}")]
    InvalidGraphicsState {
        operation: &'static str,
        state: GraphicsState,
    },

    #[error("`{operation}` requires a running engine session (phase = {phase:?})")]
    NotRunning {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("Engine session has already been started")]
    AlreadyStarted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Programming(#[from] ProgrammingError),

    #[error("Failed to spawn engine thread: {0}")]
    Spawn(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why the worker thread gave up before the engine entry point was reached.
///
/// Setup failures abort the run before any frame is drawn. Any resources
/// acquired up to that point have already been released (graphics before
/// audio) by the time this is reported.
#[derive(Error, Debug)]
pub enum EngineSetupError {
    #[error("Error preparing the engine thread: audio setup failed")]
    Audio(#[source] Error),

    #[error("Error preparing the engine thread: graphics setup failed")]
    Graphics(#[source] Error),

    #[error("Error preparing the engine thread: failed to read {}", path.display())]
    Assets {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Startup was aborted while waiting for the first surface")]
    SurfaceWaitCancelled,

    #[error("The engine worker thread panicked")]
    WorkerPanicked,
}
