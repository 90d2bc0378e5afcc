//! Device platforms for Android: EGL through glutin for graphics and the
//! Java `AudioTrack` API for audio.
//!
//! The audio platform makes JNI calls through the process-wide Android
//! context, which must have been initialized (see `ndk-context`) before a
//! session is started.

mod audio_track;
mod egl;

pub use audio_track::{AudioTrack, AudioTrackPlatform};
pub use egl::{EglContext, EglPlatform};
