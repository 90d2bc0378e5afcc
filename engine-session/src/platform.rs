//! The seams between the session core and a concrete windowing, graphics and
//! audio layer.
//!
//! Implementations are moved onto the engine worker thread before any device
//! resource is acquired, and every method is only ever called from that
//! thread. The handle types therefore don't need to be `Send`, only the
//! platform objects themselves.

use std::ffi::c_void;
use std::ptr;

use crate::error::DeviceError;
use crate::scorer::ConfigurationCandidate;

/// Platform-reported output capabilities for 16-bit stereo PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCaps {
    /// The native output sample rate, in Hz
    pub native_sample_rate: u32,
    /// The smallest streaming buffer the platform accepts at that rate, in bytes
    pub min_buffer_size: u32,
}

/// Whether an opened output stream is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDeviceState {
    Initialized,
    /// The platform created the device object but couldn't initialize it;
    /// carries the platform's raw state code.
    Uninitialized(i32),
}

pub trait AudioPlatform: Send + 'static {
    type Device;

    fn query_caps(&mut self) -> Result<AudioCaps, DeviceError>;

    /// Opens a 16-bit stereo streaming output device
    fn open_stream(
        &mut self,
        sample_rate: u32,
        buffer_size: u32,
    ) -> Result<(Self::Device, AudioDeviceState), DeviceError>;

    /// Stops and releases a device; must not fail
    fn close_stream(&mut self, device: Self::Device);

    /// The device as an opaque pointer for native engines, or null if the
    /// platform has no such representation
    fn raw_device(&self, _device: &Self::Device) -> *mut c_void {
        ptr::null_mut()
    }
}

/// Opaque native graphics handles, for engines on the other side of an FFI
/// boundary. Any of them may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawGraphicsHandles {
    pub display: *mut c_void,
    pub config: *mut c_void,
    pub context: *mut c_void,
}

impl Default for RawGraphicsHandles {
    fn default() -> Self {
        Self {
            display: ptr::null_mut(),
            config: ptr::null_mut(),
            context: ptr::null_mut(),
        }
    }
}

pub trait DisplayPlatform: Send + 'static {
    type Display;
    type Config: Clone;
    type Context;
    type Surface;

    /// The platform-owned drawable, as supplied by the UI layer
    type Window: Clone + Send + 'static;

    /// Connects to (and initializes) the default display
    fn open_display(&mut self) -> Result<Self::Display, DeviceError>;

    /// Returns every configuration the display advertises, paired with its
    /// scoring descriptor
    fn query_configs(
        &mut self,
        display: &Self::Display,
    ) -> Result<Vec<(Self::Config, ConfigurationCandidate)>, DeviceError>;

    fn create_context(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
        api_version: u8,
    ) -> Result<Self::Context, DeviceError>;

    /// Creates a window surface for `window` and makes it current together
    /// with `context`
    fn bind_window(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
        context: &mut Self::Context,
        window: &Self::Window,
    ) -> Result<Self::Surface, DeviceError>;

    /// Releases the current binding (no surface or context current) and
    /// destroys `surface` if there is one. Must not fail.
    fn unbind(
        &mut self,
        display: &Self::Display,
        context: &mut Self::Context,
        surface: Option<Self::Surface>,
    );

    fn destroy_context(&mut self, display: &Self::Display, context: Self::Context);

    fn terminate_display(&mut self, display: Self::Display);

    /// A short description of the driver (version, vendor) for logging
    fn describe(&self, _display: &Self::Display) -> Option<String> {
        None
    }

    fn raw_handles(
        &self,
        _display: &Self::Display,
        _config: &Self::Config,
        _context: &Self::Context,
    ) -> RawGraphicsHandles {
        RawGraphicsHandles::default()
    }
}
