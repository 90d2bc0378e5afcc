use crate::error::{DeviceError, Result};
use crate::platform::{AudioDeviceState, AudioPlatform};

const CHANNELS: u64 = 2;
const BYTES_PER_SAMPLE: u64 = 2;

/// The streaming buffer size (in bytes) to request for 16-bit stereo output.
///
/// Aims for ~50ms of audio, rounded down to a multiple of 1024 bytes, but
/// never goes below what the platform says it needs.
pub fn buffer_size_for(sample_rate: u32, platform_minimum: u32) -> u32 {
    // 50ms of any u32 rate fits back into a u32
    let want = (u64::from(sample_rate) * CHANNELS * BYTES_PER_SAMPLE / 20) & !1023;
    platform_minimum.max(want as u32)
}

/// Owns the audio output device for one engine run
pub struct AudioDeviceSession<A: AudioPlatform> {
    platform: A,
    device: Option<A::Device>,
    sample_rate: u32,
    buffer_size: u32,
}

impl<A: AudioPlatform> AudioDeviceSession<A> {
    pub fn new(platform: A) -> Self {
        Self {
            platform,
            device: None,
            sample_rate: 0,
            buffer_size: 0,
        }
    }

    pub fn open(&mut self) -> Result<()> {
        if self.device.is_some() {
            log::warn!("Audio device is already open");
            return Ok(());
        }

        let caps = self.platform.query_caps()?;
        let sample_rate = caps.native_sample_rate;
        let buffer_size = buffer_size_for(sample_rate, caps.min_buffer_size);
        if buffer_size != caps.min_buffer_size {
            log::warn!(
                "adjusting audio buffer size (was: {})",
                caps.min_buffer_size
            );
        }
        log::info!("Using {buffer_size} bytes buffer for {sample_rate}Hz audio");

        let (device, state) = self.platform.open_stream(sample_rate, buffer_size)?;
        if let AudioDeviceState::Uninitialized(state) = state {
            self.platform.close_stream(device);
            return Err(DeviceError::AudioNotInitialized { state }.into());
        }

        self.device = Some(device);
        self.sample_rate = sample_rate;
        self.buffer_size = buffer_size;
        Ok(())
    }

    /// Stops and releases the device. Idempotent.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            self.platform.close_stream(device);
        }
        self.sample_rate = 0;
        self.buffer_size = 0;
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn device(&self) -> Option<&A::Device> {
        self.device.as_ref()
    }

    pub fn platform(&self) -> &A {
        &self.platform
    }

    /// Sample rate in Hz, or 0 while closed
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in bytes, or 0 while closed
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

impl<A: AudioPlatform> Drop for AudioDeviceSession<A> {
    fn drop(&mut self) {
        self.close();
    }
}
