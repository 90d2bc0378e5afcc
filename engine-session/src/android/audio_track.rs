use std::ffi::c_void;

use jni::objects::{GlobalRef, JValue};
use jni::{JNIEnv, JavaVM};

use crate::error::DeviceError;
use crate::platform::{AudioCaps, AudioDeviceState, AudioPlatform};

const AUDIO_TRACK_CLASS: &str = "android/media/AudioTrack";

// android.media.AudioManager / AudioFormat / AudioTrack constants
const STREAM_MUSIC: i32 = 3;
const CHANNEL_OUT_STEREO: i32 = 12;
const ENCODING_PCM_16BIT: i32 = 2;
const MODE_STREAM: i32 = 1;
const STATE_INITIALIZED: i32 = 1;

fn audio_error(err: jni::errors::Error) -> DeviceError {
    DeviceError::Audio(err.to_string())
}

/// Runs `f` with a JNI environment for the current thread, attaching it to
/// the VM of the process' Android context if needed.
fn with_env<R>(f: impl FnOnce(&mut JNIEnv) -> jni::errors::Result<R>) -> Result<R, DeviceError> {
    let ctx = ndk_context::android_context();
    let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }.map_err(audio_error)?;
    let mut env = vm.attach_current_thread().map_err(audio_error)?;
    let result = f(&mut env);
    if result.is_err() && env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
    }
    result.map_err(audio_error)
}

/// A streaming `android.media.AudioTrack`
pub struct AudioTrack {
    track: GlobalRef,
}

/// 16-bit stereo PCM output through the platform's `AudioTrack`
#[derive(Debug, Default)]
pub struct AudioTrackPlatform;

impl AudioTrackPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl AudioPlatform for AudioTrackPlatform {
    type Device = AudioTrack;

    fn query_caps(&mut self) -> Result<AudioCaps, DeviceError> {
        let (sample_rate, min_buffer_size) = with_env(|env| {
            let sample_rate = env
                .call_static_method(
                    AUDIO_TRACK_CLASS,
                    "getNativeOutputSampleRate",
                    "(I)I",
                    &[JValue::Int(STREAM_MUSIC)],
                )?
                .i()?;
            let min_buffer_size = env
                .call_static_method(
                    AUDIO_TRACK_CLASS,
                    "getMinBufferSize",
                    "(III)I",
                    &[
                        JValue::Int(sample_rate),
                        JValue::Int(CHANNEL_OUT_STEREO),
                        JValue::Int(ENCODING_PCM_16BIT),
                    ],
                )?
                .i()?;
            Ok((sample_rate, min_buffer_size))
        })?;

        // Both report failures as negative values
        if sample_rate <= 0 || min_buffer_size <= 0 {
            return Err(DeviceError::Audio(format!(
                "unsupported output parameters (rate = {sample_rate}, min buffer = {min_buffer_size})"
            )));
        }
        Ok(AudioCaps {
            native_sample_rate: sample_rate as u32,
            min_buffer_size: min_buffer_size as u32,
        })
    }

    fn open_stream(
        &mut self,
        sample_rate: u32,
        buffer_size: u32,
    ) -> Result<(Self::Device, AudioDeviceState), DeviceError> {
        with_env(|env| {
            let track = env.new_object(
                AUDIO_TRACK_CLASS,
                "(IIIIII)V",
                &[
                    JValue::Int(STREAM_MUSIC),
                    JValue::Int(sample_rate as i32),
                    JValue::Int(CHANNEL_OUT_STEREO),
                    JValue::Int(ENCODING_PCM_16BIT),
                    JValue::Int(buffer_size as i32),
                    JValue::Int(MODE_STREAM),
                ],
            )?;
            let state = env.call_method(&track, "getState", "()I", &[])?.i()?;
            let track = env.new_global_ref(track)?;

            let state = if state == STATE_INITIALIZED {
                AudioDeviceState::Initialized
            } else {
                AudioDeviceState::Uninitialized(state)
            };
            Ok((AudioTrack { track }, state))
        })
    }

    fn close_stream(&mut self, device: Self::Device) {
        let closed = with_env(|env| {
            // Stopping a track that never initialized throws; it still needs releasing
            if env
                .call_method(device.track.as_obj(), "stop", "()V", &[])
                .is_err()
            {
                env.exception_clear()?;
            }
            env.call_method(device.track.as_obj(), "release", "()V", &[])?;
            Ok(())
        });
        if let Err(err) = closed {
            log::error!("Failed to release audio track: {err}");
        }
    }

    fn raw_device(&self, device: &Self::Device) -> *mut c_void {
        device.track.as_obj().as_raw().cast()
    }
}
