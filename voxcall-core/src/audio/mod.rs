//! Microphone capture and speaker output via cpal.
//!
//! # Design constraints
//!
//! Both device callbacks run on OS audio threads at elevated priority. They
//! must not allocate per callback, block on a lock, or perform I/O.
//!
//! - Capture downmixes into a buffer that is reused across callbacks and
//!   pushes into an SPSC ring producer whose `push_slice` is lock-free.
//! - Output hands the callback buffer to a [`PlaybackDriver`](crate::playback::PlaybackDriver),
//!   which only drains a lock-free command channel and reads its own ring.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! [`AudioCapture`] and [`AudioOutput`] must be created and dropped on the same
//! thread. [`backend::CpalBackend`] parks each stream on a dedicated thread.

pub mod backend;
pub mod device;
pub mod encode;
pub mod output;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};

use crate::{buffering::CaptureProducer, error::Result};
#[cfg(feature = "audio-cpal")]
use crate::{buffering::Producer, error::VoxError};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

pub use output::AudioOutput;

/// Handle to an active microphone stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback no-op.
    running: Arc<AtomicBool>,
    /// Device capture rate (Hz).
    pub sample_rate: u32,
    pub channels: u16,
}

#[cfg(feature = "audio-cpal")]
fn push_mono(producer: &mut CaptureProducer, mono: &[f32], dropped: &AtomicUsize) {
    let written = producer.push_slice(mono);
    if written < mono.len() {
        dropped.fetch_add(mono.len() - written, Ordering::Relaxed);
    }
}

impl AudioCapture {
    /// Open the preferred input device (by exact name), falling back to the
    /// system default and then the first available input.
    ///
    /// Mono f32 samples at the device rate are pushed into `producer`.
    /// Samples that do not fit in the ring are counted in `dropped`.
    ///
    /// # Errors
    /// `VoxError::NoDefaultInputDevice` when no microphone exists, or
    /// `VoxError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: CaptureProducer,
        running: Arc<AtomicBool>,
        dropped: Arc<AtomicUsize>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let device = device::select_input_device(preferred_device_name)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| VoxError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let ch = channels as usize;
        let on_error = |err| error!("input stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let running = Arc::clone(&running);
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        encode::downmix_into(data, ch, |s| s, &mut mix);
                        push_mono(&mut producer, &mix, &dropped);
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let running = Arc::clone(&running);
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        encode::downmix_into(data, ch, |s| s as f32 / 32768.0, &mut mix);
                        push_mono(&mut producer, &mix, &dropped);
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::U8 => {
                let running = Arc::clone(&running);
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        encode::downmix_into(data, ch, |s| (s as f32 - 128.0) / 128.0, &mut mix);
                        push_mono(&mut producer, &mix, &dropped);
                    },
                    on_error,
                    None,
                )
            }
            fmt => {
                return Err(VoxError::AudioStream(format!(
                    "unsupported input sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| VoxError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VoxError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
            channels,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: CaptureProducer,
        _running: Arc<AtomicBool>,
        _dropped: Arc<AtomicUsize>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(crate::error::VoxError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(all(test, not(feature = "audio-cpal")))]
mod tests {
    use super::*;
    use crate::buffering::create_capture_ring;

    #[test]
    fn open_without_cpal_reports_the_missing_feature() {
        let (producer, _consumer) = create_capture_ring();
        let running = Arc::new(AtomicBool::new(true));
        let err = AudioCapture::open_with_preference(
            producer,
            running,
            Arc::new(AtomicUsize::new(0)),
            None,
        )
        .err()
        .expect("no capture backend compiled in");
        assert!(err.to_string().contains("audio-cpal"));
    }
}
