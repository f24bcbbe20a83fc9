//! Speaker output stream. The render context lives here.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::error::Result;
use crate::playback::PlaybackDriver;

/// Render `frames` mono samples through `driver` into `scratch`, then fan
/// them out to every interleaved channel of `out` via `convert`.
///
/// `scratch` is reused between callbacks; it only grows when the device
/// asks for a larger buffer than ever before.
pub fn render_interleaved<T: Copy>(
    driver: &mut PlaybackDriver,
    scratch: &mut Vec<f32>,
    out: &mut [T],
    channels: usize,
    convert: impl Fn(f32) -> T,
) {
    let channels = channels.max(1);
    let frames = out.len() / channels;
    if scratch.len() < frames {
        scratch.resize(frames, 0.0);
    }
    let mono = &mut scratch[..frames];
    driver.render(mono);
    for (frame, &sample) in out.chunks_exact_mut(channels).zip(mono.iter()) {
        let value = convert(sample);
        frame.fill(value);
    }
}

/// Handle to an active speaker stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioOutput {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Device output rate (Hz). May differ from the network rate.
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioOutput {
    /// Open the preferred output device and move `driver` into its callback.
    ///
    /// The device is asked for the driver's network rate. If it cannot run
    /// at that rate its default rate is used and the driver is told to
    /// scale its read step.
    ///
    /// # Errors
    /// `VoxError::NoDefaultOutputDevice` or `VoxError::AudioStream`.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut driver: PlaybackDriver,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use crate::error::VoxError;

        let device = super::device::select_output_device(preferred_device_name)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let wanted = SampleRate(driver.sample_rate());
        let supported = pick_output_config(&device, wanted)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        if sample_rate != wanted.0 {
            warn!(
                device_rate = sample_rate,
                stream_rate = wanted.0,
                "output device cannot run at stream rate, scaling playback step"
            );
            driver.set_output_rate(sample_rate);
        }
        info!(sample_rate, channels, "output config selected");

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let ch = channels as usize;
        let on_error = |err| error!("output stream error: {err}");
        let mut scratch: Vec<f32> = Vec::new();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _info| {
                    render_interleaved(&mut driver, &mut scratch, data, ch, |s| s);
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _info| {
                    render_interleaved(&mut driver, &mut scratch, data, ch, super::encode::quantize);
                },
                on_error,
                None,
            ),
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _info| {
                    render_interleaved(&mut driver, &mut scratch, data, ch, |s| {
                        (super::encode::quantize(s) as i32 + 32768) as u16
                    });
                },
                on_error,
                None,
            ),
            fmt => {
                return Err(VoxError::AudioStream(format!(
                    "unsupported output sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| VoxError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VoxError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }
}

/// Prefer a supported range containing `wanted`, otherwise the default config.
#[cfg(feature = "audio-cpal")]
fn pick_output_config(device: &cpal::Device, wanted: SampleRate) -> Result<SupportedStreamConfig> {
    use crate::error::VoxError;

    let ranged = device.supported_output_configs().ok().and_then(|mut configs| {
        configs.find(|c| {
            c.min_sample_rate() <= wanted
                && wanted <= c.max_sample_rate()
                && matches!(
                    c.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                )
        })
    });
    match ranged {
        Some(range) => Ok(range.with_sample_rate(wanted)),
        None => device
            .default_output_config()
            .map_err(|e| VoxError::AudioDevice(e.to_string())),
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl AudioOutput {
    pub fn open_with_preference(
        _driver: PlaybackDriver,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(crate::error::VoxError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffering::frame::AudioFrame;
    use crate::playback::{playback_channel, rate::RateLimits, PlaybackConfig, PlaybackStats};

    #[test]
    fn mono_render_is_duplicated_across_channels() {
        let config = PlaybackConfig {
            sample_rate: 1_000,
            initial_threshold_ms: 4,
            fade_ms: 0,
            rate: RateLimits {
                base: 1.0,
                ..RateLimits::default()
            },
            ..PlaybackConfig::default()
        };
        let (handle, mut driver, _events) =
            playback_channel(config, Arc::new(PlaybackStats::default()));
        handle.chunk(AudioFrame::new(vec![16_384; 8], 1_000));

        let mut scratch = Vec::new();
        let mut out = [0.0f32; 6];
        render_interleaved(&mut driver, &mut scratch, &mut out, 2, |s| s);
        assert_eq!(out, [0.5; 6]);
        assert_eq!(scratch.len(), 3);

        let mut out = [0i16; 4];
        render_interleaved(&mut driver, &mut scratch, &mut out, 2, crate::audio::encode::quantize);
        assert_eq!(out, [16_384; 4]);
        assert_eq!(scratch.len(), 3, "scratch never shrinks or regrows");
    }
}
