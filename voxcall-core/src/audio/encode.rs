//! Capture-side encode stage: downmix → resample → quantize → frame.
//!
//! The input callback only downmixes (allocation-free into a reusable
//! buffer) and pushes into the SPSC capture ring. Resampling, quantizing
//! and framing run on the capture loop thread via [`CaptureEncoder`].

use std::collections::VecDeque;

use crate::buffering::frame::AudioFrame;
use crate::error::Result;

use super::resample::{RateConverter, ResampleMode};

/// Average interleaved `channels`-wide input into mono, reusing `out`.
///
/// `convert` maps one device sample to `f32` in [-1.0, 1.0]. A trailing
/// partial frame (fewer than `channels` samples) is ignored.
pub fn downmix_into<T: Copy>(
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> f32,
    out: &mut Vec<f32>,
) {
    let channels = channels.max(1);
    let frames = data.len() / channels;
    out.clear();
    if channels == 1 {
        out.extend(data.iter().take(frames).map(|&s| convert(s)));
        return;
    }
    let scale = 1.0 / channels as f32;
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| convert(s)).sum();
        out.push(sum * scale);
    }
}

/// Clamp to [-1.0, 1.0] and round to the nearest i16. Non-finite → 0.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Turns a stream of mono device-rate samples into fixed-size network frames.
pub struct CaptureEncoder {
    converter: RateConverter,
    target_rate: u32,
    frame_samples: usize,
    pending: Vec<i16>,
}

impl CaptureEncoder {
    /// # Errors
    /// Propagates resampler construction failures.
    pub fn new(
        mode: ResampleMode,
        capture_rate: u32,
        target_rate: u32,
        frame_samples: usize,
    ) -> Result<Self> {
        let frame_samples = frame_samples.max(1);
        Ok(Self {
            converter: RateConverter::new(mode, capture_rate, target_rate)?,
            target_rate,
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.converter.is_passthrough()
    }

    /// Resample and quantize `mono`, appending every completed frame to `out`.
    /// Returns the number of frames produced.
    pub fn encode(&mut self, mono: &[f32], out: &mut Vec<AudioFrame>) -> usize {
        let resampled = self.converter.process(mono);
        self.pending.extend(resampled.iter().map(|&s| quantize(s)));

        let mut produced = 0;
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let full = std::mem::replace(&mut self.pending, rest);
            out.push(AudioFrame::new(full, self.target_rate));
            produced += 1;
        }
        produced
    }

    /// Drop partial state so audio from before a mute never leaks into the
    /// next unmuted frame.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.converter.reset();
    }
}

/// Bounded outbound backlog with oldest-dropped eviction.
///
/// Holds frames the transport could not accept immediately and frames
/// produced during the device warm-up window.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
    evicted: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append `frame`, evicting the oldest when full. Returns `true` if a
    /// frame was evicted.
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        let evicted = if self.frames.len() == self.capacity {
            self.frames.pop_front();
            self.evicted += 1;
            true
        } else {
            false
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Offer queued frames to `send` oldest-first until it refuses one.
    /// A refused frame goes back to the front. Returns how many were sent.
    pub fn flush_with<F>(&mut self, mut send: F) -> usize
    where
        F: FnMut(AudioFrame) -> std::result::Result<(), AudioFrame>,
    {
        let mut sent = 0;
        while let Some(frame) = self.frames.pop_front() {
            match send(frame) {
                Ok(()) => sent += 1,
                Err(frame) => {
                    self.frames.push_front(frame);
                    break;
                }
            }
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total frames evicted since creation.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
