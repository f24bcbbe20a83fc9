//! Sample-rate conversion from the device input rate to the network rate.
//!
//! ## Modes
//!
//! - [`LinearResampler`] (default): interpolates between the two nearest
//!   source samples. Its read position is tracked as an exact rational
//!   (`numerator / target_rate`) so the fractional remainder carries across
//!   block boundaries without accumulating drift. Output depends only on the
//!   concatenated input, never on how it was split into blocks.
//! - [`PolynomialResampler`]: rubato `FastFixedIn` with cubic interpolation,
//!   for hosts that prefer quality over the extra block latency.
//!
//! Both return the input untouched when the two rates match.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Result, VoxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMode {
    #[default]
    Linear,
    Polynomial,
}

/// Resampler selected by [`ResampleMode`].
pub enum RateConverter {
    Linear(LinearResampler),
    Polynomial(PolynomialResampler),
}

impl RateConverter {
    /// # Errors
    /// Returns `VoxError::AudioDevice` for a zero rate or a rubato init failure.
    pub fn new(mode: ResampleMode, capture_rate: u32, target_rate: u32) -> Result<Self> {
        if capture_rate == 0 || target_rate == 0 {
            return Err(VoxError::AudioDevice(format!(
                "invalid resample rates {capture_rate} -> {target_rate}"
            )));
        }
        Ok(match mode {
            ResampleMode::Linear => Self::Linear(LinearResampler::new(capture_rate, target_rate)),
            ResampleMode::Polynomial => Self::Polynomial(PolynomialResampler::new(
                capture_rate,
                target_rate,
                POLYNOMIAL_CHUNK,
            )?),
        })
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        match self {
            Self::Linear(r) => r.process(samples),
            Self::Polynomial(r) => r.process(samples),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        match self {
            Self::Linear(r) => r.is_passthrough(),
            Self::Polynomial(r) => r.is_passthrough(),
        }
    }

    /// Forget carried state (e.g. when capture is re-enabled after a gap).
    pub fn reset(&mut self) {
        match self {
            Self::Linear(r) => r.reset(),
            Self::Polynomial(r) => r.reset(),
        }
    }
}

/// Input frames per rubato call: 10 ms at 48 kHz.
const POLYNOMIAL_CHUNK: usize = 480;

/// Streaming linear-interpolation resampler.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    capture_rate: u64,
    target_rate: u64,
    /// Last sample of the previous block; index 0 of the virtual source.
    carry: Option<f32>,
    /// Read position in units of `1 / target_rate` source samples,
    /// relative to `carry`.
    pos: u64,
}

impl LinearResampler {
    pub fn new(capture_rate: u32, target_rate: u32) -> Self {
        Self {
            capture_rate: capture_rate as u64,
            target_rate: target_rate as u64,
            carry: None,
            pos: 0,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.capture_rate == self.target_rate
    }

    pub fn reset(&mut self) {
        self.carry = None;
        self.pos = 0;
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return samples.to_vec();
        }
        if samples.is_empty() {
            return Vec::new();
        }

        // Virtual source: [carry, samples...]. On the very first block the
        // first input sample plays the role of the carry.
        let (head, body) = match self.carry {
            Some(c) => (c, samples),
            None => (samples[0], &samples[1..]),
        };
        let source_at = |i: usize| if i == 0 { head } else { body[i - 1] };
        let last_index = body.len();

        let expected = (body.len() as u64 * self.target_rate / self.capture_rate) as usize + 1;
        let mut out = Vec::with_capacity(expected);

        loop {
            let index = (self.pos / self.target_rate) as usize;
            let rem = self.pos % self.target_rate;
            // Past the block, or between the last sample and the next block.
            if index > last_index || (index == last_index && rem != 0) {
                break;
            }
            let a = source_at(index);
            let value = if rem == 0 {
                a
            } else {
                let b = source_at(index + 1);
                a + (b - a) * (rem as f32 / self.target_rate as f32)
            };
            out.push(value);
            self.pos += self.capture_rate;
        }

        // Re-base so the last sample of this block becomes index 0.
        self.pos -= last_index as u64 * self.target_rate;
        self.carry = Some(source_at(last_index));
        out
    }
}

/// Fixed-ratio cubic resampler backed by rubato.
pub struct PolynomialResampler {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input chunk carried between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl PolynomialResampler {
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| VoxError::AudioDevice(format!("resampler init: {e}")))?;
        let max_out = resampler.output_frames_max();

        tracing::info!(
            capture_rate,
            target_rate,
            chunk_size,
            "polynomial resampling enabled"
        );

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn reset(&mut self) {
        self.input_buf.clear();
        if let Some(r) = self.resampler.as_mut() {
            r.reset();
        }
    }

    /// Samples are accumulated until a full chunk is available; any
    /// remainder is kept for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }
}
