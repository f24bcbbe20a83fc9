//! Typed PCM frame exchanged between capture, transport and playback.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::FrameError;

/// A contiguous block of mono signed 16-bit PCM samples at a known sample rate.
///
/// Immutable once built. Ownership moves to whichever consumer accepts it
/// (the transport writer or the playback ring).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode a raw little-endian PCM payload (one binary transport message).
    ///
    /// # Errors
    /// `FrameError::Empty` for a zero-length payload, `FrameError::OddLength`
    /// when the byte count is not a whole number of samples.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Result<Self, FrameError> {
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }
        if bytes.len() % 2 != 0 {
            return Err(FrameError::OddLength(bytes.len()));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self::new(samples, sample_rate))
    }

    /// Decode the base64 payload of an `audio_chunk` control message.
    pub fn from_base64(data: &str, sample_rate: u32) -> Result<Self, FrameError> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| FrameError::Base64(e.to_string()))?;
        Self::from_le_bytes(&bytes, sample_rate)
    }

    /// Serialise as raw little-endian PCM for a binary transport message.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_pairs() {
        let frame = AudioFrame::from_le_bytes(&[0x01, 0x00, 0xff, 0xff, 0x00, 0x80], 24_000)
            .expect("valid payload");
        assert_eq!(frame.samples(), &[1, -1, i16::MIN]);
        assert_eq!(frame.sample_rate(), 24_000);
    }

    #[test]
    fn rejects_odd_and_empty_payloads() {
        assert_eq!(
            AudioFrame::from_le_bytes(&[0x01, 0x00, 0x02], 24_000),
            Err(FrameError::OddLength(3))
        );
        assert_eq!(AudioFrame::from_le_bytes(&[], 24_000), Err(FrameError::Empty));
    }

    #[test]
    fn base64_payload_matches_binary_payload() {
        let frame = AudioFrame::new(vec![100, -200, 300], 24_000);
        let encoded = STANDARD.encode(frame.to_le_bytes());
        let decoded = AudioFrame::from_base64(&encoded, 24_000).expect("valid base64");
        assert_eq!(decoded, frame);
        assert!(AudioFrame::from_base64("not base64!!", 24_000).is_err());
    }

    #[test]
    fn duration_of_100ms_frame() {
        let frame = AudioFrame::new(vec![0; 2_400], 24_000);
        assert!((frame.duration_ms() - 100.0).abs() < 1e-9);
    }
}
