//! Sample buffers.
//!
//! - [`frame::AudioFrame`]: immutable PCM frame moved between components.
//! - [`ring::PlaybackRing`]: growable jitter queue owned by the render context.
//! - A lock-free SPSC ring (`ringbuf::HeapRb<f32>`) carrying downmixed mono
//!   samples from the input callback to the capture/encode loop. Its
//!   `push_slice` is wait-free and safe to call from the real-time callback.

pub mod frame;
pub mod ring;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the input device callback.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture/encode loop.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Capture ring capacity: 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz.
/// The encode loop drains every few milliseconds, so this only absorbs
/// scheduler stalls.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(CAPTURE_RING_CAPACITY).split()
}
