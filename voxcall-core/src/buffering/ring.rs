//! Growable circular playback queue with a hard ceiling.
//!
//! Owned exclusively by the render context. Samples are stored as `f32` in
//! [-1.0, 1.0] so the playback interpolator never converts on the hot path.
//!
//! ## Invariants
//!
//! - `len <= capacity` at all times.
//! - `len <= max_len`: a push that would cross the ceiling is rejected whole
//!   and the queue is left untouched.
//! - Growth doubles capacity (capped at `max_len`) and copies the logical,
//!   possibly wrapped, window to the front of the new storage.

/// Why a push was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub queued: usize,
    pub incoming: usize,
    pub max_len: usize,
}

#[derive(Debug)]
pub struct PlaybackRing {
    buf: Vec<f32>,
    read: usize,
    len: usize,
    max_len: usize,
}

impl PlaybackRing {
    /// `initial_capacity` is clamped into `1..=max_len`.
    pub fn new(initial_capacity: usize, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        let capacity = initial_capacity.clamp(1, max_len);
        Self {
            buf: vec![0.0; capacity],
            read: 0,
            len: 0,
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn read_position(&self) -> usize {
        self.read
    }

    /// Append PCM samples, converting to `f32`.
    ///
    /// # Errors
    /// Returns `Overflow` (and changes nothing) when the whole frame does not
    /// fit under the ceiling.
    pub fn push_pcm(&mut self, samples: &[i16]) -> Result<(), Overflow> {
        let needed = self.len + samples.len();
        if needed > self.max_len {
            return Err(Overflow {
                queued: self.len,
                incoming: samples.len(),
                max_len: self.max_len,
            });
        }
        if needed > self.buf.len() {
            self.grow(needed);
        }

        let cap = self.buf.len();
        let mut write = (self.read + self.len) % cap;
        for &s in samples {
            self.buf[write] = s as f32 / 32768.0;
            write += 1;
            if write == cap {
                write = 0;
            }
        }
        self.len = needed;
        Ok(())
    }

    /// Sample at `offset` from the read position, if queued.
    #[inline]
    pub fn get(&self, offset: usize) -> Option<f32> {
        if offset >= self.len {
            return None;
        }
        Some(self.buf[(self.read + offset) % self.buf.len()])
    }

    /// Retire up to `n` samples from the front. Returns how many were retired.
    #[inline]
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        if n == 0 {
            return 0;
        }
        self.read = (self.read + n) % self.buf.len();
        self.len -= n;
        n
    }

    /// Hard reset: read position and queued count go to zero. Capacity is kept.
    pub fn clear(&mut self) {
        self.read = 0;
        self.len = 0;
    }

    /// Replace the ceiling (e.g. on `init`). Queued audio is discarded.
    pub fn reconfigure(&mut self, initial_capacity: usize, max_len: usize) {
        *self = Self::new(initial_capacity, max_len);
    }

    fn grow(&mut self, needed: usize) {
        let mut new_cap = self.buf.len().max(1);
        while new_cap < needed {
            new_cap = new_cap.saturating_mul(2);
        }
        let new_cap = new_cap.min(self.max_len);

        let mut next = vec![0.0f32; new_cap];
        let cap = self.buf.len();
        let first = self.len.min(cap - self.read);
        next[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        let rest = self.len - first;
        if rest > 0 {
            next[first..first + rest].copy_from_slice(&self.buf[..rest]);
        }

        self.buf = next;
        self.read = 0;
    }
}
