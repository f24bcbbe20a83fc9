//! Jitter buffer and adaptive playback engine.
//!
//! ## States (derived, not stored as an enum)
//!
//! ```text
//!            queued >= initial_threshold
//!            (or final expected and queued > 0)
//!   Cold ───────────────────────────────────────► Playing
//!    ▲                                              │
//!    │  queue empties (drain event)                 │
//!    └──────────────────────────────────────────────┤
//!    ▲                                              │
//!    │  final expected and queued <= grace          │
//!    └──────────────── final_done ◄─────────────────┘
//! ```
//!
//! While cold the engine outputs silence and makes no rate adjustment.
//! While playing it reads the ring at a fractional offset, interpolating
//! linearly between adjacent samples and advancing by the current rate.
//! Below the low water mark (half the initial threshold) the rate goal is
//! capped at `base` so the queue rebuilds margin.
//!
//! Everything here runs in the render context. No method blocks, logs or
//! performs I/O; events leave through a bounded channel with `try_send`.

pub mod driver;
pub mod rate;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use crate::buffering::{frame::AudioFrame, ring::PlaybackRing};
use rate::{RateController, RateLimits};

pub use driver::{playback_channel, PlaybackDriver, PlaybackHandle};

/// Jitter buffer configuration. Durations are converted to sample counts
/// at `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Output and inbound PCM rate (Hz). Default: 24 000.
    pub sample_rate: u32,
    /// Pre-buffer required before playback starts. Default: 300 ms.
    pub initial_threshold_ms: u32,
    /// Hard ceiling on queued audio. Default: 10 s.
    pub max_buffer_ms: u32,
    /// Ring allocation at init; doubles on demand up to the ceiling.
    pub initial_capacity_ms: u32,
    /// Fade-in window after a gap; also the finalization grace threshold.
    /// Default: 5 ms.
    pub fade_ms: u32,
    pub rate: RateLimits,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            initial_threshold_ms: 300,
            max_buffer_ms: 10_000,
            initial_capacity_ms: 1_000,
            fade_ms: 5,
            rate: RateLimits::default(),
        }
    }
}

impl PlaybackConfig {
    fn samples_for(&self, ms: u32) -> usize {
        (self.sample_rate as u64 * ms as u64 / 1000) as usize
    }

    pub fn initial_threshold_samples(&self) -> usize {
        self.samples_for(self.initial_threshold_ms).max(1)
    }

    pub fn low_water_samples(&self) -> usize {
        self.initial_threshold_samples() / 2
    }

    pub fn max_buffer_samples(&self) -> usize {
        self.samples_for(self.max_buffer_ms)
            .max(self.initial_threshold_samples())
    }

    pub fn fade_samples(&self) -> usize {
        self.samples_for(self.fade_ms)
    }
}

/// Commands accepted by the render context, applied in issue order.
#[derive(Debug)]
pub enum PlaybackCommand {
    Init(PlaybackConfig),
    Chunk(AudioFrame),
    SetRate { value: f32, allow_above_base: bool },
    /// Arm finalization for the utterance tagged `id`. Replaces any
    /// finalization already armed.
    FinalExpected(u64),
    /// Disarm finalization without emitting anything.
    CancelFinal,
    /// Clear the queue and reset rate state without notifying.
    Flush,
    /// Clear the queue, reset rate state and emit one `Drain`.
    FlushImmediate,
}

/// Events emitted by the render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The queue ran dry mid-stream, or an immediate flush happened.
    Drain,
    /// The finalization armed with this id resolved.
    FinalDone(u64),
}

/// Lock-free counters shared with the control context.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    pub chunks_enqueued: AtomicUsize,
    pub chunks_dropped_overflow: AtomicUsize,
    pub chunks_dropped_malformed: AtomicUsize,
    pub drains: AtomicUsize,
    pub finals: AtomicUsize,
    pub events_lost: AtomicUsize,
}

impl PlaybackStats {
    pub fn reset(&self) {
        self.chunks_enqueued.store(0, Ordering::Relaxed);
        self.chunks_dropped_overflow.store(0, Ordering::Relaxed);
        self.chunks_dropped_malformed.store(0, Ordering::Relaxed);
        self.drains.store(0, Ordering::Relaxed);
        self.finals.store(0, Ordering::Relaxed);
        self.events_lost.store(0, Ordering::Relaxed);
    }
}

pub struct PlaybackEngine {
    config: PlaybackConfig,
    ring: PlaybackRing,
    rate: RateController,
    initial_threshold: usize,
    low_water: usize,
    fade_len: usize,
    /// Fractional read offset in [0, 1) relative to the ring's read position.
    frac: f32,
    /// Source samples per output sample at rate 1.0 (`sample_rate / device rate`).
    step_scale: f32,
    playing: bool,
    fade_pos: usize,
    final_expected: bool,
    final_id: u64,
    events: mpsc::Sender<PlaybackEvent>,
    stats: Arc<PlaybackStats>,
}

impl PlaybackEngine {
    pub fn new(
        config: PlaybackConfig,
        events: mpsc::Sender<PlaybackEvent>,
        stats: Arc<PlaybackStats>,
    ) -> Self {
        let ring = PlaybackRing::new(
            config.samples_for(config.initial_capacity_ms),
            config.max_buffer_samples(),
        );
        let mut engine = Self {
            rate: RateController::new(config.rate),
            initial_threshold: 0,
            low_water: 0,
            fade_len: 0,
            ring,
            config,
            frac: 0.0,
            step_scale: 1.0,
            playing: false,
            fade_pos: 0,
            final_expected: false,
            final_id: 0,
            events,
            stats,
        };
        engine.derive_thresholds();
        engine
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn queued(&self) -> usize {
        self.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn final_expected(&self) -> bool {
        self.final_expected
    }

    pub fn current_rate(&self) -> f32 {
        self.rate.current()
    }

    pub fn target_rate(&self) -> f32 {
        self.rate.target()
    }

    /// Adapt to an output device running at a different rate than the
    /// inbound PCM. The read step is scaled so pitch is preserved.
    pub fn set_output_rate(&mut self, output_rate: u32) {
        self.step_scale = if output_rate == 0 {
            1.0
        } else {
            self.config.sample_rate as f32 / output_rate as f32
        };
    }

    pub fn apply(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Init(config) => self.reinit(config),
            PlaybackCommand::Chunk(frame) => self.enqueue(&frame),
            PlaybackCommand::SetRate {
                value,
                allow_above_base,
            } => self.rate.set_target(value, allow_above_base),
            PlaybackCommand::FinalExpected(id) => {
                self.final_expected = true;
                self.final_id = id;
            }
            PlaybackCommand::CancelFinal => self.final_expected = false,
            PlaybackCommand::Flush => self.reset_queue(),
            PlaybackCommand::FlushImmediate => {
                self.reset_queue();
                self.stats.drains.fetch_add(1, Ordering::Relaxed);
                self.emit(PlaybackEvent::Drain);
            }
        }
    }

    /// Fill one render callback of mono output.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.playing {
            let low_water = self.ring.len() < self.low_water;
            self.rate.tick(low_water);
        }
        for slot in out.iter_mut() {
            *slot = self.next_sample();
        }
    }

    fn next_sample(&mut self) -> f32 {
        if self.final_expected && self.ring.len() <= self.fade_len {
            self.finish();
            return 0.0;
        }

        if !self.playing {
            let primed = self.ring.len() >= self.initial_threshold
                || (self.final_expected && !self.ring.is_empty());
            if !primed {
                return 0.0;
            }
            self.playing = true;
            self.fade_pos = 0;
            self.frac = 0.0;
        }

        let Some(a) = self.ring.get(0) else {
            self.underrun();
            return 0.0;
        };
        let b = self.ring.get(1).unwrap_or(a);
        let mut value = a + (b - a) * self.frac;

        if self.fade_pos < self.fade_len {
            value *= self.fade_pos as f32 / self.fade_len as f32;
            self.fade_pos += 1;
        }

        self.frac += self.rate.current() * self.step_scale;
        let whole = self.frac as usize;
        if whole > 0 {
            self.frac -= whole as f32;
            self.ring.discard(whole);
            if self.ring.is_empty() && !self.final_expected {
                self.underrun();
            }
        }

        value
    }

    fn enqueue(&mut self, frame: &AudioFrame) {
        if frame.is_empty() || frame.sample_rate() != self.config.sample_rate {
            self.stats
                .chunks_dropped_malformed
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.ring.push_pcm(frame.samples()) {
            Ok(()) => {
                self.stats.chunks_enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats
                    .chunks_dropped_overflow
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Queue went from non-empty to empty while playing.
    fn underrun(&mut self) {
        self.playing = false;
        self.fade_pos = 0;
        self.frac = 0.0;
        self.stats.drains.fetch_add(1, Ordering::Relaxed);
        self.emit(PlaybackEvent::Drain);
    }

    /// Resolve the armed finalization exactly once.
    fn finish(&mut self) {
        self.ring.clear();
        self.playing = false;
        self.fade_pos = 0;
        self.frac = 0.0;
        self.final_expected = false;
        self.stats.finals.fetch_add(1, Ordering::Relaxed);
        self.emit(PlaybackEvent::FinalDone(self.final_id));
    }

    fn reset_queue(&mut self) {
        self.ring.clear();
        self.rate.reset();
        self.playing = false;
        self.fade_pos = 0;
        self.frac = 0.0;
        self.final_expected = false;
    }

    fn reinit(&mut self, config: PlaybackConfig) {
        self.ring.reconfigure(
            config.samples_for(config.initial_capacity_ms),
            config.max_buffer_samples(),
        );
        self.rate = RateController::new(config.rate);
        self.config = config;
        self.derive_thresholds();
        self.playing = false;
        self.fade_pos = 0;
        self.frac = 0.0;
        self.final_expected = false;
    }

    fn derive_thresholds(&mut self) {
        self.initial_threshold = self.config.initial_threshold_samples();
        self.low_water = self.config.low_water_samples();
        self.fade_len = self.config.fade_samples();
    }

    fn emit(&self, event: PlaybackEvent) {
        if self.events.try_send(event).is_err() {
            self.stats.events_lost.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    /// 1 kHz "sample rate" keeps sample counts equal to milliseconds.
    fn config() -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: 1_000,
            initial_threshold_ms: 100,
            max_buffer_ms: 1_000,
            initial_capacity_ms: 64,
            fade_ms: 4,
            rate: RateLimits {
                base: 1.0,
                min: 0.5,
                max: 2.0,
                step: 0.05,
            },
        }
    }

    fn engine() -> (PlaybackEngine, mpsc::Receiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (
            PlaybackEngine::new(config(), tx, Arc::new(PlaybackStats::default())),
            rx,
        )
    }

    fn chunk(len: usize, value: i16) -> PlaybackCommand {
        PlaybackCommand::Chunk(AudioFrame::new(vec![value; len], 1_000))
    }

    fn drain_events(rx: &mut mpsc::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(ev) => out.push(ev),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return out,
            }
        }
    }

    #[test]
    fn cold_engine_outputs_silence_below_threshold() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(99, 16_384));
        let mut out = vec![1.0; 32];
        eng.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(eng.queued(), 99);
        assert!(!eng.is_playing());
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn playback_starts_with_fade_in() {
        let (mut eng, _rx) = engine();
        eng.apply(chunk(100, 16_384));
        let mut out = vec![0.0; 8];
        eng.render(&mut out);
        assert!(eng.is_playing());
        assert_eq!(&out[..4], &[0.0, 0.125, 0.25, 0.375]);
        assert!(out[4..].iter().all(|&s| s == 0.5));
        assert_eq!(eng.queued(), 92);
    }

    #[test]
    fn interpolates_between_adjacent_samples() {
        let (mut eng, _rx) = engine();
        let mut samples = vec![0i16; 100];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = (i as i16) * 100;
        }
        eng.apply(PlaybackCommand::Chunk(AudioFrame::new(samples, 1_000)));
        eng.apply(PlaybackCommand::SetRate {
            value: 0.5,
            allow_above_base: false,
        });
        // Converge to 0.5 (10 cycles of 0.05) before checking values.
        let mut scratch = vec![0.0; 1];
        for _ in 0..12 {
            eng.render(&mut scratch);
        }
        assert!((eng.current_rate() - 0.5).abs() < 1e-6);
        let mut out = vec![0.0; 4];
        eng.render(&mut out);
        let step = 100.0 / 32768.0;
        for pair in out.windows(2) {
            assert!(((pair[1] - pair[0]) - step * 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn underrun_emits_drain_once_and_refades() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(100, 16_384));
        let mut out = vec![0.0; 150];
        eng.render(&mut out);
        assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::Drain]);
        assert!(out[100..].iter().all(|&s| s == 0.0));
        assert!(!eng.is_playing());

        eng.apply(chunk(100, 16_384));
        let mut out = vec![0.0; 2];
        eng.render(&mut out);
        assert_eq!(out[0], 0.0, "fade restarts after the gap");
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn drain_fires_when_last_sample_is_retired_at_callback_end() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(100, 16_384));
        let mut out = vec![0.0; 100];
        eng.render(&mut out);
        assert_eq!(eng.queued(), 0);
        assert!(!eng.is_playing());
        assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::Drain]);

        // Refilled before the next callback: no read ever sees an empty ring.
        eng.apply(chunk(100, 16_384));
        eng.render(&mut out);
        assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::Drain]);
        assert_eq!(eng.stats.drains.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn final_done_carries_the_latest_armed_id() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(60, 16_384));
        eng.apply(PlaybackCommand::FinalExpected(4));
        eng.apply(PlaybackCommand::FinalExpected(5));
        let mut out = vec![0.0; 80];
        eng.render(&mut out);
        assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::FinalDone(5)]);
    }

    #[test]
    fn cancel_final_lets_the_queue_drain_normally() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(60, 16_384));
        eng.apply(PlaybackCommand::FinalExpected(2));
        eng.apply(PlaybackCommand::CancelFinal);
        let mut out = vec![0.0; 80];
        eng.render(&mut out);
        assert!(!eng.final_expected());
        assert_eq!(eng.queued(), 60, "cold below threshold once disarmed");
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn overflow_drops_the_frame() {
        let (mut eng, _rx) = engine();
        eng.apply(chunk(900, 1));
        eng.apply(chunk(200, 1));
        assert_eq!(eng.queued(), 900);
        eng.apply(chunk(100, 1));
        assert_eq!(eng.queued(), 1_000);
        assert!(eng.capacity() <= 1_000);
        assert_eq!(
            eng.stats.chunks_dropped_overflow.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn malformed_frames_are_dropped_and_playback_continues() {
        let (mut eng, _rx) = engine();
        eng.apply(PlaybackCommand::Chunk(AudioFrame::new(vec![], 1_000)));
        eng.apply(PlaybackCommand::Chunk(AudioFrame::new(vec![5; 50], 48_000)));
        assert_eq!(eng.queued(), 0);
        eng.apply(chunk(120, 16_384));
        let mut out = vec![0.0; 10];
        eng.render(&mut out);
        assert!(eng.is_playing());
        assert_eq!(
            eng.stats.chunks_dropped_malformed.load(Ordering::Relaxed),
            2
        );
    }

    #[test]
    fn final_done_fires_exactly_once_at_grace_threshold() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(120, 16_384));
        eng.apply(PlaybackCommand::FinalExpected(1));

        let mut finals = 0;
        let mut out = vec![0.0; 10];
        for _ in 0..30 {
            let before = eng.queued();
            eng.render(&mut out);
            for ev in drain_events(&mut rx) {
                assert_eq!(ev, PlaybackEvent::FinalDone(1));
                finals += 1;
                assert!(before <= 10 + 4, "fired early with {before} queued");
            }
        }
        assert_eq!(finals, 1);
        assert_eq!(eng.queued(), 0);
        assert!(!eng.final_expected());
    }

    #[test]
    fn final_expected_on_empty_queue_resolves_immediately() {
        let (mut eng, mut rx) = engine();
        eng.apply(PlaybackCommand::FinalExpected(1));
        let mut out = vec![0.0; 4];
        eng.render(&mut out);
        assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::FinalDone(1)]);
        eng.render(&mut out);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn short_utterance_plays_out_when_final_expected() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(40, 16_384));
        eng.apply(PlaybackCommand::FinalExpected(1));
        let mut out = vec![0.0; 60];
        eng.render(&mut out);
        assert!(out[4..30].iter().all(|&s| s == 0.5));
        assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::FinalDone(1)]);
    }

    #[test]
    fn flush_immediate_always_yields_one_drain() {
        for prefill in [0usize, 30, 100, 500] {
            let (mut eng, mut rx) = engine();
            if prefill > 0 {
                eng.apply(chunk(prefill, 100));
            }
            eng.apply(PlaybackCommand::FinalExpected(1));
            let mut out = vec![0.0; 3];
            if prefill > 100 {
                eng.render(&mut out);
            }
            let _ = drain_events(&mut rx);

            eng.apply(PlaybackCommand::FlushImmediate);
            assert_eq!(eng.queued(), 0);
            assert!(!eng.final_expected());
            assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::Drain]);

            eng.render(&mut out);
            assert!(drain_events(&mut rx).is_empty());
        }
    }

    #[test]
    fn flush_is_silent_and_resets_rate() {
        let (mut eng, mut rx) = engine();
        eng.apply(chunk(200, 100));
        eng.apply(PlaybackCommand::SetRate {
            value: 1.5,
            allow_above_base: true,
        });
        let mut out = vec![0.0; 4];
        eng.render(&mut out);
        eng.apply(PlaybackCommand::Flush);
        assert_eq!(eng.queued(), 0);
        assert_eq!(eng.current_rate(), 1.0);
        assert_eq!(eng.target_rate(), 1.0);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn init_reconfigures_thresholds() {
        let (mut eng, _rx) = engine();
        eng.apply(chunk(50, 100));
        let mut cfg = config();
        cfg.initial_threshold_ms = 20;
        eng.apply(PlaybackCommand::Init(cfg));
        assert_eq!(eng.queued(), 0);
        eng.apply(chunk(20, 100));
        let mut out = vec![0.0; 2];
        eng.render(&mut out);
        assert!(eng.is_playing());
    }

    #[test]
    fn rate_changes_are_bounded_per_render_cycle() {
        let (mut eng, _rx) = engine();
        eng.apply(chunk(1_000, 100));
        eng.apply(PlaybackCommand::SetRate {
            value: 2.0,
            allow_above_base: true,
        });
        let mut out = vec![0.0; 4];
        let mut prev = eng.current_rate();
        for _ in 0..40 {
            eng.render(&mut out);
            assert!((eng.current_rate() - prev).abs() <= 0.05 + 1e-6);
            prev = eng.current_rate();
        }
        assert!((eng.current_rate() - 2.0).abs() < 1e-6);
    }
}
