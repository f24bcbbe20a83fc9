//! Blocking capture loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Drain the capture ring (mono f32 at the device rate)
//! 2. Mic gate closed → discard, reset encoder state on the next open
//! 3. Resample → quantize → fixed-size frames
//! 4. Before warm_until, or while a backlog exists → OutboundQueue
//!    otherwise → TransportSender::try_send_frame, backlog on Full
//! ```
//!
//! The loop runs in `spawn_blocking`, keeping sample math off the control
//! task. It never waits on the transport.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, OnceLock,
};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    audio::encode::{CaptureEncoder, OutboundQueue},
    buffering::{frame::AudioFrame, CaptureConsumer, Consumer},
    error::TransportError,
    playback::PlaybackStats,
    transport::TransportSender,
};

/// Lock-free call counters. Capture-side fields are written by the capture
/// loop, inbound fields by the control task, playback fields by the render
/// callback.
#[derive(Debug, Default)]
pub struct CallDiagnostics {
    pub frames_captured: AtomicUsize,
    pub frames_sent: AtomicUsize,
    pub frames_queued: AtomicUsize,
    pub frames_evicted: AtomicUsize,
    /// Frames lost because the transport was already closed.
    pub frames_dropped_closed: AtomicUsize,
    /// Samples the input callback could not fit into the capture ring.
    pub capture_samples_dropped: Arc<AtomicUsize>,
    pub frames_received: AtomicUsize,
    pub frames_malformed: AtomicUsize,
    /// Agent audio dropped after an interrupt.
    pub frames_discarded: AtomicUsize,
    pub fallbacks_fired: AtomicUsize,
    pub playback: Arc<PlaybackStats>,
}

impl CallDiagnostics {
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_queued.store(0, Ordering::Relaxed);
        self.frames_evicted.store(0, Ordering::Relaxed);
        self.frames_dropped_closed.store(0, Ordering::Relaxed);
        self.capture_samples_dropped.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_malformed.store(0, Ordering::Relaxed);
        self.frames_discarded.store(0, Ordering::Relaxed);
        self.fallbacks_fired.store(0, Ordering::Relaxed);
        self.playback.reset();
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let p = &self.playback;
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            frames_dropped_closed: self.frames_dropped_closed.load(Ordering::Relaxed),
            capture_samples_dropped: self.capture_samples_dropped.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            fallbacks_fired: self.fallbacks_fired.load(Ordering::Relaxed),
            chunks_enqueued: p.chunks_enqueued.load(Ordering::Relaxed),
            chunks_dropped_overflow: p.chunks_dropped_overflow.load(Ordering::Relaxed),
            chunks_dropped_malformed: p.chunks_dropped_malformed.load(Ordering::Relaxed),
            drains: p.drains.load(Ordering::Relaxed),
            finals: p.finals.load(Ordering::Relaxed),
            playback_events_lost: p.events_lost.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_captured: usize,
    pub frames_sent: usize,
    pub frames_queued: usize,
    pub frames_evicted: usize,
    pub frames_dropped_closed: usize,
    pub capture_samples_dropped: usize,
    pub frames_received: usize,
    pub frames_malformed: usize,
    pub frames_discarded: usize,
    pub fallbacks_fired: usize,
    pub chunks_enqueued: usize,
    pub chunks_dropped_overflow: usize,
    pub chunks_dropped_malformed: usize,
    pub drains: usize,
    pub finals: usize,
    pub playback_events_lost: usize,
}

/// Samples drained from the capture ring per pop: 20 ms at 48 kHz.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const DEFAULT_SLEEP_EMPTY_MS: u64 = 5;

fn empty_sleep_ms() -> u64 {
    static EMPTY_SLEEP_MS: OnceLock<u64> = OnceLock::new();
    *EMPTY_SLEEP_MS.get_or_init(|| {
        std::env::var("VOXCALL_CAPTURE_EMPTY_SLEEP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 20))
            .unwrap_or(DEFAULT_SLEEP_EMPTY_MS)
    })
}

/// Mic gate and loop flag shared between the control task and [`run`].
///
/// Dropping it closes the gate and stops the loop, including when the
/// control task is cancelled mid-call.
#[derive(Debug, Default)]
pub struct CaptureFlags {
    pub gate: Arc<AtomicBool>,
    pub running: Arc<AtomicBool>,
}

impl CaptureFlags {
    pub fn stop(&self) {
        self.gate.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }
}

impl Drop for CaptureFlags {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One capture-to-transport stage, advanced by [`CapturePump::pump`].
pub struct CapturePump {
    consumer: CaptureConsumer,
    encoder: CaptureEncoder,
    sender: TransportSender,
    gate: Arc<AtomicBool>,
    gate_was_open: bool,
    warm_until: Instant,
    backlog: OutboundQueue,
    transport_closed: bool,
    scratch: Vec<f32>,
    frames: Vec<AudioFrame>,
    diagnostics: Arc<CallDiagnostics>,
}

impl CapturePump {
    pub fn new(
        consumer: CaptureConsumer,
        encoder: CaptureEncoder,
        sender: TransportSender,
        gate: Arc<AtomicBool>,
        warm_until: Instant,
        backlog_frames: usize,
        diagnostics: Arc<CallDiagnostics>,
    ) -> Self {
        Self {
            consumer,
            encoder,
            sender,
            gate,
            gate_was_open: false,
            warm_until,
            backlog: OutboundQueue::new(backlog_frames),
            transport_closed: false,
            scratch: vec![0.0; DRAIN_CHUNK],
            frames: Vec::new(),
            diagnostics,
        }
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Run one iteration. Returns `true` if any samples were drained.
    pub fn pump(&mut self, now: Instant) -> bool {
        let warm = now >= self.warm_until;
        if warm {
            self.flush_backlog();
        }

        let open = self.gate.load(Ordering::Acquire);
        if open && !self.gate_was_open {
            self.encoder.reset();
            debug!("mic gate opened");
        }
        self.gate_was_open = open;

        let mut drained = false;
        loop {
            let n = self.consumer.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            drained = true;
            if open {
                self.encoder.encode(&self.scratch[..n], &mut self.frames);
            }
        }

        if self.frames.is_empty() {
            return drained;
        }
        self.diagnostics
            .frames_captured
            .fetch_add(self.frames.len(), Ordering::Relaxed);
        let frames = std::mem::take(&mut self.frames);
        for frame in frames {
            if warm && self.backlog.is_empty() {
                self.send_or_queue(frame);
            } else {
                self.enqueue(frame);
            }
        }
        drained
    }

    fn send_or_queue(&mut self, frame: AudioFrame) {
        if self.transport_closed {
            self.diagnostics
                .frames_dropped_closed
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.sender.try_send_frame(frame) {
            Ok(()) => {
                self.diagnostics.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err((TransportError::Full, frame)) => self.enqueue(frame),
            Err((_, _)) => self.mark_closed(1),
        }
    }

    fn enqueue(&mut self, frame: AudioFrame) {
        self.diagnostics.frames_queued.fetch_add(1, Ordering::Relaxed);
        if self.backlog.push(frame) {
            self.diagnostics
                .frames_evicted
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush_backlog(&mut self) {
        if self.backlog.is_empty() || self.transport_closed {
            return;
        }
        let sender = &self.sender;
        let mut closed = false;
        let sent = self.backlog.flush_with(|frame| match sender.try_send_frame(frame) {
            Ok(()) => Ok(()),
            Err((TransportError::Full, frame)) => Err(frame),
            Err((_, frame)) => {
                closed = true;
                Err(frame)
            }
        });
        self.diagnostics
            .frames_sent
            .fetch_add(sent, Ordering::Relaxed);
        if closed {
            self.mark_closed(0);
        }
    }

    /// `in_flight` counts a rejected frame that is not in the backlog.
    fn mark_closed(&mut self, in_flight: usize) {
        if !self.transport_closed {
            warn!("transport closed, dropping outbound audio");
        }
        self.transport_closed = true;
        let lost = self.backlog.len() + in_flight;
        self.backlog.clear();
        self.diagnostics
            .frames_dropped_closed
            .fetch_add(lost, Ordering::Relaxed);
    }
}

/// Run `pump` until `running` becomes false or the transport goes away.
pub fn run(mut pump: CapturePump, running: Arc<AtomicBool>) {
    info!(
        passthrough = pump.encoder.is_passthrough(),
        backlog_capacity = pump.backlog.capacity(),
        "capture loop started"
    );
    let idle = Duration::from_millis(empty_sleep_ms());
    while running.load(Ordering::Acquire) {
        if pump.sender.is_closed() {
            debug!("transport receiver gone, capture loop exiting");
            break;
        }
        if !pump.pump(Instant::now()) {
            std::thread::sleep(idle);
        }
    }
    info!(
        backlog = pump.backlog_len(),
        evicted = pump.backlog.evicted(),
        "capture loop stopped"
    );
}
