//! Shared doubles for the integration tests: a device backend driven by
//! plain threads and helpers for awaiting engine events.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use voxcall_core::buffering::{CaptureProducer, Producer};
use voxcall_core::playback::PlaybackDriver;
use voxcall_core::transport::{ChannelPeer, Outbound};
use voxcall_core::{
    AudioBackend, CallStatus, CallStatusEvent, DeviceLease, PermissionGate, Turn, TurnEvent,
    VoxError,
};

pub const RATE: u32 = 24_000;
const BLOCK: usize = 240; // 10 ms at 24 kHz

/// Backend whose "devices" are threads ticking every 10 ms of real time.
#[derive(Default)]
pub struct ThreadBackend {
    /// Render the playback driver. When false the driver is only held.
    pub render: bool,
    pub opened: AtomicUsize,
    /// Every sample the output thread rendered.
    pub rendered: Arc<Mutex<Vec<f32>>>,
}

impl ThreadBackend {
    pub fn rendering() -> Self {
        Self {
            render: true,
            ..Self::default()
        }
    }
}

struct ThreadLease {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceLease for ThreadLease {
    fn sample_rate(&self) -> u32 {
        RATE
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn ticking<F>(mut tick: F) -> ThreadLease
where
    F: FnMut() + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        while !flag.load(Ordering::SeqCst) {
            tick();
            thread::sleep(Duration::from_millis(10));
        }
    });
    ThreadLease {
        stop,
        handle: Some(handle),
    }
}

impl AudioBackend for ThreadBackend {
    fn open_input(
        &self,
        mut producer: CaptureProducer,
        _dropped: Arc<AtomicUsize>,
    ) -> Result<Box<dyn DeviceLease>, VoxError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let tone = [0.25f32; BLOCK];
        Ok(Box::new(ticking(move || {
            producer.push_slice(&tone);
        })))
    }

    fn open_output(&self, mut driver: PlaybackDriver) -> Result<Box<dyn DeviceLease>, VoxError> {
        if !self.render {
            return Ok(Box::new(ticking(move || {
                let _held = &driver;
            })));
        }
        let rendered = Arc::clone(&self.rendered);
        let mut block = vec![0.0f32; BLOCK];
        Ok(Box::new(ticking(move || {
            driver.render(&mut block);
            rendered.lock().extend_from_slice(&block);
        })))
    }
}

/// Permission prompt the user always declines.
pub struct Denied;

impl PermissionGate for Denied {
    fn request_microphone(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }
}

const WAIT: Duration = Duration::from_secs(5);

pub async fn wait_status(
    rx: &mut broadcast::Receiver<CallStatusEvent>,
    status: CallStatus,
) -> CallStatusEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("status channel open");
            if event.status == status {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {status:?}"))
}

pub async fn wait_turn(rx: &mut broadcast::Receiver<TurnEvent>, turn: Turn) {
    tokio::time::timeout(WAIT, async {
        loop {
            if rx.recv().await.expect("turn channel open").turn == turn {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {turn:?}"))
}

/// Next outbound audio frame, skipping control messages.
pub async fn next_audio(peer: &mut ChannelPeer) -> Vec<i16> {
    tokio::time::timeout(WAIT, async {
        loop {
            match peer.recv().await.expect("client transport open") {
                Outbound::Audio(frame) => return frame.samples().to_vec(),
                Outbound::Control(_) => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for outbound audio")
}
