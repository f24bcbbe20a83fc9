//! [`AudioBackend`] over cpal.
//!
//! `cpal::Stream` is `!Send`, so each stream is opened on its own named
//! thread and parked there until its lease is dropped. A sync oneshot
//! carries the open result (device rate or error) back to the caller.

use std::sync::{atomic::AtomicBool, atomic::AtomicUsize, mpsc, Arc};
use std::thread;

use tracing::debug;

use super::{AudioCapture, AudioOutput};
use crate::buffering::CaptureProducer;
use crate::error::{Result, VoxError};
use crate::playback::PlaybackDriver;
use crate::resources::{AudioBackend, DeviceLease};

/// Opens the preferred (or default) cpal devices.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    preferred_input: Option<String>,
    preferred_output: Option<String>,
}

impl CpalBackend {
    pub fn new(preferred_input: Option<String>, preferred_output: Option<String>) -> Self {
        Self {
            preferred_input,
            preferred_output,
        }
    }
}

/// A stream parked on its owner thread. Dropping `stop` wakes the thread,
/// which then drops the stream.
struct ThreadLease {
    sample_rate: u32,
    _stop: mpsc::Sender<()>,
}

impl DeviceLease for ThreadLease {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Run `open` on a fresh thread and keep its stream alive there.
fn host_stream<S, F>(name: &str, open: F) -> Result<ThreadLease>
where
    F: FnOnce() -> Result<(S, u32)> + Send + 'static,
    S: 'static,
{
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32>>(1);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let thread_name = name.to_string();

    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        let stream = match open() {
            Ok((stream, rate)) => {
                let _ = ready_tx.send(Ok(rate));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        // Returns Err once the lease (and its sender) is dropped.
        let _ = stop_rx.recv();
        drop(stream);
        debug!(thread = thread_name.as_str(), "device stream closed");
    })?;

    let sample_rate = ready_rx
        .recv()
        .map_err(|_| VoxError::AudioStream(format!("{name} thread exited before opening")))??;
    Ok(ThreadLease {
        sample_rate,
        _stop: stop_tx,
    })
}

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        producer: CaptureProducer,
        dropped: Arc<AtomicUsize>,
    ) -> Result<Box<dyn DeviceLease>> {
        let preferred = self.preferred_input.clone();
        let lease = host_stream("voxcall-capture", move || {
            let capture = AudioCapture::open_with_preference(
                producer,
                Arc::new(AtomicBool::new(true)),
                dropped,
                preferred.as_deref(),
            )?;
            let rate = capture.sample_rate;
            Ok((capture, rate))
        })?;
        Ok(Box::new(lease))
    }

    fn open_output(&self, driver: PlaybackDriver) -> Result<Box<dyn DeviceLease>> {
        let preferred = self.preferred_output.clone();
        let lease = host_stream("voxcall-render", move || {
            let output = AudioOutput::open_with_preference(driver, preferred.as_deref())?;
            let rate = output.sample_rate;
            Ok((output, rate))
        })?;
        Ok(Box::new(lease))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn stream_lives_until_lease_dropped() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);
        let lease = host_stream("drop-flag", move || Ok((DropFlag(flag), 16_000))).unwrap();
        assert_eq!(lease.sample_rate(), 16_000);
        thread::sleep(Duration::from_millis(20));
        assert!(!dropped.load(std::sync::atomic::Ordering::SeqCst));

        drop(lease);
        for _ in 0..100 {
            if dropped.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("stream was not dropped after release");
    }

    #[test]
    fn open_error_is_returned_to_caller() {
        let err = host_stream::<(), _>("failing", || Err(VoxError::NoDefaultOutputDevice))
            .err()
            .unwrap();
        assert!(matches!(err, VoxError::NoDefaultOutputDevice));
    }
}
