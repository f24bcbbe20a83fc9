//! Resource lifecycle: the only place microphone and speaker streams are
//! opened or closed.
//!
//! ```text
//! acquire():  release held leases ─► sleep(release_grace) ─► open output
//!             ─► open input ─► warm_until = now + warm_up
//! release():  drop leases (platform teardown continues asynchronously)
//! ```
//!
//! The grace sleep happens on every acquisition, including the first of
//! the process, because a previous process or call may still be closing
//! the same hardware. Frames the capture loop produces before
//! `warm_until` are held in the outbound queue rather than sent.

use std::sync::{atomic::AtomicUsize, Arc};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::buffering::CaptureProducer;
use crate::error::{Result, VoxError};
use crate::playback::PlaybackDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Wait after every release before the next open. Default: 300 ms.
    pub release_grace: Duration,
    /// Time after opening before the first outbound frame. Default: 200 ms.
    pub warm_up: Duration,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            release_grace: Duration::from_millis(300),
            warm_up: Duration::from_millis(200),
        }
    }
}

/// An open device stream. Dropping the lease releases the device.
pub trait DeviceLease: Send {
    /// Rate the device actually runs at (Hz).
    fn sample_rate(&self) -> u32;
}

/// Opens device streams. Implementations may block; they are always called
/// from a blocking-pool thread.
pub trait AudioBackend: Send + Sync {
    /// Open the microphone, pushing mono f32 samples into `producer`.
    /// Samples that do not fit are counted in `dropped`.
    fn open_input(
        &self,
        producer: CaptureProducer,
        dropped: Arc<AtomicUsize>,
    ) -> Result<Box<dyn DeviceLease>>;

    /// Open the speaker, moving `driver` into the render callback.
    fn open_output(&self, driver: PlaybackDriver) -> Result<Box<dyn DeviceLease>>;
}

/// Result of a successful [`ResourceManager::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    pub capture_rate: u32,
    pub output_rate: u32,
    /// No outbound audio may be sent before this instant.
    pub warm_until: Instant,
}

pub struct ResourceManager {
    backend: Arc<dyn AudioBackend>,
    config: ResourceConfig,
    input: Option<Box<dyn DeviceLease>>,
    output: Option<Box<dyn DeviceLease>>,
    acquisitions: u64,
}

impl ResourceManager {
    pub fn new(backend: Arc<dyn AudioBackend>, config: ResourceConfig) -> Self {
        Self {
            backend,
            config,
            input: None,
            output: None,
            acquisitions: 0,
        }
    }

    pub fn is_held(&self) -> bool {
        self.input.is_some() || self.output.is_some()
    }

    /// Successful acquisitions since creation.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    /// Release, wait out the grace period, then open output and input.
    ///
    /// # Errors
    /// Any backend open failure. Nothing stays held on error.
    pub async fn acquire(
        &mut self,
        producer: CaptureProducer,
        dropped: Arc<AtomicUsize>,
        driver: PlaybackDriver,
    ) -> Result<Acquired> {
        self.release();
        debug!(grace_ms = self.config.release_grace.as_millis() as u64, "release grace");
        tokio::time::sleep(self.config.release_grace).await;

        let backend = Arc::clone(&self.backend);
        let (output, input) = tokio::task::spawn_blocking(move || {
            let output = backend.open_output(driver)?;
            let input = backend.open_input(producer, dropped)?;
            Ok::<_, VoxError>((output, input))
        })
        .await
        .map_err(|e| VoxError::Other(anyhow::anyhow!("device open task failed: {e}")))??;

        let acquired = Acquired {
            capture_rate: input.sample_rate(),
            output_rate: output.sample_rate(),
            warm_until: Instant::now() + self.config.warm_up,
        };
        self.input = Some(input);
        self.output = Some(output);
        self.acquisitions += 1;
        info!(
            capture_rate = acquired.capture_rate,
            output_rate = acquired.output_rate,
            "audio devices acquired"
        );
        Ok(acquired)
    }

    /// Drop both leases. Returns `true` if anything was held.
    pub fn release(&mut self) -> bool {
        let held = self.is_held();
        // Input first: stop producing before the speaker goes away.
        self.input.take();
        self.output.take();
        if held {
            info!("audio devices released");
        }
        held
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.release();
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::fake::{DeviceOp, FakeBackend};
    use super::*;
    use crate::buffering::create_capture_ring;
    use crate::playback::{playback_channel, PlaybackConfig, PlaybackStats};

    fn parts() -> (CaptureProducer, Arc<AtomicUsize>, PlaybackDriver) {
        let (producer, _consumer) = create_capture_ring();
        let (_handle, driver, _events) =
            playback_channel(PlaybackConfig::default(), Arc::new(PlaybackStats::default()));
        (producer, Arc::new(AtomicUsize::new(0)), driver)
    }

    fn backend() -> Arc<FakeBackend> {
        Arc::new(FakeBackend {
            capture_rate: 48_000,
            ..FakeBackend::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_grace_then_opens_and_sets_warm_up() {
        let backend = backend();
        let mut rm = ResourceManager::new(backend.clone(), ResourceConfig::default());
        let (p, d, drv) = parts();

        let before = Instant::now();
        let acquired = rm.acquire(p, d, drv).await.unwrap();
        assert!(Instant::now() - before >= Duration::from_millis(300));
        assert_eq!(acquired.capture_rate, 48_000);
        assert_eq!(acquired.output_rate, 24_000);
        assert_eq!(acquired.warm_until - Instant::now(), Duration::from_millis(200));
        assert_eq!(
            *backend.ops.lock(),
            vec![DeviceOp::OpenOutput, DeviceOp::OpenInput]
        );
        assert!(rm.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn reacquire_releases_first_and_exactly_once() {
        let backend = backend();
        let mut rm = ResourceManager::new(backend.clone(), ResourceConfig::default());
        let (p, d, drv) = parts();
        rm.acquire(p, d, drv).await.unwrap();
        let (p, d, drv) = parts();
        rm.acquire(p, d, drv).await.unwrap();
        assert!(rm.release());
        assert!(!rm.release());

        assert_eq!(
            *backend.ops.lock(),
            vec![
                DeviceOp::OpenOutput,
                DeviceOp::OpenInput,
                DeviceOp::CloseInput,
                DeviceOp::CloseOutput,
                DeviceOp::OpenOutput,
                DeviceOp::OpenInput,
                DeviceOp::CloseInput,
                DeviceOp::CloseOutput,
            ]
        );
        assert_eq!(rm.acquisitions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_input_leaves_nothing_held() {
        let backend = backend();
        backend.fail_input.store(true, Ordering::SeqCst);
        let mut rm = ResourceManager::new(backend.clone(), ResourceConfig::default());
        let (p, d, drv) = parts();
        let err = rm.acquire(p, d, drv).await.unwrap_err();
        assert!(matches!(err, VoxError::NoDefaultInputDevice));
        assert!(!rm.is_held());
        assert_eq!(
            *backend.ops.lock(),
            vec![DeviceOp::OpenOutput, DeviceOp::CloseOutput]
        );
    }
}
