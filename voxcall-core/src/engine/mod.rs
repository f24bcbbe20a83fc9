//! `CallEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! CallEngine::new()
//!     └─► start(user, scenario)   → Connecting: permission, devices, dial, join
//!         ├─► (peer turn-taking)  → Connected
//!         └─► end_call()          → Ending → Idle
//! ```
//!
//! `start()`/`end_call()` never block: the call runs on a control task that
//! owns the [`CallSession`], the transport and the playback handle. Calling
//! them in the wrong state returns an error rather than panicking.
//!
//! ## Contexts
//!
//! - control task (tokio): session, transport events, command issue.
//! - render callback: owns the playback engine; reached only through
//!   [`PlaybackHandle`] commands and [`PlaybackEvent`]s.
//! - capture loop (`spawn_blocking`): encode and send, see [`pipeline`].

pub mod pipeline;
pub mod session;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    audio::{encode::CaptureEncoder, resample::ResampleMode},
    buffering::{create_capture_ring, frame::AudioFrame, CaptureConsumer},
    collab::{AlwaysGranted, PermissionGate, Ringtone, SilentRingtone},
    error::{Result, VoxError},
    ipc::events::{AgentTextEvent, CallStatus, CallStatusEvent, Turn, TurnEvent},
    playback::{playback_channel, PlaybackConfig, PlaybackEvent, PlaybackHandle},
    protocol::ClientMessage,
    resources::{Acquired, AudioBackend, ResourceConfig, ResourceManager},
    transport::{Dialer, Transport, TransportEvent, TransportSender},
};
use pipeline::{CallDiagnostics, CaptureFlags, CapturePump, DiagnosticsSnapshot};
use session::{CallSession, SessionAction};

/// Broadcast channel capacity for UI events.
const BROADCAST_CAP: usize = 256;

/// Pending `end_call` / `set_playback_rate` requests.
const CONTROL_CAP: usize = 16;

/// Configuration for `CallEngine`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    /// Network PCM rate (Hz), both directions. Default: 24000.
    pub sample_rate: u32,
    /// Outbound frame length. Default: 20 ms.
    pub frame_ms: u32,
    /// Jitter buffer settings. `sample_rate` is overridden by the field above.
    pub playback: PlaybackConfig,
    pub resources: ResourceConfig,
    /// Forces the user turn if `final_done` never arrives after `audio_end`.
    /// Default: 1 s.
    pub fallback_timeout: Duration,
    /// Outbound backlog while warming up or while the transport is full.
    /// Default: 50 frames (1 s at 20 ms).
    pub outbound_queue_frames: usize,
    /// Queue depth a dialer should give each transport direction. Default: 64.
    pub transport_capacity: usize,
    pub resample_mode: ResampleMode,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            frame_ms: 20,
            playback: PlaybackConfig::default(),
            resources: ResourceConfig::default(),
            fallback_timeout: Duration::from_secs(1),
            outbound_queue_frames: 50,
            transport_capacity: 64,
            resample_mode: ResampleMode::Linear,
        }
    }
}

impl CallConfig {
    /// Samples per outbound frame (at least one).
    pub fn frame_samples(&self) -> usize {
        ((self.sample_rate as u64 * self.frame_ms as u64) / 1000).max(1) as usize
    }

    /// Playback settings with the network rate applied.
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: self.sample_rate,
            ..self.playback.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ControlCommand {
    End,
    SetRate { value: f32, allow_above_base: bool },
}

/// The top-level call handle.
///
/// `CallEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<CallEngine>` to share between a UI and event forwarders.
pub struct CallEngine {
    config: CallConfig,
    dialer: Arc<dyn Dialer>,
    ringtone: Arc<dyn Ringtone>,
    permission: Arc<dyn PermissionGate>,
    /// Persists across calls so each acquisition releases the previous one.
    resources: Arc<tokio::sync::Mutex<ResourceManager>>,
    status: Arc<Mutex<CallStatus>>,
    turn: Arc<Mutex<Turn>>,
    /// Last issued call id; ids start at 1.
    call_seq: AtomicU64,
    status_tx: broadcast::Sender<CallStatusEvent>,
    turn_tx: broadcast::Sender<TurnEvent>,
    text_tx: broadcast::Sender<AgentTextEvent>,
    diagnostics: Arc<CallDiagnostics>,
    control: Mutex<Option<mpsc::Sender<ControlCommand>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CallEngine {
    pub fn new(config: CallConfig, dialer: Arc<dyn Dialer>, backend: Arc<dyn AudioBackend>) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (turn_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (text_tx, _) = broadcast::channel(BROADCAST_CAP);
        let resources = ResourceManager::new(backend, config.resources);

        Self {
            config,
            dialer,
            ringtone: Arc::new(SilentRingtone),
            permission: Arc::new(AlwaysGranted),
            resources: Arc::new(tokio::sync::Mutex::new(resources)),
            status: Arc::new(Mutex::new(CallStatus::Idle)),
            turn: Arc::new(Mutex::new(Turn::None)),
            call_seq: AtomicU64::new(0),
            status_tx,
            turn_tx,
            text_tx,
            diagnostics: Arc::new(CallDiagnostics::default()),
            control: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn with_ringtone(mut self, ringtone: Arc<dyn Ringtone>) -> Self {
        self.ringtone = ringtone;
        self
    }

    pub fn with_permission_gate(mut self, permission: Arc<dyn PermissionGate>) -> Self {
        self.permission = permission;
        self
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Begin a call attempt and return its id.
    ///
    /// Returns as soon as the control task is spawned; progress and failures
    /// are reported through [`subscribe_status`](Self::subscribe_status).
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `VoxError::AlreadyActive` unless the engine is `Idle`.
    pub fn start(&self, user_id: impl Into<String>, scenario_id: impl Into<String>) -> Result<u64> {
        {
            let mut status = self.status.lock();
            if status.is_active() {
                return Err(VoxError::AlreadyActive);
            }
            *status = CallStatus::Connecting;
        }

        let user_id = user_id.into();
        let scenario_id = scenario_id.into();
        let call_id = self.call_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.diagnostics.reset();

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAP);
        *self.control.lock() = Some(control_tx);

        let ctx = CallContext {
            call_id,
            config: self.config.clone(),
            dialer: Arc::clone(&self.dialer),
            ringtone: Arc::clone(&self.ringtone),
            permission: Arc::clone(&self.permission),
            resources: Arc::clone(&self.resources),
            status: Arc::clone(&self.status),
            turn: Arc::clone(&self.turn),
            status_tx: self.status_tx.clone(),
            turn_tx: self.turn_tx.clone(),
            text_tx: self.text_tx.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
        };
        let span = info_span!(
            "call",
            call_id,
            user_id = user_id.as_str(),
            scenario_id = scenario_id.as_str()
        );
        let handle = tokio::spawn(run_call(ctx, user_id, scenario_id, control_rx).instrument(span));
        *self.task.lock() = Some(handle);
        Ok(call_id)
    }

    /// Hang up. Teardown continues on the control task.
    ///
    /// # Errors
    /// `VoxError::NotActive` if no call is in progress.
    pub fn end_call(&self) -> Result<()> {
        self.send_control(ControlCommand::End)
    }

    /// Forward a playback rate target to the render context.
    ///
    /// `value` is clamped to `[min_rate, base_rate]`, or up to `max_rate`
    /// when `allow_above_base` enables catch-up.
    ///
    /// # Errors
    /// `VoxError::NotActive` if no call is in progress.
    pub fn set_playback_rate(&self, value: f32, allow_above_base: bool) -> Result<()> {
        self.send_control(ControlCommand::SetRate {
            value,
            allow_above_base,
        })
    }

    /// Wait for the current call (if any) to return to `Idle`.
    pub async fn wait_idle(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("call task ended abnormally: {e}");
            }
        }
    }

    /// Current call status (snapshot).
    pub fn status(&self) -> CallStatus {
        *self.status.lock()
    }

    /// Current turn owner (snapshot).
    pub fn turn(&self) -> Turn {
        *self.turn.lock()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<CallStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_turns(&self) -> broadcast::Receiver<TurnEvent> {
        self.turn_tx.subscribe()
    }

    pub fn subscribe_text(&self) -> broadcast::Receiver<AgentTextEvent> {
        self.text_tx.subscribe()
    }

    /// Counters for the current (or last) call.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn send_control(&self, command: ControlCommand) -> Result<()> {
        if !self.status().is_active() {
            return Err(VoxError::NotActive);
        }
        if let Some(tx) = self.control.lock().as_ref() {
            if tx.try_send(command).is_err() {
                debug!(?command, "control queue unavailable, request dropped");
            }
        }
        Ok(())
    }
}

/// Everything the control task needs, cloned out of the engine.
struct CallContext {
    call_id: u64,
    config: CallConfig,
    dialer: Arc<dyn Dialer>,
    ringtone: Arc<dyn Ringtone>,
    permission: Arc<dyn PermissionGate>,
    resources: Arc<tokio::sync::Mutex<ResourceManager>>,
    status: Arc<Mutex<CallStatus>>,
    turn: Arc<Mutex<Turn>>,
    status_tx: broadcast::Sender<CallStatusEvent>,
    turn_tx: broadcast::Sender<TurnEvent>,
    text_tx: broadcast::Sender<AgentTextEvent>,
    diagnostics: Arc<CallDiagnostics>,
}

/// Output of a successful connect phase.
struct Connected {
    transport: Transport,
    playback_events: mpsc::Receiver<PlaybackEvent>,
    consumer: CaptureConsumer,
    encoder: CaptureEncoder,
    acquired: Acquired,
}

/// Per-call mutable state on the control task.
struct CallRuntime {
    ctx: CallContext,
    playback: Option<PlaybackHandle>,
    sender: Option<TransportSender>,
    capture: CaptureFlags,
    capture_task: Option<JoinHandle<()>>,
    fallback_at: Option<Instant>,
    /// Set by a `Teardown` action: `Some(notify_peer)`.
    teardown: Option<bool>,
}

impl CallRuntime {
    fn new(ctx: CallContext) -> Self {
        Self {
            ctx,
            playback: None,
            sender: None,
            capture: CaptureFlags::default(),
            capture_task: None,
            fallback_at: None,
            teardown: None,
        }
    }

    fn apply(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::StartRingtone => self.ctx.ringtone.start(),
                SessionAction::StopRingtone => self.ctx.ringtone.stop(),
                SessionAction::EnableCapture => {
                    self.capture.gate.store(true, Ordering::Release);
                    debug!("capture enabled");
                }
                SessionAction::DisableCapture => {
                    self.capture.gate.store(false, Ordering::Release);
                    debug!("capture disabled");
                }
                SessionAction::InitPlayback => {
                    if let Some(playback) = &self.playback {
                        playback.init(self.ctx.config.playback_config());
                    }
                }
                SessionAction::ExpectFinal(id) => {
                    if let Some(playback) = &self.playback {
                        playback.final_expected(id);
                    }
                }
                SessionAction::DisarmFinal => {
                    if let Some(playback) = &self.playback {
                        playback.cancel_final();
                    }
                }
                SessionAction::FlushPlayback => {
                    if let Some(playback) = &self.playback {
                        playback.flush_immediate();
                    }
                }
                SessionAction::ArmFallback => {
                    self.fallback_at = Some(Instant::now() + self.ctx.config.fallback_timeout);
                }
                SessionAction::CancelFallback => self.fallback_at = None,
                SessionAction::EmitStatus { status, detail } => self.emit_status(status, detail),
                SessionAction::EmitTurn(turn) => {
                    *self.ctx.turn.lock() = turn;
                    info!(?turn, "turn changed");
                    let _ = self.ctx.turn_tx.send(TurnEvent {
                        call_id: self.ctx.call_id,
                        turn,
                    });
                }
                SessionAction::EmitText(text) => {
                    let _ = self.ctx.text_tx.send(AgentTextEvent {
                        call_id: self.ctx.call_id,
                        text,
                    });
                }
                SessionAction::Teardown { notify_peer } => self.teardown = Some(notify_peer),
            }
        }
    }

    fn emit_status(&self, status: CallStatus, detail: Option<String>) {
        *self.ctx.status.lock() = status;
        match &detail {
            Some(detail) => info!(?status, detail = detail.as_str(), "call status"),
            None => info!(?status, "call status"),
        }
        let _ = self.ctx.status_tx.send(CallStatusEvent {
            call_id: self.ctx.call_id,
            status,
            detail,
        });
    }

    /// Permission → playback channel → devices → dial → join.
    async fn connect(
        &mut self,
        resources: &mut ResourceManager,
        user_id: &str,
        scenario_id: &str,
    ) -> Result<Connected> {
        if !self.ctx.permission.request_microphone().await {
            return Err(VoxError::PermissionDenied);
        }

        let config = &self.ctx.config;
        let (producer, consumer) = create_capture_ring();
        let (handle, driver, playback_events) =
            playback_channel(config.playback_config(), Arc::clone(&self.ctx.diagnostics.playback));

        let acquired = resources
            .acquire(
                producer,
                Arc::clone(&self.ctx.diagnostics.capture_samples_dropped),
                driver,
            )
            .await?;
        let encoder = CaptureEncoder::new(
            config.resample_mode,
            acquired.capture_rate,
            config.sample_rate,
            config.frame_samples(),
        )?;

        let transport = self.ctx.dialer.dial().await?;
        transport.send_control(ClientMessage::Join {
            user_id: user_id.to_string(),
            scenario_id: scenario_id.to_string(),
        })?;

        self.playback = Some(handle);
        self.sender = Some(transport.sender());
        Ok(Connected {
            transport,
            playback_events,
            consumer,
            encoder,
            acquired,
        })
    }

    fn start_capture(&mut self, consumer: CaptureConsumer, encoder: CaptureEncoder, acquired: Acquired) {
        let Some(sender) = self.sender.clone() else {
            return;
        };
        let pump = CapturePump::new(
            consumer,
            encoder,
            sender,
            Arc::clone(&self.capture.gate),
            acquired.warm_until.into_std(),
            self.ctx.config.outbound_queue_frames,
            Arc::clone(&self.ctx.diagnostics),
        );
        self.capture.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.capture.running);
        self.capture_task = Some(tokio::task::spawn_blocking(move || {
            pipeline::run(pump, running)
        }));
    }

    /// Route one inbound agent frame to playback.
    fn play(&self, session: &CallSession, frame: AudioFrame) {
        let diagnostics = &self.ctx.diagnostics;
        diagnostics.frames_received.fetch_add(1, Ordering::Relaxed);
        if !session.accepts_agent_audio() {
            diagnostics.frames_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if let Some(playback) = &self.playback {
            playback.chunk(frame);
        }
    }

    fn malformed(&self, reason: &str) {
        self.ctx
            .diagnostics
            .frames_malformed
            .fetch_add(1, Ordering::Relaxed);
        warn!(reason, "malformed inbound payload dropped");
    }

    /// Stop capture, flush playback, notify the peer, release devices.
    async fn teardown(&mut self, transport: Option<Transport>, resources: &mut ResourceManager) {
        let notify_peer = self.teardown.unwrap_or(false);
        self.capture.stop();
        if let Some(task) = self.capture_task.take() {
            if let Err(e) = task.await {
                warn!("capture loop ended abnormally: {e}");
            }
        }
        if let Some(playback) = self.playback.take() {
            playback.flush();
        }
        self.fallback_at = None;

        if let Some(transport) = transport {
            if notify_peer {
                if let Err(e) = transport.send_control(ClientMessage::EndCall) {
                    debug!("end_call not delivered: {e}");
                }
            }
        }
        self.sender = None;
        resources.release();

        let snapshot = self.ctx.diagnostics.snapshot();
        info!(?snapshot, "call ended — diagnostics");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Wait for a hang-up while connecting. Rate requests have nowhere to go yet.
async fn wait_for_end(control: &mut mpsc::Receiver<ControlCommand>) {
    while let Some(command) = control.recv().await {
        if command == ControlCommand::End {
            return;
        }
    }
}

async fn run_call(
    ctx: CallContext,
    user_id: String,
    scenario_id: String,
    mut control: mpsc::Receiver<ControlCommand>,
) {
    let resources = Arc::clone(&ctx.resources);
    let mut resources = resources.lock_owned().await;
    let sample_rate = ctx.config.sample_rate;
    let mut session = CallSession::new();
    let mut rt = CallRuntime::new(ctx);
    rt.apply(session.begin());

    let outcome = tokio::select! {
        result = rt.connect(&mut resources, &user_id, &scenario_id) => Some(result),
        _ = wait_for_end(&mut control) => None,
    };

    let connected = match outcome {
        Some(Ok(connected)) => connected,
        Some(Err(e)) => {
            warn!("call failed to start: {e}");
            rt.apply(session.on_start_failed(e.to_string()));
            rt.teardown(None, &mut resources).await;
            rt.apply(session.finish());
            return;
        }
        None => {
            info!("call cancelled while connecting");
            rt.apply(session.end_local());
            rt.teardown(None, &mut resources).await;
            rt.apply(session.finish());
            return;
        }
    };

    let Connected {
        mut transport,
        mut playback_events,
        consumer,
        encoder,
        acquired,
    } = connected;
    rt.apply(session.on_connected());
    rt.start_capture(consumer, encoder, acquired);

    while rt.teardown.is_none() {
        let fallback_at = rt.fallback_at;
        tokio::select! {
            event = transport.recv() => match event {
                Some(TransportEvent::Audio(frame)) => {
                    rt.apply(session.on_agent_audio());
                    rt.play(&session, frame);
                }
                Some(TransportEvent::Control(message)) => {
                    debug!(kind = message.kind(), "control message");
                    let decoded = message.audio_frame(sample_rate);
                    rt.apply(session.on_server_message(&message));
                    match decoded {
                        Some(Ok(frame)) => rt.play(&session, frame),
                        Some(Err(e)) => rt.malformed(&e.to_string()),
                        None => {}
                    }
                }
                Some(TransportEvent::Malformed(reason)) => rt.malformed(&reason),
                Some(TransportEvent::Closed(error)) => {
                    rt.apply(session.on_transport_closed(error.map(|e| e.to_string())));
                }
                None => rt.apply(session.on_transport_closed(None)),
            },
            Some(event) = playback_events.recv() => {
                debug!(?event, "playback event");
                rt.apply(session.on_playback_event(event));
            }
            _ = sleep_until_opt(fallback_at) => {
                rt.fallback_at = None;
                let actions = session.on_fallback_elapsed();
                if !actions.is_empty() {
                    rt.ctx.diagnostics.fallbacks_fired.fetch_add(1, Ordering::Relaxed);
                    warn!("final_done not observed in time, handing turn to user");
                }
                rt.apply(actions);
            }
            command = control.recv() => match command {
                Some(ControlCommand::SetRate { value, allow_above_base }) => {
                    if let Some(playback) = &rt.playback {
                        playback.set_rate(value, allow_above_base);
                    }
                }
                Some(ControlCommand::End) | None => rt.apply(session.end_local()),
            },
        }
    }

    rt.teardown(Some(transport), &mut resources).await;
    rt.apply(session.finish());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::resources::fake::{DeviceOp, FakeBackend};
    use crate::transport::{ChannelDialer, ChannelPeer, Outbound};

    struct Harness {
        engine: CallEngine,
        backend: Arc<FakeBackend>,
        dialer: Arc<ChannelDialer>,
        peers: mpsc::UnboundedReceiver<ChannelPeer>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(FakeBackend {
            capture_rate: 24_000,
            ..FakeBackend::default()
        });
        let (dialer, peers) = ChannelDialer::new(64);
        let dialer = Arc::new(dialer);
        let engine = CallEngine::new(CallConfig::default(), dialer.clone(), backend.clone());
        Harness {
            engine,
            backend,
            dialer,
            peers,
        }
    }

    async fn wait_for_status(rx: &mut broadcast::Receiver<CallStatusEvent>, status: CallStatus) -> CallStatusEvent {
        loop {
            let event = rx.recv().await.expect("status channel open");
            if event.status == status {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_joins_and_local_end_notifies_peer() {
        let mut h = harness();
        let mut status = h.engine.subscribe_status();
        let call_id = h.engine.start("u-7", "s-1").unwrap();
        assert!(matches!(h.engine.start("u-7", "s-1"), Err(VoxError::AlreadyActive)));

        let mut peer = h.peers.recv().await.unwrap();
        assert_eq!(
            peer.recv_control().await,
            Some(ClientMessage::Join {
                user_id: "u-7".into(),
                scenario_id: "s-1".into()
            })
        );
        let connected = wait_for_status(&mut status, CallStatus::Connected).await;
        assert_eq!(connected.call_id, call_id);

        h.engine.end_call().unwrap();
        assert_eq!(peer.recv_control().await, Some(ClientMessage::EndCall));
        h.engine.wait_idle().await;
        assert_eq!(h.engine.status(), CallStatus::Idle);
        assert!(matches!(h.engine.end_call(), Err(VoxError::NotActive)));
        assert_eq!(
            h.backend.ops.lock().last(),
            Some(&DeviceOp::CloseOutput),
            "devices released on teardown"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dial_failure_reports_reason_and_allows_restart() {
        let mut h = harness();
        h.dialer.set_refuse(true);
        let mut status = h.engine.subscribe_status();
        h.engine.start("u", "s").unwrap();
        let ending = wait_for_status(&mut status, CallStatus::Ending).await;
        assert!(ending.detail.unwrap().contains("connection refused"));
        h.engine.wait_idle().await;
        assert_eq!(h.engine.status(), CallStatus::Idle);

        h.dialer.set_refuse(false);
        h.engine.start("u", "s").unwrap();
        let _peer = h.peers.recv().await.unwrap();
        wait_for_status(&mut status, CallStatus::Connected).await;
        h.engine.end_call().unwrap();
        h.engine.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn peer_end_call_tears_down_without_echo() {
        let mut h = harness();
        let mut status = h.engine.subscribe_status();
        h.engine.start("u", "s").unwrap();
        let mut peer = h.peers.recv().await.unwrap();
        wait_for_status(&mut status, CallStatus::Connected).await;

        peer.send(ServerMessage::EndCall).await.unwrap();
        h.engine.wait_idle().await;
        let items = peer.drain();
        assert!(items
            .iter()
            .all(|item| !matches!(item, Outbound::Control(ClientMessage::EndCall))));
    }

    #[test]
    fn frame_samples_follow_rate_and_duration() {
        let config = CallConfig::default();
        assert_eq!(config.frame_samples(), 480);
        assert_eq!(config.playback_config().sample_rate, 24_000);
    }
}
