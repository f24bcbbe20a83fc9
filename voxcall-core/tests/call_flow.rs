mod support;

use std::sync::{atomic::Ordering, Arc};
use std::time::Duration;

use support::{next_audio, wait_status, wait_turn, Denied, ThreadBackend, RATE};
use voxcall_core::buffering::frame::AudioFrame;
use voxcall_core::protocol::{ClientMessage, ServerMessage, TurnOwner};
use voxcall_core::resources::ResourceConfig;
use voxcall_core::transport::{ChannelDialer, ChannelPeer, Outbound};
use voxcall_core::{CallConfig, CallEngine, CallStatus, Turn, VoxError};

fn config(fallback: Duration) -> CallConfig {
    CallConfig {
        resources: ResourceConfig {
            release_grace: Duration::from_millis(10),
            warm_up: Duration::from_millis(10),
        },
        fallback_timeout: fallback,
        ..CallConfig::default()
    }
}

fn agent() -> ServerMessage {
    ServerMessage::Turn {
        turn: TurnOwner::Agent,
    }
}

fn speech(ms: u32) -> AudioFrame {
    AudioFrame::new(vec![6_000; (RATE * ms / 1000) as usize], RATE)
}

async fn connect(
    engine: &CallEngine,
    peers: &mut tokio::sync::mpsc::UnboundedReceiver<ChannelPeer>,
) -> ChannelPeer {
    let mut status = engine.subscribe_status();
    engine.start("user-1", "scenario-9").unwrap();
    let mut peer = peers.recv().await.expect("dialed");
    assert_eq!(
        peer.recv_control().await,
        Some(ClientMessage::Join {
            user_id: "user-1".into(),
            scenario_id: "scenario-9".into(),
        })
    );
    wait_status(&mut status, CallStatus::Connected).await;
    peer
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn agent_reply_plays_out_then_user_speaks() {
    let backend = Arc::new(ThreadBackend::rendering());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(
        config(Duration::from_secs(5)),
        Arc::new(dialer),
        backend.clone(),
    );
    let mut turns = engine.subscribe_turns();
    let mut text = engine.subscribe_text();
    let mut peer = connect(&engine, &mut peers).await;

    peer.send(agent()).await.unwrap();
    wait_turn(&mut turns, Turn::Agent).await;
    peer.send(ServerMessage::Text {
        data: "hello there".into(),
    })
    .await
    .unwrap();
    assert_eq!(text.recv().await.unwrap().text, "hello there");

    for _ in 0..5 {
        peer.send_audio(speech(100)).await.unwrap();
    }
    peer.send(ServerMessage::AudioEnd).await.unwrap();

    // Playback drains, final_done resolves, and the floor passes to the user.
    wait_turn(&mut turns, Turn::User).await;
    let rendered = backend.rendered.lock().clone();
    let first = rendered.iter().position(|s| *s != 0.0).expect("audio was played");
    let audible = rendered[first..].iter().take_while(|s| **s != 0.0).count();
    assert!(
        audible > (RATE as usize * 400) / 1000,
        "playback had a gap after {audible} samples"
    );

    let frame = next_audio(&mut peer).await;
    assert_eq!(frame.len(), 480);
    assert!(frame.iter().all(|s| *s > 0));

    let snapshot = engine.diagnostics_snapshot();
    assert_eq!(snapshot.fallbacks_fired, 0);
    assert_eq!(snapshot.frames_received, 5);
    assert_eq!(snapshot.finals, 1);

    peer.send(ServerMessage::EndCall).await.unwrap();
    engine.wait_idle().await;
    assert_eq!(engine.status(), CallStatus::Idle);
    assert_eq!(engine.turn(), Turn::None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_final_falls_back_to_user_turn_once() {
    let backend = Arc::new(ThreadBackend::default());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(
        config(Duration::from_millis(150)),
        Arc::new(dialer),
        backend,
    );
    let mut turns = engine.subscribe_turns();
    let peer = connect(&engine, &mut peers).await;

    peer.send(agent()).await.unwrap();
    wait_turn(&mut turns, Turn::Agent).await;
    peer.send_audio(speech(100)).await.unwrap();
    peer.send(ServerMessage::AudioEnd).await.unwrap();
    peer.send(ServerMessage::AudioEnd).await.unwrap();

    wait_turn(&mut turns, Turn::User).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        turns.try_recv().is_err(),
        "user turn must be emitted exactly once"
    );
    assert_eq!(engine.diagnostics_snapshot().fallbacks_fired, 1);

    engine.end_call().unwrap();
    engine.wait_idle().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_discards_agent_audio_until_next_agent_turn() {
    let backend = Arc::new(ThreadBackend::default());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(config(Duration::from_secs(5)), Arc::new(dialer), backend);
    let mut turns = engine.subscribe_turns();
    let peer = connect(&engine, &mut peers).await;

    peer.send(agent()).await.unwrap();
    wait_turn(&mut turns, Turn::Agent).await;
    peer.send_audio(speech(100)).await.unwrap();
    peer.send(ServerMessage::Interrupted).await.unwrap();
    wait_turn(&mut turns, Turn::User).await;

    peer.send_audio(speech(100)).await.unwrap();
    peer.send_audio(speech(100)).await.unwrap();
    peer.send(agent()).await.unwrap();
    wait_turn(&mut turns, Turn::Agent).await;
    peer.send_audio(speech(100)).await.unwrap();
    peer.send(ServerMessage::EndCall).await.unwrap();
    engine.wait_idle().await;

    let snapshot = engine.diagnostics_snapshot();
    assert_eq!(snapshot.frames_received, 4);
    assert_eq!(snapshot.frames_discarded, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_audio_chunk_is_counted_and_call_survives() {
    let backend = Arc::new(ThreadBackend::default());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(config(Duration::from_secs(5)), Arc::new(dialer), backend);
    let mut peer = connect(&engine, &mut peers).await;

    peer.send(ServerMessage::AudioChunk { data: "AQ==".into() })
        .await
        .unwrap();
    peer.send(ServerMessage::AudioChunk {
        data: "AQD//w==".into(),
    })
    .await
    .unwrap();

    engine.end_call().unwrap();
    assert_eq!(peer.recv_control().await, Some(ClientMessage::EndCall));
    engine.wait_idle().await;

    let snapshot = engine.diagnostics_snapshot();
    assert_eq!(snapshot.frames_malformed, 1);
    assert_eq!(snapshot.frames_received, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transport_loss_ends_call_and_restart_reacquires_devices() {
    let backend = Arc::new(ThreadBackend::default());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(
        config(Duration::from_secs(5)),
        Arc::new(dialer),
        backend.clone(),
    );
    let mut status = engine.subscribe_status();

    let peer = connect(&engine, &mut peers).await;
    peer.close().await.unwrap();
    let ending = wait_status(&mut status, CallStatus::Ending).await;
    assert_eq!(ending.detail.as_deref(), Some("connection closed"));
    engine.wait_idle().await;

    let _peer = connect(&engine, &mut peers).await;
    assert_eq!(backend.opened.load(Ordering::SeqCst), 2);
    engine.end_call().unwrap();
    engine.wait_idle().await;
    assert!(matches!(engine.end_call(), Err(VoxError::NotActive)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denied_permission_never_opens_devices() {
    let backend = Arc::new(ThreadBackend::default());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(
        config(Duration::from_secs(5)),
        Arc::new(dialer),
        backend.clone(),
    )
    .with_permission_gate(Arc::new(Denied));
    let mut status = engine.subscribe_status();

    engine.start("u", "s").unwrap();
    let ending = wait_status(&mut status, CallStatus::Ending).await;
    assert_eq!(ending.detail.as_deref(), Some("microphone permission denied"));
    wait_status(&mut status, CallStatus::Idle).await;
    engine.wait_idle().await;

    assert_eq!(backend.opened.load(Ordering::SeqCst), 0);
    assert!(peers.try_recv().is_err(), "no connection attempted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn outbound_capture_waits_for_user_turn() {
    let backend = Arc::new(ThreadBackend::default());
    let (dialer, mut peers) = ChannelDialer::new(64);
    let engine = CallEngine::new(config(Duration::from_secs(5)), Arc::new(dialer), backend);
    let mut turns = engine.subscribe_turns();
    let mut peer = connect(&engine, &mut peers).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        peer.drain()
            .iter()
            .all(|item| !matches!(item, Outbound::Audio(_))),
        "no audio before the user has the floor"
    );

    peer.send(ServerMessage::Turn {
        turn: TurnOwner::User,
    })
    .await
    .unwrap();
    wait_turn(&mut turns, Turn::User).await;
    assert_eq!(next_audio(&mut peer).await.len(), 480);

    engine.end_call().unwrap();
    engine.wait_idle().await;
}
