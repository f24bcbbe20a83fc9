//! voxcall headless host entry point.
//!
//! Loads settings, wires cpal devices and the WebSocket dialer into a
//! `CallEngine`, runs one call and prints what the agent says. Ctrl-C
//! hangs up.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use voxcall_core::audio::device::{list_input_devices, list_output_devices, DeviceInfo};
use voxcall_core::{
    CallEngine, CallStatus, CallStatusEvent, CpalBackend, Ringtone, Turn, WsDialer,
};

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    settings: Option<PathBuf>,
    server: Option<String>,
    user: Option<String>,
    scenario: Option<String>,
    list_devices: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--settings" => parsed.settings = Some(PathBuf::from(value("--settings")?)),
            "--server" => parsed.server = Some(value("--server")?),
            "--user" => parsed.user = Some(value("--user")?),
            "--scenario" => parsed.scenario = Some(value("--scenario")?),
            "--list-devices" => parsed.list_devices = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

impl CliArgs {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(server) = &self.server {
            settings.server_url = server.clone();
        }
        if let Some(user) = &self.user {
            settings.user_id = user.clone();
        }
        if let Some(scenario) = &self.scenario {
            settings.scenario_id = scenario.clone();
        }
        settings.normalize();
    }
}

/// Ringback "tone" for a terminal: a log line.
struct ConsoleRingtone;

impl Ringtone for ConsoleRingtone {
    fn start(&self) {
        info!("ringing…");
    }

    fn stop(&self) {
        debug!("ringtone stopped");
    }
}

fn print_devices(label: &str, devices: &[DeviceInfo]) {
    println!("{label}:");
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        let mut tags = Vec::new();
        if device.is_default {
            tags.push("default");
        }
        if device.is_loopback_like {
            tags.push("loopback");
        }
        if tags.is_empty() {
            println!("  {}", device.name);
        } else {
            println!("  {} [{}]", device.name, tags.join(", "));
        }
    }
}

/// Log every broadcast until the sender goes away.
fn forward<T, F>(mut rx: broadcast::Receiver<T>, mut handle: F)
where
    T: Clone + Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => handle(event),
                Err(RecvError::Lagged(n)) => warn!(missed = n, "event forwarder lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn wait_for_idle(mut rx: broadcast::Receiver<CallStatusEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) if event.status == CallStatus::Idle => return,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("voxcall=info,voxcall_core=info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.list_devices {
        print_devices("input devices", &list_input_devices());
        print_devices("output devices", &list_output_devices());
        return Ok(());
    }

    let path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&path);
    if !path.exists() {
        match save_settings(&path, &settings) {
            Ok(()) => info!(path = %path.display(), "wrote default settings"),
            Err(e) => warn!(path = %path.display(), "could not write default settings: {e}"),
        }
    }
    args.apply(&mut settings);

    let config = settings.call_config();
    let dialer = Arc::new(WsDialer::new(
        settings.server_url.clone(),
        config.transport_capacity,
        config.sample_rate,
    ));
    info!(settings = %path.display(), server = dialer.url(), "voxcall starting");
    let backend = Arc::new(CpalBackend::new(
        settings.preferred_input_device.clone(),
        settings.preferred_output_device.clone(),
    ));
    let engine = Arc::new(
        CallEngine::new(config, dialer, backend).with_ringtone(Arc::new(ConsoleRingtone)),
    );

    forward(engine.subscribe_status(), |event| match event.detail {
        Some(detail) => println!("[call {}] {:?}: {detail}", event.call_id, event.status),
        None => println!("[call {}] {:?}", event.call_id, event.status),
    });
    forward(engine.subscribe_turns(), |event| match event.turn {
        Turn::User => println!("[call {}] your turn", event.call_id),
        Turn::Agent => println!("[call {}] agent speaking", event.call_id),
        Turn::None => {}
    });
    forward(engine.subscribe_text(), |event| {
        println!("agent: {}", event.text);
    });

    let idle = wait_for_idle(engine.subscribe_status());
    engine.start(settings.user_id.clone(), settings.scenario_id.clone())?;

    tokio::select! {
        _ = idle => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("interrupt received, hanging up");
            if let Err(e) = engine.end_call() {
                debug!("end_call: {e}");
            }
        }
    }
    engine.wait_idle().await;

    let snapshot = engine.diagnostics_snapshot();
    info!(
        sent = snapshot.frames_sent,
        received = snapshot.frames_received,
        drains = snapshot.drains,
        fallbacks = snapshot.fallbacks_fired,
        "voxcall exiting"
    );
    Ok(())
}
