//! Message-passing seam between the control context and the render context.
//!
//! ```text
//! control ── PlaybackHandle ──(crossbeam bounded)──► PlaybackDriver ── render()
//!    ▲                                                     │
//!    └────────────── mpsc::Receiver<PlaybackEvent> ◄───────┘ (try_send)
//! ```
//!
//! Neither side ever waits on the other: the handle uses `try_send`, the
//! driver drains pending commands with `try_iter` at the top of each
//! render callback, and events are posted with `try_send`.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::sync::mpsc;
use tracing::warn;

use super::{PlaybackCommand, PlaybackConfig, PlaybackEngine, PlaybackEvent, PlaybackStats};
use crate::buffering::frame::AudioFrame;

/// Pending commands the render context has not applied yet.
/// At 20 ms per chunk this is ~20 s of audio, twice the default ceiling.
pub const COMMAND_CAPACITY: usize = 1024;

/// Events the control context has not consumed yet.
pub const EVENT_CAPACITY: usize = 64;

/// Build a matched control-side handle, render-side driver and event stream.
pub fn playback_channel(
    config: PlaybackConfig,
    stats: Arc<PlaybackStats>,
) -> (PlaybackHandle, PlaybackDriver, mpsc::Receiver<PlaybackEvent>) {
    let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(COMMAND_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
    let engine = PlaybackEngine::new(config, event_tx, stats);
    (
        PlaybackHandle { commands: cmd_tx },
        PlaybackDriver {
            engine,
            commands: cmd_rx,
        },
        event_rx,
    )
}

/// Control-side sender. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    commands: Sender<PlaybackCommand>,
}

impl PlaybackHandle {
    /// Returns `false` when the command could not be queued.
    pub fn send(&self, command: PlaybackCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!(command = ?CommandKind::of(&cmd), "playback command queue full, dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn init(&self, config: PlaybackConfig) -> bool {
        self.send(PlaybackCommand::Init(config))
    }

    pub fn chunk(&self, frame: AudioFrame) -> bool {
        self.send(PlaybackCommand::Chunk(frame))
    }

    pub fn set_rate(&self, value: f32, allow_above_base: bool) -> bool {
        self.send(PlaybackCommand::SetRate {
            value,
            allow_above_base,
        })
    }

    pub fn final_expected(&self, id: u64) -> bool {
        self.send(PlaybackCommand::FinalExpected(id))
    }

    pub fn cancel_final(&self) -> bool {
        self.send(PlaybackCommand::CancelFinal)
    }

    pub fn flush(&self) -> bool {
        self.send(PlaybackCommand::Flush)
    }

    pub fn flush_immediate(&self) -> bool {
        self.send(PlaybackCommand::FlushImmediate)
    }
}

/// Command discriminant for logging without dumping PCM payloads.
#[derive(Debug)]
enum CommandKind {
    Init,
    Chunk,
    SetRate,
    FinalExpected,
    CancelFinal,
    Flush,
    FlushImmediate,
}

impl CommandKind {
    fn of(cmd: &PlaybackCommand) -> Self {
        match cmd {
            PlaybackCommand::Init(_) => Self::Init,
            PlaybackCommand::Chunk(_) => Self::Chunk,
            PlaybackCommand::SetRate { .. } => Self::SetRate,
            PlaybackCommand::FinalExpected(_) => Self::FinalExpected,
            PlaybackCommand::CancelFinal => Self::CancelFinal,
            PlaybackCommand::Flush => Self::Flush,
            PlaybackCommand::FlushImmediate => Self::FlushImmediate,
        }
    }
}

/// Render-side owner of the engine. Moved into the output device callback.
pub struct PlaybackDriver {
    engine: PlaybackEngine,
    commands: Receiver<PlaybackCommand>,
}

impl PlaybackDriver {
    /// Apply every pending command in issue order, then render `out`.
    pub fn render(&mut self, out: &mut [f32]) {
        for command in self.commands.try_iter() {
            self.engine.apply(command);
        }
        self.engine.render(out);
    }

    /// See [`PlaybackEngine::set_output_rate`].
    pub fn set_output_rate(&mut self, output_rate: u32) {
        self.engine.set_output_rate(output_rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.config().sample_rate
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }
}
