//! Call session state machine.
//!
//! Pure: every input returns the [`SessionAction`]s the control task must
//! perform, in order. No I/O, no timers, no channels.
//!
//! ```text
//!  Idle ──begin──► Connecting ──connected──► Connected
//!                      │                        │
//!                      └──── failure / end ─────┴──► Ending ──finish──► Idle
//! ```
//!
//! Turn handoff while `Connected`:
//!
//! | input | turn | capture | playback |
//! |-------|------|---------|----------|
//! | `turn=agent` | Agent | off | |
//! | `turn=user` | User | on | |
//! | `audio_end` | | | expect final `n`, arm fallback |
//! | `final_done(n)` | User | on | (cancel fallback) |
//! | `turn=user` / fallback | User | on | disarm final |
//! | `interrupted` | User | on | flush + drain, cancel fallback |

use tracing::debug;

use crate::ipc::events::{CallStatus, Turn};
use crate::playback::PlaybackEvent;
use crate::protocol::{ServerMessage, TurnOwner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    StartRingtone,
    StopRingtone,
    EnableCapture,
    DisableCapture,
    /// Reset the render context to the call's playback settings.
    InitPlayback,
    /// Playback `final_expected`, tagged with the utterance id.
    ExpectFinal(u64),
    /// Playback finalization resolved without the render context.
    DisarmFinal,
    /// Playback `flushImmediate`.
    FlushPlayback,
    ArmFallback,
    CancelFallback,
    EmitStatus {
        status: CallStatus,
        detail: Option<String>,
    },
    EmitTurn(Turn),
    EmitText(String),
    /// Stop capture, flush playback, release devices. Send `end_call`
    /// first when `notify_peer`.
    Teardown { notify_peer: bool },
}

#[derive(Debug, Default)]
pub struct CallSession {
    status: CallStatus,
    turn: Turn,
    /// Id of the `audio_end` awaiting `final_done` or the fallback.
    final_pending: Option<u64>,
    /// Last id handed to playback. A `final_done` carrying any other id
    /// belongs to an utterance that was already resolved.
    final_seq: u64,
    ringtone: bool,
    /// Set by `interrupted`; agent audio of the cut-off utterance that is
    /// still in flight is dropped until the next `turn=agent`.
    discard_agent_audio: bool,
}

impl CallSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn final_pending(&self) -> bool {
        self.final_pending.is_some()
    }

    /// Whether agent audio arriving now should reach playback.
    pub fn accepts_agent_audio(&self) -> bool {
        self.status == CallStatus::Connected && !self.discard_agent_audio
    }

    /// `Idle → Connecting`. No-op in any other state.
    pub fn begin(&mut self) -> Vec<SessionAction> {
        if self.status != CallStatus::Idle {
            return Vec::new();
        }
        self.status = CallStatus::Connecting;
        self.turn = Turn::None;
        self.final_pending = None;
        self.discard_agent_audio = false;
        self.ringtone = true;
        vec![
            SessionAction::EmitStatus {
                status: CallStatus::Connecting,
                detail: None,
            },
            SessionAction::StartRingtone,
        ]
    }

    /// Devices acquired, transport open, `join` sent.
    pub fn on_connected(&mut self) -> Vec<SessionAction> {
        if self.status != CallStatus::Connecting {
            return Vec::new();
        }
        self.status = CallStatus::Connected;
        self.turn = Turn::None;
        vec![
            SessionAction::InitPlayback,
            SessionAction::EmitStatus {
                status: CallStatus::Connected,
                detail: None,
            },
            SessionAction::EmitTurn(Turn::None),
        ]
    }

    /// Permission, device or dial failure while connecting.
    pub fn on_start_failed(&mut self, reason: impl Into<String>) -> Vec<SessionAction> {
        if self.status != CallStatus::Connecting {
            return Vec::new();
        }
        self.teardown(false, Some(reason.into()))
    }

    pub fn on_server_message(&mut self, message: &ServerMessage) -> Vec<SessionAction> {
        if self.status != CallStatus::Connected {
            debug!(kind = message.kind(), status = ?self.status, "ignoring message");
            return Vec::new();
        }
        match message {
            ServerMessage::Turn { turn: TurnOwner::Agent } => {
                let mut actions = self.stop_ringtone();
                self.discard_agent_audio = false;
                if self.turn != Turn::Agent {
                    self.turn = Turn::Agent;
                    actions.push(SessionAction::DisableCapture);
                    actions.push(SessionAction::EmitTurn(Turn::Agent));
                }
                actions
            }
            ServerMessage::Turn { turn: TurnOwner::User } => {
                let mut actions = self.stop_ringtone();
                actions.extend(self.disarm_final());
                actions.extend(self.hand_to_user());
                actions
            }
            ServerMessage::Text { data } => vec![SessionAction::EmitText(data.clone())],
            ServerMessage::AudioChunk { .. } => self.on_agent_audio(),
            ServerMessage::AudioEnd => {
                if self.final_pending.is_some() {
                    debug!("audio_end while a final is outstanding, ignored");
                    return Vec::new();
                }
                self.final_seq += 1;
                self.final_pending = Some(self.final_seq);
                vec![
                    SessionAction::ExpectFinal(self.final_seq),
                    SessionAction::ArmFallback,
                ]
            }
            ServerMessage::Interrupted => {
                let mut actions = vec![SessionAction::FlushPlayback];
                actions.extend(self.resolve_final());
                self.discard_agent_audio = true;
                actions.extend(self.hand_to_user());
                actions
            }
            ServerMessage::EndCall => self.teardown(false, Some("call ended by peer".into())),
            ServerMessage::Unknown => Vec::new(),
        }
    }

    /// Binary audio or a decoded `audio_chunk` arrived.
    pub fn on_agent_audio(&mut self) -> Vec<SessionAction> {
        if self.status != CallStatus::Connected {
            return Vec::new();
        }
        self.stop_ringtone()
    }

    pub fn on_playback_event(&mut self, event: PlaybackEvent) -> Vec<SessionAction> {
        match event {
            PlaybackEvent::FinalDone(id) if self.status == CallStatus::Connected => {
                if self.final_pending != Some(id) {
                    debug!(id, pending = ?self.final_pending, "stale final_done ignored");
                    return Vec::new();
                }
                let mut actions = self.resolve_final();
                actions.extend(self.hand_to_user());
                actions
            }
            _ => Vec::new(),
        }
    }

    /// The fallback timer armed by `audio_end` expired.
    pub fn on_fallback_elapsed(&mut self) -> Vec<SessionAction> {
        if self.status != CallStatus::Connected || self.final_pending.is_none() {
            return Vec::new();
        }
        self.final_pending = None;
        let mut actions = vec![SessionAction::DisarmFinal];
        actions.extend(self.hand_to_user());
        actions
    }

    /// Transport closed or failed.
    pub fn on_transport_closed(&mut self, reason: Option<String>) -> Vec<SessionAction> {
        if !matches!(self.status, CallStatus::Connecting | CallStatus::Connected) {
            return Vec::new();
        }
        let detail = reason.unwrap_or_else(|| "connection closed".into());
        self.teardown(false, Some(detail))
    }

    /// Local hang-up.
    pub fn end_local(&mut self) -> Vec<SessionAction> {
        if !matches!(self.status, CallStatus::Connecting | CallStatus::Connected) {
            return Vec::new();
        }
        let notify = self.status == CallStatus::Connected;
        self.teardown(notify, None)
    }

    /// Teardown done. `Ending → Idle`.
    pub fn finish(&mut self) -> Vec<SessionAction> {
        if self.status != CallStatus::Ending {
            return Vec::new();
        }
        self.status = CallStatus::Idle;
        let mut actions = Vec::new();
        if self.turn != Turn::None {
            self.turn = Turn::None;
            actions.push(SessionAction::EmitTurn(Turn::None));
        }
        actions.push(SessionAction::EmitStatus {
            status: CallStatus::Idle,
            detail: None,
        });
        actions
    }

    fn stop_ringtone(&mut self) -> Vec<SessionAction> {
        if std::mem::take(&mut self.ringtone) {
            vec![SessionAction::StopRingtone]
        } else {
            Vec::new()
        }
    }

    fn resolve_final(&mut self) -> Vec<SessionAction> {
        if self.final_pending.take().is_some() {
            vec![SessionAction::CancelFallback]
        } else {
            Vec::new()
        }
    }

    /// Resolve the pending final here and stop playback from resolving it.
    fn disarm_final(&mut self) -> Vec<SessionAction> {
        let mut actions = self.resolve_final();
        if !actions.is_empty() {
            actions.push(SessionAction::DisarmFinal);
        }
        actions
    }

    fn hand_to_user(&mut self) -> Vec<SessionAction> {
        if self.turn == Turn::User {
            return Vec::new();
        }
        self.turn = Turn::User;
        vec![
            SessionAction::EnableCapture,
            SessionAction::EmitTurn(Turn::User),
        ]
    }

    fn teardown(&mut self, notify_peer: bool, detail: Option<String>) -> Vec<SessionAction> {
        self.status = CallStatus::Ending;
        let mut actions = vec![SessionAction::EmitStatus {
            status: CallStatus::Ending,
            detail,
        }];
        actions.extend(self.resolve_final());
        actions.extend(self.stop_ringtone());
        self.discard_agent_audio = false;
        actions.push(SessionAction::Teardown { notify_peer });
        actions
    }
}
