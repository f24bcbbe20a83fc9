//! Call events.
//!
//! | Event | Emitted when |
//! |-------|--------------|
//! | `CallStatusEvent` | the session lifecycle changes |
//! | `TurnEvent` | the floor moves between user and agent |
//! | `AgentTextEvent` | the peer sends a `text` message |

use serde::{Deserialize, Serialize};

/// Session lifecycle. `Idle → Connecting → Connected → Ending → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Ending,
}

impl CallStatus {
    /// `true` between `start()` and the return to `Idle`.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Who owns the mic-to-network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Turn {
    #[default]
    None,
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusEvent {
    pub call_id: u64,
    pub status: CallStatus,
    /// Human-readable reason, e.g. why a call ended.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEvent {
    pub call_id: u64,
    pub turn: Turn,
}

/// Transcript or caption text from the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTextEvent {
    pub call_id: u64,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_camel_case_and_lowercase_status() {
        let event = CallStatusEvent {
            call_id: 3,
            status: CallStatus::Ending,
            detail: Some("connection lost".into()),
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["callId"], 3);
        assert_eq!(json["status"], "ending");
        assert_eq!(json["detail"], "connection lost");

        let round_trip: CallStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip, event);
    }

    #[test]
    fn turn_event_uses_lowercase_turn() {
        let json = serde_json::to_value(TurnEvent {
            call_id: 1,
            turn: Turn::None,
        })
        .unwrap();
        assert_eq!(json["turn"], "none");
        assert!(serde_json::from_str::<Turn>(r#""Agent""#).is_err());
    }

    #[test]
    fn only_idle_is_inactive() {
        assert!(!CallStatus::Idle.is_active());
        assert!(CallStatus::Connecting.is_active());
        assert!(CallStatus::Ending.is_active());
    }
}
