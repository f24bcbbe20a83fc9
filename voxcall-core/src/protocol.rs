//! JSON control messages exchanged with the conversational peer.
//!
//! Every text frame is a JSON object with a `type` discriminator:
//!
//! | type | direction | payload |
//! |------|-----------|---------|
//! | `join` | client → server | `{ userId, scenarioId }` |
//! | `turn` | server → client | `{ turn: "user" \| "agent" }` |
//! | `text` | server → client | `{ data }` |
//! | `audio_chunk` | server → client | `{ data: base64 PCM }` |
//! | `audio_end` | server → client | `{}` |
//! | `interrupted` | server → client | `{}` |
//! | `end_call` | either | `{}` |
//!
//! Binary frames carry raw PCM and never pass through this module.

use serde::{Deserialize, Serialize};

use crate::buffering::frame::AudioFrame;
use crate::error::FrameError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "scenarioId")]
        scenario_id: String,
    },
    EndCall,
}

/// Which party the server hands the floor to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOwner {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Turn { turn: TurnOwner },
    Text { data: String },
    AudioChunk { data: String },
    AudioEnd,
    Interrupted,
    EndCall,
    /// Any `type` this client does not know. Ignored by the session.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Decode an `audio_chunk` payload. `None` for every other message.
    pub fn audio_frame(&self, sample_rate: u32) -> Option<Result<AudioFrame, FrameError>> {
        match self {
            Self::AudioChunk { data } => Some(AudioFrame::from_base64(data, sample_rate)),
            _ => None,
        }
    }

    /// Short name for logs, without payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Turn { .. } => "turn",
            Self::Text { .. } => "text",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::AudioEnd => "audio_end",
            Self::Interrupted => "interrupted",
            Self::EndCall => "end_call",
            Self::Unknown => "unknown",
        }
    }
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
