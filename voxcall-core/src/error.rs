use thiserror::Error;

/// All errors produced by voxcall-core.
#[derive(Debug, Error)]
pub enum VoxError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("a call is already active")]
    AlreadyActive,

    #[error("no call is active")]
    NotActive,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of the message channel between client and server.
///
/// None of these ever reach the render context; the session treats every
/// variant as a terminal signal for the current call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("channel closed")]
    Closed,

    #[error("outbound channel is full")]
    Full,

    #[error("send failed: {0}")]
    Send(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Malformed inbound audio payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("PCM payload has odd length {0}")]
    OddLength(usize),

    #[error("PCM payload is empty")]
    Empty,

    #[error("invalid base64 audio payload: {0}")]
    Base64(String),
}

pub type Result<T> = std::result::Result<T, VoxError>;
