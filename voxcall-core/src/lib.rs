//! # voxcall-core
//!
//! Real-time duplex voice-call client SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → CapturePump(spawn_blocking)
//!                                                    │ resample + frame
//!                                              TransportSender ──► peer
//!
//! peer ──► Transport events → CallSession (control task)
//!                                   │ PlaybackCommand
//!                        PlaybackDriver (render callback) → Speaker
//!                                   │ PlaybackEvent
//!                              CallSession
//! ```
//!
//! The input and render callbacks are zero-alloc. The session never touches
//! the jitter buffer directly: it issues commands and reacts to events.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod collab;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod protocol;
pub mod resources;
pub mod transport;

// Convenience re-exports for downstream crates
pub use audio::{backend::CpalBackend, resample::ResampleMode};
pub use collab::{AlwaysGranted, PermissionGate, Ringtone, SilentRingtone};
pub use engine::{pipeline::DiagnosticsSnapshot, CallConfig, CallEngine};
pub use error::{FrameError, TransportError, VoxError};
pub use ipc::events::{AgentTextEvent, CallStatus, CallStatusEvent, Turn, TurnEvent};
pub use playback::{PlaybackConfig, PlaybackEvent};
pub use resources::{AudioBackend, DeviceLease, ResourceConfig};
pub use transport::{Dialer, WsDialer};
