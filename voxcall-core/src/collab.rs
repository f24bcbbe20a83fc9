//! Host-provided collaborators the call drives but does not own.

use futures_util::future::BoxFuture;

/// Ringback tone played while a call is connecting.
///
/// Started when the session enters `Connecting`; stopped on the first
/// `turn` message or the first agent audio, and on teardown.
pub trait Ringtone: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Microphone permission prompt. Awaited before any device is opened.
pub trait PermissionGate: Send + Sync {
    /// Resolve to `true` when the user granted microphone access.
    fn request_microphone(&self) -> BoxFuture<'_, bool>;
}

/// No ringback tone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentRingtone;

impl Ringtone for SilentRingtone {
    fn start(&self) {}
    fn stop(&self) {}
}

/// Grants access without asking. For hosts whose OS prompt happens when
/// the device is opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    fn request_microphone(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}
