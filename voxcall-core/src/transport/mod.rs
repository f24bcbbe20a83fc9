//! Persistent, ordered, message-oriented duplex channel to the peer.
//!
//! A [`Transport`] is two halves:
//!
//! - [`TransportSender`]: cloneable, synchronous, never waits. Sending is
//!   `try_send` into a bounded queue drained by the connection's writer
//!   task, so it is safe to call from the capture loop thread.
//! - an inbound stream of [`TransportEvent`]s, consumed by the control task.
//!
//! Connection loss is reported once as [`TransportEvent::Closed`] and is
//! terminal for the call.

pub mod channel;
pub mod ws;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::buffering::frame::AudioFrame;
use crate::error::TransportError;
use crate::protocol::{ClientMessage, ServerMessage};

pub use channel::{ChannelDialer, ChannelPeer};
pub use ws::WsDialer;

/// What the client hands to the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Sent as one binary message of little-endian PCM.
    Audio(AudioFrame),
    /// Sent as one JSON text message.
    Control(ClientMessage),
}

/// What the reader task hands to the control task, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Audio(AudioFrame),
    Control(ServerMessage),
    /// Inbound payload that could not be decoded. Dropped by the session.
    Malformed(String),
    /// The connection is gone. `None` for an orderly close by the peer.
    Closed(Option<TransportError>),
}

/// Non-blocking send side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TransportSender {
    tx: mpsc::Sender<Outbound>,
}

impl TransportSender {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// Fire-and-forget audio send.
    ///
    /// # Errors
    /// `TransportError::Full` if the writer is behind, `Closed` if the
    /// connection is gone. The frame is dropped in both cases.
    pub fn send_frame(&self, frame: AudioFrame) -> Result<(), TransportError> {
        self.try_send_frame(frame).map_err(|(e, _)| e)
    }

    /// Like [`send_frame`](Self::send_frame) but hands a rejected frame
    /// back so the caller can queue it locally.
    pub fn try_send_frame(&self, frame: AudioFrame) -> Result<(), (TransportError, AudioFrame)> {
        match self.tx.try_reserve() {
            Ok(permit) => {
                permit.send(Outbound::Audio(frame));
                Ok(())
            }
            Err(TrySendError::Full(())) => Err((TransportError::Full, frame)),
            Err(TrySendError::Closed(())) => Err((TransportError::Closed, frame)),
        }
    }

    pub fn send_control(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.tx.try_send(Outbound::Control(message)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Full,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open connection.
#[derive(Debug)]
pub struct Transport {
    sender: TransportSender,
    events: mpsc::Receiver<TransportEvent>,
}

impl Transport {
    pub fn new(sender: TransportSender, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { sender, events }
    }

    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// Next inbound event. `None` once every producer is gone, which the
    /// session treats like [`TransportEvent::Closed`].
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn send_frame(&self, frame: AudioFrame) -> Result<(), TransportError> {
        self.sender.send_frame(frame)
    }

    pub fn send_control(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.sender.send_control(message)
    }
}

/// Opens a new [`Transport`] for each call attempt.
pub trait Dialer: Send + Sync {
    fn dial(&self) -> BoxFuture<'static, Result<Transport, TransportError>>;
}
