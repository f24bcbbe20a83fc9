//! WebSocket transport over tokio-tungstenite.
//!
//! One connection spawns two tasks:
//!
//! ```text
//! TransportSender ──(mpsc bounded)──► writer task ──► ws sink
//! ws stream ──► reader task ──(mpsc bounded)──► Transport::recv
//! ```
//!
//! Binary messages are raw little-endian PCM; text messages are JSON
//! control messages. Dropping every `TransportSender` closes the socket.

use futures_util::{future::BoxFuture, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{Dialer, Outbound, Transport, TransportEvent, TransportSender};
use crate::buffering::frame::AudioFrame;
use crate::error::TransportError;
use crate::protocol::ServerMessage;

/// Dials `url` once per call attempt.
#[derive(Debug, Clone)]
pub struct WsDialer {
    url: String,
    capacity: usize,
    sample_rate: u32,
}

impl WsDialer {
    /// `capacity` bounds both the outbound and inbound queues.
    /// `sample_rate` is stamped on inbound binary PCM.
    pub fn new(url: impl Into<String>, capacity: usize, sample_rate: u32) -> Self {
        Self {
            url: url.into(),
            capacity: capacity.max(1),
            sample_rate,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Dialer for WsDialer {
    fn dial(&self) -> BoxFuture<'static, Result<Transport, TransportError>> {
        let this = self.clone();
        Box::pin(async move { connect(&this.url, this.capacity, this.sample_rate).await })
    }
}

/// Encode one outbound item as a WebSocket message.
pub fn encode(outbound: Outbound) -> Result<Message, TransportError> {
    match outbound {
        Outbound::Audio(frame) => Ok(Message::Binary(frame.to_le_bytes())),
        Outbound::Control(message) => message
            .to_json()
            .map(Message::Text)
            .map_err(|e| TransportError::Encode(e.to_string())),
    }
}

/// Decode one inbound WebSocket message. `None` for frames with no
/// meaning at this layer (ping, pong, raw frames).
pub fn decode(message: Message, sample_rate: u32) -> Option<TransportEvent> {
    match message {
        Message::Binary(bytes) => Some(match AudioFrame::from_le_bytes(&bytes, sample_rate) {
            Ok(frame) => TransportEvent::Audio(frame),
            Err(e) => TransportEvent::Malformed(format!("binary audio: {e}")),
        }),
        Message::Text(text) => Some(match ServerMessage::parse(&text) {
            Ok(message) => TransportEvent::Control(message),
            Err(e) => TransportEvent::Malformed(format!("control message: {e}")),
        }),
        Message::Close(frame) => {
            debug!(?frame, "peer sent close");
            Some(TransportEvent::Closed(None))
        }
        _ => None,
    }
}

/// Open a WebSocket connection and start its reader and writer tasks.
///
/// # Errors
/// `TransportError::Connect` if the handshake fails.
pub async fn connect(
    url: &str,
    capacity: usize,
    sample_rate: u32,
) -> Result<Transport, TransportError> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    info!(url, "transport connected");

    let (mut sink, mut source) = stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(capacity);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(capacity);

    let writer_events = event_tx.clone();
    tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let message = match encode(outbound) {
                Ok(message) => message,
                Err(e) => {
                    warn!("dropping outbound message: {e}");
                    continue;
                }
            };
            if let Err(e) = sink.send(message).await {
                let _ = writer_events
                    .send(TransportEvent::Closed(Some(TransportError::Send(
                        e.to_string(),
                    ))))
                    .await;
                return;
            }
        }
        debug!("outbound channel closed, closing socket");
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(result) = source.next().await {
            let event = match result {
                Ok(message) => match decode(message, sample_rate) {
                    Some(event) => event,
                    None => continue,
                },
                Err(e) => TransportEvent::Closed(Some(TransportError::Protocol(e.to_string()))),
            };
            let terminal = matches!(event, TransportEvent::Closed(_));
            if event_tx.send(event).await.is_err() || terminal {
                return;
            }
        }
        let _ = event_tx.send(TransportEvent::Closed(None)).await;
    });

    Ok(Transport::new(TransportSender::new(out_tx), event_rx))
}
