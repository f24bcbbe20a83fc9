//! In-memory transport. Each dial produces a connected [`Transport`] and a
//! [`ChannelPeer`] that plays the server side.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use super::{Dialer, Outbound, Transport, TransportEvent, TransportSender};
use crate::buffering::frame::AudioFrame;
use crate::error::TransportError;
use crate::protocol::{ClientMessage, ServerMessage};

/// Build a connected client/peer pair with `capacity`-bounded queues.
pub fn pair(capacity: usize) -> (Transport, ChannelPeer) {
    let capacity = capacity.max(1);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);
    (
        Transport::new(TransportSender::new(out_tx), event_rx),
        ChannelPeer {
            outbound: out_rx,
            events: event_tx,
        },
    )
}

/// Server side of an in-memory connection.
#[derive(Debug)]
pub struct ChannelPeer {
    outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
}

impl ChannelPeer {
    /// Deliver a control message to the client.
    ///
    /// # Errors
    /// `TransportError::Closed` once the client dropped its transport.
    pub async fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.deliver(TransportEvent::Control(message)).await
    }

    /// Deliver a binary PCM frame to the client.
    pub async fn send_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        self.deliver(TransportEvent::Audio(frame)).await
    }

    /// Simulate connection loss.
    pub async fn fail(&self, error: TransportError) -> Result<(), TransportError> {
        self.deliver(TransportEvent::Closed(Some(error))).await
    }

    /// Orderly close from the peer.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.deliver(TransportEvent::Closed(None)).await
    }

    async fn deliver(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Next item the client sent. `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Next control message, skipping audio. `None` once the client is gone.
    pub async fn recv_control(&mut self) -> Option<ClientMessage> {
        loop {
            match self.outbound.recv().await? {
                Outbound::Control(message) => return Some(message),
                Outbound::Audio(_) => continue,
            }
        }
    }

    /// Everything already sent by the client, without waiting.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = self.outbound.try_recv() {
            out.push(item);
        }
        out
    }
}

/// Dialer handing each new [`ChannelPeer`] to whoever holds the receiver
/// returned by [`ChannelDialer::new`].
#[derive(Debug)]
pub struct ChannelDialer {
    capacity: usize,
    peers: mpsc::UnboundedSender<ChannelPeer>,
    refuse: AtomicBool,
}

impl ChannelDialer {
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<ChannelPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                capacity,
                peers,
                refuse: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Make subsequent dials fail with `TransportError::Connect`.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Dialer for ChannelDialer {
    fn dial(&self) -> BoxFuture<'static, Result<Transport, TransportError>> {
        let result = if self.refuse.load(Ordering::SeqCst) {
            Err(TransportError::Connect("connection refused".into()))
        } else {
            let (transport, peer) = pair(self.capacity);
            self.peers
                .send(peer)
                .map(|()| transport)
                .map_err(|_| TransportError::Connect("no peer listening".into()))
        };
        Box::pin(async move { result })
    }
}
