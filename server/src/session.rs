//! Connection handles bound to player entities

use crate::error::SessionError;
use bytes::Bytes;
use log::{debug, info};
use shared::{ChatMessage, CodecRegistry, KickMessage, Packet, MAX_STRING_LEN};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An encoded frame waiting for the network sender task
#[derive(Debug, Clone)]
pub struct Outbound {
    pub addr: SocketAddr,
    pub data: Bytes,
}

/// Builds protocol-specific messages out of plain values
pub trait ProtocolAdapter: Send + Sync {
    /// Chat message carrying `text`, or `None` if the protocol cannot carry it
    fn chat_message(&self, text: &str) -> Option<Packet>;
}

/// Adapter for the built-in message set
#[derive(Debug, Default)]
pub struct DefaultProtocol;

impl ProtocolAdapter for DefaultProtocol {
    fn chat_message(&self, text: &str) -> Option<Packet> {
        if text.len() > MAX_STRING_LEN {
            return None;
        }
        Some(Packet::Chat(ChatMessage::new(text)))
    }
}

/// A live connection from one peer
///
/// Sessions encode outgoing messages with the shared codec registry and
/// queue the frames for the sender task, so sending never blocks on the
/// socket.
pub struct Session {
    id: u32,
    addr: SocketAddr,
    codecs: Arc<CodecRegistry>,
    protocol: Arc<dyn ProtocolAdapter>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        id: u32,
        addr: SocketAddr,
        codecs: Arc<CodecRegistry>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self::with_protocol(id, addr, codecs, outbound, Arc::new(DefaultProtocol))
    }

    pub fn with_protocol(
        id: u32,
        addr: SocketAddr,
        codecs: Arc<CodecRegistry>,
        outbound: mpsc::UnboundedSender<Outbound>,
        protocol: Arc<dyn ProtocolAdapter>,
    ) -> Self {
        Self {
            id,
            addr,
            codecs,
            protocol,
            outbound,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn protocol(&self) -> &dyn ProtocolAdapter {
        self.protocol.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Encodes `packet` and queues it for delivery
    pub fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id));
        }
        self.enqueue(packet)
    }

    fn enqueue(&self, packet: &Packet) -> Result<(), SessionError> {
        let data = self.codecs.encode(packet)?;
        self.outbound
            .send(Outbound {
                addr: self.addr,
                data,
            })
            .map_err(|_| SessionError::QueueClosed)
    }

    /// Closes the session without telling the peer, for peers that left
    /// on their own
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Sends a kick message and closes the session
    ///
    /// Returns false if the session was already closed.
    pub fn disconnect(&self, reason: &str) -> bool {
        if !self.close() {
            return false;
        }

        info!("Session {} ({}) closed: {}", self.id, self.addr, reason);
        if let Err(e) = self.enqueue(&Packet::Kick(KickMessage::new(reason))) {
            debug!("Could not deliver kick to {}: {}", self.addr, e);
        }
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
