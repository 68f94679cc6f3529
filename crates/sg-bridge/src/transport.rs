//! Transport capability owned by each endpoint.
//!
//! Two implementations, selected at construction time: a channel into a
//! real WebSocket write task, and a log-sink for server-created virtual
//! controllers whose sends are captured but never delivered.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use sg_core::WireFrame;

/// What a WebSocket write task receives from its endpoint's transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Frame(WireFrame),
    Close,
}

/// Send/close capability over one connection. Only the bridge calls these.
pub trait Transport: Send + Sync {
    /// Enqueue a frame. Returns false once the peer is gone.
    fn send(&self, frame: &WireFrame) -> bool;
    /// Ask the connection to close. Idempotent.
    fn close(&self);
    fn is_live(&self) -> bool;
}

/// Transport backed by an mpsc channel draining into a socket write task.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: &WireFrame) -> bool {
        self.tx.send(TransportEvent::Frame(frame.clone())).is_ok()
    }

    fn close(&self) {
        let _ = self.tx.send(TransportEvent::Close);
    }

    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Log-sink transport for virtual controller endpoints: the AI acts through
/// the bridge API directly, so frames addressed to it have nowhere to go.
pub struct NullTransport {
    closed: AtomicBool,
}

impl NullTransport {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for NullTransport {
    fn send(&self, frame: &WireFrame) -> bool {
        tracing::debug!(
            kind = %frame.kind,
            message = %frame.message,
            "virtual endpoint swallowed frame"
        );
        !self.closed.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }
}
