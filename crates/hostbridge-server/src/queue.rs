//! Bounded event queue between connection threads and the host tick.
//!
//! Many producers (read loops, the accept loop) feed one consumer (the
//! host's pump). The channel is bounded at construction; a full queue blocks
//! the producer rather than dropping, because dropped events would break
//! request/response correlation. A stalled host therefore throttles all
//! readers, which is the accepted tradeoff for no-loss delivery.

use crossbeam_channel::{bounded, Receiver, Sender};

use hostbridge_core::error::{BridgeError, Result};

use crate::connection::ConnectionId;

/// Protocol-level event produced by connection threads.
///
/// Per-connection ordering is preserved end to end; no total order exists
/// across connections beyond enqueue order.
#[derive(Debug)]
pub enum SocketEvent {
    Opened(ConnectionId),
    Message {
        connection: ConnectionId,
        /// Fresh correlation id for this event, used in logs.
        event_id: String,
        /// UTF-8 payload of a text frame.
        text: Option<String>,
        /// Raw payload of a binary frame.
        data: Option<Vec<u8>>,
    },
    Closed(ConnectionId),
}

/// The consumer half, owned by the server.
pub struct EventQueue {
    tx: Sender<SocketEvent>,
    rx: Receiver<SocketEvent>,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> EventQueue {
        let (tx, rx) = bounded(capacity);
        EventQueue { tx, rx }
    }

    /// Clone a producer handle for a connection or accept thread.
    pub fn producer(&self) -> EventProducer {
        EventProducer {
            tx: self.tx.clone(),
        }
    }

    /// Non-blocking dequeue; the pump calls this until it returns `None`.
    pub fn try_next(&self) -> Option<SocketEvent> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct EventProducer {
    tx: Sender<SocketEvent>,
}

impl EventProducer {
    /// Enqueue one event, blocking while the queue is full.
    pub fn push(&self, event: SocketEvent) -> Result<()> {
        if self.tx.is_full() {
            tracing::debug!("event queue full; producer blocking");
        }
        self.tx.send(event).map_err(|_| BridgeError::QueueClosed)
    }
}
