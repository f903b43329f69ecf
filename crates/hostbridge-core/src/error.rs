//! Shared error type across hostbridge crates.

use thiserror::Error;

use crate::json::JsonError;

/// Shared result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The HTTP upgrade request did not satisfy the handshake rules.
    /// The connection must be dropped without a reply.
    #[error("handshake rejected: {0}")]
    Handshake(String),

    /// A frame violated the wire protocol (bad length field, oversized
    /// control payload, and so on).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Socket I/O failure. Treated as an implicit close, never retried.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// JSON syntax or type-directed materialization failure.
    #[error(transparent)]
    Serialization(#[from] JsonError),

    /// Send/broadcast target is not in the connection registry.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// The event queue was torn down while a producer still held a handle.
    #[error("event queue closed")]
    QueueClosed,
}

impl BridgeError {
    /// Stable category name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Handshake(_) => "handshake",
            BridgeError::Protocol(_) => "protocol",
            BridgeError::Transport(_) => "transport",
            BridgeError::Serialization(_) => "serialization",
            BridgeError::UnknownConnection(_) => "unknown_connection",
            BridgeError::QueueClosed => "queue_closed",
        }
    }
}
