//! Wire-level WebSocket protocol (RFC 6455): handshake and framing.
//!
//! Everything here is pure byte manipulation. The server crate owns the
//! sockets and feeds bytes through these functions.

pub mod frame;
pub mod handshake;
