//! hostbridge core: transport-agnostic protocol primitives.
//!
//! This crate defines the byte-level WebSocket codec (handshake + framing),
//! the generic JSON token-tree codec, and the typed message-envelope protocol
//! shared by the server and by collaborator layers. It intentionally carries
//! no sockets, threads, or runtime dependencies so it can be exercised from
//! any context, including tests that never open a connection.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `BridgeError`/`Result` so a host
//! process embedding the bridge never crashes on malformed traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod envelope;
pub mod error;
pub mod json;
pub mod protocol;

/// Shared result type.
pub use error::{BridgeError, Result};
