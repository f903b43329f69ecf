//! hostbridge server: the embeddable WebSocket endpoint.
//!
//! This crate owns the sockets and threads: a dedicated accept loop, one
//! blocking read thread per connection, and a bounded event queue that hands
//! everything to the host's single-threaded tick via [`server::BridgeServer::pump`].
//! The wire protocol itself lives in `hostbridge-core`.

pub mod config;
pub mod connection;
pub mod demo;
pub mod queue;
pub mod registry;
pub mod server;

pub use config::BridgeConfig;
pub use connection::{Connection, ConnectionId};
pub use queue::{EventProducer, EventQueue, SocketEvent};
pub use registry::ConnectionRegistry;
pub use server::{BridgeHandler, BridgeServer};
