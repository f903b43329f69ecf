//! Top-level facade crate for hostbridge.
//!
//! Re-exports the protocol core and the server so hosts can depend on a
//! single crate.

pub mod core {
    pub use hostbridge_core::*;
}

pub mod server {
    pub use hostbridge_server::*;
}
