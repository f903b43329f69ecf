//! Demo bridge binary.
//!
//! Stands in for the host process: loads `hostbridge.yaml` (falling back to
//! defaults), starts the bridge, and pumps events on a fixed tick the way an
//! embedding host would from its update loop.

use std::thread;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use hostbridge_server::{config, demo, BridgeServer};

fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = match config::load_from_file("hostbridge.yaml") {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "config not loaded; using defaults");
            config::BridgeConfig::default()
        }
    };

    let server = BridgeServer::listen(cfg, demo::demo_registry()).expect("bridge failed to start");
    let mut handler = demo::EchoHandler;

    loop {
        server.pump(&mut handler);
        thread::sleep(Duration::from_millis(16));
    }
}
