//! Bridge config loader (strict parsing).

use std::fs;

use serde::Deserialize;

use hostbridge_core::error::{BridgeError, Result};

/// Server configuration. Defaults match the original deployment: port 8787,
/// bind-all address, 1000-event queue, 10 kB handshake buffer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port. 0 lets the OS pick one (used by tests).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Event queue capacity; producers block when it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Cap on the buffered HTTP header block during the handshake.
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    /// Cap on a single inbound frame payload.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            queue_capacity: default_queue_capacity(),
            max_header_bytes: default_max_header_bytes(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(BridgeError::Protocol(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_header_bytes < 256 {
            return Err(BridgeError::Protocol(
                "max_header_bytes must be at least 256".into(),
            ));
        }
        if self.max_frame_bytes < 125 {
            return Err(BridgeError::Protocol(
                "max_frame_bytes must be at least 125".into(),
            ));
        }
        Ok(())
    }
}

fn default_address() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8787
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_max_header_bytes() -> usize {
    10000
}
fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

pub fn load_from_file(path: &str) -> Result<BridgeConfig> {
    let s = fs::read_to_string(path)?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BridgeConfig> {
    let cfg: BridgeConfig = serde_yaml::from_str(s)
        .map_err(|e| BridgeError::Protocol(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
