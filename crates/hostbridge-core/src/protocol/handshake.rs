//! HTTP upgrade handshake: request parsing, validation, and the 101 reply.
//!
//! Validation failures carry a specific reason string for diagnostics; the
//! caller must drop the socket without sending any reply.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::error::{BridgeError, Result};

/// Fixed GUID appended to the client key before hashing (RFC 6455 §1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Parsed HTTP upgrade request: request line plus headers.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Parse a raw header block (everything up to the blank line).
    pub fn parse(text: &str) -> Result<Request> {
        let mut lines = text.split("\r\n").map(str::trim_end);
        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| BridgeError::Handshake("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or_default().to_string();
        let version = parts
            .next()
            .and_then(|v| v.strip_prefix("HTTP/"))
            .unwrap_or_default()
            .to_string();
        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(BridgeError::Handshake(format!(
                "malformed request line: {request_line:?}"
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                // Tolerate stray lines the way the original did: skip them.
                continue;
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Request {
            method,
            target,
            version,
            headers,
        })
    }

    /// Case-insensitive header lookup (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check the upgrade rules. Any failure means the socket is dropped
    /// without a handshake reply.
    pub fn validate(&self) -> Result<()> {
        if self.method != "GET" {
            return Err(BridgeError::Handshake(format!(
                "method is {:?}, not GET",
                self.method
            )));
        }
        if self.header("Host").is_none() {
            return Err(BridgeError::Handshake("missing Host header".into()));
        }
        match self.header("Upgrade") {
            Some(v) if v.eq_ignore_ascii_case("websocket") => {}
            Some(v) => {
                return Err(BridgeError::Handshake(format!(
                    "Upgrade header is {v:?}, not websocket"
                )))
            }
            None => return Err(BridgeError::Handshake("missing Upgrade header".into())),
        }
        match self.header("Connection") {
            Some(v) if v.to_ascii_lowercase().contains("upgrade") => {}
            Some(v) => {
                return Err(BridgeError::Handshake(format!(
                    "Connection header {v:?} does not include Upgrade"
                )))
            }
            None => return Err(BridgeError::Handshake("missing Connection header".into())),
        }
        if self.header("Sec-WebSocket-Key").is_none() {
            return Err(BridgeError::Handshake(
                "missing Sec-WebSocket-Key header".into(),
            ));
        }
        match self.header("Sec-WebSocket-Version") {
            Some("13") => {}
            Some(v) => {
                return Err(BridgeError::Handshake(format!(
                    "Sec-WebSocket-Version is {v:?}, not 13"
                )))
            }
            None => {
                return Err(BridgeError::Handshake(
                    "missing Sec-WebSocket-Version header".into(),
                ))
            }
        }
        Ok(())
    }

    /// Client key, present after a successful `validate`.
    pub fn websocket_key(&self) -> Option<&str> {
        self.header("Sec-WebSocket-Key")
    }
}

/// Accept value: base64(SHA-1(key ++ GUID)).
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The fixed 101 Switching Protocols reply, CRLF line endings, terminated by
/// a blank line.
pub fn encode_reply(key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    )
    .into_bytes()
}
