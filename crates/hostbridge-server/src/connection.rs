//! One accepted socket: handshake establishment, the dedicated blocking read
//! loop, and synchronized frame writes.
//!
//! Lifecycle: `Connecting -> Established -> Closed`. A connection only
//! exists in the registry once the handshake succeeded; teardown is always
//! cooperative (stop flag + socket shutdown), never a killed thread.

use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use hostbridge_core::envelope::fresh_id;
use hostbridge_core::error::{BridgeError, Result};
use hostbridge_core::protocol::frame::{self, Opcode};
use hostbridge_core::protocol::handshake;

use crate::queue::{EventProducer, SocketEvent};

/// Handshakes run synchronously in the accept loop, so a client that stalls
/// mid-header must be cut off or it blocks every later connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opaque unique connection identity, also used as the envelope `clientID`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn fresh() -> ConnectionId {
        ConnectionId(fresh_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> ConnectionId {
        ConnectionId(s.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An established WebSocket connection.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    /// Write half. Shared between the host thread (send/broadcast) and the
    /// read thread (pong and close echoes), hence the lock.
    writer: Mutex<TcpStream>,
    live: AtomicBool,
    stopping: AtomicBool,
}

/// One decoded inbound frame, already unmasked.
struct RawFrame {
    fin: bool,
    opcode: Option<Opcode>,
    raw_opcode: u8,
    payload: Vec<u8>,
}

impl Connection {
    /// Run the handshake on a freshly accepted socket. On success the reply
    /// has been written and the connection is live; the returned stream
    /// clone is handed to [`Connection::spawn_read_loop`]. On failure the
    /// socket is dropped and no event is emitted.
    pub fn establish(
        mut stream: TcpStream,
        max_header_bytes: usize,
    ) -> Result<(Arc<Connection>, TcpStream)> {
        let peer = stream.peer_addr()?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        let header = read_header_block(&mut stream, max_header_bytes)?;
        let request = handshake::Request::parse(&header)?;
        request.validate()?;
        let key = request
            .websocket_key()
            .ok_or_else(|| BridgeError::Handshake("missing Sec-WebSocket-Key header".into()))?;
        stream.write_all(&handshake::encode_reply(key))?;
        // Established connections block in the read loop indefinitely.
        stream.set_read_timeout(None)?;

        let reader = stream.try_clone()?;
        let conn = Arc::new(Connection {
            id: ConnectionId::fresh(),
            peer,
            writer: Mutex::new(stream),
            live: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
        });
        tracing::info!(connection = %conn.id, peer = %conn.peer, "websocket client connected");
        Ok((conn, reader))
    }

    /// Start the dedicated read thread for this connection.
    pub fn spawn_read_loop(
        self: &Arc<Self>,
        reader: TcpStream,
        events: EventProducer,
        max_frame_bytes: usize,
    ) -> Result<()> {
        let conn = Arc::clone(self);
        thread::Builder::new()
            .name(format!("hostbridge-conn-{}", conn.id))
            .spawn(move || conn.read_loop(reader, events, max_frame_bytes))?;
        Ok(())
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Host-requested teardown: flag the read loop to stop and shut the
    /// socket down to unblock it. Emits no event.
    pub fn close(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        let _ = self.writer.lock().shutdown(Shutdown::Both);
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.write_frame(&frame::encode_text(text))
    }

    pub fn send_binary(&self, data: &[u8]) -> Result<()> {
        self.write_frame(&frame::encode_binary(data))
    }

    pub fn send_close(&self, code: u16, reason: Option<&str>) -> Result<()> {
        self.write_frame(&frame::encode_close(code, reason)?)
    }

    pub fn send_ping(&self, payload: &[u8]) -> Result<()> {
        self.write_frame(&frame::encode_ping(payload)?)
    }

    fn send_pong(&self, payload: &[u8]) -> Result<()> {
        self.write_frame(&frame::encode_pong(payload)?)
    }

    /// Synchronous write; errors surface to the caller, never a silent
    /// no-op. A failed write marks the connection dead for pruning.
    fn write_frame(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(bytes).map_err(|e| {
            self.live.store(false, Ordering::SeqCst);
            BridgeError::from(e)
        })
    }

    fn read_loop(&self, mut stream: TcpStream, events: EventProducer, max_frame_bytes: usize) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            let frame = match self.read_frame(&mut stream, max_frame_bytes) {
                Ok(frame) => frame,
                Err(_) if self.stopping.load(Ordering::SeqCst) => break,
                Err(e) => {
                    // Stream error: implicit close, logged, not retried.
                    tracing::warn!(
                        connection = %self.id,
                        error = %e,
                        kind = e.kind(),
                        "read failed; closing connection"
                    );
                    self.live.store(false, Ordering::SeqCst);
                    let _ = stream.shutdown(Shutdown::Both);
                    let _ = events.push(SocketEvent::Closed(self.id.clone()));
                    break;
                }
            };

            if !frame.fin {
                // No fragmented-message reassembly; skip rather than corrupt.
                tracing::warn!(connection = %self.id, "fragmented frame ignored");
                continue;
            }

            match frame.opcode {
                Some(Opcode::Text) => match String::from_utf8(frame.payload) {
                    Ok(text) => {
                        let event = SocketEvent::Message {
                            connection: self.id.clone(),
                            event_id: fresh_id(),
                            text: Some(text),
                            data: None,
                        };
                        if events.push(event).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::warn!(connection = %self.id, "text frame is not valid UTF-8; dropped");
                    }
                },
                Some(Opcode::Binary) => {
                    let event = SocketEvent::Message {
                        connection: self.id.clone(),
                        event_id: fresh_id(),
                        text: None,
                        data: Some(frame.payload),
                    };
                    if events.push(event).is_err() {
                        break;
                    }
                }
                Some(Opcode::Ping) => {
                    tracing::debug!(connection = %self.id, "ping");
                    if let Err(e) = self.send_pong(&frame.payload) {
                        tracing::warn!(connection = %self.id, error = %e, "pong write failed");
                    }
                }
                Some(Opcode::Pong) => {
                    tracing::debug!(connection = %self.id, "pong");
                }
                Some(Opcode::Close) => {
                    let (code, reason) = frame::decode_close(&frame.payload);
                    // Echo the close back, best effort.
                    if let Err(e) = self.send_close(code, reason.as_deref()) {
                        tracing::debug!(connection = %self.id, error = %e, "close echo failed");
                    }
                    tracing::info!(
                        connection = %self.id,
                        code,
                        reason = reason.as_deref().unwrap_or(""),
                        "client closed the connection"
                    );
                    self.live.store(false, Ordering::SeqCst);
                    let _ = stream.shutdown(Shutdown::Both);
                    let _ = events.push(SocketEvent::Closed(self.id.clone()));
                    break;
                }
                Some(Opcode::Continuation) | None => {
                    tracing::warn!(
                        connection = %self.id,
                        opcode = frame.raw_opcode,
                        "unsupported opcode; frame ignored"
                    );
                }
            }
        }
        tracing::debug!(connection = %self.id, "read loop stopped");
    }

    /// Block until one whole frame is available and decode it.
    fn read_frame(&self, stream: &mut TcpStream, max_frame_bytes: usize) -> Result<RawFrame> {
        let mut prefix = [0u8; 2];
        stream.read_exact(&mut prefix)?;
        let head = frame::decode_prefix(prefix[0], prefix[1]);

        let mut extra = [0u8; 8];
        let extra_len = head.length.extra_bytes();
        stream.read_exact(&mut extra[..extra_len])?;
        let payload_len = frame::extended_length(head.length, &extra[..extra_len])?;
        if payload_len > max_frame_bytes as u64 {
            return Err(BridgeError::Protocol(format!(
                "frame payload of {payload_len} bytes exceeds cap of {max_frame_bytes}"
            )));
        }

        let mask = if head.masked {
            let mut key = [0u8; 4];
            stream.read_exact(&mut key)?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; payload_len as usize];
        stream.read_exact(&mut payload)?;
        if let Some(key) = mask {
            frame::apply_mask(&mut payload, key);
        }

        Ok(RawFrame {
            fin: head.fin,
            opcode: head.opcode,
            raw_opcode: head.raw_opcode,
            payload,
        })
    }
}

/// Buffer raw bytes until the blank line terminating the HTTP header block,
/// capped at `max_header_bytes`. Only the bytes up to the terminator are
/// decoded; a client may coalesce frame bytes into the same segment and
/// those must not fail the handshake.
fn read_header_block(stream: &mut TcpStream, max_header_bytes: usize) -> Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok(String::from_utf8_lossy(&buffer[..end + 4]).into_owned());
        }
        if buffer.len() >= max_header_bytes {
            return Err(BridgeError::Handshake(format!(
                "header block exceeds {max_header_bytes} bytes without terminator"
            )));
        }
        let received = stream.read(&mut chunk)?;
        if received == 0 {
            return Err(BridgeError::Handshake(
                "connection closed during handshake".into(),
            ));
        }
        buffer.extend_from_slice(&chunk[..received]);
    }
}
