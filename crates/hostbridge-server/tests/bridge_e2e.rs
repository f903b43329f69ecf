//! End-to-end exercise against a real socket: handshake, greeting, unknown
//! type fallback, ping/pong, and the close exchange.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use hostbridge_core::envelope::{Envelope, Message};
use hostbridge_core::json;
use hostbridge_server::demo::{demo_registry, ErrorReply, Ready};
use hostbridge_server::{BridgeConfig, BridgeHandler, BridgeServer, ConnectionId};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> BridgeConfig {
    BridgeConfig {
        address: "127.0.0.1".into(),
        port: 0,
        ..BridgeConfig::default()
    }
}

/// Demo behavior plus a record of every callback, so the test can both drive
/// the exchange and assert on dispatch order.
#[derive(Default)]
struct RecordingHandler {
    opened: Vec<ConnectionId>,
    closed: Vec<ConnectionId>,
    unknown: Vec<Envelope>,
    messages: Vec<String>,
}

impl BridgeHandler for RecordingHandler {
    fn on_open(&mut self, server: &BridgeServer, connection: &ConnectionId) {
        server.send(Ready::new(), connection, None).unwrap();
        self.opened.push(connection.clone());
    }

    fn on_close(&mut self, _server: &BridgeServer, connection: &ConnectionId) {
        self.closed.push(connection.clone());
    }

    fn on_message(&mut self, _server: &BridgeServer, message: Box<dyn Message>) {
        self.messages.push(message.kind().to_string());
    }

    fn on_unknown(&mut self, server: &BridgeServer, envelope: Envelope) {
        let client = envelope.client_id.clone().unwrap();
        let reply = ErrorReply::new(format!("unrecognized message type {:?}", envelope.kind));
        server
            .send(reply, &ConnectionId::from(client.as_str()), Some(&envelope.id))
            .unwrap();
        self.unknown.push(envelope);
    }
}

/// Pump on the host thread until the predicate holds or the deadline hits.
fn pump_until(
    server: &BridgeServer,
    handler: &mut RecordingHandler,
    what: &str,
    mut done: impl FnMut(&RecordingHandler) -> bool,
) {
    let deadline = Instant::now() + READ_TIMEOUT;
    loop {
        server.pump(handler);
        if done(handler) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn ws_connect(server: &BridgeServer) -> TcpStream {
    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();

    let request = format!(
        "GET / HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        server.local_addr()
    );
    stream.write_all(request.as_bytes()).unwrap();

    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    while !reply.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        reply.push(byte[0]);
    }
    let reply = String::from_utf8(reply).unwrap();
    assert!(reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "{reply}");
    assert!(
        reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"),
        "{reply}"
    );
    stream
}

/// Read one server frame (always fin=1 and unmasked).
fn read_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut prefix = [0u8; 2];
    stream.read_exact(&mut prefix).unwrap();
    assert_eq!(prefix[0] & 0x80, 0x80, "server frames must be fin=1");
    assert_eq!(prefix[1] & 0x80, 0, "server frames must be unmasked");
    let len = match prefix[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            stream.read_exact(&mut ext).unwrap();
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            stream.read_exact(&mut ext).unwrap();
            u64::from_be_bytes(ext) as usize
        }
        n => n as usize,
    };
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();
    (prefix[0] & 0x0F, payload)
}

fn read_text(stream: &mut TcpStream) -> String {
    let (opcode, payload) = read_frame(stream);
    assert_eq!(opcode, 0x1, "expected a text frame");
    String::from_utf8(payload).unwrap()
}

/// Write a client frame, masked as clients are required to.
fn write_masked(stream: &mut TcpStream, opcode: u8, payload: &[u8]) {
    let mut frame = vec![0x80 | opcode];
    let key = [0x11u8, 0x22, 0x33, 0x44];
    if payload.len() <= 125 {
        frame.push(0x80 | payload.len() as u8);
    } else {
        frame.push(0x80 | 126);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }
    frame.extend_from_slice(&key);
    frame.extend(
        payload
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % 4]),
    );
    stream.write_all(&frame).unwrap();
}

#[test]
fn full_session() {
    let mut server = BridgeServer::listen(test_config(), demo_registry()).unwrap();
    let mut handler = RecordingHandler::default();

    let mut client = ws_connect(&server);

    // The greeting is sent from on_open, which runs inside pump.
    pump_until(&server, &mut handler, "open", |h| !h.opened.is_empty());
    assert_eq!(server.connection_count(), 1);

    let greeting = read_text(&mut client);
    let head = json::parse(&greeting)
        .and_then(|v| {
            use hostbridge_core::json::FromJson as _;
            Envelope::from_json(&v)
        })
        .unwrap();
    assert_eq!(head.kind, "Ready");
    assert!(!head.id.is_empty());
    assert!(!head.when.is_empty());
    assert_eq!(head.client_id.as_deref(), Some(handler.opened[0].as_str()));

    // A registered type goes to on_message.
    write_masked(
        &mut client,
        0x1,
        br#"{"id":"msg-1","type":"Ready"}"#,
    );
    pump_until(&server, &mut handler, "message", |h| !h.messages.is_empty());
    assert_eq!(handler.messages, ["Ready"]);

    // An unregistered type goes to on_unknown and gets a correlated Error
    // reply; the connection survives.
    write_masked(
        &mut client,
        0x1,
        br#"{"id":"msg-2","type":"Teleport","x":1,"y":2}"#,
    );
    pump_until(&server, &mut handler, "unknown", |h| !h.unknown.is_empty());
    assert_eq!(handler.unknown[0].kind, "Teleport");
    assert_eq!(handler.unknown[0].id, "msg-2");

    let reply = read_text(&mut client);
    let value = json::parse(&reply).unwrap();
    assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("Error"));
    assert_eq!(value.get("replyTo").and_then(|v| v.as_str()), Some("msg-2"));
    assert!(value
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap()
        .contains("Teleport"));
    assert_eq!(server.connection_count(), 1);

    // Ping is answered from the read thread without host involvement.
    write_masked(&mut client, 0x9, b"stamp");
    let (opcode, payload) = read_frame(&mut client);
    assert_eq!(opcode, 0xA);
    assert_eq!(payload, b"stamp");

    // Close is echoed, then the host sees the Closed event.
    let mut close_payload = 1000u16.to_be_bytes().to_vec();
    close_payload.extend_from_slice(b"done");
    write_masked(&mut client, 0x8, &close_payload);
    let (opcode, payload) = read_frame(&mut client);
    assert_eq!(opcode, 0x8);
    assert_eq!(payload, close_payload);

    pump_until(&server, &mut handler, "close", |h| !h.closed.is_empty());
    assert_eq!(handler.closed, handler.opened);
    assert_eq!(server.connection_count(), 0);

    server.shutdown();
}

#[test]
fn bad_handshake_is_dropped_without_a_reply() {
    let mut server = BridgeServer::listen(test_config(), demo_registry()).unwrap();

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    // No 101, no error payload: the socket just closes.
    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected EOF, got data");

    // The listener still accepts a well-formed client afterwards.
    let mut handler = RecordingHandler::default();
    let _client = ws_connect(&server);
    pump_until(&server, &mut handler, "open", |h| !h.opened.is_empty());
    assert_eq!(server.connection_count(), 1);

    server.shutdown();
}

#[test]
fn stalled_handshake_does_not_block_later_clients() {
    let mut server = BridgeServer::listen(test_config(), demo_registry()).unwrap();
    let mut handler = RecordingHandler::default();

    // Open a socket and stop mid-header, never sending the terminator.
    let mut stalled = TcpStream::connect(server.local_addr()).unwrap();
    stalled.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
    stalled.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap();

    // A well-formed client arriving behind it still gets through.
    let _client = ws_connect(&server);
    pump_until(&server, &mut handler, "open", |h| !h.opened.is_empty());
    assert_eq!(server.connection_count(), 1);

    // The stalled socket is cut off without a reply.
    let mut buf = [0u8; 1];
    let n = stalled.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected EOF on the stalled socket");

    server.shutdown();
}

#[test]
fn coalesced_bytes_after_the_header_do_not_fail_the_handshake() {
    let mut server = BridgeServer::listen(test_config(), demo_registry()).unwrap();
    let mut handler = RecordingHandler::default();

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();

    // Upgrade request plus a masked binary frame with non-UTF-8 payload,
    // written as one segment.
    let mut bytes = format!(
        "GET / HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        server.local_addr()
    )
    .into_bytes();
    let key = [9u8, 8, 7, 6];
    let payload = [0xFFu8, 0x00, 0xFE];
    bytes.extend_from_slice(&[0x82, 0x83]);
    bytes.extend_from_slice(&key);
    bytes.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    stream.write_all(&bytes).unwrap();

    // The 101 still arrives.
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    while !reply.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        reply.push(byte[0]);
    }
    let reply = String::from_utf8(reply).unwrap();
    assert!(reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "{reply}");

    pump_until(&server, &mut handler, "open", |h| !h.opened.is_empty());
    let _ = read_text(&mut stream);

    // The connection is fully usable afterwards.
    write_masked(&mut stream, 0x9, b"ok");
    let (opcode, payload) = read_frame(&mut stream);
    assert_eq!(opcode, 0xA);
    assert_eq!(payload, b"ok");

    server.shutdown();
}

#[test]
fn broadcast_reaches_every_client() {
    let mut server = BridgeServer::listen(test_config(), demo_registry()).unwrap();
    let mut handler = RecordingHandler::default();

    let mut a = ws_connect(&server);
    let mut b = ws_connect(&server);
    pump_until(&server, &mut handler, "opens", |h| h.opened.len() == 2);
    let _ = read_text(&mut a);
    let _ = read_text(&mut b);

    let delivered = server.broadcast(Ready::new());
    assert_eq!(delivered, 2);

    for client in [&mut a, &mut b] {
        let text = read_text(client);
        let value = json::parse(&text).unwrap();
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("Ready"));
        // Broadcasts carry no per-connection clientID.
        assert!(value.get("clientID").is_none());
    }

    server.shutdown();
}

#[test]
fn shutdown_disconnects_clients_and_rejects_new_ones() {
    let mut server = BridgeServer::listen(test_config(), demo_registry()).unwrap();
    let mut handler = RecordingHandler::default();

    let mut client = ws_connect(&server);
    pump_until(&server, &mut handler, "open", |h| !h.opened.is_empty());
    let _ = read_text(&mut client);

    let addr = server.local_addr();
    server.shutdown();
    assert_eq!(server.connection_count(), 0);

    // The client observes EOF (or a reset) rather than hanging.
    let mut buf = [0u8; 64];
    match client.read(&mut buf) {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("expected EOF after shutdown, read {n} bytes"),
    }

    // The port no longer accepts websocket sessions.
    if let Ok(mut stale) = TcpStream::connect(addr) {
        stale.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let _ = stale.write_all(b"GET / HTTP/1.1\r\n\r\n");
        let n = stale.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0, "accept loop still answering after shutdown");
    }
}
