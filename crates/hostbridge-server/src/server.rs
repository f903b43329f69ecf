//! The embeddable bridge server.
//!
//! Thread model: one accept thread performing handshakes synchronously, one
//! read thread per established connection, and the host's own thread which
//! drives [`BridgeServer::pump`] and owns all `send`/`broadcast` calls.
//! Queued events cross into host-thread execution only inside `pump`; no
//! other component invokes handler callbacks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hostbridge_core::envelope::{Envelope, Inbound, Message, VariantRegistry};
use hostbridge_core::error::{BridgeError, Result};
use hostbridge_core::json;

use crate::config::BridgeConfig;
use crate::connection::{Connection, ConnectionId};
use crate::queue::{EventProducer, EventQueue, SocketEvent};
use crate::registry::ConnectionRegistry;

/// Host-side callbacks, invoked synchronously from `pump` in dequeue order.
pub trait BridgeHandler {
    fn on_open(&mut self, server: &BridgeServer, connection: &ConnectionId) {
        let _ = (server, connection);
    }

    fn on_close(&mut self, server: &BridgeServer, connection: &ConnectionId) {
        let _ = (server, connection);
    }

    /// One inbound application message, concrete-type resolution already
    /// performed and the envelope stamped.
    fn on_message(&mut self, server: &BridgeServer, message: Box<dyn Message>);

    /// Fallback for envelopes whose `type` tag is not registered. Reaching
    /// this path is not an error and must not drop the connection.
    fn on_unknown(&mut self, server: &BridgeServer, envelope: Envelope) {
        let _ = server;
        tracing::debug!(kind = %envelope.kind, "unhandled message with unregistered type");
    }

    /// Raw binary frame payload. The envelope protocol is text-only, so the
    /// default just records it.
    fn on_binary(&mut self, server: &BridgeServer, connection: &ConnectionId, data: Vec<u8>) {
        let _ = server;
        tracing::debug!(connection = %connection, bytes = data.len(), "unhandled binary message");
    }
}

pub struct BridgeServer {
    registry: Arc<ConnectionRegistry>,
    events: EventQueue,
    variants: VariantRegistry,
    stop: Arc<AtomicBool>,
    local_addr: SocketAddr,
    accept_handle: Option<JoinHandle<()>>,
}

impl BridgeServer {
    /// Bind and start accepting. Handshakes run synchronously inside the
    /// accept loop, which serializes connection setup; acceptable for the
    /// small, local client population this serves.
    pub fn listen(config: BridgeConfig, variants: VariantRegistry) -> Result<BridgeServer> {
        config.validate()?;
        let listener = TcpListener::bind((config.address.as_str(), config.port))?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(ConnectionRegistry::new());
        let events = EventQueue::with_capacity(config.queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let registry = Arc::clone(&registry);
            let producer = events.producer();
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("hostbridge-accept".into())
                .spawn(move || accept_loop(listener, config, registry, producer, stop))?
        };

        tracing::info!(%local_addr, "bridge listening for incoming connections");
        Ok(BridgeServer {
            registry,
            events,
            variants,
            stop,
            local_addr,
            accept_handle: Some(handle),
        })
    }

    /// Actual bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Drain the event queue fully, dispatching to the handler in dequeue
    /// order. The host calls this once per tick and it never blocks.
    pub fn pump(&self, handler: &mut dyn BridgeHandler) {
        while let Some(event) = self.events.try_next() {
            match event {
                SocketEvent::Opened(id) => handler.on_open(self, &id),
                SocketEvent::Closed(id) => {
                    self.registry.remove(&id);
                    handler.on_close(self, &id);
                }
                SocketEvent::Message {
                    connection,
                    event_id,
                    text,
                    data,
                } => {
                    if let Some(text) = text {
                        self.dispatch_text(handler, &connection, &event_id, &text);
                    } else if let Some(data) = data {
                        handler.on_binary(self, &connection, data);
                    }
                }
            }
        }
    }

    fn dispatch_text(
        &self,
        handler: &mut dyn BridgeHandler,
        connection: &ConnectionId,
        event_id: &str,
        text: &str,
    ) {
        match self.variants.resolve(text) {
            Ok(Inbound::Known(mut message)) => {
                message.envelope_mut().populate_on_receive(connection.as_str());
                handler.on_message(self, message);
            }
            Ok(Inbound::Unknown(mut envelope)) => {
                envelope.populate_on_receive(connection.as_str());
                tracing::debug!(
                    connection = %connection,
                    id = %envelope.id,
                    kind = %envelope.kind,
                    "unrecognized message type; routing to fallback"
                );
                handler.on_unknown(self, envelope);
            }
            Err(e) => {
                // Surfaced, never silently coerced; the connection stays up.
                tracing::warn!(
                    connection = %connection,
                    event = %event_id,
                    error = %e,
                    "failed to decode inbound message"
                );
            }
        }
    }

    /// Stamp, serialize, and write one message to one connection.
    pub fn send<M: Message>(
        &self,
        mut message: M,
        connection: &ConnectionId,
        reply_to: Option<&str>,
    ) -> Result<()> {
        let kind = message.kind();
        message
            .envelope_mut()
            .populate_on_send(Some(connection.as_str()), reply_to, kind);
        let text = json::write(&message.to_json());
        let conn = self
            .registry
            .get(connection)
            .ok_or_else(|| BridgeError::UnknownConnection(connection.to_string()))?;
        tracing::debug!(connection = %connection, id = %message.envelope().id, kind, "sending message");
        conn.send_text(&text)
    }

    /// Stamp and serialize once, then write to every live connection.
    /// Per-connection failures are logged and skipped. Returns the number of
    /// connections written.
    pub fn broadcast<M: Message>(&self, mut message: M) -> usize {
        let kind = message.kind();
        message.envelope_mut().populate_on_send(None, None, kind);
        let text = json::write(&message.to_json());

        self.registry.prune_dead();
        let mut delivered = 0;
        for conn in self.registry.live_connections() {
            match conn.send_text(&text) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection = %conn.id(),
                        id = %message.envelope().id,
                        error = %e,
                        "broadcast write failed; skipping connection"
                    );
                }
            }
        }
        tracing::debug!(id = %message.envelope().id, kind, delivered, "broadcast");
        delivered
    }

    /// Cooperative teardown: flag every loop to stop, shut the sockets down
    /// to unblock their reads, wake the accept loop, and join it. Threads
    /// are never terminated forcibly.
    pub fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("bridge shutting down");
        for conn in self.registry.all_connections() {
            conn.close();
        }
        // The accept thread is blocked in accept(); a throwaway local
        // connection wakes it so it can observe the stop flag.
        let mut wake = self.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        let _ = TcpStream::connect(wake);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        self.registry.clear();
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: TcpListener,
    config: BridgeConfig,
    registry: Arc<ConnectionRegistry>,
    events: EventProducer,
    stop: Arc<AtomicBool>,
) {
    for incoming in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        match Connection::establish(stream, config.max_header_bytes) {
            Ok((conn, reader)) => {
                // Register before the Opened event so the host can reply to
                // it immediately; spawn the reader last so no Message can
                // ever precede its Opened.
                registry.insert(Arc::clone(&conn));
                if events.push(SocketEvent::Opened(conn.id().clone())).is_err() {
                    break;
                }
                if let Err(e) = conn.spawn_read_loop(reader, events.clone(), config.max_frame_bytes)
                {
                    tracing::warn!(connection = %conn.id(), error = %e, "failed to start read loop");
                    conn.close();
                    registry.remove(conn.id());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), "handshake failed; dropping socket");
            }
        }
    }
    tracing::debug!("accept loop stopped");
}
