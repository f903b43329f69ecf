//! Built-in demo catalogue: the smallest useful collaborator layer.
//!
//! `Ready` greets every new connection and `Error` answers envelopes with an
//! unregistered `type` tag. Real hosts register their own catalogue and
//! handler; these two variants double as the reference implementation of the
//! [`Message`] trait and as fixtures for the integration tests.

use std::any::Any;

use hostbridge_core::envelope::{Envelope, Message, VariantRegistry};
use hostbridge_core::json::{FromJson, JsonError, ObjectReader, ObjectWriter, ToJson, Value};

use crate::connection::ConnectionId;
use crate::server::{BridgeHandler, BridgeServer};

/// Sent to a client as soon as its connection opens.
#[derive(Debug, Default)]
pub struct Ready {
    pub head: Envelope,
}

impl Ready {
    pub fn new() -> Ready {
        Ready::default()
    }
}

impl ToJson for Ready {
    fn to_json(&self) -> Value {
        let mut w = ObjectWriter::new();
        self.head.write_fields(&mut w);
        w.finish()
    }
}

impl FromJson for Ready {
    fn from_json(value: &Value) -> Result<Ready, JsonError> {
        Ok(Ready {
            head: Envelope::from_json(value)?,
        })
    }
}

impl Message for Ready {
    fn envelope(&self) -> &Envelope {
        &self.head
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.head
    }

    fn kind(&self) -> &'static str {
        "Ready"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Error reply carrying a human-readable description.
#[derive(Debug, Default)]
pub struct ErrorReply {
    pub head: Envelope,
    pub error: String,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> ErrorReply {
        ErrorReply {
            head: Envelope::default(),
            error: error.into(),
        }
    }
}

impl ToJson for ErrorReply {
    fn to_json(&self) -> Value {
        let mut w = ObjectWriter::new();
        self.head.write_fields(&mut w);
        w.field("error", &self.error);
        w.finish()
    }
}

impl FromJson for ErrorReply {
    fn from_json(value: &Value) -> Result<ErrorReply, JsonError> {
        let r = ObjectReader::new(value)?;
        Ok(ErrorReply {
            head: Envelope::from_json(value)?,
            error: r.field("error")?,
        })
    }
}

impl Message for ErrorReply {
    fn envelope(&self) -> &Envelope {
        &self.head
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.head
    }

    fn kind(&self) -> &'static str {
        "Error"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry holding the demo catalogue.
pub fn demo_registry() -> VariantRegistry {
    let mut variants = VariantRegistry::new();
    variants.register::<Ready>("Ready");
    variants.register::<ErrorReply>("Error");
    variants
}

/// Demo handler: greet on open, answer unknown types with an `Error` reply
/// correlated via `replyTo`.
pub struct EchoHandler;

impl BridgeHandler for EchoHandler {
    fn on_open(&mut self, server: &BridgeServer, connection: &ConnectionId) {
        tracing::info!(connection = %connection, "connection opened");
        if let Err(e) = server.send(Ready::new(), connection, None) {
            tracing::warn!(connection = %connection, error = %e, "ready send failed");
        }
    }

    fn on_close(&mut self, _server: &BridgeServer, connection: &ConnectionId) {
        tracing::info!(connection = %connection, "connection closed");
    }

    fn on_message(&mut self, _server: &BridgeServer, message: Box<dyn Message>) {
        let head = message.envelope();
        tracing::info!(
            id = %head.id,
            kind = message.kind(),
            client = head.client_id.as_deref().unwrap_or(""),
            "message received"
        );
    }

    fn on_unknown(&mut self, server: &BridgeServer, envelope: Envelope) {
        let Some(client) = envelope.client_id.as_deref() else {
            return;
        };
        let reply = ErrorReply::new(format!("unrecognized message type {:?}", envelope.kind));
        let connection = ConnectionId::from(client);
        if let Err(e) = server.send(reply, &connection, Some(&envelope.id)) {
            tracing::warn!(connection = %connection, error = %e, "error reply failed");
        }
    }
}
