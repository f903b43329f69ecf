//! Typed message envelope and variant resolution.
//!
//! Every application message travels inside an [`Envelope`]: correlation id,
//! UTC timestamp, sender connection id (inbound only), reply-to id, and the
//! `type` tag naming the concrete variant. The [`VariantRegistry`] is an
//! explicit startup-populated table from tag to decoder; unknown tags are a
//! first-class outcome, never an error.

use std::any::Any;
use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::json::{self, FromJson, JsonError, ObjectReader, ObjectWriter, ToJson, Value};

/// Freshly generated globally-unique message id.
pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time, ISO-8601.
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Correlation metadata wrapped around every application message.
///
/// Wire shape: `{"id","when","clientID","replyTo","type"}` with `clientID`
/// and `replyTo` omitted entirely when absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub id: String,
    pub when: String,
    pub client_id: Option<String>,
    pub reply_to: Option<String>,
    /// Type tag naming the concrete variant (`type` on the wire).
    pub kind: String,
}

impl Envelope {
    /// Inbound stamping: generate id/when only if the peer left them empty,
    /// and record which connection delivered the message.
    pub fn populate_on_receive(&mut self, client_id: &str) {
        if self.id.is_empty() {
            self.id = fresh_id();
        }
        if self.when.is_empty() {
            self.when = utc_now();
        }
        self.client_id = Some(client_id.to_string());
    }

    /// Outbound stamping: identity is always fresh, even when the value was
    /// built by copying an inbound envelope.
    pub fn populate_on_send(
        &mut self,
        client_id: Option<&str>,
        reply_to: Option<&str>,
        kind: &str,
    ) {
        self.id = fresh_id();
        self.when = utc_now();
        self.client_id = client_id.map(str::to_string);
        self.reply_to = reply_to.map(str::to_string);
        self.kind = kind.to_string();
    }

    /// Append the envelope fields to an in-progress object. Variants call
    /// this first so their own fields follow the envelope's on the wire.
    pub fn write_fields(&self, w: &mut ObjectWriter) {
        w.field("id", &self.id);
        w.field("when", &self.when);
        w.optional("clientID", &self.client_id);
        w.optional("replyTo", &self.reply_to);
        w.field("type", &self.kind);
    }
}

impl ToJson for Envelope {
    fn to_json(&self) -> Value {
        let mut w = ObjectWriter::new();
        self.write_fields(&mut w);
        w.finish()
    }
}

impl FromJson for Envelope {
    fn from_json(value: &Value) -> Result<Envelope, JsonError> {
        let r = ObjectReader::new(value)?;
        Ok(Envelope {
            id: r.field("id")?,
            when: r.field("when")?,
            client_id: r.optional("clientID")?,
            reply_to: r.optional("replyTo")?,
            kind: r.field("type")?,
        })
    }
}

/// A registered message variant: envelope access plus a JSON schema.
///
/// The concrete catalogue lives in the collaborator layer; the core only
/// needs the envelope and the tag.
pub trait Message: ToJson + Send {
    fn envelope(&self) -> &Envelope;
    fn envelope_mut(&mut self) -> &mut Envelope;
    /// Type tag written into `type` on send.
    fn kind(&self) -> &'static str;
    /// Downcast hook for handlers that match on concrete variants.
    fn as_any(&self) -> &dyn Any;
}

/// Outcome of resolving one inbound text payload.
pub enum Inbound {
    /// The `type` tag matched a registered variant.
    Known(Box<dyn Message>),
    /// Unregistered tag: the generic envelope is handed to the fallback
    /// path. Dropping the message silently would break correlation.
    Unknown(Envelope),
}

type DecodeFn = fn(&Value) -> Result<Box<dyn Message>, JsonError>;

/// Closed table mapping `type` tags to variant decoders, populated once at
/// startup. Replaces scanning loaded types by name at runtime.
#[derive(Default)]
pub struct VariantRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl VariantRegistry {
    pub fn new() -> VariantRegistry {
        VariantRegistry::default()
    }

    /// Register a variant under its tag. Later registrations win, which
    /// lets tests shadow a built-in variant.
    pub fn register<M>(&mut self, kind: &str)
    where
        M: Message + FromJson + 'static,
    {
        fn decode<M: Message + FromJson + 'static>(
            value: &Value,
        ) -> Result<Box<dyn Message>, JsonError> {
            Ok(Box::new(M::from_json(value)?))
        }
        self.decoders.insert(kind.to_string(), decode::<M>);
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Decode the generic envelope to read the tag, then re-decode the full
    /// payload as the registered variant. Unknown tags resolve to
    /// [`Inbound::Unknown`]; only malformed JSON or a schema mismatch on a
    /// *known* variant is an error.
    pub fn resolve(&self, text: &str) -> Result<Inbound, JsonError> {
        let value = json::parse(text)?;
        let head = Envelope::from_json(&value)?;
        match self.decoders.get(&head.kind) {
            Some(decode) => Ok(Inbound::Known(decode(&value)?)),
            None => Ok(Inbound::Unknown(head)),
        }
    }
}
