//! Generic JSON codec: token tree, recursive-descent parser, writer, and the
//! type-directed `FromJson`/`ToJson` traits.
//!
//! The token tree has no awareness of target application types; the traits in
//! [`codec`] map it to and from typed values. This replaces the reflection
//! layer a dynamic runtime would use with explicit, auditable per-type
//! schemas.

mod codec;
mod parser;
mod writer;

pub use codec::{FromJson, ObjectReader, ObjectWriter, ToJson};
pub use parser::parse;
pub use writer::write;

use thiserror::Error;

/// Intermediate JSON representation.
///
/// Objects preserve key order; numbers are always double precision, matching
/// the wire format. Narrowing into fixed-width targets happens in the codec
/// layer and fails loudly on overflow.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Name of the token kind, used in `TypeMismatch` diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Look up an object entry by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// JSON codec failure, surfaced to callers as a typed error — malformed
/// input is never silently coerced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonError {
    /// Malformed JSON text. `at` is a byte offset into the input.
    #[error("syntax error at byte {at}: {msg}")]
    Syntax { at: usize, msg: String },

    /// The token tree does not fit the requested target type.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: String },
}

impl JsonError {
    pub(crate) fn mismatch(expected: &'static str, got: &Value) -> JsonError {
        JsonError::TypeMismatch {
            expected,
            got: got.kind().to_string(),
        }
    }
}
