//! Type-directed materialization between the token tree and typed values.
//!
//! Per-type schemas are written against [`ObjectReader`]/[`ObjectWriter`]
//! instead of runtime field introspection. Reads are tolerant (unknown keys
//! ignored, missing fields defaulted); writes omit absent optional fields so
//! the wire format can evolve additively.

use std::collections::BTreeMap;

use super::{JsonError, Value};

/// Typed value -> token tree.
pub trait ToJson {
    fn to_json(&self) -> Value;
}

/// Token tree -> typed value. Fails with `TypeMismatch` instead of coercing.
pub trait FromJson: Sized {
    fn from_json(value: &Value) -> Result<Self, JsonError>;
}

impl ToJson for bool {
    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromJson for bool {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(JsonError::mismatch("boolean", other)),
        }
    }
}

impl ToJson for String {
    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl ToJson for str {
    fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl FromJson for String {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(JsonError::mismatch("string", other)),
        }
    }
}

impl ToJson for f64 {
    fn to_json(&self) -> Value {
        Value::Number(*self)
    }
}

impl FromJson for f64 {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(JsonError::mismatch("number", other)),
        }
    }
}

impl ToJson for f32 {
    fn to_json(&self) -> Value {
        Value::Number(f64::from(*self))
    }
}

impl FromJson for f32 {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        f64::from_json(value).map(|n| n as f32)
    }
}

// Numbers arrive as f64; fixed-width targets truncate the fraction and
// range-check, failing with TypeMismatch on overflow instead of wrapping.
macro_rules! int_codec {
    ($($t:ty),* $(,)?) => {$(
        impl ToJson for $t {
            fn to_json(&self) -> Value {
                Value::Number(*self as f64)
            }
        }

        impl FromJson for $t {
            fn from_json(value: &Value) -> Result<Self, JsonError> {
                let n = match value {
                    Value::Number(n) => *n,
                    other => return Err(JsonError::mismatch(stringify!($t), other)),
                };
                if !n.is_finite() {
                    return Err(JsonError::TypeMismatch {
                        expected: stringify!($t),
                        got: format!("non-finite number {n}"),
                    });
                }
                let t = n.trunc();
                // `MAX as f64` rounds up for 64-bit targets, so the upper
                // bound is the exclusive next value, which is exact.
                if t < <$t>::MIN as f64 || t >= (<$t>::MAX as f64) + 1.0 {
                    return Err(JsonError::TypeMismatch {
                        expected: stringify!($t),
                        got: format!("out-of-range number {n}"),
                    });
                }
                Ok(t as $t)
            }
        }
    )*};
}

int_codec!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl<T: ToJson> ToJson for Option<T> {
    fn to_json(&self) -> Value {
        match self {
            Some(inner) => inner.to_json(),
            None => Value::Null,
        }
    }
}

impl<T: FromJson> FromJson for Option<T> {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_json(other).map(Some),
        }
    }
}

impl<T: ToJson> ToJson for Vec<T> {
    fn to_json(&self) -> Value {
        Value::Array(self.iter().map(ToJson::to_json).collect())
    }
}

impl<T: FromJson> FromJson for Vec<T> {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        match value {
            Value::Array(items) => items.iter().map(T::from_json).collect(),
            other => Err(JsonError::mismatch("array", other)),
        }
    }
}

impl<T: ToJson> ToJson for BTreeMap<String, T> {
    fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<T: FromJson> FromJson for BTreeMap<String, T> {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        match value {
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), T::from_json(v)?)))
                .collect(),
            other => Err(JsonError::mismatch("object", other)),
        }
    }
}

/// Declare `ToJson`/`FromJson` for a unit-variant enum. Wire values are the
/// variant names; decoding matches case-insensitively.
#[macro_export]
macro_rules! json_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::json::ToJson for $name {
            fn to_json(&self) -> $crate::json::Value {
                match self {
                    $(Self::$variant => {
                        $crate::json::Value::String(stringify!($variant).to_string())
                    })+
                }
            }
        }

        impl $crate::json::FromJson for $name {
            fn from_json(
                value: &$crate::json::Value,
            ) -> std::result::Result<Self, $crate::json::JsonError> {
                let s = match value {
                    $crate::json::Value::String(s) => s,
                    other => {
                        return Err($crate::json::JsonError::TypeMismatch {
                            expected: stringify!($name),
                            got: other.kind().to_string(),
                        })
                    }
                };
                $(if s.eq_ignore_ascii_case(stringify!($variant)) {
                    return Ok(Self::$variant);
                })+
                Err($crate::json::JsonError::TypeMismatch {
                    expected: stringify!($name),
                    got: format!("unknown member {s:?}"),
                })
            }
        }
    };
}

/// Incrementally build an object token, omitting absent optional fields.
#[derive(Default)]
pub struct ObjectWriter {
    entries: Vec<(String, Value)>,
}

impl ObjectWriter {
    pub fn new() -> ObjectWriter {
        ObjectWriter::default()
    }

    /// Always-emitted field.
    pub fn field<T: ToJson + ?Sized>(&mut self, key: &str, value: &T) {
        self.entries.push((key.to_string(), value.to_json()));
    }

    /// Optional field: `None` leaves the key out of the object entirely.
    pub fn optional<T: ToJson>(&mut self, key: &str, value: &Option<T>) {
        if let Some(inner) = value {
            self.entries.push((key.to_string(), inner.to_json()));
        }
    }

    pub fn finish(self) -> Value {
        Value::Object(self.entries)
    }
}

/// Read fields out of an object token with tolerant semantics.
#[derive(Debug)]
pub struct ObjectReader<'a> {
    entries: &'a [(String, Value)],
}

impl<'a> ObjectReader<'a> {
    /// Requires an object token.
    pub fn new(value: &'a Value) -> Result<ObjectReader<'a>, JsonError> {
        match value {
            Value::Object(entries) => Ok(ObjectReader { entries }),
            other => Err(JsonError::mismatch("object", other)),
        }
    }

    fn lookup(&self, key: &str) -> Option<&'a Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Field with default: a missing key yields `T::default()`; a present
    /// key must materialize (tolerant reads, but never silent coercion).
    pub fn field<T: FromJson + Default>(&self, key: &str) -> Result<T, JsonError> {
        match self.lookup(key) {
            Some(v) => T::from_json(v),
            None => Ok(T::default()),
        }
    }

    /// Optional field: missing key or explicit null both yield `None`.
    pub fn optional<T: FromJson>(&self, key: &str) -> Result<Option<T>, JsonError> {
        match self.lookup(key) {
            Some(Value::Null) | None => Ok(None),
            Some(v) => T::from_json(v).map(Some),
        }
    }
}
