//! Native values exchanged between the scripting runtime and ops.
//!
//! Ops never see engine-specific value handles, only [`HostValue`]. The
//! runtime side converts its own values into this shape before a call and
//! back after it returns.

use bytes::Bytes;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;

/// Object key that marks a binary buffer in JSON form: `{"$bytes": [1, 2, 3]}`
pub const BYTES_TAG: &str = "$bytes";

/// Largest integer a runtime number represents exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A value as the scripting runtime represents it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Buffer(Bytes),
    Array(Vec<HostValue>),
    Object(BTreeMap<String, HostValue>),
}

impl HostValue {
    /// Wrap raw bytes as a buffer value
    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        Self::Buffer(bytes.into())
    }

    /// Build an object from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Runtime type name, used in argument errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Buffer(_) => "ArrayBuffer",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// `undefined` or `null`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number as an exact non-negative integer, rejecting fractions and
    /// values past the safe integer range
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
                (*n <= MAX_SAFE_INTEGER).then_some(*n as u64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, HostValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Property lookup on objects, `None` for anything else
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Convert to JSON. Buffers become `{"$bytes": [...]}`, `undefined`
    /// becomes `null`, integral numbers are written without a fraction.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Undefined | Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Buffer(b) => {
                let bytes = b.iter().map(|byte| JsonValue::from(*byte)).collect();
                let mut map = Map::new();
                map.insert(BYTES_TAG.to_string(), JsonValue::Array(bytes));
                JsonValue::Object(map)
            }
            Self::Array(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
            Self::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number((n as i64).into());
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Decode a `{"$bytes": [...]}` object, `None` if the shape does not match
fn tagged_bytes(map: &Map<String, JsonValue>) -> Option<Bytes> {
    if map.len() != 1 {
        return None;
    }
    let items = map.get(BYTES_TAG)?.as_array()?;
    items
        .iter()
        .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()
        .map(Bytes::from)
}

impl From<JsonValue> for HostValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(map) => match tagged_bytes(&map) {
                Some(bytes) => Self::Buffer(bytes),
                None => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
            },
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u64> for HostValue {
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Bytes> for HostValue {
    fn from(b: Bytes) -> Self {
        Self::Buffer(b)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Buffer(Bytes::from(b))
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}
