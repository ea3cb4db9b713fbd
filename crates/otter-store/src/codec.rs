//! Conversion between runtime values and engine byte strings.
//!
//! Keys, values and range bounds cross the boundary as either strings
//! (encoded as UTF-8) or `ArrayBuffer`s (copied verbatim). Going back, the
//! caller picks [`Encoding::Buffer`] or [`Encoding::Utf8`]. A missing entry
//! becomes `undefined`, which never collides with an empty buffer or string.

use crate::error::{KvError, KvResult};
use bytes::Bytes;
use otter_host::HostValue;
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Immutable byte string used for every key and value
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteView(Bytes);

impl ByteView {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// UTF-8 view, replacing invalid sequences
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl Deref for ByteView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for ByteView {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self::copy_from_slice(bytes)
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl From<String> for ByteView {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "ByteView({s:?})"),
            Err(_) => write!(f, "ByteView({:?})", self.0.as_ref()),
        }
    }
}

/// How a byte string is handed back to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Buffer,
    Utf8,
}

/// Decode a key or value argument. `what` names the argument in errors.
pub fn decode(value: &HostValue, what: &str) -> KvResult<ByteView> {
    match value {
        HostValue::String(s) => Ok(ByteView::from(s.as_str())),
        HostValue::Buffer(b) => Ok(ByteView::new(b.clone())),
        other => Err(KvError::invalid_argument(format!(
            "{what} must be a string or ArrayBuffer, got {}",
            other.type_name()
        ))),
    }
}

/// Decode an optional range bound: `undefined` and `null` mean open-ended.
pub fn decode_bound(value: Option<&HostValue>, what: &str) -> KvResult<Option<ByteView>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_nullish() => Ok(None),
        Some(v) => decode(v, what).map(Some),
    }
}

pub fn encode(view: &ByteView, encoding: Encoding) -> HostValue {
    match encoding {
        Encoding::Buffer => HostValue::Buffer(view.0.clone()),
        Encoding::Utf8 => HostValue::String(view.to_string_lossy()),
    }
}

/// Encode a point lookup result, `None` becomes `undefined`
pub fn encode_lookup(found: Option<ByteView>, encoding: Encoding) -> HostValue {
    match found {
        Some(view) => encode(&view, encoding),
        None => HostValue::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_decode_string_is_utf8() {
        let view = decode(&HostValue::from("héllo"), "key").unwrap();
        assert_eq!(view.as_bytes(), "héllo".as_bytes());
    }

    #[test]
    fn test_decode_buffer_is_verbatim() {
        let raw = vec![0u8, 159, 146, 150];
        let view = decode(&HostValue::buffer(raw.clone()), "value").unwrap();
        assert_eq!(view.as_bytes(), raw.as_slice());
    }

    #[test]
    fn test_decode_rejects_other_types() {
        let err = decode(&HostValue::Number(1.0), "key").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "key must be a string or ArrayBuffer, got number");

        assert!(decode(&HostValue::Undefined, "key").is_err());
    }

    #[test]
    fn test_decode_bound() {
        assert_eq!(decode_bound(None, "lowerBound").unwrap(), None);
        assert_eq!(decode_bound(Some(&HostValue::Null), "lowerBound").unwrap(), None);
        assert_eq!(
            decode_bound(Some(&HostValue::from("")), "lowerBound").unwrap(),
            Some(ByteView::default())
        );
        assert!(decode_bound(Some(&HostValue::Bool(true)), "lowerBound").is_err());
    }

    #[test]
    fn test_lookup_absent_differs_from_empty() {
        assert_eq!(encode_lookup(None, Encoding::Buffer), HostValue::Undefined);
        assert_eq!(
            encode_lookup(Some(ByteView::default()), Encoding::Buffer),
            HostValue::buffer(Vec::<u8>::new())
        );
        assert_eq!(
            encode_lookup(Some(ByteView::default()), Encoding::Utf8),
            HostValue::from("")
        );
    }

    #[test]
    fn test_utf8_encoding_is_lossy() {
        let view = ByteView::from(vec![b'a', 0xff]);
        assert_eq!(encode(&view, Encoding::Utf8), HostValue::from("a\u{fffd}"));
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let mut keys = vec![
            ByteView::from("b"),
            ByteView::from(vec![0xffu8]),
            ByteView::from("a"),
            ByteView::from("ab"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ByteView::from("a"),
                ByteView::from("ab"),
                ByteView::from("b"),
                ByteView::from(vec![0xffu8]),
            ]
        );
    }
}
