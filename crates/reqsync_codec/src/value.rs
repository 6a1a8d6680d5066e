//! Dynamic field value type.

use crate::error::{CodecError, CodecResult};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A dynamic field value.
///
/// Used both as the dictionary projection of local entities and as the
/// scalar payload of remote record fields. Floats are intentionally not
/// supported; timestamps travel as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map keyed by field name.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Creates an empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Compares two map keys in canonical CBOR order.
    ///
    /// Text keys encode as a length header followed by the UTF-8 bytes, so
    /// the canonical order is length-first, then bytewise.
    pub fn cmp_canonical_keys(a: &str, b: &str) -> Ordering {
        match a.len().cmp(&b.len()) {
            Ordering::Equal => a.as_bytes().cmp(b.as_bytes()),
            ord => ord,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Inserts a field into a map value. Non-map values are left untouched.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Value::Map(m) = self {
            m.insert(key.into(), value.into());
        }
    }

    /// Builder-style variant of [`Value::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns a required text field.
    pub fn require_text(&self, key: &str) -> CodecResult<&str> {
        self.get(key)
            .and_then(Value::as_text)
            .ok_or_else(|| CodecError::missing_field(key))
    }

    /// Returns a required integer field.
    pub fn require_integer(&self, key: &str) -> CodecResult<i64> {
        self.get(key)
            .and_then(Value::as_integer)
            .ok_or_else(|| CodecError::missing_field(key))
    }

    /// Returns a text field, or the empty string when absent.
    pub fn text_or_default(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_string()
    }

    /// Returns a boolean field, or `default` when absent.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Returns an integer field, or `default` when absent.
    pub fn integer_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_integer).unwrap_or(default)
    }

    /// Returns an optional text field; null and absent both map to `None`.
    pub fn opt_text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_text).map(str::to_string)
    }

    /// Returns the elements of an array field, or an empty slice.
    pub fn array_or_empty(&self, key: &str) -> &[Value] {
        self.get(key).and_then(Value::as_array).unwrap_or(&[])
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().collect())
    }
}
