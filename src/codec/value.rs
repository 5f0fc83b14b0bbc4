//! KV values and entries.

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed KV value. The variant is remembered on the server through the
/// entry's flags.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    /// Opaque bytes
    Bytes(Bytes),
    /// UTF-8 text
    String(String),
    /// Signed integer
    Integer(i64),
    /// JSON array
    List(Vec<Value>),
    /// JSON object
    Mapping(Map<String, Value>),
}

impl KvValue {
    /// Opaque bytes from anything byte-like.
    pub fn bytes(data: impl AsRef<[u8]>) -> Self {
        KvValue::Bytes(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            KvValue::Bytes(_) => "bytes",
            KvValue::String(_) => "string",
            KvValue::Integer(_) => "integer",
            KvValue::List(_) => "list",
            KvValue::Mapping(_) => "mapping",
        }
    }

    /// Raw bytes of a `Bytes` or `String` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            KvValue::Bytes(b) => Some(b),
            KvValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// The text of a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KvValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number of an `Integer` value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KvValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<Bytes> for KvValue {
    fn from(value: Bytes) -> Self {
        KvValue::Bytes(value)
    }
}

impl From<Vec<u8>> for KvValue {
    fn from(value: Vec<u8>) -> Self {
        KvValue::Bytes(Bytes::from(value))
    }
}

impl From<&str> for KvValue {
    fn from(value: &str) -> Self {
        KvValue::String(value.to_string())
    }
}

impl From<String> for KvValue {
    fn from(value: String) -> Self {
        KvValue::String(value)
    }
}

impl From<i64> for KvValue {
    fn from(value: i64) -> Self {
        KvValue::Integer(value)
    }
}

impl From<Vec<Value>> for KvValue {
    fn from(value: Vec<Value>) -> Self {
        KvValue::List(value)
    }
}

impl From<Map<String, Value>> for KvValue {
    fn from(value: Map<String, Value>) -> Self {
        KvValue::Mapping(value)
    }
}

/// A KV entry as the agent sends it, value still base64-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawKvEntry {
    /// Full key path
    pub key: String,
    /// Base64 value; `None` for keys without a value
    #[serde(default)]
    pub value: Option<String>,
    /// Opaque client flags
    #[serde(default)]
    pub flags: u64,
    /// Index of the write that created the key
    #[serde(default)]
    pub create_index: u64,
    /// Number of times the key was acquired as a lock
    #[serde(default)]
    pub lock_index: u64,
    /// Index of the last write to the key
    #[serde(default)]
    pub modify_index: u64,
    /// Session holding the lock, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl RawKvEntry {
    /// Parse the `[{...}]` array returned by KV reads.
    pub fn list_from_value(value: Value) -> Result<Vec<RawKvEntry>> {
        match value {
            Value::Null => Ok(Vec::new()),
            other => Ok(serde_json::from_value(other)?),
        }
    }
}

/// A decoded KV entry with the metadata needed for check-and-set writes.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    /// Full key path
    pub key: String,
    /// Decoded value
    pub value: Option<KvValue>,
    /// Opaque client flags the value was decoded with
    pub flags: u64,
    /// Index of the write that created the key
    pub create_index: u64,
    /// Number of times the key was acquired as a lock
    pub lock_index: u64,
    /// Index of the last write to the key
    pub modify_index: u64,
    /// Session holding the lock, if any
    pub session: Option<String>,
}
