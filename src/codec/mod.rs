//! Typed KV value codec.
//!
//! The agent stores an opaque integer, the *flags*, next to every value.
//! This client uses the flags as a type tag: a [`CodecRegistry`] maps each
//! tag to a [`ValueCodec`] that knows how to turn a [`KvValue`] into bytes
//! and back.
//!
//! # Default registry
//!
//! | Flags | Codec | Wire form |
//! |-------|-------|-----------|
//! | `0` | raw | bytes as given |
//! | `1` | string | UTF-8 |
//! | `2` | integer | ASCII decimal |
//! | `3` | list | JSON array |
//! | `4` | mapping | JSON object |
//!
//! Values read with an unregistered flags value decode as raw bytes, so
//! entries written by other clients never fail to load. New types are added
//! by registering a codec under a new tag.
//!
//! # Transport encoding
//!
//! Plain KV writes send the encoded bytes as the request body. Transactions
//! embed values in a JSON array and use [`Encoded::to_base64`]. Reads always
//! arrive base64-encoded and go through [`KvCodec::decode`].
//!
//! # Examples
//!
//! ```
//! use consul_http::codec::{KvCodec, KvValue, RawKvEntry, FLAG_INTEGER};
//!
//! let codec = KvCodec::default();
//! let encoded = codec.encode(&KvValue::Integer(42), None).unwrap();
//! assert_eq!(encoded.flags, FLAG_INTEGER);
//!
//! let raw = RawKvEntry {
//!     key: "answer".into(),
//!     value: Some(encoded.to_base64()),
//!     flags: encoded.flags,
//!     ..Default::default()
//! };
//! let entry = codec.decode(raw).unwrap();
//! assert_eq!(entry.value, Some(KvValue::Integer(42)));
//! ```

mod value;

pub use value::{KvEntry, KvValue, RawKvEntry};

use crate::error::{ConsulError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Flags of opaque bytes.
pub const FLAG_RAW: u64 = 0;
/// Flags of UTF-8 strings.
pub const FLAG_STRING: u64 = 1;
/// Flags of integers.
pub const FLAG_INTEGER: u64 = 2;
/// Flags of JSON arrays.
pub const FLAG_LIST: u64 = 3;
/// Flags of JSON objects.
pub const FLAG_MAPPING: u64 = 4;

/// Encoder/decoder pair for one flags value.
pub trait ValueCodec: Send + Sync + fmt::Debug {
    /// Whether this codec is the natural choice for `value` when no flags
    /// are given.
    fn accepts(&self, value: &KvValue) -> bool;

    /// Serialize a value.
    fn encode(&self, value: &KvValue) -> Result<Bytes>;

    /// Deserialize a value.
    fn decode(&self, raw: &[u8]) -> Result<KvValue>;
}

fn mismatch(codec: &str, value: &KvValue) -> ConsulError {
    ConsulError::Codec(format!("{} codec cannot encode a {} value", codec, value.kind()))
}

#[derive(Debug)]
struct RawCodec;

impl ValueCodec for RawCodec {
    fn accepts(&self, value: &KvValue) -> bool {
        matches!(value, KvValue::Bytes(_))
    }

    fn encode(&self, value: &KvValue) -> Result<Bytes> {
        value
            .as_bytes()
            .map(Bytes::copy_from_slice)
            .ok_or_else(|| mismatch("raw", value))
    }

    fn decode(&self, raw: &[u8]) -> Result<KvValue> {
        Ok(KvValue::bytes(raw))
    }
}

#[derive(Debug)]
struct StringCodec;

impl ValueCodec for StringCodec {
    fn accepts(&self, value: &KvValue) -> bool {
        matches!(value, KvValue::String(_))
    }

    fn encode(&self, value: &KvValue) -> Result<Bytes> {
        match value {
            KvValue::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            other => Err(mismatch("string", other)),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<KvValue> {
        String::from_utf8(raw.to_vec())
            .map(KvValue::String)
            .map_err(|e| ConsulError::Codec(e.to_string()))
    }
}

#[derive(Debug)]
struct IntegerCodec;

impl ValueCodec for IntegerCodec {
    fn accepts(&self, value: &KvValue) -> bool {
        matches!(value, KvValue::Integer(_))
    }

    fn encode(&self, value: &KvValue) -> Result<Bytes> {
        match value {
            KvValue::Integer(n) => Ok(Bytes::from(n.to_string())),
            other => Err(mismatch("integer", other)),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<KvValue> {
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(KvValue::Integer)
            .ok_or_else(|| ConsulError::Codec("value is not an integer".to_string()))
    }
}

#[derive(Debug)]
struct ListCodec;

impl ValueCodec for ListCodec {
    fn accepts(&self, value: &KvValue) -> bool {
        matches!(value, KvValue::List(_))
    }

    fn encode(&self, value: &KvValue) -> Result<Bytes> {
        match value {
            KvValue::List(items) => Ok(Bytes::from(serde_json::to_vec(items)?)),
            other => Err(mismatch("list", other)),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<KvValue> {
        Ok(KvValue::List(serde_json::from_slice(raw)?))
    }
}

#[derive(Debug)]
struct MappingCodec;

impl ValueCodec for MappingCodec {
    fn accepts(&self, value: &KvValue) -> bool {
        matches!(value, KvValue::Mapping(_))
    }

    fn encode(&self, value: &KvValue) -> Result<Bytes> {
        match value {
            KvValue::Mapping(map) => Ok(Bytes::from(serde_json::to_vec(map)?)),
            other => Err(mismatch("mapping", other)),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<KvValue> {
        Ok(KvValue::Mapping(serde_json::from_slice(raw)?))
    }
}

/// Registry mapping flags values to codecs.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<u64, Arc<dyn ValueCodec>>,
}

impl CodecRegistry {
    /// A registry with no codecs; every value is opaque.
    pub fn empty() -> Self {
        CodecRegistry {
            codecs: BTreeMap::new(),
        }
    }

    /// Register `codec` under `flags`, replacing any previous one.
    pub fn register(mut self, flags: u64, codec: impl ValueCodec + 'static) -> Self {
        self.codecs.insert(flags, Arc::new(codec));
        self
    }

    /// Codec for `flags`.
    pub fn get(&self, flags: u64) -> Option<&Arc<dyn ValueCodec>> {
        self.codecs.get(&flags)
    }

    /// Flags to tag `value` with when the caller gives none: the lowest
    /// registered flags whose codec accepts it, else [`FLAG_RAW`].
    pub fn flags_for(&self, value: &KvValue) -> u64 {
        self.codecs
            .iter()
            .find(|(_, codec)| codec.accepts(value))
            .map(|(flags, _)| *flags)
            .unwrap_or(FLAG_RAW)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        CodecRegistry::empty()
            .register(FLAG_RAW, RawCodec)
            .register(FLAG_STRING, StringCodec)
            .register(FLAG_INTEGER, IntegerCodec)
            .register(FLAG_LIST, ListCodec)
            .register(FLAG_MAPPING, MappingCodec)
    }
}

/// A value serialized for the wire, with the flags it must be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Flags to store with the value
    pub flags: u64,
    /// Serialized value
    pub bytes: Bytes,
}

impl Encoded {
    /// Base64 text form, for values embedded in JSON.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// KV value codec backed by a [`CodecRegistry`].
#[derive(Debug, Clone, Default)]
pub struct KvCodec {
    registry: Arc<CodecRegistry>,
}

impl KvCodec {
    /// Create a codec over `registry`.
    pub fn new(registry: CodecRegistry) -> Self {
        KvCodec {
            registry: Arc::new(registry),
        }
    }

    /// The registry in use.
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Serialize `value` under `flags`, or under the flags inferred from
    /// the value when `flags` is `None`.
    ///
    /// Flags without a registered codec store bytes or strings as they are.
    pub fn encode(&self, value: &KvValue, flags: Option<u64>) -> Result<Encoded> {
        let flags = flags.unwrap_or_else(|| self.registry.flags_for(value));
        let bytes = match self.registry.get(flags) {
            Some(codec) => codec.encode(value)?,
            None => value.as_bytes().map(Bytes::copy_from_slice).ok_or_else(|| {
                ConsulError::Codec(format!(
                    "no codec registered for flags {}; a {} value cannot be stored opaquely",
                    flags,
                    value.kind()
                ))
            })?,
        };
        Ok(Encoded { flags, bytes })
    }

    /// Decode raw bytes stored under `flags`. Never fails: unknown flags and
    /// undecodable values come back as raw bytes.
    pub fn decode_value(&self, raw: &[u8], flags: u64) -> KvValue {
        match self.registry.get(flags) {
            Some(codec) => codec.decode(raw).unwrap_or_else(|e| {
                tracing::warn!(flags, "Falling back to raw bytes: {}", e);
                KvValue::bytes(raw)
            }),
            None => KvValue::bytes(raw),
        }
    }

    /// Decode an entry read from the agent.
    pub fn decode(&self, entry: RawKvEntry) -> Result<KvEntry> {
        let value = match entry.value.as_deref() {
            Some(text) => {
                let raw = STANDARD.decode(text)?;
                Some(self.decode_value(&raw, entry.flags))
            }
            None => None,
        };
        Ok(KvEntry {
            key: entry.key,
            value,
            flags: entry.flags,
            create_index: entry.create_index,
            lock_index: entry.lock_index,
            modify_index: entry.modify_index,
            session: entry.session,
        })
    }

    /// Decode every entry of a list read.
    pub fn decode_all(&self, entries: Vec<RawKvEntry>) -> Result<Vec<KvEntry>> {
        entries.into_iter().map(|e| self.decode(e)).collect()
    }
}
