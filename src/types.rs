//! Core types shared by the request pipeline and the endpoint wrappers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Request`] | Outgoing call, mutated by each pipeline stage |
//! | [`Response`] | Raw agent answer with decoded body |
//! | [`ParamValue`] | A query parameter value before normalization |
//! | [`ConsistencyMode`] | Read consistency policy |
//! | [`Blocking`] | "Wait for a change since index X" |
//! | [`ModifyIndex`] | An index taken from a previous response |
//! | [`Identifier`] | A raw id or an object carrying one |
//! | [`ConsulValue`] | A decoded value paired with its response metadata |

use crate::codec::KvEntry;
use crate::error::{ConsulError, Result};
use crate::protocol::meta::ResponseMeta;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Uppercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query parameter value.
///
/// `Null` entries are dropped and `Bool` entries are rendered as the
/// configured tokens before a request leaves the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Not set; never transmitted
    Null,
    /// Boolean flag
    Bool(bool),
    /// Unsigned integer (indexes, flags)
    Int(u64),
    /// Plain string
    Str(String),
}

impl ParamValue {
    /// A presence flag: `true` sends the flag, `false` omits it.
    ///
    /// The agent tests flags such as `recurse` or `keys` for presence, so a
    /// literal `false` would still switch them on.
    pub fn flag(on: bool) -> Self {
        if on {
            ParamValue::Bool(true)
        } else {
            ParamValue::Null
        }
    }

    /// Check if the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Interpret the value as a boolean flag.
    pub fn is_truthy(&self) -> bool {
        match self {
            ParamValue::Null => false,
            ParamValue::Bool(b) => *b,
            ParamValue::Int(n) => *n != 0,
            ParamValue::Str(s) => s == "true" || s == "1",
        }
    }

    /// Wire rendering of a non-boolean value; `None` for `Null`.
    pub fn render(&self) -> Option<String> {
        match self {
            ParamValue::Null => None,
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::Int(n) => Some(n.to_string()),
            ParamValue::Str(s) => Some(s.clone()),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Str(value.clone())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Query parameters of a request.
pub type Params = BTreeMap<String, ParamValue>;

/// Collapse repeated slashes and force a single leading slash.
pub fn flatten_path(path: &str) -> String {
    let mut flat = String::with_capacity(path.len() + 1);
    flat.push('/');
    for ch in path.chars() {
        if ch == '/' && flat.ends_with('/') {
            continue;
        }
        flat.push(ch);
    }
    flat
}

/// An outgoing request travelling through the pipeline.
///
/// `json`, `watch` and `consistency` are call options consumed by the
/// pipeline stages; they never reach the transport directly.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute API path, e.g. `/v1/kv/foo`
    pub path: String,
    /// Query parameters
    pub params: Params,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Raw request body
    pub body: Option<Bytes>,
    /// JSON body, encoded by the body stage
    pub json: Option<Value>,
    /// Blocking query to perform
    pub watch: Option<Blocking>,
    /// Explicit per-call consistency
    pub consistency: Option<ConsistencyMode>,
}

impl Request {
    /// Create a request for `path`.
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        Request {
            method,
            path: flatten_path(path.as_ref()),
            params: Params::new(),
            headers: BTreeMap::new(),
            body: None,
            json: None,
            watch: None,
            consistency: None,
        }
    }

    /// GET request.
    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(Method::Get, path)
    }

    /// PUT request.
    pub fn put(path: impl AsRef<str>) -> Self {
        Self::new(Method::Put, path)
    }

    /// POST request.
    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(Method::Post, path)
    }

    /// DELETE request.
    pub fn delete(path: impl AsRef<str>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Set a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body.
    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    /// Make this a blocking query.
    pub fn with_watch(mut self, watch: Option<Blocking>) -> Self {
        self.watch = watch;
        self
    }

    /// Force a consistency mode for this call.
    pub fn with_consistency(mut self, consistency: Option<ConsistencyMode>) -> Self {
        self.consistency = consistency;
        self
    }

    /// Look up a query parameter.
    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No body
    Empty,
    /// `application/json` body
    Json(Value),
    /// Any other content type
    Bytes(Bytes),
}

impl Body {
    /// The JSON value, if the body was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The raw bytes, if the body was not JSON.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Check for a JSON `true`, the agent's answer to most writes.
    pub fn is_true(&self) -> bool {
        matches!(self, Body::Json(Value::Bool(true)))
    }

    /// The body as a JSON value; raw bytes become a lossy string.
    pub fn to_value(&self) -> Value {
        match self {
            Body::Empty => Value::Null,
            Body::Json(value) => value.clone(),
            Body::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// A response from the agent.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,
    /// Decoded body
    pub body: Body,
    /// Method of the originating request
    pub method: Method,
    /// Path of the originating request
    pub path: String,
}

impl Response {
    /// Extract the Consul metadata headers.
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta::from_headers(&self.headers)
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.to_value())?)
    }
}

/// Consistency mode of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// Leader-routed read, may be stale by a tiny window
    #[default]
    Default,
    /// Leader verifies it is still leader before answering
    Consistent,
    /// Any server may answer
    Stale,
}

impl ConsistencyMode {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyMode::Default => "default",
            ConsistencyMode::Consistent => "consistent",
            ConsistencyMode::Stale => "stale",
        }
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyMode {
    type Err = ConsulError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ConsistencyMode::Default),
            "consistent" => Ok(ConsistencyMode::Consistent),
            "stale" => Ok(ConsistencyMode::Stale),
            other => Err(ConsulError::InvalidOperation(format!(
                "unknown consistency mode: {}",
                other
            ))),
        }
    }
}

/// A Raft index observed on a previous response.
///
/// Build it from a [`KvEntry`], from [`ResponseMeta::last_index`], or from a
/// JSON object's `ModifyIndex`/`Index` field. The literal `0` is meaningful
/// for check-and-set writes ("only if the key does not exist").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModifyIndex(u64);

impl ModifyIndex {
    /// The raw index.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Read `ModifyIndex`, falling back to `Index`, from a JSON object.
    pub fn from_value(value: &Value) -> Option<Self> {
        ["ModifyIndex", "Index"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_u64))
            .map(ModifyIndex)
    }

    /// The `last_index` of a response.
    pub fn from_meta(meta: &ResponseMeta) -> Option<Self> {
        meta.last_index.map(ModifyIndex)
    }
}

impl From<u64> for ModifyIndex {
    fn from(index: u64) -> Self {
        ModifyIndex(index)
    }
}

impl From<&KvEntry> for ModifyIndex {
    fn from(entry: &KvEntry) -> Self {
        ModifyIndex(entry.modify_index)
    }
}

/// A blocking query: wait until the resource index moves past `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocking {
    index: u64,
    wait: Option<Duration>,
}

impl Blocking {
    /// Block until the index moves past `index`.
    pub fn since(index: impl Into<ModifyIndex>) -> Self {
        Blocking {
            index: index.into().get(),
            wait: None,
        }
    }

    /// Block on the index reported by a previous response.
    pub fn from_meta(meta: &ResponseMeta) -> Option<Self> {
        ModifyIndex::from_meta(meta).map(Self::since)
    }

    /// Block on the modify index of a KV entry.
    pub fn from_entry(entry: &KvEntry) -> Self {
        Self::since(entry)
    }

    /// Bound the server-side wait.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Index to wait past.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Requested wait, if any.
    pub fn wait(&self) -> Option<Duration> {
        self.wait
    }
}

/// An identifier given either directly or through the object it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Read the `ID` field of a JSON object, or take a JSON string as is.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(id) => Ok(Identifier(id.clone())),
            Value::Object(map) => map
                .get("ID")
                .and_then(Value::as_str)
                .map(|id| Identifier(id.to_string()))
                .ok_or_else(|| ConsulError::InvalidOperation(format!("no ID in {}", value))),
            other => Err(ConsulError::InvalidOperation(format!(
                "cannot take an identifier from {}",
                other
            ))),
        }
    }

    /// The resolved id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Identifier(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Identifier(id)
    }
}

impl From<&String> for Identifier {
    fn from(id: &String) -> Self {
        Identifier(id.clone())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded value together with the metadata of the response it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsulValue<T> {
    /// Decoded value
    pub value: T,
    /// Response metadata
    pub meta: ResponseMeta,
}

impl<T> ConsulValue<T> {
    /// Pair a value with its metadata.
    pub fn new(value: T, meta: ResponseMeta) -> Self {
        ConsulValue { value, meta }
    }

    /// Transform the value, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ConsulValue<U> {
        ConsulValue {
            value: f(self.value),
            meta: self.meta,
        }
    }
}
