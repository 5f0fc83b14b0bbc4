//! Key/value store.
//!
//! Reads decode values through the client's [`KvCodec`](crate::codec::KvCodec)
//! and keep the indexes needed for check-and-set writes. Writes send the
//! encoded value as the raw request body and return the agent's boolean
//! answer: `false` means a check-and-set or lock condition did not hold.
//!
//! | Method | Request |
//! |--------|---------|
//! | [`get`](KvEndpoint::get) | `GET /v1/kv/<key>` |
//! | [`raw`](KvEndpoint::raw) | `GET /v1/kv/<key>?raw` |
//! | [`keys`](KvEndpoint::keys) | `GET /v1/kv/<prefix>?keys` |
//! | [`get_tree`](KvEndpoint::get_tree) | `GET /v1/kv/<prefix>?recurse` |
//! | [`set`](KvEndpoint::set), [`cas`](KvEndpoint::cas), [`lock`](KvEndpoint::lock), [`unlock`](KvEndpoint::unlock) | `PUT /v1/kv/<key>` |
//! | [`delete`](KvEndpoint::delete), [`delete_tree`](KvEndpoint::delete_tree), [`delete_cas`](KvEndpoint::delete_cas) | `DELETE /v1/kv/<key>` |
//!
//! # Examples
//!
//! ```ignore
//! use consul_http::{ConsulClient, KvValue};
//! use consul_http::endpoints::ReadOptions;
//!
//! let client = ConsulClient::new()?;
//! let kv = client.kv();
//!
//! kv.set("config/replicas", 3i64).await?;
//! let entry = kv.get("config/replicas", ReadOptions::default()).await?;
//! assert_eq!(entry.value.value, Some(KvValue::Integer(3)));
//!
//! // Only succeeds if nobody wrote the key in between.
//! let swapped = kv.cas("config/replicas", 4i64, &entry.value).await?;
//! ```

use crate::client::{wait_for_change, ConsulClient, Subscription};
use crate::codec::{Encoded, KvEntry, KvValue, RawKvEntry};
use crate::endpoints::txn::TransactionBuilder;
use crate::endpoints::ReadOptions;
use crate::error::{ConsulError, Result};
use crate::protocol::constants::API_PREFIX;
use crate::types::{Blocking, Body, ConsulValue, Identifier, ModifyIndex, ParamValue, Request, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

fn kv_path(key: &str) -> String {
    format!("{}/kv/{}", API_PREFIX, key)
}

/// KV store endpoint.
#[derive(Debug, Clone, Copy)]
pub struct KvEndpoint<'a> {
    client: &'a ConsulClient,
}

impl<'a> KvEndpoint<'a> {
    pub(crate) fn new(client: &'a ConsulClient) -> Self {
        KvEndpoint { client }
    }

    async fn read(&self, key: &str, request: Request, options: ReadOptions) -> Result<Response> {
        let request = options.apply(request);
        tracing::trace!(key, "KV read");
        self.client.request(request).await
    }

    /// Read one key.
    ///
    /// A missing key is [`ConsulError::NotFound`].
    pub async fn get(&self, key: &str, options: ReadOptions) -> Result<ConsulValue<KvEntry>> {
        let response = self.read(key, Request::get(kv_path(key)), options).await?;
        let meta = response.meta();
        let entry = RawKvEntry::list_from_value(response.body.to_value())?
            .into_iter()
            .next()
            .ok_or_else(|| ConsulError::NotFound {
                value: serde_json::Value::String(key.to_string()),
                meta: meta.clone(),
            })?;
        Ok(ConsulValue::new(self.client.codec().decode(entry)?, meta))
    }

    /// Read the undecoded value of one key.
    pub async fn raw(&self, key: &str, options: ReadOptions) -> Result<ConsulValue<Bytes>> {
        let request = Request::get(kv_path(key)).with_param("raw", ParamValue::flag(true));
        let response = self.read(key, request, options).await?;
        let meta = response.meta();
        let bytes = match response.body {
            Body::Empty => Bytes::new(),
            Body::Bytes(bytes) => bytes,
            Body::Json(value) => Bytes::from(serde_json::to_vec(&value)?),
        };
        Ok(ConsulValue::new(bytes, meta))
    }

    /// List the keys under `prefix`, stopping at `separator` when given.
    pub async fn keys(
        &self,
        prefix: &str,
        separator: Option<&str>,
        options: ReadOptions,
    ) -> Result<ConsulValue<Vec<String>>> {
        let request = Request::get(kv_path(prefix))
            .with_param("keys", ParamValue::flag(true))
            .with_param("separator", separator);
        let response = self.read(prefix, request, options).await?;
        let keys = match response.body.to_value() {
            serde_json::Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        };
        Ok(ConsulValue::new(keys, response.meta()))
    }

    /// Read every entry under `prefix`.
    pub async fn get_tree(
        &self,
        prefix: &str,
        separator: Option<&str>,
        options: ReadOptions,
    ) -> Result<ConsulValue<Vec<KvEntry>>> {
        let request = Request::get(kv_path(prefix))
            .with_param("recurse", ParamValue::flag(true))
            .with_param("separator", separator);
        let response = self.read(prefix, request, options).await?;
        let raw = RawKvEntry::list_from_value(response.body.to_value())?;
        let entries = self.client.codec().decode_all(raw)?;
        Ok(ConsulValue::new(entries, response.meta()))
    }

    async fn write(&self, key: &str, encoded: Encoded, extra: Vec<(&str, ParamValue)>) -> Result<bool> {
        let mut request = Request::put(kv_path(key))
            .with_param("flags", encoded.flags)
            .with_body(encoded.bytes);
        for (name, value) in extra {
            request = request.with_param(name, value);
        }
        let response = self.client.request(request).await?;
        Ok(response.body.is_true())
    }

    /// Store `value` under flags inferred from its type.
    pub async fn set(&self, key: &str, value: impl Into<KvValue>) -> Result<bool> {
        let encoded = self.client.codec().encode(&value.into(), None)?;
        self.write(key, encoded, Vec::new()).await
    }

    /// Store `value` under explicit flags.
    pub async fn set_with_flags(&self, key: &str, value: impl Into<KvValue>, flags: u64) -> Result<bool> {
        let encoded = self.client.codec().encode(&value.into(), Some(flags))?;
        self.write(key, encoded, Vec::new()).await
    }

    /// Store `value` only if the key was last modified at `index`.
    /// An index of `0` writes only if the key does not exist.
    pub async fn cas(
        &self,
        key: &str,
        value: impl Into<KvValue>,
        index: impl Into<ModifyIndex>,
    ) -> Result<bool> {
        self.cas_with_flags(key, value, index, None).await
    }

    /// [`cas`](Self::cas) with explicit flags; `None` infers them from the value.
    pub async fn cas_with_flags(
        &self,
        key: &str,
        value: impl Into<KvValue>,
        index: impl Into<ModifyIndex>,
        flags: Option<u64>,
    ) -> Result<bool> {
        let encoded = self.client.codec().encode(&value.into(), flags)?;
        let cas = ParamValue::Int(index.into().get());
        self.write(key, encoded, vec![("cas", cas)]).await
    }

    /// Acquire the key as a lock held by `session`, storing `value`.
    pub async fn lock(
        &self,
        key: &str,
        value: impl Into<KvValue>,
        session: impl Into<Identifier>,
    ) -> Result<bool> {
        self.lock_with_flags(key, value, session, None).await
    }

    /// [`lock`](Self::lock) with explicit flags.
    pub async fn lock_with_flags(
        &self,
        key: &str,
        value: impl Into<KvValue>,
        session: impl Into<Identifier>,
        flags: Option<u64>,
    ) -> Result<bool> {
        let encoded = self.client.codec().encode(&value.into(), flags)?;
        let session = ParamValue::Str(session.into().as_str().to_string());
        self.write(key, encoded, vec![("acquire", session)]).await
    }

    /// Release the lock `session` holds on the key, storing `value`.
    pub async fn unlock(
        &self,
        key: &str,
        value: impl Into<KvValue>,
        session: impl Into<Identifier>,
    ) -> Result<bool> {
        self.unlock_with_flags(key, value, session, None).await
    }

    /// [`unlock`](Self::unlock) with explicit flags.
    pub async fn unlock_with_flags(
        &self,
        key: &str,
        value: impl Into<KvValue>,
        session: impl Into<Identifier>,
        flags: Option<u64>,
    ) -> Result<bool> {
        let encoded = self.client.codec().encode(&value.into(), flags)?;
        let session = ParamValue::Str(session.into().as_str().to_string());
        self.write(key, encoded, vec![("release", session)]).await
    }

    async fn discard(&self, request: Request) -> Result<bool> {
        let response = self.client.request(request).await?;
        Ok(response.body.is_true())
    }

    /// Delete one key.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.discard(Request::delete(kv_path(key))).await
    }

    /// Delete every key under `prefix`.
    pub async fn delete_tree(&self, prefix: &str, separator: Option<&str>) -> Result<bool> {
        let request = Request::delete(kv_path(prefix))
            .with_param("recurse", ParamValue::flag(true))
            .with_param("separator", separator);
        self.discard(request).await
    }

    /// Delete the key only if it was last modified at `index`.
    pub async fn delete_cas(&self, key: &str, index: impl Into<ModifyIndex>) -> Result<bool> {
        let request = Request::delete(kv_path(key)).with_param("cas", index.into().get());
        self.discard(request).await
    }

    /// Block until the key moves past `since`, re-polling on timeouts.
    pub async fn wait_for_change(
        &self,
        key: &str,
        since: Blocking,
        cancel: &CancellationToken,
    ) -> Result<ConsulValue<KvEntry>> {
        let kv = *self;
        wait_for_change(since, cancel, |watch| async move {
            kv.get(key, ReadOptions::default().watch(watch)).await
        })
        .await
    }

    /// Stream every change of the key after `since` from a background task.
    pub fn subscribe(&self, key: &str, since: Blocking) -> Subscription<KvEntry> {
        let client = self.client.clone();
        let key = key.to_string();
        Subscription::spawn(since, CancellationToken::new(), move |watch| {
            let client = client.clone();
            let key = key.clone();
            async move { client.kv().get(&key, ReadOptions::default().watch(watch)).await }
        })
    }

    /// Start an empty transaction.
    pub fn prepare(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.client.clone())
    }

    /// Alias of [`prepare`](Self::prepare).
    pub fn txn(&self) -> TransactionBuilder {
        self.prepare()
    }
}
