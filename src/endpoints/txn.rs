//! Atomic KV transactions.
//!
//! A [`TransactionBuilder`] collects [`Operation`]s in order and submits
//! them as one `PUT /v1/txn`. The agent applies all of them or none.
//!
//! | Verb | Needs |
//! |------|-------|
//! | `get`, `get-tree`, `delete`, `delete-tree` | key |
//! | `set` | key, value |
//! | `cas` | key, value, index |
//! | `lock`, `unlock` | key, value, session |
//! | `delete-cas`, `check-index` | key, index |
//! | `check-session` | key, session |
//!
//! Operations can only be built through their verb constructors, so an
//! operation that needs an index or a session always carries one.
//!
//! The builder keeps its operations until a submission succeeds. A failed
//! submission leaves them in place so the same transaction can be retried
//! or inspected; a rolled back transaction reports which operations failed
//! in [`ConsulError::Transaction`].
//!
//! # Examples
//!
//! ```ignore
//! use consul_http::ConsulClient;
//!
//! let client = ConsulClient::new()?;
//! let mut txn = client.kv().prepare();
//! txn.check_index("leader", 42u64)
//!     .set("leader", "node-b")
//!     .delete("leader/candidate");
//!
//! match txn.execute().await {
//!     Ok(results) => println!("{} results", results.len()),
//!     Err(consul_http::ConsulError::Transaction { errors, .. }) => {
//!         for failure in errors {
//!             eprintln!("operation {} failed: {}", failure.operation_index, failure.message);
//!         }
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use crate::client::ConsulClient;
use crate::codec::{KvEntry, KvValue, RawKvEntry};
use crate::error::{ConsulError, Result};
use crate::protocol::constants::{params, API_PREFIX};
use crate::types::{Identifier, ModifyIndex, Request};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Transaction operation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    /// Read a key
    Get,
    /// Read every key under a prefix
    GetTree,
    /// Write a key
    Set,
    /// Write a key if its index matches
    Cas,
    /// Acquire a key as a lock
    Lock,
    /// Release a lock
    Unlock,
    /// Delete a key
    Delete,
    /// Delete every key under a prefix
    DeleteTree,
    /// Delete a key if its index matches
    DeleteCas,
    /// Fail unless the key's index matches
    CheckIndex,
    /// Fail unless the key is locked by the session
    CheckSession,
}

impl Verb {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::GetTree => "get-tree",
            Verb::Set => "set",
            Verb::Cas => "cas",
            Verb::Lock => "lock",
            Verb::Unlock => "unlock",
            Verb::Delete => "delete",
            Verb::DeleteTree => "delete-tree",
            Verb::DeleteCas => "delete-cas",
            Verb::CheckIndex => "check-index",
            Verb::CheckSession => "check-session",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    verb: Verb,
    key: String,
    value: Option<KvValue>,
    flags: Option<u64>,
    index: Option<u64>,
    session: Option<String>,
}

impl Operation {
    fn new(verb: Verb, key: impl Into<String>) -> Self {
        Operation {
            verb,
            key: key.into(),
            value: None,
            flags: None,
            index: None,
            session: None,
        }
    }

    fn with_value(mut self, value: impl Into<KvValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn with_index(mut self, index: impl Into<ModifyIndex>) -> Self {
        self.index = Some(index.into().get());
        self
    }

    fn with_session(mut self, session: impl Into<Identifier>) -> Self {
        self.session = Some(session.into().as_str().to_string());
        self
    }

    /// Read `key`.
    pub fn get(key: impl Into<String>) -> Self {
        Self::new(Verb::Get, key)
    }

    /// Read every key under `prefix`.
    pub fn get_tree(prefix: impl Into<String>) -> Self {
        Self::new(Verb::GetTree, prefix)
    }

    /// Write `value` to `key`.
    pub fn set(key: impl Into<String>, value: impl Into<KvValue>) -> Self {
        Self::new(Verb::Set, key).with_value(value)
    }

    /// Write `value` to `key` if it was last modified at `index`.
    pub fn cas(key: impl Into<String>, value: impl Into<KvValue>, index: impl Into<ModifyIndex>) -> Self {
        Self::new(Verb::Cas, key).with_value(value).with_index(index)
    }

    /// Acquire `key` for `session`, writing `value`.
    pub fn lock(key: impl Into<String>, value: impl Into<KvValue>, session: impl Into<Identifier>) -> Self {
        Self::new(Verb::Lock, key).with_value(value).with_session(session)
    }

    /// Release the lock `session` holds on `key`, writing `value`.
    pub fn unlock(key: impl Into<String>, value: impl Into<KvValue>, session: impl Into<Identifier>) -> Self {
        Self::new(Verb::Unlock, key).with_value(value).with_session(session)
    }

    /// Delete `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(Verb::Delete, key)
    }

    /// Delete every key under `prefix`.
    pub fn delete_tree(prefix: impl Into<String>) -> Self {
        Self::new(Verb::DeleteTree, prefix)
    }

    /// Delete `key` if it was last modified at `index`.
    pub fn delete_cas(key: impl Into<String>, index: impl Into<ModifyIndex>) -> Self {
        Self::new(Verb::DeleteCas, key).with_index(index)
    }

    /// Fail the transaction unless `key` was last modified at `index`.
    pub fn check_index(key: impl Into<String>, index: impl Into<ModifyIndex>) -> Self {
        Self::new(Verb::CheckIndex, key).with_index(index)
    }

    /// Fail the transaction unless `key` is locked by `session`.
    pub fn check_session(key: impl Into<String>, session: impl Into<Identifier>) -> Self {
        Self::new(Verb::CheckSession, key).with_session(session)
    }

    /// Store the value under explicit flags instead of inferred ones.
    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags = Some(flags);
        self
    }

    /// The verb.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The key or prefix.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value to write, if any.
    pub fn value(&self) -> Option<&KvValue> {
        self.value.as_ref()
    }

    /// Explicit flags, if any.
    pub fn flags(&self) -> Option<u64> {
        self.flags
    }

    /// The index checked by the operation, if any.
    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// The session of a lock operation, if any.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

/// A failed operation of a rolled back transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnFailure {
    /// Position of the operation in the submission
    #[serde(rename = "OpIndex", default)]
    pub operation_index: usize,
    /// Reason given by the agent
    #[serde(rename = "What", default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct TxnResult {
    #[serde(rename = "KV")]
    kv: Option<RawKvEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct TxnResponse {
    #[serde(rename = "Results", default)]
    results: Option<Vec<TxnResult>>,
}

/// Accumulates KV operations and submits them atomically.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    client: ConsulClient,
    operations: Vec<Operation>,
}

impl TransactionBuilder {
    /// Start an empty transaction on `client`.
    pub fn new(client: ConsulClient) -> Self {
        TransactionBuilder {
            client,
            operations: Vec::new(),
        }
    }

    /// Add an operation.
    pub fn append(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    /// Operations queued so far, in submission order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if no operation is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queue a `get`.
    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.append(Operation::get(key))
    }

    /// Queue a `get-tree`.
    pub fn get_tree(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.append(Operation::get_tree(prefix))
    }

    /// Queue a `set`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<KvValue>) -> &mut Self {
        self.append(Operation::set(key, value))
    }

    /// Queue a `cas`.
    pub fn cas(
        &mut self,
        key: impl Into<String>,
        value: impl Into<KvValue>,
        index: impl Into<ModifyIndex>,
    ) -> &mut Self {
        self.append(Operation::cas(key, value, index))
    }

    /// Queue a `lock`.
    pub fn lock(
        &mut self,
        key: impl Into<String>,
        value: impl Into<KvValue>,
        session: impl Into<Identifier>,
    ) -> &mut Self {
        self.append(Operation::lock(key, value, session))
    }

    /// Queue an `unlock`.
    pub fn unlock(
        &mut self,
        key: impl Into<String>,
        value: impl Into<KvValue>,
        session: impl Into<Identifier>,
    ) -> &mut Self {
        self.append(Operation::unlock(key, value, session))
    }

    /// Queue a `delete`.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.append(Operation::delete(key))
    }

    /// Queue a `delete-tree`.
    pub fn delete_tree(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.append(Operation::delete_tree(prefix))
    }

    /// Queue a `delete-cas`.
    pub fn delete_cas(&mut self, key: impl Into<String>, index: impl Into<ModifyIndex>) -> &mut Self {
        self.append(Operation::delete_cas(key, index))
    }

    /// Queue a `check-index`.
    pub fn check_index(&mut self, key: impl Into<String>, index: impl Into<ModifyIndex>) -> &mut Self {
        self.append(Operation::check_index(key, index))
    }

    /// Queue a `check-session`.
    pub fn check_session(&mut self, key: impl Into<String>, session: impl Into<Identifier>) -> &mut Self {
        self.append(Operation::check_session(key, session))
    }

    /// JSON payload of the queued operations, values base64-encoded.
    fn payload(&self) -> Result<Value> {
        let codec = self.client.codec();
        let mut ops = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            let (value, flags) = match &op.value {
                Some(value) => {
                    let encoded = codec.encode(value, op.flags)?;
                    (Some(encoded.to_base64()), Some(encoded.flags))
                }
                None => (None, op.flags),
            };
            ops.push(json!({
                "KV": {
                    "Verb": op.verb,
                    "Key": op.key,
                    "Value": value,
                    "Flags": flags,
                    "Index": op.index,
                    "Session": op.session,
                }
            }));
        }
        Ok(Value::Array(ops))
    }

    /// Submit the queued operations in the agent's datacenter.
    pub async fn execute(&mut self) -> Result<Vec<KvEntry>> {
        self.execute_with(None, None).await
    }

    /// Submit the queued operations to datacenter `dc`, optionally with a
    /// token that overrides the client's.
    ///
    /// On success the queue is cleared and the results are returned in
    /// submission order. On failure the queue is left untouched.
    pub async fn execute_with(
        &mut self,
        dc: Option<&str>,
        token: Option<Identifier>,
    ) -> Result<Vec<KvEntry>> {
        let request = Request::put(format!("{}/txn", API_PREFIX))
            .with_json(self.payload()?)
            .with_param(params::DC, dc)
            .with_param(params::TOKEN, token.map(|t| t.as_str().to_string()));

        let response = match self.client.request(request).await {
            Ok(response) => response,
            Err(ConsulError::Conflict { value, meta }) => {
                let errors: Vec<TxnFailure> =
                    serde_json::from_value(value.clone()).unwrap_or_default();
                tracing::warn!(
                    failed = errors.len(),
                    submitted = self.operations.len(),
                    "Transaction rolled back"
                );
                return Err(ConsulError::Transaction {
                    errors,
                    value,
                    operations: self.operations.clone(),
                    meta,
                });
            }
            Err(e) => return Err(e),
        };

        self.operations.clear();

        let body: TxnResponse = match response.body.to_value() {
            Value::Null => TxnResponse::default(),
            other => serde_json::from_value(other)?,
        };
        let codec = self.client.codec();
        body.results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.kv)
            .map(|raw| codec.decode(raw))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use crate::client::ClientConfig;
    use crate::codec::FLAG_MAPPING;
    use crate::types::ParamValue;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use std::sync::Arc;

    fn builder() -> (TransactionBuilder, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = ConsulClient::with_transport(ClientConfig::default(), transport.clone()).unwrap();
        (client.kv().prepare(), transport)
    }

    fn sent_payload(transport: &MockTransport) -> Value {
        let request = transport.last_request().unwrap();
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn test_verb_names() {
        assert_eq!(serde_json::to_value(Verb::GetTree).unwrap(), json!("get-tree"));
        assert_eq!(serde_json::to_value(Verb::DeleteCas).unwrap(), json!("delete-cas"));
        assert_eq!(serde_json::to_value(Verb::CheckSession).unwrap(), json!("check-session"));
        assert_eq!(Verb::CheckIndex.to_string(), "check-index");
    }

    #[test]
    fn test_operations_carry_required_fields() {
        assert_eq!(Operation::cas("k", "v", 3u64).index(), Some(3));
        assert_eq!(Operation::delete_cas("k", 4u64).index(), Some(4));
        assert_eq!(Operation::check_index("k", 5u64).index(), Some(5));
        assert_eq!(Operation::lock("k", "v", "s1").session(), Some("s1"));
        assert_eq!(Operation::unlock("k", "v", "s1").session(), Some("s1"));
        assert_eq!(Operation::check_session("k", "s1").session(), Some("s1"));
        assert_eq!(Operation::get("k").value(), None);
    }

    #[tokio::test]
    async fn test_payload_shape() {
        let (mut txn, transport) = builder();
        let mut config = serde_json::Map::new();
        config.insert("replicas".into(), json!(3));
        txn.set("app/config", KvValue::Mapping(config))
            .check_index("app/leader", 7u64)
            .delete("app/tmp");
        transport.push_json(200, Some(8), json!({"Results": [], "Errors": null}));
        txn.execute_with(Some("dc2"), Some(Identifier::from("txn-token")))
            .await
            .unwrap();

        let payload = sent_payload(&transport);
        assert_eq!(
            payload,
            json!([
                {"KV": {
                    "Verb": "set",
                    "Key": "app/config",
                    "Value": STANDARD.encode(br#"{"replicas":3}"#),
                    "Flags": FLAG_MAPPING
                }},
                {"KV": {"Verb": "check-index", "Key": "app/leader", "Index": 7}},
                {"KV": {"Verb": "delete", "Key": "app/tmp"}}
            ])
        );

        let request = transport.last_request().unwrap();
        assert_eq!(request.path, "/v1/txn");
        assert_eq!(request.param("dc"), Some(&ParamValue::Str("dc2".into())));
        assert_eq!(request.param("token"), Some(&ParamValue::Str("txn-token".into())));
    }

    #[tokio::test]
    async fn test_execute_sends_client_token() {
        let transport = Arc::new(MockTransport::new());
        let config = ClientConfig {
            token: Some("client-token".into()),
            ..Default::default()
        };
        let client = ConsulClient::with_transport(config, transport.clone()).unwrap();
        let mut txn = client.kv().prepare();
        txn.get("k");
        transport.push_json(200, Some(2), json!({"Results": [], "Errors": null}));
        txn.execute().await.unwrap();

        let request = transport.last_request().unwrap();
        assert_eq!(request.param("token"), Some(&ParamValue::Str("client-token".into())));
    }

    #[tokio::test]
    async fn test_unparsable_errors_are_kept() {
        let (mut txn, transport) = builder();
        txn.get("k");
        transport.push_json(409, Some(4), json!({"Errors": "boom"}));

        let err = txn.execute().await.unwrap_err();
        assert_eq!(err.value(), Some(&json!("boom")));
        match err {
            ConsulError::Transaction { errors, operations, .. } => {
                assert!(errors.is_empty());
                assert_eq!(operations.len(), 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(txn.len(), 1);
    }

    #[tokio::test]
    async fn test_success_preserves_order_and_clears() {
        let (mut txn, transport) = builder();
        txn.get("a").get("b").get("c");

        let results: Vec<Value> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, key)| {
                json!({"KV": {
                    "Key": key,
                    "Value": STANDARD.encode(key.as_bytes()),
                    "Flags": 0,
                    "CreateIndex": 1,
                    "LockIndex": 0,
                    "ModifyIndex": 10 + i,
                }})
            })
            .collect();
        transport.push_json(200, Some(12), json!({"Results": results, "Errors": null}));

        let entries = txn.execute().await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(entries[2].value, Some(KvValue::bytes(b"c")));
        assert_eq!(entries[2].modify_index, 12);
        assert!(txn.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_keeps_operations() {
        let (mut txn, transport) = builder();
        txn.cas("a", "1", 4u64).set("b", "2");
        transport.push_json(
            409,
            Some(9),
            json!({
                "Results": null,
                "Errors": [{"OpIndex": 0, "What": "current modify index 5 does not match 4"}]
            }),
        );

        let err = txn.execute().await.unwrap_err();
        match err {
            ConsulError::Transaction {
                errors,
                value,
                operations,
                meta,
            } => {
                assert_eq!(value[0]["OpIndex"], json!(0));
                assert_eq!(
                    errors,
                    vec![TxnFailure {
                        operation_index: 0,
                        message: "current modify index 5 does not match 4".into(),
                    }]
                );
                assert_eq!(operations.len(), 2);
                assert_eq!(operations[0].verb(), Verb::Cas);
                assert_eq!(meta.last_index, Some(9));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(txn.len(), 2);
    }

    #[tokio::test]
    async fn test_other_failures_keep_operations() {
        let (mut txn, transport) = builder();
        txn.delete_tree("jobs/");
        transport.push_json(500, None, json!("leader lost"));

        let err = txn.execute().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(txn.operations(), &[Operation::delete_tree("jobs/")]);
    }

    #[tokio::test]
    async fn test_encode_failure_sends_nothing() {
        let (mut txn, transport) = builder();
        txn.append(Operation::set("n", KvValue::List(vec![])).with_flags(2));
        assert!(matches!(txn.execute().await, Err(ConsulError::Codec(_))));
        assert!(transport.requests().is_empty());
        assert_eq!(txn.len(), 1);
    }
}
