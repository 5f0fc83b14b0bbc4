//! Scenario tests across the whole client.
//!
//! [`FakeAgent`] keeps a KV store in memory and answers the pipeline's
//! prepared requests the way the agent does, so reads, check-and-set
//! writes and transactions can be exercised end to end without a server.
//! The `http` tests go through the reqwest transport against mockito.

use crate::client::{ClientConfig, Transport};
use crate::codec::{KvValue, FLAG_RAW, FLAG_STRING};
use crate::error::{ConsulError, Result};
use crate::types::{Body, Method, ParamValue, Request, Response};
use crate::{ConsistencyMode, ConsulClient, ReadOptions};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Stored {
    value: Bytes,
    flags: u64,
    create_index: u64,
    modify_index: u64,
}

#[derive(Debug, Clone, Default)]
struct Store {
    index: u64,
    entries: BTreeMap<String, Stored>,
}

impl Store {
    fn entry_json(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|s| {
            json!({
                "Key": key,
                "Value": STANDARD.encode(&s.value),
                "Flags": s.flags,
                "CreateIndex": s.create_index,
                "LockIndex": 0,
                "ModifyIndex": s.modify_index,
            })
        })
    }

    fn write(&mut self, key: &str, value: Bytes, flags: u64, cas: Option<u64>) -> bool {
        let current = self.entries.get(key).map(|s| s.modify_index);
        match (cas, current) {
            (Some(0), Some(_)) => return false,
            (Some(expected), Some(index)) if expected != 0 && expected != index => return false,
            (Some(expected), None) if expected != 0 => return false,
            _ => {}
        }
        self.index += 1;
        let create_index = self
            .entries
            .get(key)
            .map(|s| s.create_index)
            .unwrap_or(self.index);
        self.entries.insert(
            key.to_string(),
            Stored {
                value,
                flags,
                create_index,
                modify_index: self.index,
            },
        );
        true
    }
}

/// In-memory stand-in for the agent's KV and transaction endpoints.
#[derive(Debug, Default)]
struct FakeAgent {
    store: Mutex<Store>,
    requests: Mutex<Vec<Request>>,
}

fn int_param(request: &Request, key: &str) -> Option<u64> {
    request
        .param(key)
        .and_then(ParamValue::render)
        .and_then(|v| v.parse().ok())
}

fn json_response(request: &Request, status: u16, index: u64, body: Value) -> Response {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("x-consul-index".to_string(), index.to_string());
    Response {
        status,
        headers,
        body: Body::Json(body),
        method: request.method,
        path: request.path.clone(),
    }
}

impl FakeAgent {
    fn kv(&self, request: &Request, key: &str) -> Response {
        let mut store = self.store.lock();
        match request.method {
            Method::Get => match store.entry_json(key) {
                Some(entry) => json_response(request, 200, store.index, json!([entry])),
                None => json_response(request, 404, store.index, Value::Null),
            },
            Method::Put => {
                let value = request.body.clone().unwrap_or_default();
                let flags = int_param(request, "flags").unwrap_or(0);
                let cas = int_param(request, "cas");
                let ok = store.write(key, value, flags, cas);
                json_response(request, 200, store.index, json!(ok))
            }
            Method::Delete => {
                let ok = store.entries.remove(key).is_some();
                store.index += 1;
                json_response(request, 200, store.index, json!(ok))
            }
            Method::Post => json_response(request, 405, store.index, Value::Null),
        }
    }

    fn txn(&self, request: &Request) -> Result<Response> {
        let ops: Vec<Value> = serde_json::from_slice(request.body.as_deref().unwrap_or(&b"[]"[..]))?;
        let mut store = self.store.lock();
        let mut scratch = store.clone();
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (i, op) in ops.iter().enumerate() {
            let kv = &op["KV"];
            let key = kv["Key"].as_str().unwrap_or_default();
            let index = kv["Index"].as_u64();
            match kv["Verb"].as_str().unwrap_or_default() {
                "set" | "cas" => {
                    let value = STANDARD.decode(kv["Value"].as_str().unwrap_or_default())?;
                    let flags = kv["Flags"].as_u64().unwrap_or(0);
                    if scratch.write(key, Bytes::from(value), flags, index) {
                        results.extend(scratch.entry_json(key));
                    } else {
                        errors.push(json!({"OpIndex": i, "What": "failed to set key"}));
                    }
                }
                "get" => match scratch.entry_json(key) {
                    Some(entry) => results.push(entry),
                    None => errors.push(json!({"OpIndex": i, "What": format!("key {:?} doesn't exist", key)})),
                },
                "check-index" => {
                    let current = scratch.entries.get(key).map(|s| s.modify_index);
                    if current != index {
                        errors.push(json!({
                            "OpIndex": i,
                            "What": format!("current modify index {:?} does not match {:?}", current, index)
                        }));
                    }
                }
                other => errors.push(json!({"OpIndex": i, "What": format!("unsupported verb {}", other)})),
            }
        }

        if !errors.is_empty() {
            return Ok(json_response(
                request,
                409,
                store.index,
                json!({"Results": null, "Errors": errors}),
            ));
        }
        *store = scratch;
        let results: Vec<Value> = results.into_iter().map(|r| json!({"KV": r})).collect();
        Ok(json_response(
            request,
            200,
            store.index,
            json!({"Results": results, "Errors": null}),
        ))
    }

    fn stored(&self, key: &str) -> Option<Bytes> {
        self.store.lock().entries.get(key).map(|s| s.value.clone())
    }
}

#[async_trait]
impl Transport for FakeAgent {
    async fn send(&self, request: &Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        if let Some(key) = request.path.strip_prefix("/v1/kv/") {
            return Ok(self.kv(request, key));
        }
        if request.path == "/v1/txn" {
            return self.txn(request);
        }
        Ok(json_response(request, 404, 0, json!("no such endpoint")))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn fake_client() -> (ConsulClient, Arc<FakeAgent>) {
    init_tracing();
    let agent = Arc::new(FakeAgent::default());
    let client = ConsulClient::with_transport(ClientConfig::default(), agent.clone()).unwrap();
    (client, agent)
}

#[tokio::test]
async fn test_cas_round_trip() {
    let (client, agent) = fake_client();
    let kv = client.kv();

    assert!(kv.set("foo", KvValue::bytes(b"bar")).await.unwrap());

    let read = kv.get("foo", ReadOptions::default()).await.unwrap();
    assert_eq!(read.value.value, Some(KvValue::bytes(b"bar")));
    assert_eq!(read.value.flags, FLAG_RAW);
    let index = read.value.modify_index;

    let swapped = kv
        .cas("foo", KvValue::bytes(b"baz"), index + 100)
        .await
        .unwrap();
    assert!(!swapped);
    assert_eq!(agent.stored("foo"), Some(Bytes::from_static(b"bar")));

    assert!(kv.cas("foo", KvValue::bytes(b"baz"), &read.value).await.unwrap());
    assert_eq!(agent.stored("foo"), Some(Bytes::from_static(b"baz")));
}

#[tokio::test]
async fn test_cas_zero_only_creates() {
    let (client, _agent) = fake_client();
    let kv = client.kv();
    assert!(tokio_test::assert_ok!(kv.cas("lock", "mine", 0u64).await));
    assert!(!tokio_test::assert_ok!(kv.cas("lock", "theirs", 0u64).await));

    let read = kv.get("lock", ReadOptions::default()).await.unwrap();
    assert_eq!(read.value.value, Some(KvValue::from("mine")));
    assert_eq!(read.value.flags, FLAG_STRING);
}

#[tokio::test]
async fn test_transaction_against_agent() {
    let (client, agent) = fake_client();
    client.kv().set("a", 1i64).await.unwrap();
    let a = client.kv().get("a", ReadOptions::default()).await.unwrap();

    let mut txn = client.kv().prepare();
    txn.check_index("a", &a.value)
        .set("b", "two")
        .cas("a", 2i64, &a.value)
        .get("b");
    let results = txn.execute().await.unwrap();

    let keys: Vec<&str> = results.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["b", "a", "b"]);
    assert_eq!(results[1].value, Some(KvValue::Integer(2)));
    assert_eq!(results[2].value, Some(KvValue::from("two")));
    assert!(txn.is_empty());

    // The stale index now fails the whole batch.
    txn.set("c", "three").check_index("a", &a.value);
    let err = txn.execute().await.unwrap_err();
    match &err {
        ConsulError::Transaction { errors, operations, .. } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].operation_index, 1);
            assert_eq!(operations.len(), 2);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_conflict());
    assert_eq!(txn.len(), 2);
    assert_eq!(agent.stored("c"), None);
}

#[tokio::test]
async fn test_missing_key_is_not_found() {
    let (client, _agent) = fake_client();
    let err = tokio_test::assert_err!(client.kv().get("nope", ReadOptions::default()).await);
    assert!(err.is_not_found());
    assert_eq!(err.meta().and_then(|m| m.last_index), Some(0));
}

#[tokio::test]
async fn test_numeric_bool_tokens_reach_transport() {
    let agent = Arc::new(FakeAgent::default());
    let config = ClientConfig {
        bool_tokens: crate::client::BoolTokens::Numeric,
        consistency: Some(ConsistencyMode::Stale),
        ..Default::default()
    };
    let client = ConsulClient::with_transport(config, agent.clone()).unwrap();
    client.kv().set("k", "v").await.unwrap();
    client.kv().get("k", ReadOptions::default()).await.unwrap();

    let sent = agent.requests.lock().last().cloned().unwrap();
    assert_eq!(sent.param("stale"), Some(&ParamValue::Str("1".into())));
    assert_eq!(sent.param("consistent"), None);
}

#[tokio::test]
async fn test_client_token_reaches_every_call() {
    let agent = Arc::new(FakeAgent::default());
    let config = ClientConfig {
        token: Some("client-token".into()),
        ..Default::default()
    };
    let client = ConsulClient::with_transport(config, agent.clone()).unwrap();
    client.kv().set("k", "v").await.unwrap();
    let mut txn = client.kv().prepare();
    txn.get("k");
    txn.execute().await.unwrap();

    let tokens: Vec<Option<ParamValue>> = agent
        .requests
        .lock()
        .iter()
        .map(|r| r.param("token").cloned())
        .collect();
    let expected = Some(ParamValue::Str("client-token".into()));
    assert_eq!(tokens, vec![expected.clone(), expected]);
}

mod http {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard, token: Option<&str>) -> ConsulClient {
        ConsulClient::with_config(ClientConfig {
            address: server.url(),
            token: token.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_with_token_and_consistency() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/kv/app/config")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), "secret".into()),
                Matcher::UrlEncoded("consistent".into(), "true".into()),
                Matcher::UrlEncoded("dc".into(), "east".into()),
            ]))
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_header("X-Consul-Index", "31")
            .with_header("X-Consul-KnownLeader", "true")
            .with_header("X-Consul-LastContact", "0")
            .with_body(
                json!([{
                    "Key": "app/config",
                    "Value": STANDARD.encode(br#"{"debug":false}"#),
                    "Flags": 4,
                    "CreateIndex": 30,
                    "LockIndex": 0,
                    "ModifyIndex": 31
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, Some("secret"));
        let entry = client
            .kv()
            .get(
                "app/config",
                ReadOptions::default()
                    .dc("east")
                    .consistency(ConsistencyMode::Consistent),
            )
            .await
            .unwrap();

        let mut expected = serde_json::Map::new();
        expected.insert("debug".into(), json!(false));
        assert_eq!(entry.value.value, Some(KvValue::Mapping(expected)));
        assert_eq!(entry.meta.last_index, Some(31));
        assert_eq!(entry.meta.known_leader, Some(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_raw_value() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/kv/app/blob")
            .match_query(Matcher::UrlEncoded("flags".into(), "0".into()))
            .match_body(Matcher::Exact("\u{1}\u{2}\u{3}".into()))
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body("true")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let ok = client
            .kv()
            .set("app/blob", KvValue::bytes([1u8, 2, 3]))
            .await
            .unwrap();
        assert!(ok);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_conflict_on_txn() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/v1/txn")
            .match_query(Matcher::Any)
            .match_header("content-type", "application/json")
            .with_status(409)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"Results":null,"Errors":[{"OpIndex":0,"What":"key is locked"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let mut txn = client.kv().prepare();
        txn.lock("jobs/leader", "me", "sess-1");
        let err = txn.execute().await.unwrap_err();
        match err {
            ConsulError::Transaction { errors, .. } => {
                assert_eq!(errors[0].message, "key is locked");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(txn.len(), 1);
    }

    #[tokio::test]
    async fn test_plain_conflict_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/v1/session/create")
            .match_query(Matcher::Any)
            .with_status(409)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"foo":"bar"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client
            .session()
            .create(&crate::endpoints::SessionSpec::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsulError::Conflict { .. }));
        assert_eq!(err.value(), Some(&json!({"foo": "bar"})));
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/status/leader")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_header("Content-Type", "text/plain")
            .with_body("No cluster leader")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.status().leader().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.value(), Some(&json!("No cluster leader")));
    }
}
