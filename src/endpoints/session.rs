//! Sessions.
//!
//! Sessions bind KV locks to the health of a node. A lock acquired with
//! [`KvEndpoint::lock`](crate::endpoints::KvEndpoint::lock) is released (or
//! its key deleted, see [`SessionBehavior`]) when the session is destroyed,
//! expires, or fails one of its checks.

use crate::client::ConsulClient;
use crate::endpoints::ReadOptions;
use crate::error::{ConsulError, Result};
use crate::protocol::constants::{params, API_PREFIX};
use crate::protocol::{format_duration, parse_duration, ResponseMeta};
use crate::types::{ConsulValue, Identifier, Request, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// What happens to held locks when a session is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBehavior {
    /// Locks are released
    #[default]
    Release,
    /// Locked keys are deleted
    Delete,
}

/// Definition of a session to create.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSpec {
    name: Option<String>,
    node: Option<String>,
    checks: Option<Vec<String>>,
    behavior: Option<SessionBehavior>,
    ttl: Option<Duration>,
    lock_delay: Option<Duration>,
}

impl SessionSpec {
    /// An empty definition; the agent fills in its defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Human-readable name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Node the session belongs to; the agent's own by default.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Health checks that invalidate the session when critical.
    pub fn checks<I, S>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checks = Some(checks.into_iter().map(Into::into).collect());
        self
    }

    /// Behavior on invalidation.
    pub fn behavior(mut self, behavior: SessionBehavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Invalidate the session unless renewed within `ttl`.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Delay before a released lock can be acquired again.
    pub fn lock_delay(mut self, delay: Duration) -> Self {
        self.lock_delay = Some(delay);
        self
    }

    fn to_json(&self) -> Value {
        let mut body = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            body.insert(key.to_string(), value.unwrap_or(Value::Null));
        };
        put("Name", self.name.clone().map(Value::String));
        put("Node", self.node.clone().map(Value::String));
        put(
            "Checks",
            self.checks
                .as_ref()
                .map(|c| Value::Array(c.iter().cloned().map(Value::String).collect())),
        );
        put(
            "Behavior",
            self.behavior
                .and_then(|b| serde_json::to_value(b).ok()),
        );
        put("TTL", self.ttl.map(|d| Value::String(format_duration(d))));
        put(
            "LockDelay",
            self.lock_delay.map(|d| Value::String(format_duration(d))),
        );
        Value::Object(body)
    }
}

/// A session as reported by the agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionInfo {
    /// Session id
    #[serde(rename = "ID")]
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Owning node
    #[serde(default)]
    pub node: String,
    /// Associated health checks
    #[serde(default)]
    pub checks: Option<Vec<String>>,
    /// Behavior on invalidation
    #[serde(default)]
    pub behavior: SessionBehavior,
    /// Lock delay, in nanoseconds or as a duration string
    #[serde(default)]
    pub lock_delay: Value,
    /// TTL as a duration string; empty when the session has none
    #[serde(rename = "TTL", default)]
    pub ttl: String,
    /// Index of the write that created the session
    #[serde(default)]
    pub create_index: u64,
    /// Index of the last write to the session
    #[serde(default)]
    pub modify_index: u64,
}

impl SessionInfo {
    /// Parsed TTL, if the session has one.
    pub fn ttl(&self) -> Result<Option<Duration>> {
        if self.ttl.is_empty() {
            return Ok(None);
        }
        parse_duration(&self.ttl).map(Some)
    }

    /// Parsed lock delay, if reported.
    pub fn lock_delay(&self) -> Result<Option<Duration>> {
        match &self.lock_delay {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_u64().map(Duration::from_nanos)),
            Value::String(s) => parse_duration(s).map(Some),
            other => Err(ConsulError::Codec(format!("unexpected lock delay: {}", other))),
        }
    }
}

impl From<&SessionInfo> for Identifier {
    fn from(info: &SessionInfo) -> Self {
        Identifier::from(info.id.as_str())
    }
}

fn session_path(action: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{}/session/{}/{}", API_PREFIX, action, id),
        None => format!("{}/session/{}", API_PREFIX, action),
    }
}

fn decode_list<T: DeserializeOwned>(response: &Response) -> Result<Vec<T>> {
    match response.body.to_value() {
        Value::Null => Ok(Vec::new()),
        other => Ok(serde_json::from_value(other)?),
    }
}

/// The first session of a list answer, or `NotFound`.
fn single(response: Response, id: &Identifier) -> Result<ConsulValue<SessionInfo>> {
    let meta: ResponseMeta = response.meta();
    decode_list::<SessionInfo>(&response)?
        .into_iter()
        .next()
        .map(|info| ConsulValue::new(info, meta.clone()))
        .ok_or_else(|| ConsulError::NotFound {
            value: Value::String(format!("No session for {}", id)),
            meta,
        })
}

/// Session endpoint.
#[derive(Debug, Clone, Copy)]
pub struct SessionEndpoint<'a> {
    client: &'a ConsulClient,
}

impl<'a> SessionEndpoint<'a> {
    pub(crate) fn new(client: &'a ConsulClient) -> Self {
        SessionEndpoint { client }
    }

    /// Create a session and return its id.
    pub async fn create(&self, spec: &SessionSpec, dc: Option<&str>) -> Result<Identifier> {
        let request = Request::put(session_path("create", None))
            .with_json(spec.to_json())
            .with_param(params::DC, dc);
        let response = self.client.request(request).await?;
        Identifier::from_value(&response.body.to_value())
    }

    /// Destroy a session, releasing its locks.
    pub async fn destroy(&self, session: impl Into<Identifier>, dc: Option<&str>) -> Result<bool> {
        let id = session.into();
        let request =
            Request::put(session_path("destroy", Some(id.as_str()))).with_param(params::DC, dc);
        let response = self.client.request(request).await?;
        Ok(response.body.is_true())
    }

    /// Read one session.
    pub async fn info(
        &self,
        session: impl Into<Identifier>,
        options: ReadOptions,
    ) -> Result<ConsulValue<SessionInfo>> {
        let id = session.into();
        let request = options.apply(Request::get(session_path("info", Some(id.as_str()))));
        let response = self.client.request(request).await?;
        single(response, &id)
    }

    /// Renew a TTL session. The agent may answer with a longer TTL than
    /// requested when it wants fewer renewals.
    pub async fn renew(
        &self,
        session: impl Into<Identifier>,
        dc: Option<&str>,
    ) -> Result<ConsulValue<SessionInfo>> {
        let id = session.into();
        let request =
            Request::put(session_path("renew", Some(id.as_str()))).with_param(params::DC, dc);
        let response = self.client.request(request).await?;
        single(response, &id)
    }

    /// Every session of the datacenter.
    pub async fn list(&self, options: ReadOptions) -> Result<ConsulValue<Vec<SessionInfo>>> {
        let request = options.apply(Request::get(session_path("list", None)));
        let response = self.client.request(request).await?;
        Ok(ConsulValue::new(decode_list(&response)?, response.meta()))
    }

    /// Sessions of one node.
    pub async fn node(&self, node: &str, options: ReadOptions) -> Result<ConsulValue<Vec<SessionInfo>>> {
        let request = options.apply(Request::get(session_path("node", Some(node))));
        let response = self.client.request(request).await?;
        Ok(ConsulValue::new(decode_list(&response)?, response.meta()))
    }
}
