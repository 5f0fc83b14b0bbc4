//! The request pipeline.
//!
//! Every call travels through an ordered list of [`Middleware`] stages
//! before the terminal [`Transport`] sends it. The standard order,
//! outermost first:
//!
//! | # | Stage | Effect |
//! |---|-------|--------|
//! | 1 | [`TokenStage`] | adds the ACL token unless the call set one |
//! | 2 | [`BlockingStage`] | turns [`Request::watch`] into `index`/`wait` |
//! | 3 | [`ConsistencyStage`] | resolves `consistent`/`stale` |
//! | 4 | [`JsonBodyStage`] | encodes [`Request::json`], pruning nulls |
//! | 5 | [`NormalizeStage`] | drops null params, renders booleans |
//!
//! Stages only rewrite the request. They never see the response and never
//! catch errors; the status of the response is mapped once, after the
//! transport returns, by [`render`](crate::protocol::render).
//!
//! Runtime [`Settings`] are read once when a call enters the pipeline and
//! that snapshot is handed to every stage, so a token change never affects
//! a call already in flight.
//!
//! # Examples
//!
//! ```
//! use consul_http::client::{Middleware, NormalizeStage, BoolTokens, Settings};
//! use consul_http::types::{ParamValue, Request};
//!
//! let mut request = Request::get("/v1/kv/foo")
//!     .with_param("recurse", true)
//!     .with_param("dc", ParamValue::Null);
//! NormalizeStage::new(BoolTokens::Numeric)
//!     .prepare(&mut request, &Settings::default())
//!     .unwrap();
//!
//! assert_eq!(request.param("recurse"), Some(&ParamValue::Str("1".into())));
//! assert_eq!(request.param("dc"), None);
//! ```

use crate::client::config::{BoolTokens, ClientConfig, Settings, SharedSettings};
use crate::client::transport::Transport;
use crate::error::Result;
use crate::protocol::constants::headers::{APPLICATION_JSON, CONTENT_TYPE};
use crate::protocol::constants::params;
use crate::protocol::{apply_consistency, format_duration, render, resolve_consistency};
use crate::types::{ParamValue, Request, Response};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A request-transforming pipeline stage.
pub trait Middleware: Send + Sync {
    /// Stage name, used to insert or remove stages.
    fn name(&self) -> &'static str;

    /// Rewrite `request` in place.
    fn prepare(&self, request: &mut Request, settings: &Settings) -> Result<()>;
}

/// Adds the ACL token parameter unless one is already present.
///
/// A null `token` entry counts as absent.
#[derive(Debug, Clone, Default)]
pub struct TokenStage;

impl Middleware for TokenStage {
    fn name(&self) -> &'static str {
        "token"
    }

    fn prepare(&self, request: &mut Request, settings: &Settings) -> Result<()> {
        if matches!(request.param(params::TOKEN), Some(v) if !v.is_null()) {
            return Ok(());
        }
        if let Some(token) = &settings.token {
            request
                .params
                .insert(params::TOKEN.to_string(), ParamValue::Str(token.clone()));
        }
        Ok(())
    }
}

/// Sets `index` and `wait` for blocking queries.
#[derive(Debug, Clone)]
pub struct BlockingStage {
    default_wait: Duration,
}

impl BlockingStage {
    /// Use `default_wait` when a blocking query requests none.
    pub fn new(default_wait: Duration) -> Self {
        BlockingStage { default_wait }
    }
}

impl Middleware for BlockingStage {
    fn name(&self) -> &'static str {
        "blocking"
    }

    fn prepare(&self, request: &mut Request, _settings: &Settings) -> Result<()> {
        let Some(watch) = request.watch.take() else {
            return Ok(());
        };
        let wait = watch.wait().unwrap_or(self.default_wait);
        request
            .params
            .insert(params::INDEX.to_string(), ParamValue::Int(watch.index()));
        request
            .params
            .insert(params::WAIT.to_string(), ParamValue::Str(format_duration(wait)));
        Ok(())
    }
}

/// Resolves the consistency mode and rewrites the `consistent`/`stale` flags.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyStage;

impl Middleware for ConsistencyStage {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn prepare(&self, request: &mut Request, settings: &Settings) -> Result<()> {
        let mode = resolve_consistency(
            request.consistency.take(),
            &request.params,
            settings.consistency,
        );
        apply_consistency(mode, &mut request.params);
        Ok(())
    }
}

/// Remove `null` members of objects, recursively. Arrays keep their length.
pub fn prune_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, prune_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(prune_nulls).collect()),
        other => other,
    }
}

/// Serializes the JSON body and sets its content type.
#[derive(Debug, Clone, Default)]
pub struct JsonBodyStage;

impl Middleware for JsonBodyStage {
    fn name(&self) -> &'static str {
        "json-body"
    }

    fn prepare(&self, request: &mut Request, _settings: &Settings) -> Result<()> {
        let Some(json) = request.json.take() else {
            return Ok(());
        };
        let encoded = serde_json::to_vec(&prune_nulls(json))?;
        request.body = Some(Bytes::from(encoded));
        let has_content_type = request
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE));
        if !has_content_type {
            request
                .headers
                .insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
        }
        Ok(())
    }
}

/// Drops null parameters and renders booleans as wire tokens.
#[derive(Debug, Clone, Default)]
pub struct NormalizeStage {
    tokens: BoolTokens,
}

impl NormalizeStage {
    /// Render booleans with `tokens`.
    pub fn new(tokens: BoolTokens) -> Self {
        NormalizeStage { tokens }
    }
}

impl Middleware for NormalizeStage {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn prepare(&self, request: &mut Request, _settings: &Settings) -> Result<()> {
        request.params.retain(|_, v| !v.is_null());
        for value in request.params.values_mut() {
            if let ParamValue::Bool(b) = value {
                *value = ParamValue::Str(self.tokens.render(*b).to_string());
            }
        }
        Ok(())
    }
}

/// An ordered chain of stages in front of a transport.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
    settings: SharedSettings,
}

impl Pipeline {
    /// A pipeline with no stages.
    pub fn new(transport: Arc<dyn Transport>, settings: SharedSettings) -> Self {
        Pipeline {
            stages: Vec::new(),
            transport,
            settings,
        }
    }

    /// The five standard stages, configured from `config`.
    pub fn standard(
        transport: Arc<dyn Transport>,
        settings: SharedSettings,
        config: &ClientConfig,
    ) -> Self {
        Self::new(transport, settings)
            .with_stage(TokenStage)
            .with_stage(BlockingStage::new(config.default_wait()))
            .with_stage(ConsistencyStage)
            .with_stage(JsonBodyStage)
            .with_stage(NormalizeStage::new(config.bool_tokens))
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Insert a stage at `position`, clamped to the end.
    pub fn insert_stage(mut self, position: usize, stage: impl Middleware + 'static) -> Self {
        let position = position.min(self.stages.len());
        self.stages.insert(position, Arc::new(stage));
        self
    }

    /// Remove every stage called `name`.
    pub fn without_stage(mut self, name: &str) -> Self {
        self.stages.retain(|s| s.name() != name);
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage over `request` with one settings snapshot.
    pub fn prepare(&self, mut request: Request) -> Result<Request> {
        let settings = self.settings.read().clone();
        for stage in &self.stages {
            stage.prepare(&mut request, &settings)?;
            tracing::trace!(stage = stage.name(), path = %request.path, "Prepared request");
        }
        Ok(request)
    }

    /// Prepare, send, and map the status of the response.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let request = self.prepare(request)?;
        let response = self.transport.send(&request).await?;
        render(response)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
