//! The Consul client.
//!
//! [`ConsulClient`] owns the request pipeline, the runtime settings and the
//! KV codec. Endpoint wrappers borrow it and go through
//! [`ConsulClient::request`], the single entry point to the agent.
//!
//! # Examples
//!
//! ## Creating a client
//!
//! ```
//! use consul_http::{ClientConfig, ConsulClient, ConsistencyMode};
//!
//! let config = ClientConfig {
//!     address: "10.0.0.5:8500".to_string(),
//!     consistency: Some(ConsistencyMode::Stale),
//!     ..Default::default()
//! };
//! let client = ConsulClient::with_config(config).unwrap();
//! assert_eq!(client.address().port, Some(8500));
//! assert_eq!(client.consistency(), Some(ConsistencyMode::Stale));
//! ```
//!
//! ## Raw requests
//!
//! ```ignore
//! use consul_http::{ConsulClient, Request};
//!
//! let client = ConsulClient::new()?;
//! let response = client.request(Request::get("/v1/agent/self")).await?;
//! println!("{}", response.body.to_value());
//! ```

use crate::client::config::{ClientConfig, Settings, SharedSettings};
use crate::client::pipeline::Pipeline;
use crate::client::transport::{ReqwestTransport, Transport};
use crate::codec::KvCodec;
use crate::endpoints::{KvEndpoint, SessionEndpoint, StatusEndpoint};
use crate::error::Result;
use crate::protocol::address::{resolve_address, Address, Protocol};
use crate::protocol::constants::DEFAULT_HOST;
use crate::types::{ConsistencyMode, Request, Response};
use parking_lot::RwLock;
use std::sync::Arc;

/// Client for the Consul HTTP API.
///
/// Cheap to clone; clones share the connection pool and the settings.
#[derive(Clone, Debug)]
pub struct ConsulClient {
    pipeline: Pipeline,
    settings: SharedSettings,
    codec: KvCodec,
    config: Arc<ClientConfig>,
    address: Address,
}

impl ConsulClient {
    /// Client configured from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::from_env())
    }

    /// Client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let address = resolve_address(
            config.address.as_str(),
            Some(Protocol::Http),
            Some(DEFAULT_HOST),
        )?;
        let transport = ReqwestTransport::new(&address, &config)?;
        Ok(Self::build(config, address, Arc::new(transport)))
    }

    /// Client sending through a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let address = resolve_address(
            config.address.as_str(),
            Some(Protocol::Http),
            Some(DEFAULT_HOST),
        )?;
        Ok(Self::build(config, address, transport))
    }

    fn build(config: ClientConfig, address: Address, transport: Arc<dyn Transport>) -> Self {
        let settings = Arc::new(RwLock::new(Settings::from_config(&config)));
        let pipeline = Pipeline::standard(transport, settings.clone(), &config);
        ConsulClient {
            pipeline,
            settings,
            codec: KvCodec::default(),
            config: Arc::new(config),
            address,
        }
    }

    /// Replace the KV codec.
    pub fn with_codec(mut self, codec: KvCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the pipeline, e.g. to add a stage.
    pub fn map_pipeline(mut self, f: impl FnOnce(Pipeline) -> Pipeline) -> Self {
        self.pipeline = f(self.pipeline);
        self
    }

    /// Current ACL token.
    pub fn token(&self) -> Option<String> {
        self.settings.read().token.clone()
    }

    /// Change the ACL token of later calls.
    pub fn set_token(&self, token: Option<String>) {
        self.settings.write().token = token;
    }

    /// Current default consistency mode.
    pub fn consistency(&self) -> Option<ConsistencyMode> {
        self.settings.read().consistency
    }

    /// Change the default consistency mode of later calls.
    pub fn set_consistency(&self, consistency: Option<ConsistencyMode>) {
        self.settings.write().consistency = consistency;
    }

    /// Send a request through the pipeline.
    ///
    /// Statuses of 400 and above come back as errors.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let method = request.method;
        let path = request.path.clone();
        let result = self.pipeline.execute(request).await;
        if self.config.enable_logging {
            match &result {
                Ok(response) => {
                    tracing::debug!(%method, %path, status = response.status, "Consul request")
                }
                Err(e) => tracing::debug!(%method, %path, "Consul request failed: {}", e),
            }
        }
        result
    }

    /// KV store.
    pub fn kv(&self) -> KvEndpoint<'_> {
        KvEndpoint::new(self)
    }

    /// Sessions.
    pub fn session(&self) -> SessionEndpoint<'_> {
        SessionEndpoint::new(self)
    }

    /// Cluster status.
    pub fn status(&self) -> StatusEndpoint<'_> {
        StatusEndpoint::new(self)
    }

    /// The KV codec.
    pub fn codec(&self) -> &KvCodec {
        &self.codec
    }

    /// The pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Resolved agent address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
