//! Consul HTTP client implementation.
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── config       - ClientConfig and runtime Settings
//! ├── transport    - Transport trait and the reqwest implementation
//! ├── pipeline     - Middleware stages and the Pipeline
//! ├── blocking     - Long-poll loop of blocking queries
//! ├── subscription - Background watches streamed over a channel
//! └── fetch        - ConsulClient
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConsulClient`] | Entry point to the agent |
//! | [`ClientConfig`] | Client configuration options |
//! | [`Pipeline`] | Ordered middleware stages in front of a transport |
//! | [`Middleware`] | One request-transforming stage |
//! | [`Transport`] | Terminal stage sending the request |
//! | [`Subscription`] | Stream of changes of a watched resource |
//!
//! # Examples
//!
//! ## Custom configuration
//!
//! ```
//! use consul_http::client::{BoolTokens, ClientConfig, ConsulClient};
//!
//! let config = ClientConfig {
//!     token: Some("acl-token".to_string()),
//!     bool_tokens: BoolTokens::Numeric,
//!     default_wait_secs: 60,
//!     ..Default::default()
//! };
//! let client = ConsulClient::with_config(config).unwrap();
//! assert_eq!(client.token().as_deref(), Some("acl-token"));
//! ```
//!
//! ## Watching a key
//!
//! ```ignore
//! use consul_http::{Blocking, ConsulClient};
//! use consul_http::endpoints::ReadOptions;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = ConsulClient::new()?;
//! let current = client.kv().get("service/web/leader", ReadOptions::default()).await?;
//! let changed = client
//!     .kv()
//!     .wait_for_change("service/web/leader", Blocking::from_entry(&current.value), &CancellationToken::new())
//!     .await?;
//! ```

mod blocking;
mod config;
mod fetch;
mod pipeline;
mod subscription;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use blocking::wait_for_change;
pub use config::{BoolTokens, ClientConfig, Settings, SharedSettings, ENV_HTTP_ADDR, ENV_HTTP_TOKEN};
pub use fetch::ConsulClient;
pub use pipeline::{
    prune_nulls, BlockingStage, ConsistencyStage, JsonBodyStage, Middleware, NormalizeStage,
    Pipeline, TokenStage,
};
pub use subscription::Subscription;
pub use transport::{decode_body, ReqwestTransport, Transport};
