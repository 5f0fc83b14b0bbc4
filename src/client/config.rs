//! Client configuration.
//!
//! [`ClientConfig`] is fixed once a client is built. The ACL token and the
//! default consistency mode can change at runtime; they live in [`Settings`]
//! behind a shared lock, and every call takes a snapshot of them when it
//! enters the pipeline.

use crate::types::ConsistencyMode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the agent address.
pub const ENV_HTTP_ADDR: &str = "CONSUL_HTTP_ADDR";
/// Environment variable holding the ACL token.
pub const ENV_HTTP_TOKEN: &str = "CONSUL_HTTP_TOKEN";

/// Wire tokens used for boolean query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolTokens {
    /// `"true"` / `"false"`
    #[default]
    TrueFalse,
    /// `"1"` / `"0"`
    Numeric,
}

impl BoolTokens {
    /// Render a boolean.
    pub fn render(self, value: bool) -> &'static str {
        match (self, value) {
            (BoolTokens::TrueFalse, true) => "true",
            (BoolTokens::TrueFalse, false) => "false",
            (BoolTokens::Numeric, true) => "1",
            (BoolTokens::Numeric, false) => "0",
        }
    }
}

/// Configuration for the Consul client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Agent address, e.g. `http://127.0.0.1:8500`
    pub address: String,
    /// ACL token sent with every call
    pub token: Option<String>,
    /// Default consistency mode of reads
    pub consistency: Option<ConsistencyMode>,
    /// Rendering of boolean query parameters
    pub bool_tokens: BoolTokens,
    /// Server-side wait of blocking queries that request none, in seconds
    pub default_wait_secs: u64,
    /// Request timeout in milliseconds; must exceed the longest blocking wait
    pub request_timeout_ms: u64,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
    /// Emit per-request debug logs
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: "http://127.0.0.1:8500".to_string(),
            token: None,
            consistency: None,
            bool_tokens: BoolTokens::default(),
            default_wait_secs: 600,
            request_timeout_ms: 15 * 60 * 1000,
            max_idle_per_host: 16,
            enable_logging: true,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `CONSUL_HTTP_ADDR` and `CONSUL_HTTP_TOKEN`.
    pub fn from_env() -> Self {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values found through `lookup`. Empty values are ignored.
    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(address) = non_empty(ENV_HTTP_ADDR) {
            self.address = address;
        }
        if let Some(token) = non_empty(ENV_HTTP_TOKEN) {
            self.token = Some(token);
        }
        self
    }

    /// Wait of blocking queries that request none.
    pub fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Runtime-mutable client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// ACL token
    pub token: Option<String>,
    /// Default consistency mode
    pub consistency: Option<ConsistencyMode>,
}

impl Settings {
    /// Initial settings of a client built from `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Settings {
            token: config.token.clone(),
            consistency: config.consistency,
        }
    }
}

/// Settings shared between a client and its pipeline stages.
pub type SharedSettings = Arc<RwLock<Settings>>;
