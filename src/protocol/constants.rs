//! Protocol constants.

use std::time::Duration;

/// API version prefix of every endpoint path.
pub const API_PREFIX: &str = "/v1";

/// Port the agent listens on when none is given.
pub const DEFAULT_PORT: u16 = 8500;

/// Host used when an address names none.
pub const DEFAULT_HOST: &str = "localhost";

/// Server-side wait of a blocking query when none is requested.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(600);

/// Marker the agent puts in place of redacted secrets.
pub const HIDDEN_VALUE: &str = "<hidden>";

/// Response and request header names.
pub mod headers {
    /// Prefix of all Consul metadata headers (lowercase).
    pub const PREFIX: &str = "x-consul-";
    /// Raft index of the returned data.
    pub const INDEX: &str = "X-Consul-Index";
    /// Whether the answering server knew a leader.
    pub const KNOWN_LEADER: &str = "X-Consul-KnownLeader";
    /// Milliseconds since the answering server last heard from the leader.
    pub const LAST_CONTACT: &str = "X-Consul-LastContact";
    /// ACL token.
    pub const TOKEN: &str = "X-Consul-Token";
    /// Whether addresses were translated for the WAN.
    pub const TRANSLATE_ADDRESSES: &str = "X-Consul-Translate-Addresses";
    /// Content type header.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// JSON media type.
    pub const APPLICATION_JSON: &str = "application/json";
}

/// Query parameter names.
pub mod params {
    /// ACL token.
    pub const TOKEN: &str = "token";
    /// Blocking query index.
    pub const INDEX: &str = "index";
    /// Blocking query wait.
    pub const WAIT: &str = "wait";
    /// Strongly consistent read.
    pub const CONSISTENT: &str = "consistent";
    /// Stale read.
    pub const STALE: &str = "stale";
    /// Datacenter.
    pub const DC: &str = "dc";
}
