//! Consul response metadata.
//!
//! The agent reports server-side state in `X-Consul-*` response headers.
//! Header names are matched case-insensitively, the vendor prefix is
//! stripped, the remainder is mapped to a canonical name and the value is
//! JSON-decoded so booleans and integers arrive typed.
//!
//! | Header | Canonical | Field |
//! |--------|-----------|-------|
//! | `X-Consul-Index` | `Index` | [`ResponseMeta::last_index`] |
//! | `X-Consul-KnownLeader` | `KnownLeader` | [`ResponseMeta::known_leader`] |
//! | `X-Consul-LastContact` | `LastContact` | [`ResponseMeta::last_contact`] (milliseconds) |
//! | `X-Consul-Token` | `Token` | `extra["Token"]` |
//! | `X-Consul-Translate-Addresses` | `Translate-Addresses` | `extra["Translate-Addresses"]` |
//! | any other `X-Consul-*` | suffix, each `-` part capitalized | `extra[suffix]` |
//!
//! Extraction never fails. A value that is not valid JSON becomes `null`.
//!
//! # Examples
//!
//! ```
//! use consul_http::protocol::ResponseMeta;
//! use std::time::Duration;
//!
//! let meta = ResponseMeta::from_pairs([
//!     ("X-Consul-Index", "42"),
//!     ("x-consul-knownleader", "true"),
//!     ("X-Consul-LastContact", "15"),
//! ]);
//! assert_eq!(meta.last_index, Some(42));
//! assert_eq!(meta.known_leader, Some(true));
//! assert_eq!(meta.last_contact, Some(Duration::from_millis(15)));
//! ```

use crate::protocol::constants::HIDDEN_VALUE;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Server-side metadata carried by a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    /// Raft index of the returned data
    pub last_index: Option<u64>,
    /// Time since the answering server last heard from the leader
    pub last_contact: Option<Duration>,
    /// Whether the answering server knew a leader
    pub known_leader: Option<bool>,
    /// Other `X-Consul-*` headers, keyed by canonical name
    pub extra: BTreeMap<String, Value>,
}

fn vendor_header() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^x-consul-(.+)$").ok())
        .as_ref()
}

/// Map a stripped header suffix to its canonical name.
fn canonical_name(suffix: &str) -> String {
    match suffix.to_ascii_lowercase().as_str() {
        "index" => "Index".to_string(),
        "knownleader" => "KnownLeader".to_string(),
        "lastcontact" => "LastContact".to_string(),
        "token" => "Token".to_string(),
        "translate-addresses" => "Translate-Addresses".to_string(),
        other => other
            .split('-')
            .map(capitalize)
            .collect::<Vec<_>>()
            .join("-"),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

impl ResponseMeta {
    /// Extract metadata from a header map.
    pub fn from_headers(headers: &BTreeMap<String, String>) -> Self {
        Self::from_pairs(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Extract metadata from `(name, value)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut meta = ResponseMeta::default();
        let Some(pattern) = vendor_header() else {
            return meta;
        };

        for (name, value) in pairs {
            let Some(captures) = pattern.captures(name) else {
                continue;
            };
            let Some(suffix) = captures.get(1) else {
                continue;
            };
            let decoded: Value = serde_json::from_str(value.trim()).unwrap_or(Value::Null);

            match canonical_name(suffix.as_str()).as_str() {
                "Index" => meta.last_index = decoded.as_u64(),
                "KnownLeader" => meta.known_leader = decoded.as_bool(),
                "LastContact" => meta.last_contact = decoded.as_u64().map(Duration::from_millis),
                other => {
                    meta.extra.insert(other.to_string(), decoded);
                }
            }
        }

        meta
    }

    /// The `X-Consul-Token` value, if the agent sent one.
    pub fn token(&self) -> Option<&Value> {
        self.extra.get("Token")
    }

    /// Whether addresses in the body were translated for the WAN.
    pub fn translate_addresses(&self) -> Option<bool> {
        self.extra.get("Translate-Addresses").and_then(Value::as_bool)
    }
}

/// Check for the marker the agent puts in place of redacted secrets.
pub fn is_hidden(value: &Value) -> bool {
    value.as_str() == Some(HIDDEN_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_known_headers() {
        let meta = ResponseMeta::from_pairs([
            ("X-Consul-Index", "1042"),
            ("X-Consul-KnownLeader", "false"),
            ("X-Consul-LastContact", "0"),
        ]);
        assert_eq!(meta.last_index, Some(1042));
        assert_eq!(meta.known_leader, Some(false));
        assert_eq!(meta.last_contact, Some(Duration::ZERO));
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let meta = ResponseMeta::from_pairs([("X-CONSUL-INDEX", "7"), ("x-consul-knownleader", "true")]);
        assert_eq!(meta.last_index, Some(7));
        assert_eq!(meta.known_leader, Some(true));
    }

    #[test]
    fn test_extra_headers() {
        let meta = ResponseMeta::from_pairs([
            ("x-consul-translate-addresses", "true"),
            ("X-Consul-Effective-Consistency", "\"leader\""),
            ("Content-Type", "application/json"),
        ]);
        assert_eq!(meta.translate_addresses(), Some(true));
        assert_eq!(meta.extra.get("Effective-Consistency"), Some(&json!("leader")));
        assert_eq!(meta.extra.len(), 2);
    }

    #[test]
    fn test_extra_names_are_canonical() {
        let lower = ResponseMeta::from_pairs([("x-consul-effective-consistency", "\"stale\"")]);
        let upper = ResponseMeta::from_pairs([("X-CONSUL-EFFECTIVE-CONSISTENCY", "\"stale\"")]);
        assert_eq!(lower.extra.get("Effective-Consistency"), Some(&json!("stale")));
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_malformed_values_degrade_to_null() {
        let meta = ResponseMeta::from_pairs([
            ("X-Consul-Index", "not-a-number"),
            ("X-Consul-KnownLeader", "yes"),
            ("X-Consul-Token", "abc-123"),
        ]);
        assert_eq!(meta.last_index, None);
        assert_eq!(meta.known_leader, None);
        assert_eq!(meta.token(), Some(&Value::Null));
    }

    #[test]
    fn test_hidden_marker() {
        let meta = ResponseMeta::from_pairs([("X-Consul-Token", "\"<hidden>\"")]);
        assert!(meta.token().map(is_hidden).unwrap_or(false));
        assert!(!is_hidden(&json!("secret")));
    }
}
