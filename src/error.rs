//! Error types for the Consul HTTP client.
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose error
//! side is [`ConsulError`]. The variants form a closed taxonomy:
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | `InvalidAddress` | An agent address could not be parsed (never reaches the network) |
//! | `Unauthorized` | The agent answered `401` or `403` |
//! | `NotFound` | The agent answered `404` |
//! | `Conflict` | The agent answered `409` |
//! | `Transaction` | A `409` on `/v1/txn`, with per-operation failures |
//! | `Service` | Any other status `>= 400` |
//! | `Transport` | The HTTP call failed before a response arrived |
//!
//! Errors produced from a response carry the decoded body as `value` and the
//! [`ResponseMeta`] read from its headers as `meta`, so a caller can build a
//! precise diagnostic without looking at the raw response again.

use crate::endpoints::txn::{Operation, TxnFailure};
use crate::protocol::meta::ResponseMeta;
use serde_json::Value;

/// Result type for Consul operations.
pub type Result<T> = std::result::Result<T, ConsulError>;

/// Errors returned by the Consul client.
#[derive(Debug, thiserror::Error)]
pub enum ConsulError {
    /// The agent address is malformed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The agent rejected the ACL token (401 or 403).
    #[error("Unauthorized ({status}): {value}")]
    Unauthorized {
        /// HTTP status code, 401 or 403
        status: u16,
        /// Decoded response body
        value: Value,
        /// Metadata read from the response headers
        meta: ResponseMeta,
    },

    /// The requested resource does not exist (404).
    #[error("Not found: {value}")]
    NotFound {
        /// Decoded response body
        value: Value,
        /// Metadata read from the response headers
        meta: ResponseMeta,
    },

    /// The write conflicted with the current state (409).
    ///
    /// When the body is an object holding an `Errors` key, `value` is that
    /// nested value rather than the whole body.
    #[error("Conflict: {value}")]
    Conflict {
        /// Decoded response body, unwrapped from `Errors` when present
        value: Value,
        /// Metadata read from the response headers
        meta: ResponseMeta,
    },

    /// An atomic transaction was rolled back.
    #[error("Transaction rolled back: {} operation(s) failed", errors.len())]
    Transaction {
        /// Operations that failed, with their position in the submission
        errors: Vec<TxnFailure>,
        /// The unwrapped `Errors` value as the agent sent it
        value: Value,
        /// The full list of operations that was submitted
        operations: Vec<Operation>,
        /// Metadata read from the response headers
        meta: ResponseMeta,
    },

    /// Any other error status from the agent.
    #[error("Consul error ({status}): {value}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Decoded response body
        value: Value,
        /// Metadata read from the response headers
        meta: ResponseMeta,
    },

    /// Network or connection failure before a response was received.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A KV value could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A request was built with arguments the agent cannot accept.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A blocking query loop was stopped by its cancellation token.
    #[error("Blocking query cancelled")]
    Cancelled,
}

impl ConsulError {
    /// The decoded response body, for errors built from a response.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ConsulError::Unauthorized { value, .. }
            | ConsulError::NotFound { value, .. }
            | ConsulError::Conflict { value, .. }
            | ConsulError::Transaction { value, .. }
            | ConsulError::Service { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Response metadata, for errors built from a response.
    pub fn meta(&self) -> Option<&ResponseMeta> {
        match self {
            ConsulError::Unauthorized { meta, .. }
            | ConsulError::NotFound { meta, .. }
            | ConsulError::Conflict { meta, .. }
            | ConsulError::Transaction { meta, .. }
            | ConsulError::Service { meta, .. } => Some(meta),
            _ => None,
        }
    }

    /// The HTTP status this error was mapped from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConsulError::Unauthorized { status, .. } => Some(*status),
            ConsulError::NotFound { .. } => Some(404),
            ConsulError::Conflict { .. } | ConsulError::Transaction { .. } => Some(409),
            ConsulError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConsulError::NotFound { .. })
    }

    /// Check if this is a 409, including rolled back transactions.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ConsulError::Conflict { .. } | ConsulError::Transaction { .. }
        )
    }
}

impl From<base64::DecodeError> for ConsulError {
    fn from(err: base64::DecodeError) -> Self {
        ConsulError::Codec(format!("invalid base64 value: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_and_meta_accessors() {
        let err = ConsulError::NotFound {
            value: json!("missing"),
            meta: ResponseMeta::default(),
        };
        assert_eq!(err.value(), Some(&json!("missing")));
        assert!(err.meta().is_some());
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_local_errors_have_no_payload() {
        let err = ConsulError::InvalidAddress("bad".to_string());
        assert!(err.value().is_none());
        assert!(err.meta().is_none());
        assert!(err.status().is_none());
    }

    #[test]
    fn test_display() {
        let err = ConsulError::Service {
            status: 500,
            value: json!("boom"),
            meta: ResponseMeta::default(),
        };
        assert_eq!(err.to_string(), "Consul error (500): \"boom\"");
    }

    #[test]
    fn test_unauthorized_keeps_status() {
        for status in [401u16, 403] {
            let err = ConsulError::Unauthorized {
                status,
                value: json!("ACL not found"),
                meta: ResponseMeta::default(),
            };
            assert_eq!(err.status(), Some(status));
        }
    }

    #[test]
    fn test_transaction_carries_value() {
        let err = ConsulError::Transaction {
            errors: Vec::new(),
            value: json!("boom"),
            operations: Vec::new(),
            meta: ResponseMeta::default(),
        };
        assert_eq!(err.value(), Some(&json!("boom")));
        assert_eq!(err.status(), Some(409));
        assert!(err.is_conflict());
    }
}
