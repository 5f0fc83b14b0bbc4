//! Mapping of response status codes onto the error taxonomy.
//!
//! | Status | Outcome |
//! |--------|---------|
//! | `< 400` | response passed through |
//! | `401`, `403` | [`ConsulError::Unauthorized`] |
//! | `404` | [`ConsulError::NotFound`] |
//! | `409` | [`ConsulError::Conflict`], body unwrapped from `Errors` when present |
//! | other `>= 400` | [`ConsulError::Service`] |
//!
//! The mapping runs once per call, after the whole body has been read.

use crate::error::{ConsulError, Result};
use crate::types::Response;
use serde_json::Value;

/// Check if a status code means the token was rejected.
pub fn is_access_denied_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Pass a successful response through, or turn it into the matching error.
pub fn render(response: Response) -> Result<Response> {
    if response.status < 400 {
        return Ok(response);
    }

    let meta = response.meta();
    let value = response.body.to_value();
    tracing::warn!(
        status = response.status,
        method = %response.method,
        path = %response.path,
        "Consul request failed: {}",
        value
    );

    Err(match response.status {
        status if is_access_denied_status(status) => ConsulError::Unauthorized {
            status,
            value,
            meta,
        },
        404 => ConsulError::NotFound { value, meta },
        409 => ConsulError::Conflict {
            value: unwrap_errors(value),
            meta,
        },
        status => ConsulError::Service {
            status,
            value,
            meta,
        },
    })
}

/// Take the nested `Errors` value out of a conflict body.
fn unwrap_errors(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("Errors") {
            Some(errors) => errors,
            None => Value::Object(map),
        },
        other => other,
    }
}
