//! Consistency mode resolution.
//!
//! Three signals decide the consistency of a read, highest precedence first:
//!
//! 1. an explicit per-call mode,
//! 2. `consistent`/`stale` flags already present in the query parameters,
//! 3. the client-level default.
//!
//! The outcome is always exactly one of `consistent=true`, `stale=true`, or
//! neither. When the pre-set flags name both, `consistent` wins. A pre-set
//! flag that is present but false counts as an explicit choice of the
//! default mode; a `Null` flag counts as absent.
//!
//! # Examples
//!
//! ```
//! use consul_http::protocol::resolve_consistency;
//! use consul_http::types::{ConsistencyMode, ParamValue, Params};
//!
//! let mut params = Params::new();
//! params.insert("stale".to_string(), ParamValue::Bool(true));
//!
//! // The explicit argument beats the pre-set flag.
//! let mode = resolve_consistency(Some(ConsistencyMode::Consistent), &params, None);
//! assert_eq!(mode, ConsistencyMode::Consistent);
//!
//! // The pre-set flag beats the client default.
//! let mode = resolve_consistency(None, &params, Some(ConsistencyMode::Consistent));
//! assert_eq!(mode, ConsistencyMode::Stale);
//! ```

use crate::protocol::constants::params::{CONSISTENT, STALE};
use crate::types::{ConsistencyMode, ParamValue, Params};

/// Pick the consistency mode for a request.
pub fn resolve_consistency(
    explicit: Option<ConsistencyMode>,
    params: &Params,
    default: Option<ConsistencyMode>,
) -> ConsistencyMode {
    explicit
        .or_else(|| preset(params))
        .or(default)
        .unwrap_or_default()
}

/// The mode named by flags already in the parameters, if any.
fn preset(params: &Params) -> Option<ConsistencyMode> {
    let present = |key: &str| params.get(key).filter(|v| !v.is_null());
    match (present(CONSISTENT), present(STALE)) {
        (None, None) => None,
        (Some(c), _) if c.is_truthy() => Some(ConsistencyMode::Consistent),
        (_, Some(s)) if s.is_truthy() => Some(ConsistencyMode::Stale),
        _ => Some(ConsistencyMode::Default),
    }
}

/// Rewrite the consistency flags of `params` to express `mode`.
pub fn apply_consistency(mode: ConsistencyMode, params: &mut Params) {
    params.remove(CONSISTENT);
    params.remove(STALE);
    match mode {
        ConsistencyMode::Consistent => {
            params.insert(CONSISTENT.to_string(), ParamValue::Bool(true));
        }
        ConsistencyMode::Stale => {
            params.insert(STALE.to_string(), ParamValue::Bool(true));
        }
        ConsistencyMode::Default => {}
    }
}
