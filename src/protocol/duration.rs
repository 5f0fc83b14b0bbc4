//! Go-style duration strings, as used by `wait`, session TTLs and lock delays.
//!
//! # Examples
//!
//! ```
//! use consul_http::protocol::{format_duration, parse_duration};
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_secs(600)), "10m");
//! assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
//! assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
//! assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
//! ```

use crate::error::{ConsulError, Result};
use std::time::Duration;

/// Render a duration the way the agent parses it (`2h`, `10m`, `1m30s`, `250ms`).
///
/// Sub-second precision is kept only for durations shorter than a second.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        let millis = duration.as_millis();
        return if millis == 0 {
            "0s".to_string()
        } else {
            format!("{}ms", millis)
        };
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// Parse a duration string.
///
/// Accepts a sequence of `<number><unit>` pairs with units `h`, `m`, `s`,
/// `ms`, `us` and `ns`; fractional numbers are allowed (`1.5s`). A bare
/// number is read as seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let invalid = || ConsulError::Codec(format!("Invalid duration: {}", value));

    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_nanos: u128 = 0;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_len == 0 {
            return Err(invalid());
        }
        let number = &rest[..num_len];
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale: u64 = match &rest[..unit_len] {
            "h" => 3_600_000_000_000,
            "m" => 60_000_000_000,
            "s" => 1_000_000_000,
            "ms" => 1_000_000,
            "us" | "µs" => 1_000,
            "ns" => 1,
            _ => return Err(invalid()),
        };
        let part = if number.contains('.') {
            let n: f64 = number.parse().map_err(|_| invalid())?;
            (n * scale as f64).round() as u128
        } else {
            let n: u128 = number.parse().map_err(|_| invalid())?;
            n.checked_mul(scale as u128).ok_or_else(invalid)?
        };
        total_nanos = total_nanos.checked_add(part).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }

    let nanos = u64::try_from(total_nanos).map_err(|_| invalid())?;
    Ok(Duration::from_nanos(nanos))
}
