//! Agent address resolution.
//!
//! An address can be given in several shapes:
//!
//! | Input | Example | Result |
//! |-------|---------|--------|
//! | String | `"http://10.0.0.1:8500"` | protocol, host and port |
//! | String without scheme | `"10.0.0.1:8500"` | host and port, fallback protocol |
//! | Host/port pair | `("10.0.0.1", 8500)` | host and port |
//! | Port | `8500` | port only |
//! | Address | `Address { .. }` | returned unchanged |
//!
//! Missing parts are filled from caller-supplied fallbacks.
//!
//! # Examples
//!
//! ```
//! use consul_http::protocol::{resolve_address, Protocol};
//!
//! let addr = resolve_address("tcp://127.0.0.1:8501", Some(Protocol::Http), Some("localhost")).unwrap();
//! assert_eq!(addr.protocol, Some(Protocol::Tcp));
//! assert_eq!(addr.host.as_deref(), Some("127.0.0.1"));
//! assert_eq!(addr.port, Some(8501));
//!
//! let addr = resolve_address(9000u16, Some(Protocol::Http), Some("localhost")).unwrap();
//! assert_eq!(addr.to_string(), "http://localhost:9000");
//! ```

use crate::error::{ConsulError, Result};
use crate::protocol::constants::{DEFAULT_HOST, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

/// Transport protocol named by an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
    /// TCP, spoken as HTTP
    Tcp,
    /// UDP
    Udp,
    /// Unix domain socket
    Unix,
}

impl Protocol {
    /// Scheme name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Unix => "unix",
        }
    }

    const ALL: [Protocol; 5] = [
        Protocol::Http,
        Protocol::Https,
        Protocol::Tcp,
        Protocol::Udp,
        Protocol::Unix,
    ];
}

/// A resolved agent address. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Address {
    /// Protocol
    pub protocol: Option<Protocol>,
    /// Host name, IP, or socket path for `unix`
    pub host: Option<String>,
    /// TCP/UDP port
    pub port: Option<u16>,
}

impl Address {
    /// Base URL of the HTTP API, e.g. `http://127.0.0.1:8500/`.
    ///
    /// Only `http`, `https` and `tcp` (spoken as HTTP) addresses can be
    /// reached over HTTP.
    pub fn base_url(&self) -> Result<Url> {
        let scheme = match self.protocol {
            None | Some(Protocol::Http) | Some(Protocol::Tcp) => "http",
            Some(Protocol::Https) => "https",
            Some(other) => {
                return Err(ConsulError::InvalidAddress(format!(
                    "{} addresses cannot carry HTTP requests",
                    other.as_str()
                )))
            }
        };
        let host = self.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = self.port.unwrap_or(DEFAULT_PORT);
        Url::parse(&format!("{}://{}:{}/", scheme, host, port))
            .map_err(|e| ConsulError::InvalidAddress(format!("{}: {}", self, e)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}",
            self.protocol.unwrap_or(Protocol::Http).as_str(),
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }
}

/// The accepted input shapes of [`resolve_address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec {
    /// `[scheme://]host[:port]`
    Text(String),
    /// Host and port
    HostPort(String, u16),
    /// Port only
    Port(u16),
    /// Already resolved
    Resolved(Address),
}

impl From<&str> for AddressSpec {
    fn from(value: &str) -> Self {
        AddressSpec::Text(value.to_string())
    }
}

impl From<String> for AddressSpec {
    fn from(value: String) -> Self {
        AddressSpec::Text(value)
    }
}

impl From<(&str, u16)> for AddressSpec {
    fn from((host, port): (&str, u16)) -> Self {
        AddressSpec::HostPort(host.to_string(), port)
    }
}

impl From<(String, u16)> for AddressSpec {
    fn from((host, port): (String, u16)) -> Self {
        AddressSpec::HostPort(host, port)
    }
}

impl From<u16> for AddressSpec {
    fn from(port: u16) -> Self {
        AddressSpec::Port(port)
    }
}

impl From<Address> for AddressSpec {
    fn from(address: Address) -> Self {
        AddressSpec::Resolved(address)
    }
}

impl TryFrom<&Value> for AddressSpec {
    type Error = ConsulError;

    /// Accepts a string, an integer port, or a `[host, port]` pair.
    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(AddressSpec::Text(text.clone())),
            Value::Number(n) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .map(AddressSpec::Port)
                .ok_or_else(|| ConsulError::InvalidAddress(format!("bad port: {}", n))),
            Value::Array(pair) if pair.len() == 2 => {
                let host = pair[0]
                    .as_str()
                    .ok_or_else(|| ConsulError::InvalidAddress(format!("bad host: {}", pair[0])))?;
                let port = match &pair[1] {
                    Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                }
                .ok_or_else(|| ConsulError::InvalidAddress(format!("bad port: {}", pair[1])))?;
                Ok(AddressSpec::HostPort(host.to_string(), port))
            }
            other => Err(ConsulError::InvalidAddress(format!(
                "unsupported address value: {}",
                other
            ))),
        }
    }
}

/// Resolve an address, filling missing parts from the fallbacks.
pub fn resolve_address(
    spec: impl Into<AddressSpec>,
    protocol: Option<Protocol>,
    host: Option<&str>,
) -> Result<Address> {
    let fallback_host = host.map(str::to_string);
    match spec.into() {
        AddressSpec::Resolved(address) => Ok(address),
        AddressSpec::Port(port) => Ok(Address {
            protocol,
            host: fallback_host,
            port: Some(port),
        }),
        AddressSpec::HostPort(h, port) => Ok(Address {
            protocol,
            host: non_empty(h).or(fallback_host),
            port: Some(port),
        }),
        AddressSpec::Text(text) => parse_text(&text, protocol, fallback_host),
    }
}

fn parse_text(text: &str, protocol: Option<Protocol>, host: Option<String>) -> Result<Address> {
    let text = text.trim();
    let (scheme, rest) = match Protocol::ALL
        .iter()
        .find_map(|p| text.strip_prefix(&format!("{}://", p.as_str())).map(|r| (*p, r)))
    {
        Some((p, rest)) => (Some(p), rest),
        None if text.contains("://") => {
            return Err(ConsulError::InvalidAddress(format!(
                "unsupported scheme in {}",
                text
            )))
        }
        None => (None, text),
    };
    let protocol = scheme.or(protocol);

    if protocol == Some(Protocol::Unix) {
        return Ok(Address {
            protocol,
            host: non_empty(rest.to_string()).or(host),
            port: None,
        });
    }

    let rest = rest.trim_end_matches('/');
    let (h, port) = if let Some(inner) = rest.strip_prefix('[') {
        let (v6, tail) = inner
            .split_once(']')
            .ok_or_else(|| ConsulError::InvalidAddress(format!("unclosed bracket in {}", text)))?;
        (format!("[{}]", v6), tail.strip_prefix(':').unwrap_or(tail))
    } else {
        match rest.split_once(':') {
            Some((h, p)) => (h.to_string(), p),
            None => (rest.to_string(), ""),
        }
    };

    let port = if port.is_empty() {
        None
    } else {
        Some(
            port.parse::<u16>()
                .map_err(|_| ConsulError::InvalidAddress(format!("bad port in {}", text)))?,
        )
    };

    Ok(Address {
        protocol,
        host: non_empty(h).or(host),
        port,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
