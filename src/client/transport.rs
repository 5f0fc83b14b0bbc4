//! Terminal pipeline stage: the HTTP send.
//!
//! [`Transport`] is the only place where a call leaves the process. The
//! pipeline hands it a fully prepared [`Request`] and gets back a
//! [`Response`] whose body has been read to the end and decoded. Status
//! codes are not interpreted here.

use crate::client::config::ClientConfig;
use crate::error::{ConsulError, Result};
use crate::protocol::address::Address;
use crate::protocol::constants::headers::APPLICATION_JSON;
use crate::types::{Body, Method, Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Sends prepared requests to the agent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and read the full response.
    async fn send(&self, request: &Request) -> Result<Response>;
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a transport for `address`.
    pub fn new(address: &Address, config: &ClientConfig) -> Result<Self> {
        let base_url = address.base_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| ConsulError::Transport(e.to_string()))?;

        Ok(ReqwestTransport { client, base_url })
    }

    /// Base URL every request path is joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &Request) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&request.path);
        let pairs: Vec<(&String, String)> = request
            .params
            .iter()
            .filter_map(|(k, v)| v.render().map(|v| (k, v)))
            .collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        url
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Decode a response body according to its content type.
///
/// JSON bodies that fail to parse are kept as bytes.
pub fn decode_body(content_type: Option<&str>, raw: Bytes) -> Body {
    if raw.is_empty() {
        return Body::Empty;
    }
    let is_json = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with(APPLICATION_JSON))
        .unwrap_or(false);
    if is_json {
        if let Ok(value) = serde_json::from_slice(&raw) {
            return Body::Json(value);
        }
    }
    Body::Bytes(raw)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let url = self.url_for(request);
        let mut req_builder = self.client.request(reqwest_method(request.method), url);

        for (k, v) in &request.headers {
            req_builder = req_builder.header(k, v);
        }
        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| ConsulError::Transport(e.to_string()))?;

        let status = response.status().as_u16();

        let mut headers = BTreeMap::new();
        for (k, v) in response.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_ascii_lowercase(), val.to_string());
            }
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| ConsulError::Transport(e.to_string()))?;
        let body = decode_body(headers.get("content-type").map(String::as_str), raw);

        Ok(Response {
            status,
            headers,
            body,
            method: request.method,
            path: request.path.clone(),
        })
    }
}
