//! Scripted transport for unit tests.

use crate::client::transport::Transport;
use crate::error::Result;
use crate::types::{Body, Request, Response};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Replays queued responses and records every request it is given.
/// An empty queue answers `200` with no body.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<(u16, BTreeMap<String, String>, Body)>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response with an `X-Consul-Index` header.
    pub fn push_json(&self, status: u16, index: Option<u64>, body: Value) -> &Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        if let Some(index) = index {
            headers.insert("x-consul-index".to_string(), index.to_string());
        }
        self.responses
            .lock()
            .push_back((status, headers, Body::Json(body)));
        self
    }

    /// Queue a response with a raw body.
    pub fn push_body(&self, status: u16, body: Body) -> &Self {
        self.responses
            .lock()
            .push_back((status, BTreeMap::new(), body));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        let (status, headers, body) = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or((200, BTreeMap::new(), Body::Empty));
        Ok(Response {
            status,
            headers,
            body,
            method: request.method,
            path: request.path.clone(),
        })
    }
}
