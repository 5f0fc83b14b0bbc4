//! Raft status of the datacenter.

use crate::client::ConsulClient;
use crate::error::Result;
use crate::protocol::constants::API_PREFIX;
use crate::types::{Request, Response};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

/// Status endpoint.
#[derive(Debug, Clone, Copy)]
pub struct StatusEndpoint<'a> {
    client: &'a ConsulClient,
}

impl<'a> StatusEndpoint<'a> {
    pub(crate) fn new(client: &'a ConsulClient) -> Self {
        StatusEndpoint { client }
    }

    async fn fetch(&self, what: &str) -> Result<Response> {
        let request = Request::get(format!("{}/status/{}", API_PREFIX, what));
        self.client.request(request).await
    }

    fn decode<T: DeserializeOwned + Default>(response: &Response) -> Result<T> {
        match response.body.to_value() {
            serde_json::Value::Null => Ok(T::default()),
            other => Ok(serde_json::from_value(other)?),
        }
    }

    /// Address of the Raft leader, e.g. `10.1.10.12:8300`. Empty while
    /// the cluster has no leader.
    pub async fn leader(&self) -> Result<String> {
        let response = self.fetch("leader").await?;
        Self::decode(&response)
    }

    /// Addresses of the Raft peers.
    pub async fn peers(&self) -> Result<BTreeSet<String>> {
        let response = self.fetch("peers").await?;
        Self::decode(&response)
    }
}
