//! Endpoint wrappers.
//!
//! Each wrapper borrows a [`ConsulClient`](crate::ConsulClient), builds a
//! [`Request`](crate::types::Request) for one REST resource and interprets
//! the decoded body. None of them touch the network directly.

pub mod kv;
pub mod session;
pub mod status;
pub mod txn;

pub use kv::KvEndpoint;
pub use session::{SessionBehavior, SessionEndpoint, SessionInfo, SessionSpec};
pub use status::StatusEndpoint;
pub use txn::{Operation, TransactionBuilder, TxnFailure, Verb};

use crate::protocol::constants::params;
use crate::types::{Blocking, ConsistencyMode, Request};

/// Options shared by read calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Datacenter; the agent's own when `None`
    pub dc: Option<String>,
    /// Blocking query to perform
    pub watch: Option<Blocking>,
    /// Forced consistency mode
    pub consistency: Option<ConsistencyMode>,
}

impl ReadOptions {
    /// Read from datacenter `dc`.
    pub fn dc(mut self, dc: impl Into<String>) -> Self {
        self.dc = Some(dc.into());
        self
    }

    /// Block until the resource moves past `watch`.
    pub fn watch(mut self, watch: Blocking) -> Self {
        self.watch = Some(watch);
        self
    }

    /// Force a consistency mode.
    pub fn consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub(crate) fn apply(self, request: Request) -> Request {
        request
            .with_param(params::DC, self.dc)
            .with_watch(self.watch)
            .with_consistency(self.consistency)
    }
}
