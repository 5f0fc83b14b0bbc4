#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Consul HTTP client
//!
//! An async client for the [Consul HTTP API](https://developer.hashicorp.com/consul/api-docs).
//!
//! ## Overview
//!
//! Every call goes through one [`ConsulClient::request`] entry point and a
//! configurable [`Pipeline`](client::Pipeline) of middleware stages:
//!
//! 1. **Token** - the ACL token, unless the call sets its own
//! 2. **Blocking** - `index`/`wait` of long-poll reads
//! 3. **Consistency** - one of `consistent`, `stale`, or neither
//! 4. **JSON body** - null fields pruned, `Content-Type` set
//! 5. **Normalize** - null parameters dropped, booleans rendered as wire tokens
//!
//! The transport sends the request and the response status is mapped once
//! onto [`ConsulError`]:
//!
//! | Status | Error |
//! |--------|-------|
//! | `401`, `403` | [`ConsulError::Unauthorized`] |
//! | `404` | [`ConsulError::NotFound`] |
//! | `409` | [`ConsulError::Conflict`] (or [`ConsulError::Transaction`] on `/v1/txn`) |
//! | other `>= 400` | [`ConsulError::Service`] |
//!
//! ## Key Features
//!
//! - **Blocking queries**: [`client::wait_for_change`] re-polls on timeouts
//!   and returns the first real change; [`client::Subscription`] streams them
//! - **Typed KV values**: the entry flags select a codec from a
//!   [`CodecRegistry`](codec::CodecRegistry) (bytes, string, integer, list, mapping)
//! - **Atomic transactions**: [`TransactionBuilder`] keeps its operations
//!   until a submission succeeds
//! - **Response metadata**: every value comes with its [`ResponseMeta`]
//!
//! ## Client Usage
//!
//! ```ignore
//! use consul_http::{ConsulClient, KvValue};
//! use consul_http::endpoints::ReadOptions;
//!
//! #[tokio::main]
//! async fn main() -> consul_http::Result<()> {
//!     let client = ConsulClient::new()?;
//!
//!     client.kv().set("service/web/replicas", 3i64).await?;
//!     let entry = client.kv().get("service/web/replicas", ReadOptions::default()).await?;
//!     assert_eq!(entry.value.value, Some(KvValue::Integer(3)));
//!
//!     let mut txn = client.kv().prepare();
//!     txn.cas("service/web/replicas", 4i64, &entry.value)
//!         .set("service/web/updated-by", "deploy");
//!     txn.execute().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[types]** - Requests, responses, parameters, consistency and blocking types
//! - **[error]** - Error types and result handling
//! - **[protocol]** - Addresses, metadata headers, status mapping, consistency rules
//! - **[client]** - Client, pipeline, transport, blocking loop, subscriptions
//! - **[codec]** - Flags-based KV value codec
//! - **[endpoints]** - KV, transactions, sessions, status

pub mod client;
pub mod codec;
pub mod endpoints;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::{ClientConfig, ConsulClient, Subscription};
pub use codec::{KvCodec, KvEntry, KvValue};
pub use endpoints::{Operation, ReadOptions, TransactionBuilder};
pub use error::{ConsulError, Result};
pub use protocol::ResponseMeta;
pub use types::{Blocking, ConsistencyMode, ConsulValue, Identifier, ModifyIndex, Request, Response};

#[cfg(test)]
mod tests;
