//! The client side of blocking queries.
//!
//! A blocking read returns either when the watched index moves or when the
//! server-side wait runs out. Both answer `200`; only the index tells them
//! apart. [`wait_for_change`] re-issues the call while the index stays put
//! and returns the first response that reports a different one.
//!
//! Errors are never retried. Cancellation is checked before each poll, so a
//! cancelled loop stops issuing requests but does not abort the one already
//! in flight; drop the returned future to do that.

use crate::error::{ConsulError, Result};
use crate::types::{Blocking, ConsulValue};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Poll `fetch` until the response index differs from `since`.
///
/// A response without an index is treated as a change.
pub async fn wait_for_change<T, F, Fut>(
    since: Blocking,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<ConsulValue<T>>
where
    F: FnMut(Blocking) -> Fut,
    Fut: Future<Output = Result<ConsulValue<T>>>,
{
    let mut polls: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ConsulError::Cancelled);
        }
        polls += 1;
        let value = fetch(since.clone()).await?;
        match value.meta.last_index {
            Some(index) if index == since.index() => {
                tracing::debug!(index, polls, "Blocking query timed out unchanged, polling again");
            }
            _ => return Ok(value),
        }
    }
}
