//! Background watches.
//!
//! A [`Subscription`] runs [`wait_for_change`] in a loop on a spawned task
//! and streams every change it sees over a channel. After each change the
//! watch moves on to the index that change reported, keeping the requested
//! wait.
//!
//! The first error ends the subscription: it is delivered as the last item
//! and the task exits. Cancelling, or dropping the subscription, abandons
//! the poll in flight and stops the task without touching other calls on
//! the client.
//!
//! # Examples
//!
//! ```ignore
//! use consul_http::{ConsulClient, Blocking};
//! use futures::StreamExt;
//!
//! let client = ConsulClient::new()?;
//! let entry = client.kv().get("config/app", Default::default()).await?;
//! let mut changes = client.kv().subscribe("config/app", Blocking::from_entry(&entry.value));
//!
//! while let Some(change) = changes.next().await {
//!     let change = change?;
//!     println!("now at index {:?}", change.meta.last_index);
//! }
//! ```

use crate::client::blocking::wait_for_change;
use crate::error::{ConsulError, Result};
use crate::types::{Blocking, ConsulValue};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 16;

/// A stream of changes produced by a background watch.
pub struct Subscription<T> {
    receiver: ReceiverStream<Result<ConsulValue<T>>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Subscription<T> {
    /// Start watching from `since`. `fetch` performs one blocking read.
    pub fn spawn<F, Fut>(since: Blocking, cancel: CancellationToken, mut fetch: F) -> Self
    where
        F: FnMut(Blocking) -> Fut + Send + 'static,
        Fut: Future<Output = Result<ConsulValue<T>>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut since = since;
            loop {
                let result = tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    result = wait_for_change(since.clone(), &task_cancel, &mut fetch) => result,
                };
                match result {
                    Ok(change) => {
                        let next = Blocking::from_meta(&change.meta);
                        if tx.send(Ok(change)).await.is_err() {
                            return; // Receiver dropped
                        }
                        since = match (next, since.wait()) {
                            (Some(next), Some(wait)) => next.with_wait(wait),
                            (Some(next), None) => next,
                            // Without an index there is nothing left to block on.
                            (None, _) => return,
                        };
                    }
                    Err(ConsulError::Cancelled) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        Subscription {
            receiver: ReceiverStream::new(rx),
            cancel,
        }
    }
}

impl<T> Subscription<T> {
    /// Receive the next change; `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<Result<ConsulValue<T>>> {
        futures::StreamExt::next(&mut self.receiver).await
    }

    /// Stop the watch, abandoning any poll in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if the watch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<ConsulValue<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::meta::ResponseMeta;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::future::ready;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn answer(index: u64, body: u32) -> Result<ConsulValue<u32>> {
        Ok(ConsulValue::new(
            body,
            ResponseMeta {
                last_index: Some(index),
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_streams_changes_and_advances_index() {
        let script = Arc::new(Mutex::new(VecDeque::from(vec![
            answer(1, 0),
            answer(2, 1),
            answer(2, 99),
            answer(3, 2),
            Err(ConsulError::Transport("gone".into())),
        ])));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let fetch_script = script.clone();
        let fetch_seen = seen.clone();
        let mut sub = Subscription::spawn(
            Blocking::since(1u64).with_wait(Duration::from_secs(5)),
            CancellationToken::new(),
            move |watch| {
                fetch_seen.lock().push((watch.index(), watch.wait()));
                let next = fetch_script
                    .lock()
                    .pop_front()
                    .unwrap_or(Err(ConsulError::Cancelled));
                ready(next)
            },
        );

        assert_eq!(sub.next().await.unwrap().unwrap().value, 1);
        assert_eq!(sub.next().await.unwrap().unwrap().value, 2);
        assert!(matches!(sub.next().await, Some(Err(ConsulError::Transport(_)))));
        assert!(sub.next().await.is_none());

        let wait = Some(Duration::from_secs(5));
        assert_eq!(
            *seen.lock(),
            vec![(1, wait), (1, wait), (2, wait), (2, wait), (3, wait)]
        );
    }

    /// Flags when the future holding it is dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_drop_abandons_inflight_poll() {
        let dropped = Arc::new(AtomicBool::new(false));
        let started = Arc::new(tokio::sync::Notify::new());

        let flag = dropped.clone();
        let poll_started = started.clone();
        let sub: Subscription<u32> = Subscription::spawn(
            Blocking::since(1u64),
            CancellationToken::new(),
            move |_| {
                let guard = DropFlag(flag.clone());
                let poll_started = poll_started.clone();
                async move {
                    let _guard = guard;
                    poll_started.notify_one();
                    std::future::pending::<Result<ConsulValue<u32>>>().await
                }
            },
        );

        started.notified().await;
        assert!(!dropped.load(Ordering::SeqCst));
        drop(sub);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_ends_stream() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sub = Subscription::spawn(Blocking::since(1u64), cancel, |_| ready(answer(2, 0)));
        assert!(sub.is_cancelled());
        assert!(sub.next().await.is_none());
    }
}
