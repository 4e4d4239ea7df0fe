//! Cancellable typed feeds over store subscriptions.
//!
//! A `Feed` owns a background task that reads raw payloads from a
//! [`Subscription`], decodes them, and forwards them through a bounded mpsc
//! queue. Cancelling the token (or closing/dropping the feed) stops the task;
//! the task releases the subscription and runs its end hook before it
//! finishes, so a consumer that sees `None` sees the hook's effects too.

use std::future::{self, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use parley_types::error::CodecError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::Subscription;

/// A typed, cancellable sequence of items decoded from a subscription.
pub struct Feed<T> {
    rx: mpsc::Receiver<T>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Feed<T> {
    /// Start forwarding decoded payloads from `subscription`.
    ///
    /// The feed runs under a child of `parent`, so cancelling the parent
    /// (e.g. the caller's request scope) ends it. A payload that fails to
    /// decode is logged and ends the feed.
    pub fn spawn<F>(
        subscription: Subscription,
        parent: &CancellationToken,
        buffer: usize,
        decode: F,
    ) -> Self
    where
        F: Fn(&str) -> Result<T, CodecError> + Send + 'static,
    {
        Self::spawn_with(subscription, parent, buffer, decode, future::ready(()))
    }

    /// Like [`spawn`](Self::spawn), running `on_end` once the feed stops
    /// for any reason (cancel, close, drop, source end, decode failure).
    pub fn spawn_with<F, E>(
        mut subscription: Subscription,
        parent: &CancellationToken,
        buffer: usize,
        decode: F,
        on_end: E,
    ) -> Self
    where
        F: Fn(&str) -> Result<T, CodecError> + Send + 'static,
        E: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let channel = subscription.channel().to_string();
            debug!(%channel, "feed started");

            loop {
                let payload = tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!(%channel, "feed cancelled");
                        break;
                    }
                    payload = subscription.recv() => payload,
                };

                let Some(payload) = payload else {
                    debug!(%channel, "feed source closed");
                    break;
                };

                let item = match decode(&payload) {
                    Ok(item) => item,
                    Err(e) => {
                        warn!(%channel, error = %e, "undecodable payload, ending feed");
                        break;
                    }
                };

                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!(%channel, "feed cancelled");
                        break;
                    }
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            debug!(%channel, "feed consumer gone");
                            break;
                        }
                    }
                }
            }

            subscription.close();
            on_end.await;
            drop(tx);
        });

        Self {
            rx,
            token,
            task: Some(task),
        }
    }
}

impl<T> Feed<T> {
    /// Next item, or None once the feed has ended and drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Signal the background task to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the feed and wait until its subscription has been released.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "feed task failed");
            }
        }
    }
}

impl<T> Stream for Feed<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
