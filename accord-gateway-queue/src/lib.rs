//! # accord-gateway-queue
//!
//! Serialization of gateway identify handshakes.
//!
//! The service enforces a rate on how often new sessions may be created, so
//! shards must take turns identifying. A [`Queue`] hands out
//! [`IdentifyTicket`]s one at a time: a shard acquires a ticket before
//! sending IDENTIFY and holds it until the session is up (or the attempt
//! definitively failed). Dropping the ticket lets the next shard through
//! once the minimum gap between identifies has also passed.
//!
//! [`LocalQueue`] gates shards within one process. [`RemoteLockQueue`]
//! additionally holds locks on remote gate servers so that processes sharing
//! credentials serialize against each other.

#![deny(
    clippy::all,
    clippy::pedantic,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod remote;
mod ticket;

pub use self::{
    remote::{QueueError, QueueErrorType, RemoteLockQueue},
    ticket::IdentifyTicket,
};

use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep_until, Instant},
};

/// Minimum time between two identify handshakes under one gate.
pub const DEFAULT_IDENTIFY_GAP: Duration = Duration::from_secs(5);

/// Gate serializing identify handshakes across shards.
#[async_trait]
pub trait Queue: Debug + Send + Sync {
    /// Request permission to identify.
    ///
    /// Resolves once it is the requesting shard's turn. The returned ticket
    /// must be held until the shard's session is up or its identify attempt
    /// definitively failed; dropping the ticket frees the gate.
    ///
    /// # Errors
    ///
    /// Implementations coordinating with remote gates may fail when a
    /// remote is unreachable and fallback is not allowed.
    async fn acquire(&self, shard_id: [u64; 2]) -> Result<IdentifyTicket, QueueError>;
}

/// A pending request for the gate.
#[derive(Debug)]
struct Request {
    shard_id: [u64; 2],
    tx: oneshot::Sender<IdentifyTicket>,
}

/// A local, in-process identify gate of width one.
///
/// Requests resolve in FIFO order. After each grant the gate stays shut
/// until the ticket is released *and* the minimum gap since the grant has
/// passed, whichever is later.
///
/// If you run shards of the same bot across multiple processes you must not
/// use this implementation alone; see [`RemoteLockQueue`].
#[derive(Clone, Debug)]
pub struct LocalQueue(mpsc::UnboundedSender<Request>);

impl LocalQueue {
    /// Create a new local queue with the default identify gap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_gap(DEFAULT_IDENTIFY_GAP)
    }

    /// Create a new local queue with a custom gap between identifies.
    #[must_use]
    pub fn with_gap(gap: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(waiter(rx, gap));

        Self(tx)
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn waiter(mut rx: mpsc::UnboundedReceiver<Request>, gap: Duration) {
    let mut next_allowed = Instant::now();

    while let Some(request) = rx.recv().await {
        sleep_until(next_allowed).await;

        let (done_tx, done_rx) = oneshot::channel();
        let ticket = IdentifyTicket::from_parts(vec![done_tx]);

        if request.tx.send(ticket).is_err() {
            tracing::warn!(
                shard_id = request.shard_id[0],
                "skipping identify grant, requester dropped"
            );

            continue;
        }

        let granted_at = Instant::now();

        tracing::info!(
            shard_id = request.shard_id[0],
            shard_total = request.shard_id[1],
            "identify allowance granted"
        );

        // Hold the gate until the shard's session is up or its attempt
        // failed.
        let _ = done_rx.await;

        next_allowed = granted_at + gap;
    }
}

#[async_trait]
impl Queue for LocalQueue {
    async fn acquire(&self, shard_id: [u64; 2]) -> Result<IdentifyTicket, QueueError> {
        let (tx, rx) = oneshot::channel();

        if self.0.send(Request { shard_id, tx }).is_err() {
            tracing::warn!(shard_id = shard_id[0], "identify gate task is gone");

            return Ok(IdentifyTicket::detached());
        }

        tracing::debug!(
            shard_id = shard_id[0],
            shard_total = shard_id[1],
            "waiting for identify allowance"
        );

        Ok(rx.await.unwrap_or_else(|_| IdentifyTicket::detached()))
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalQueue, Queue};
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, time::Duration};
    use tokio::time::Instant;

    assert_impl_all!(LocalQueue: Clone, Debug, Default, Send, Sync);
    assert_impl_all!(dyn Queue: Debug, Send, Sync);

    #[tokio::test(start_paused = true)]
    async fn serializes_with_gap() {
        let gap = Duration::from_secs(5);
        let queue = LocalQueue::with_gap(gap);
        let start = Instant::now();

        let first = queue.acquire([0, 2]).await.unwrap();

        // The second acquire parks until the first ticket is dropped.
        let second = tokio::spawn({
            let queue = queue.clone();
            async move {
                queue.acquire([1, 2]).await.unwrap();

                Instant::now()
            }
        });

        tokio::time::advance(Duration::from_secs(1)).await;
        drop(first);

        let granted_at = second.await.unwrap();

        // No earlier than the grant time plus the gap.
        assert!(granted_at >= start + gap);
    }

    #[tokio::test(start_paused = true)]
    async fn release_after_gap_opens_immediately() {
        let gap = Duration::from_millis(100);
        let queue = LocalQueue::with_gap(gap);

        let ticket = queue.acquire([0, 1]).await.unwrap();

        // Hold the ticket well past the gap.
        tokio::time::advance(Duration::from_secs(1)).await;
        let released_at = Instant::now();
        drop(ticket);

        queue.acquire([0, 1]).await.unwrap();

        // The gap had already passed; the second grant is immediate.
        assert!(Instant::now() - released_at < gap);
    }
}
