//! Ordered holding area for requests waiting on a ratelimit.

use crate::error::{Error, ErrorType};
use accord_http_ratelimiting::{Path, Ratelimiter};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    time::{sleep_until, timeout, timeout_at, Instant},
};

/// How long a drain task lingers on an empty queue before shutting down.
const IDLE: Duration = Duration::from_secs(10);

/// A request parked until its fingerprint's budget allows it.
#[derive(Debug)]
struct Waiter {
    /// Caller-imposed deadline; the waiter is skipped once it passes.
    deadline: Option<Instant>,
    /// Completion channel: `Ok` to proceed, `Err` if authorization failed.
    tx: oneshot::Sender<Result<(), Error>>,
}

/// Per-fingerprint FIFO queues of deferred requests.
///
/// Each fingerprint gets its own queue drained by a background task, so
/// submission order is preserved within a fingerprint while fingerprints
/// make progress independently.
#[derive(Debug)]
pub(crate) struct RequestQueue {
    queues: Arc<Mutex<HashMap<Path, UnboundedSender<Waiter>>>>,
    ratelimiter: Arc<dyn Ratelimiter>,
}

impl RequestQueue {
    pub(crate) fn new(ratelimiter: Arc<dyn Ratelimiter>) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            ratelimiter,
        }
    }

    /// Get in line for the ratelimiter's authorization.
    ///
    /// The waiter takes its place in the fingerprint's queue as part of this
    /// call; the returned future resolves when it is the waiter's turn and
    /// the ratelimiter admits it.
    ///
    /// # Errors
    ///
    /// The future resolves to an [`ErrorType::Deadline`] error type if the
    /// deadline passes first, and an [`ErrorType::RatelimitBackend`] error
    /// type if the backend fails.
    pub(crate) fn acquire(
        &self,
        path: &Path,
        deadline: Option<Instant>,
    ) -> impl std::future::Future<Output = Result<(), Error>> {
        let (tx, rx) = oneshot::channel();

        self.push(path, Waiter { deadline, tx });

        async move {
            let granted = if let Some(deadline) = deadline {
                match timeout_at(deadline, rx).await {
                    Ok(result) => result,
                    Err(_) => return Err(Error::new(ErrorType::Deadline)),
                }
            } else {
                rx.await
            };

            match granted {
                Ok(result) => result,
                // The drain task skipped the waiter at its deadline, or died.
                Err(_) => Err(Error::new(if deadline.is_some() {
                    ErrorType::Deadline
                } else {
                    ErrorType::RatelimitBackend
                })),
            }
        }
    }

    /// Put a waiter on its fingerprint's queue, starting a drain task if the
    /// fingerprint has none.
    fn push(&self, path: &Path, mut waiter: Waiter) {
        let mut queues = self.queues.lock().expect("request queues poisoned");

        if let Some(tx) = queues.get(path) {
            match tx.send(waiter) {
                Ok(()) => return,
                Err(mpsc::error::SendError(w)) => waiter = w,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(waiter).expect("fresh queue receiver exists");
        queues.insert(path.clone(), tx);

        tokio::spawn(
            QueueDrainTask {
                path: path.clone(),
                queues: Arc::clone(&self.queues),
                ratelimiter: Arc::clone(&self.ratelimiter),
                rx,
            }
            .run(),
        );
    }
}

/// Background task draining one fingerprint's queue in order.
struct QueueDrainTask {
    path: Path,
    queues: Arc<Mutex<HashMap<Path, UnboundedSender<Waiter>>>>,
    ratelimiter: Arc<dyn Ratelimiter>,
    rx: UnboundedReceiver<Waiter>,
}

impl QueueDrainTask {
    async fn run(mut self) {
        loop {
            let waiter = match timeout(IDLE, self.rx.recv()).await {
                Ok(Some(waiter)) => waiter,
                Ok(None) => break,
                // Idle: deregister under the map lock so a concurrent push
                // either reaches this task or spawns a fresh one.
                Err(_) => {
                    let mut queues = self.queues.lock().expect("request queues poisoned");

                    match self.rx.try_recv() {
                        Ok(waiter) => {
                            drop(queues);

                            waiter
                        }
                        Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                            queues.remove(&self.path);

                            break;
                        }
                    }
                }
            };

            self.drain_one(waiter).await;
        }

        tracing::debug!(path = %self.path, "request queue drained, shutting down");
    }

    /// Wait until the ratelimiter admits one waiter, then release it.
    async fn drain_one(&self, waiter: Waiter) {
        loop {
            if waiter.tx.is_closed() {
                return;
            }

            if let Some(deadline) = waiter.deadline {
                if Instant::now() >= deadline {
                    tracing::debug!(path = %self.path, "dropping waiter past its deadline");

                    return;
                }
            }

            let wait = match self.ratelimiter.authorize(&self.path).await {
                Ok(wait) => wait,
                Err(source) => {
                    let _ = waiter
                        .tx
                        .send(Err(Error::with_source(ErrorType::RatelimitBackend, source)));

                    return;
                }
            };

            if wait.is_zero() {
                let _ = waiter.tx.send(Ok(()));

                return;
            }

            let wake = Instant::now() + wait;

            match waiter.deadline {
                // No point sleeping past the deadline.
                Some(deadline) if deadline < wake => {
                    sleep_until(deadline).await;

                    return;
                }
                _ => sleep_until(wake).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequestQueue;
    use crate::error::ErrorType;
    use accord_http_ratelimiting::{
        headers::Present, InMemoryRatelimiter, Method, Path, Ratelimiter, RatelimitHeaders,
    };
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, sync::Arc, time::Duration};
    use tokio::time::Instant;

    assert_impl_all!(RequestQueue: Debug, Send, Sync);

    #[tokio::test(start_paused = true)]
    async fn preserves_submission_order() {
        let ratelimiter = Arc::new(InMemoryRatelimiter::new());
        let queue = RequestQueue::new(ratelimiter.clone());
        let path = Path::new(Method::Post, "/channels/1/messages");

        // One request per second.
        ratelimiter
            .update(
                &path,
                RatelimitHeaders::Present(Present::new(Some("b".to_owned()), 1, 1, 1000)),
            )
            .await
            .unwrap();

        let first = queue.acquire(&path, None);
        let second = queue.acquire(&path, None);

        tokio::pin!(first, second);

        tokio::select! {
            biased;
            _ = &mut second => panic!("granted out of order"),
            result = &mut first => result.unwrap(),
        }

        second.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_waiting() {
        let ratelimiter = Arc::new(InMemoryRatelimiter::new());
        let queue = RequestQueue::new(ratelimiter.clone());
        let path = Path::new(Method::Post, "/channels/1/messages");

        ratelimiter
            .update(
                &path,
                RatelimitHeaders::Present(Present::new(Some("b".to_owned()), 1, 0, 60_000)),
            )
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let error = queue.acquire(&path, Some(deadline)).await.unwrap_err();

        assert!(matches!(error.kind(), ErrorType::Deadline));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_fingerprint_admits_immediately() {
        let ratelimiter = Arc::new(InMemoryRatelimiter::new());
        let queue = RequestQueue::new(ratelimiter);
        let path = Path::new(Method::Get, "/gateway/bot");

        queue.acquire(&path, None).await.unwrap();
    }
}
