//! Identify gate coordinated across processes through remote locks.

use super::{IdentifyTicket, LocalQueue, Queue};
use accord_rpc::lock::LockClient;
use async_trait::async_trait;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tokio::{
    sync::oneshot,
    time::{interval, sleep},
};

/// How long to wait before retrying a lock another process holds.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Acquiring the identify gate failed.
#[derive(Debug)]
pub struct QueueError {
    kind: QueueErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl QueueError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &QueueErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (QueueErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            QueueErrorType::RemoteLock { address } => {
                f.write_str("acquiring the remote identify lock at ")?;
                f.write_str(address)?;

                f.write_str(" failed")
            }
        }
    }
}

impl Error for QueueError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`QueueError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum QueueErrorType {
    /// A remote lock server could not be reached and fallback was not
    /// allowed for it.
    RemoteLock {
        /// Address of the lock server.
        address: String,
    },
}

/// Identify gate backed by one or more remote lock servers.
///
/// Acquisition first passes the in-process gate, then takes each remote lock
/// in the configured order. Held locks are leased: a background task renews
/// them until the ticket is released, and the server expires them on its own
/// if the process dies.
#[derive(Debug)]
pub struct RemoteLockQueue {
    lease: Duration,
    local: LocalQueue,
    locks: Vec<LockClient>,
}

impl RemoteLockQueue {
    /// Default lease duration requested for each remote lock.
    pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

    /// Create a queue holding the given locks in order on each acquire.
    #[must_use]
    pub fn new(locks: Vec<LockClient>) -> Self {
        Self {
            lease: Self::DEFAULT_LEASE,
            local: LocalQueue::new(),
            locks,
        }
    }

    /// Set the lease duration requested for each remote lock.
    #[must_use]
    pub const fn lease(mut self, lease: Duration) -> Self {
        self.lease = lease;

        self
    }

    /// Take one remote lock, waiting out other holders.
    async fn take_lock(
        &self,
        lock: &LockClient,
        shard_id: [u64; 2],
    ) -> Result<Option<oneshot::Sender<()>>, QueueError> {
        loop {
            match lock.acquire(self.lease).await {
                Ok(grant) if grant.granted => {
                    tracing::debug!(
                        shard_id = shard_id[0],
                        address = lock.address(),
                        "remote identify lock held"
                    );

                    return Ok(Some(spawn_keeper(lock.clone(), grant.token, self.lease)));
                }
                Ok(_) => {
                    tracing::debug!(
                        shard_id = shard_id[0],
                        address = lock.address(),
                        "remote identify lock busy"
                    );

                    sleep(RETRY_DELAY).await;
                }
                Err(source) if lock.allow_fallback() => {
                    tracing::warn!(
                        address = lock.address(),
                        "remote identify lock unreachable, continuing without it: {source}"
                    );

                    return Ok(None);
                }
                Err(source) => {
                    return Err(QueueError {
                        kind: QueueErrorType::RemoteLock {
                            address: lock.address().to_owned(),
                        },
                        source: Some(Box::new(source)),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Queue for RemoteLockQueue {
    async fn acquire(&self, shard_id: [u64; 2]) -> Result<IdentifyTicket, QueueError> {
        let ticket = self.local.acquire(shard_id).await?;
        let mut releasers = ticket.into_parts();

        for lock in &self.locks {
            match self.take_lock(lock, shard_id).await {
                Ok(Some(releaser)) => releasers.push(releaser),
                Ok(None) => {}
                Err(error) => {
                    // Free everything taken so far before surfacing.
                    drop(IdentifyTicket::from_parts(releasers));

                    return Err(error);
                }
            }
        }

        Ok(IdentifyTicket::from_parts(releasers))
    }
}

/// Keep a held lock renewed until the ticket is released, then let it go.
fn spawn_keeper(lock: LockClient, token: String, lease: Duration) -> oneshot::Sender<()> {
    let (tx, mut rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut renew = interval(lease / 2);
        // The first tick fires immediately; the lock was just taken.
        renew.tick().await;

        loop {
            tokio::select! {
                _ = &mut rx => {
                    if let Err(source) = lock.release(&token).await {
                        tracing::warn!(
                            address = lock.address(),
                            "releasing remote identify lock failed: {source}"
                        );
                    }

                    break;
                }
                _ = renew.tick() => {
                    match lock.renew(&token, lease).await {
                        Ok(renewal) if renewal.granted => {}
                        Ok(_) => {
                            // The lease expired server-side; the gate is no
                            // longer ours to hold.
                            tracing::warn!(
                                address = lock.address(),
                                "remote identify lease expired before release"
                            );

                            break;
                        }
                        Err(source) => {
                            tracing::warn!(
                                address = lock.address(),
                                "renewing remote identify lock failed: {source}"
                            );
                        }
                    }
                }
            }
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::{QueueError, QueueErrorType, RemoteLockQueue};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{error::Error, fmt::Debug};

    assert_fields!(QueueErrorType::RemoteLock: address);
    assert_impl_all!(QueueError: Error, Send, Sync);
    assert_impl_all!(RemoteLockQueue: Debug, Send, Sync);
}
