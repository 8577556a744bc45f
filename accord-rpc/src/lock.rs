//! Client of the identify-lock service.

use crate::{
    client::RpcClient,
    error::{RpcError, RpcErrorType},
    protocol::{Request, Response},
};
use std::time::Duration;

/// A granted (or refused) identify lock.
#[derive(Clone, Debug)]
pub struct LockGrant {
    /// Whether the lock was taken.
    pub granted: bool,
    /// Token to renew or release with; empty when not granted.
    pub token: String,
    /// When the lease (ours, or the current holder's) expires, as unix
    /// milliseconds.
    pub expires_at: u64,
}

/// The result of renewing a held lock.
#[derive(Clone, Copy, Debug)]
pub struct LockRenewal {
    /// Whether the lease was extended.
    pub granted: bool,
    /// When the lease expires, as unix milliseconds.
    pub expires_at: u64,
}

/// Client of one identify-lock server.
#[derive(Clone, Debug)]
pub struct LockClient {
    allow_fallback: bool,
    client: RpcClient,
}

impl LockClient {
    /// Create a lock client for a server address.
    ///
    /// Fallback is disabled by default: an unreachable server surfaces as an
    /// error to the acquirer.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            allow_fallback: false,
            client: RpcClient::new(address),
        }
    }

    /// Set whether an unreachable server is skipped instead of failing the
    /// acquisition.
    #[must_use]
    pub const fn with_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;

        self
    }

    /// Whether an unreachable server is skipped instead of failing.
    #[must_use]
    pub const fn allow_fallback(&self) -> bool {
        self.allow_fallback
    }

    /// Address of the lock server.
    #[must_use]
    pub fn address(&self) -> &str {
        self.client.address()
    }

    /// Try to take the lock for a lease duration.
    pub async fn acquire(&self, duration: Duration) -> Result<LockGrant, RpcError> {
        let request = Request::Acquire {
            duration_ms: duration_millis(duration),
        };

        match self.client.call(request).await? {
            Response::Acquired {
                granted,
                token,
                expires_at,
            } => Ok(LockGrant {
                granted,
                token,
                expires_at,
            }),
            _ => Err(RpcError::new(RpcErrorType::Protocol)),
        }
    }

    /// Extend a held lock's lease.
    pub async fn renew(&self, token: &str, duration: Duration) -> Result<LockRenewal, RpcError> {
        let request = Request::Renew {
            token: token.to_owned(),
            duration_ms: duration_millis(duration),
        };

        match self.client.call(request).await? {
            Response::Renewed {
                granted,
                expires_at,
            } => Ok(LockRenewal {
                granted,
                expires_at,
            }),
            _ => Err(RpcError::new(RpcErrorType::Protocol)),
        }
    }

    /// Let a held lock go.
    pub async fn release(&self, token: &str) -> Result<(), RpcError> {
        let request = Request::Release {
            token: token.to_owned(),
        };

        match self.client.call(request).await? {
            Response::Released => Ok(()),
            _ => Err(RpcError::new(RpcErrorType::Protocol)),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{LockClient, LockGrant, LockRenewal};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(LockClient: Clone, Debug, Send, Sync);
    assert_impl_all!(LockGrant: Clone, Debug, Send, Sync);
    assert_impl_all!(LockRenewal: Clone, Copy, Debug, Send, Sync);
}
