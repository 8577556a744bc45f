//! Drop-in [`Ratelimiter`] backed by a remote coordinator.

use crate::{client::RpcClient, error::RpcErrorType, protocol::Request};
use accord_http_ratelimiting::{
    AuthorizeFuture, InMemoryRatelimiter, Path, RatelimitHeaders, Ratelimiter, UpdateFuture,
};
use crate::protocol::Response;
use std::time::Duration;

/// A [`Ratelimiter`] that forwards authorization to a rate-limit
/// coordinator over the wire.
///
/// With a fallback configured, coordinator failures degrade to the local
/// ratelimiter; without one they surface to the caller.
#[derive(Debug)]
pub struct RemoteRatelimiter {
    client: RpcClient,
    fallback: Option<InMemoryRatelimiter>,
}

impl RemoteRatelimiter {
    /// Create a remote ratelimiter with no fallback: coordinator failures
    /// surface as errors.
    #[must_use]
    pub const fn new(client: RpcClient) -> Self {
        Self {
            client,
            fallback: None,
        }
    }

    /// Create a remote ratelimiter degrading to a local one when the
    /// coordinator fails.
    #[must_use]
    pub const fn with_fallback(client: RpcClient, fallback: InMemoryRatelimiter) -> Self {
        Self {
            client,
            fallback: Some(fallback),
        }
    }
}

impl Ratelimiter for RemoteRatelimiter {
    fn authorize(&self, path: &Path) -> AuthorizeFuture {
        let client = self.client.clone();
        let fallback = self.fallback.clone();
        let path = path.clone();

        Box::pin(async move {
            let request = Request::Authorize {
                method: path.method().name().to_owned(),
                path: path.route().to_owned(),
            };

            match client.call(request).await {
                Ok(Response::Authorized { reset_after_ms }) => {
                    Ok(Duration::from_millis(reset_after_ms))
                }
                Ok(_) => Err(Box::new(crate::error::RpcError::new(
                    RpcErrorType::Protocol,
                )) as _),
                Err(source) => match fallback {
                    Some(local) => {
                        tracing::warn!(
                            address = client.address(),
                            "coordinator authorize failed, using local ratelimiter: {source}"
                        );

                        local.authorize(&path).await
                    }
                    None => Err(Box::new(source) as _),
                },
            }
        })
    }

    fn update(&self, path: &Path, headers: RatelimitHeaders) -> UpdateFuture {
        let client = self.client.clone();
        let fallback = self.fallback.clone();
        let path = path.clone();

        Box::pin(async move {
            let request = match &headers {
                // Nothing to report.
                RatelimitHeaders::None => return Ok(()),
                RatelimitHeaders::GlobalLimited { retry_after } => Request::Update {
                    method: path.method().name().to_owned(),
                    path: path.route().to_owned(),
                    global: true,
                    bucket: None,
                    limit: None,
                    remaining: None,
                    reset_after: Some(*retry_after),
                },
                RatelimitHeaders::Present(present) => Request::Update {
                    method: path.method().name().to_owned(),
                    path: path.route().to_owned(),
                    global: false,
                    bucket: present.bucket().map(ToOwned::to_owned),
                    limit: Some(present.limit()),
                    remaining: Some(present.remaining()),
                    reset_after: Some(present.reset_after()),
                },
                _ => return Ok(()),
            };

            match client.call(request).await {
                Ok(Response::Updated) => Ok(()),
                Ok(_) => Err(Box::new(crate::error::RpcError::new(
                    RpcErrorType::Protocol,
                )) as _),
                Err(source) => match fallback {
                    Some(local) => {
                        tracing::warn!(
                            address = client.address(),
                            "coordinator update failed, using local ratelimiter: {source}"
                        );

                        local.update(&path, headers).await
                    }
                    None => Err(Box::new(source) as _),
                },
            }
        })
    }
}
