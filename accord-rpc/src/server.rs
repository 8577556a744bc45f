//! Server half of the coordination protocol.
//!
//! One server exposes both contracts: the rate-limit coordinator, backed by
//! an [`InMemoryRatelimiter`] shared by every connection, and the identify
//! lock, a single leased lock with server-side expiry.

use crate::{
    error::{RpcError, RpcErrorType},
    protocol::{read_frame, write_frame, Request, RequestFrame, Response, ResponseFrame},
};
use accord_http_ratelimiting::{
    headers::Present, InMemoryRatelimiter, Method, Path, RatelimitHeaders, Ratelimiter,
};
use rand::Rng;
use std::{
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::net::{TcpListener, TcpStream};

/// Milliseconds since the unix epoch.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// The identify lock: held by at most one token at a time, expiring on its
/// own when the holder never releases it.
#[derive(Debug, Default)]
struct LockKeeper {
    held: Mutex<Option<Held>>,
}

#[derive(Debug)]
struct Held {
    expires_at: u64,
    token: String,
}

impl LockKeeper {
    fn acquire(&self, duration_ms: u64) -> Response {
        let mut held = self.held.lock().expect("lock keeper poisoned");
        let now = unix_millis();

        match held.as_ref() {
            Some(current) if current.expires_at > now => Response::Acquired {
                granted: false,
                token: String::new(),
                expires_at: current.expires_at,
            },
            _ => {
                let token = format!("{:032x}", rand::thread_rng().gen::<u128>());
                let expires_at = now + duration_ms;

                held.replace(Held {
                    expires_at,
                    token: token.clone(),
                });

                Response::Acquired {
                    granted: true,
                    token,
                    expires_at,
                }
            }
        }
    }

    fn renew(&self, token: &str, duration_ms: u64) -> Response {
        let mut held = self.held.lock().expect("lock keeper poisoned");
        let now = unix_millis();

        match held.as_mut() {
            Some(current) if current.token == token && current.expires_at > now => {
                current.expires_at = now + duration_ms;

                Response::Renewed {
                    granted: true,
                    expires_at: current.expires_at,
                }
            }
            _ => Response::Renewed {
                granted: false,
                expires_at: now,
            },
        }
    }

    fn release(&self, token: &str) -> Response {
        let mut held = self.held.lock().expect("lock keeper poisoned");

        if held.as_ref().is_some_and(|current| current.token == token) {
            held.take();
        }

        Response::Released
    }
}

/// Server for both coordination contracts.
#[derive(Debug)]
pub struct RpcServer {
    listener: TcpListener,
    lock: Arc<LockKeeper>,
    ratelimiter: Arc<InMemoryRatelimiter>,
}

impl RpcServer {
    /// Bind a server to an address, e.g. `127.0.0.1:7878`.
    pub async fn bind(address: impl AsRef<str>) -> Result<Self, RpcError> {
        let address = address.as_ref();

        let listener = TcpListener::bind(address).await.map_err(|source| {
            RpcError::with_source(
                RpcErrorType::Connecting {
                    address: address.to_owned(),
                },
                Box::new(source),
            )
        })?;

        let ratelimiter = InMemoryRatelimiter::new();
        ratelimiter.start_sweep_interval();

        Ok(Self {
            listener,
            lock: Arc::new(LockKeeper::default()),
            ratelimiter: Arc::new(ratelimiter),
        })
    }

    /// The bound address, useful when binding to port zero.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, RpcError> {
        self.listener
            .local_addr()
            .map_err(|source| RpcError::with_source(RpcErrorType::Io, Box::new(source)))
    }

    /// Accept and serve connections until the listener fails.
    pub async fn run(self) -> Result<(), RpcError> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|source| RpcError::with_source(RpcErrorType::Io, Box::new(source)))?;

            tracing::debug!(%peer, "coordination client connected");

            tokio::spawn(serve_connection(
                stream,
                Arc::clone(&self.ratelimiter),
                Arc::clone(&self.lock),
            ));
        }
    }
}

/// Answer one connection's frames until it closes.
async fn serve_connection(
    mut stream: TcpStream,
    ratelimiter: Arc<InMemoryRatelimiter>,
    lock: Arc<LockKeeper>,
) {
    loop {
        let frame = match read_frame::<RequestFrame>(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(source) => {
                tracing::warn!("dropping coordination connection: {source}");

                break;
            }
        };

        let response = dispatch(frame.request, &ratelimiter, &lock).await;

        if let Err(source) = write_frame(
            &mut stream,
            &ResponseFrame {
                id: frame.id,
                response,
            },
        )
        .await
        {
            tracing::warn!("dropping coordination connection: {source}");

            break;
        }
    }
}

/// Serve one request.
async fn dispatch(
    request: Request,
    ratelimiter: &InMemoryRatelimiter,
    lock: &LockKeeper,
) -> Response {
    match request {
        Request::Authorize { method, path } => {
            let Some(method) = Method::from_name(&method) else {
                return Response::Error {
                    message: format!("unknown method '{method}'"),
                };
            };

            match ratelimiter.authorize(&Path::new(method, &path)).await {
                Ok(wait) => Response::Authorized {
                    reset_after_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                },
                Err(source) => Response::Error {
                    message: source.to_string(),
                },
            }
        }
        Request::Update {
            method,
            path,
            global,
            bucket,
            limit,
            remaining,
            reset_after,
        } => {
            let Some(method) = Method::from_name(&method) else {
                return Response::Error {
                    message: format!("unknown method '{method}'"),
                };
            };

            let headers = if global {
                RatelimitHeaders::GlobalLimited {
                    retry_after: reset_after.unwrap_or(0),
                }
            } else if let (Some(limit), Some(remaining), Some(reset_after)) =
                (limit, remaining, reset_after)
            {
                RatelimitHeaders::Present(Present::new(bucket, limit, remaining, reset_after))
            } else {
                RatelimitHeaders::None
            };

            match ratelimiter.update(&Path::new(method, &path), headers).await {
                Ok(()) => Response::Updated,
                Err(source) => Response::Error {
                    message: source.to_string(),
                },
            }
        }
        Request::Acquire { duration_ms } => lock.acquire(duration_ms),
        Request::Renew { token, duration_ms } => lock.renew(&token, duration_ms),
        Request::Release { token } => lock.release(&token),
    }
}

#[cfg(test)]
mod tests {
    use super::{LockKeeper, RpcServer};
    use crate::protocol::Response;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(RpcServer: Debug, Send, Sync);

    #[test]
    fn lock_is_exclusive_until_expiry() {
        let keeper = LockKeeper::default();

        let Response::Acquired { granted, token, .. } = keeper.acquire(60_000) else {
            panic!("expected an acquired response");
        };
        assert!(granted);

        // A second acquire is refused while the lease is live.
        let Response::Acquired { granted: second, .. } = keeper.acquire(60_000) else {
            panic!("expected an acquired response");
        };
        assert!(!second);

        // Releasing frees it.
        keeper.release(&token);
        let Response::Acquired { granted: third, .. } = keeper.acquire(60_000) else {
            panic!("expected an acquired response");
        };
        assert!(third);
    }

    #[test]
    fn expired_lease_is_reacquirable() {
        let keeper = LockKeeper::default();

        let Response::Acquired { granted, .. } = keeper.acquire(0) else {
            panic!("expected an acquired response");
        };
        assert!(granted);

        // Zero-length lease: expired immediately.
        let Response::Acquired { granted: second, .. } = keeper.acquire(60_000) else {
            panic!("expected an acquired response");
        };
        assert!(second);
    }

    #[test]
    fn renew_requires_matching_live_token() {
        let keeper = LockKeeper::default();

        let Response::Acquired { token, .. } = keeper.acquire(60_000) else {
            panic!("expected an acquired response");
        };

        let Response::Renewed { granted, .. } = keeper.renew(&token, 60_000) else {
            panic!("expected a renewed response");
        };
        assert!(granted);

        let Response::Renewed { granted: wrong, .. } = keeper.renew("other", 60_000) else {
            panic!("expected a renewed response");
        };
        assert!(!wrong);
    }
}
