//! The REST API client.

mod builder;
mod connector;

pub use self::builder::ClientBuilder;

use crate::{
    error::{Error, ErrorType},
    queue::RequestQueue,
    request::Request,
    response::Response,
};
use accord_http_ratelimiting::{
    headers::RatelimitHeaders, InMemoryRatelimiter, Method, Ratelimiter,
};
use accord_model::gateway::ConnectionInfo;
use hyper::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Body,
};
use std::{
    sync::{Arc, Once},
    time::Duration,
};
use tokio::time::{timeout_at, Instant};

/// Client for the service's REST API.
///
/// Every request is serialized through the ratelimit engine: the client asks
/// the configured [`Ratelimiter`] for a go-ahead, performs the transport,
/// and feeds the response's ratelimit headers back in. Requests that fail at
/// the transport level are not retried; requests the service answers with a
/// 429 are requeued up to the configured retry limit.
///
/// The client is relatively cheap to construct and wrap in an [`Arc`] to
/// share across tasks.
#[derive(Debug)]
pub struct Client {
    pub(crate) base_url: Box<str>,
    pub(crate) http: hyper::Client<connector::Connector>,
    /// Kept when the ratelimiter is the client's own, to start its sweep.
    pub(crate) local: Option<InMemoryRatelimiter>,
    pub(crate) queue: RequestQueue,
    pub(crate) ratelimiter: Arc<dyn Ratelimiter>,
    pub(crate) retry_limit: u64,
    pub(crate) sweep: Once,
    pub(crate) timeout: Duration,
    pub(crate) token: Option<Box<str>>,
}

impl Client {
    /// Create a new client with a token and default configuration.
    ///
    /// The token is normalized to carry the `Bot ` prefix.
    pub fn new(token: impl Into<String>) -> Self {
        ClientBuilder::new().token(token).build()
    }

    /// Create a builder to configure a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The normalized token in use, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Immutable reference to the ratelimiting backend in use.
    #[must_use]
    pub fn ratelimiter(&self) -> &Arc<dyn Ratelimiter> {
        &self.ratelimiter
    }

    /// Fetch the gateway connection information for the current user,
    /// including the recommended shard count.
    ///
    /// # Errors
    ///
    /// Returns the same error types as [`Self::request`], plus an
    /// [`ErrorType::Json`] error type if the response fails to deserialize.
    pub async fn gateway_authed(&self) -> Result<ConnectionInfo, Error> {
        let response = self.request(Request::new(Method::Get, "gateway/bot")).await?;

        response.model()
    }

    /// Perform a request against the API.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::Deadline`] error type if the request's
    /// deadline (or the client's default timeout) elapses first.
    ///
    /// Returns an [`ErrorType::RatelimitExhausted`] error type if the
    /// service answers with a 429 more than the configured retry limit.
    ///
    /// Returns an [`ErrorType::RequestError`] error type if the transport
    /// fails; such requests are *not* retried.
    ///
    /// Returns an [`ErrorType::Response`] error type if the response status
    /// indicates failure.
    pub async fn request(&self, request: Request) -> Result<Response, Error> {
        self.start_sweep();

        let path = request.path();
        let deadline = request
            .deadline
            .unwrap_or_else(|| Instant::now() + self.timeout);
        let uri = format!(
            "{}/{}",
            self.base_url,
            request.route.trim_start_matches('/')
        );

        let mut attempts: u64 = 0;

        loop {
            self.queue.acquire(&path, Some(deadline)).await?;

            let hyper_request = self.build_request(&request, &uri)?;

            let response = match timeout_at(deadline, self.http.request(hyper_request)).await {
                Err(_) => return Err(Error::new(ErrorType::Deadline)),
                Ok(Err(source)) => {
                    tracing::error!(%path, "request transport failed: {source}");

                    return Err(Error::with_source(ErrorType::RequestError, Box::new(source)));
                }
                Ok(Ok(response)) => response,
            };

            let status = response.status();

            match RatelimitHeaders::from_pairs(
                response
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_bytes())),
            ) {
                Ok(headers) => {
                    if let Err(source) = self.ratelimiter.update(&path, headers).await {
                        tracing::warn!(%path, "updating the ratelimiter failed: {source}");
                    }
                }
                Err(source) => {
                    tracing::warn!(%path, "response ratelimit headers invalid: {source}");
                }
            }

            let bytes =
                match timeout_at(deadline, hyper::body::to_bytes(response.into_body())).await {
                    Err(_) => return Err(Error::new(ErrorType::Deadline)),
                    Ok(Err(source)) => {
                        return Err(Error::with_source(
                            ErrorType::ChunkingResponse,
                            Box::new(source),
                        ))
                    }
                    Ok(Ok(bytes)) => bytes,
                };

            if status.as_u16() == 429 {
                attempts += 1;

                if attempts >= self.retry_limit {
                    tracing::error!(%path, attempts, "ratelimit retries exhausted");

                    return Err(Error::new(ErrorType::RatelimitExhausted { attempts }));
                }

                tracing::debug!(%path, attempts, "ratelimited by the service, requeueing");

                continue;
            }

            if !status.is_success() {
                return Err(Error::new(ErrorType::Response {
                    status: status.as_u16(),
                }));
            }

            return Ok(Response {
                bytes: bytes.to_vec(),
                status: status.as_u16(),
            });
        }
    }

    /// Build the hyper request for one attempt.
    fn build_request(
        &self,
        request: &Request,
        uri: &str,
    ) -> Result<hyper::Request<Body>, Error> {
        let mut builder = hyper::Request::builder()
            .method(hyper_method(request.method))
            .uri(uri);

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(token)
                .map_err(|source| Error::with_source(ErrorType::BuildingRequest, Box::new(source)))?;

            builder = builder.header(AUTHORIZATION, value);
        }

        let body = if let Some(bytes) = &request.body {
            builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

            Body::from(bytes.clone())
        } else {
            Body::empty()
        };

        builder
            .body(body)
            .map_err(|source| Error::with_source(ErrorType::BuildingRequest, Box::new(source)))
    }

    /// Start the local ratelimiter's eviction sweep on first use.
    fn start_sweep(&self) {
        if let Some(local) = &self.local {
            self.sweep.call_once(|| local.start_sweep_interval());
        }
    }
}

/// Map a ratelimiting method to a hyper method.
const fn hyper_method(method: Method) -> hyper::Method {
    match method {
        Method::Delete => hyper::Method::DELETE,
        Method::Get => hyper::Method::GET,
        Method::Patch => hyper::Method::PATCH,
        Method::Post => hyper::Method::POST,
        Method::Put => hyper::Method::PUT,
    }
}

#[cfg(test)]
mod tests {
    use super::Client;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Client: Debug, Send, Sync);
}
