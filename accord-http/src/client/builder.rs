//! Builder to configure and construct a [`Client`].

use super::{connector, Client};
use crate::queue::RequestQueue;
use accord_http_ratelimiting::{InMemoryRatelimiter, Ratelimiter};
use std::{
    sync::{Arc, Once},
    time::Duration,
};

/// Base URL of the service's REST API.
const DEFAULT_API_URL: &str = "https://discord.com/api/v9";

/// Builder to configure and construct a [`Client`].
#[derive(Debug)]
#[must_use = "the client isn't built until `build` is called"]
pub struct ClientBuilder {
    pub(crate) base_url: String,
    pub(crate) ratelimiter: Option<Arc<dyn Ratelimiter>>,
    pub(crate) retry_limit: u64,
    pub(crate) timeout: Duration,
    pub(crate) token: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the builder, constructing the client.
    pub fn build(self) -> Client {
        let (ratelimiter, local) = match self.ratelimiter {
            Some(ratelimiter) => (ratelimiter, None),
            None => {
                let local = InMemoryRatelimiter::new();

                (
                    Arc::new(local.clone()) as Arc<dyn Ratelimiter>,
                    Some(local),
                )
            }
        };

        let token = self.token.map(|mut token| {
            if !token.starts_with("Bot ") {
                token.insert_str(0, "Bot ");
            }

            token.into_boxed_str()
        });

        Client {
            base_url: self.base_url.into_boxed_str(),
            http: hyper::Client::builder().build(connector::create()),
            local,
            queue: RequestQueue::new(Arc::clone(&ratelimiter)),
            ratelimiter,
            retry_limit: self.retry_limit,
            sweep: Once::new(),
            timeout: self.timeout,
            token,
        }
    }

    /// Set the base URL of the API, e.g. to point at a proxy.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();

        while base_url.ends_with('/') {
            base_url.pop();
        }

        self.base_url = base_url;

        self
    }

    /// Set the ratelimiting backend.
    ///
    /// Defaults to an [`InMemoryRatelimiter`] private to this client. Pass a
    /// remote coordinator's client here so multiple processes share one view
    /// of the limits.
    pub fn ratelimiter(mut self, ratelimiter: Arc<dyn Ratelimiter>) -> Self {
        self.ratelimiter = Some(ratelimiter);

        self
    }

    /// Set the number of 429 responses after which a request fails.
    ///
    /// Defaults to 3.
    pub const fn retry_limit(mut self, retry_limit: u64) -> Self {
        self.retry_limit = retry_limit;

        self
    }

    /// Set the default deadline applied to requests that set none.
    ///
    /// Defaults to 10 seconds.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;

        self
    }

    /// Set the token to authenticate with, normalizing its prefix.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());

        self
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_owned(),
            ratelimiter: None,
            retry_limit: 3,
            timeout: Duration::from_secs(10),
            token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClientBuilder;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(ClientBuilder: Debug, Default, Send, Sync);

    #[tokio::test]
    async fn token_is_normalized() {
        let client = ClientBuilder::new().token("abc123").build();
        assert_eq!(Some("Bot abc123"), client.token());

        let client = ClientBuilder::new().token("Bot abc123").build();
        assert_eq!(Some("Bot abc123"), client.token());
    }

    #[tokio::test]
    async fn base_url_trailing_slash_stripped() {
        let client = ClientBuilder::new()
            .base_url("https://proxy.example/api/")
            .build();

        assert_eq!("https://proxy.example/api", &*client.base_url);
    }
}
