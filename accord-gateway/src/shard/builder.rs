//! Builder to configure and construct a shard.

use super::{config::Config, emitter::Emitter, Events, Shard};
use accord_gateway_queue::{LocalQueue, Queue};
use accord_http::Client as HttpClient;
use accord_model::gateway::payload::outgoing::IdentifyProperties;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
};

/// Shard ID configuration is invalid.
///
/// Returned by [`ShardBuilder::shard`].
#[derive(Debug)]
pub struct ShardIdError {
    kind: ShardIdErrorType,
}

impl ShardIdError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ShardIdErrorType {
        &self.kind
    }
}

impl Display for ShardIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ShardIdErrorType::IdTooLarge { id, total } => {
                f.write_str("provided shard ID ")?;
                Display::fmt(id, f)?;
                f.write_str(" is not less than the total of ")?;

                Display::fmt(total, f)
            }
        }
    }
}

impl Error for ShardIdError {}

/// Type of [`ShardIdError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ShardIdErrorType {
    /// Provided shard ID is not below the total shard count.
    IdTooLarge {
        /// Shard ID.
        id: u64,
        /// Total shard count.
        total: u64,
    },
}

/// Builder to configure and construct a [`Shard`].
///
/// # Examples
///
/// Create a shard with ID 5 out of 10:
///
/// ```rust,no_run
/// use accord_gateway::Shard;
/// use std::env;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let token = env::var("ACCORD_TOKEN")?;
///
/// let (shard, events) = Shard::builder(token).shard(5, 10)?.build();
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct ShardBuilder(pub(crate) Config);

impl ShardBuilder {
    /// Create a new builder to configure and construct a shard.
    ///
    /// Refer to each method to learn their default values.
    pub fn new(token: impl Into<String>) -> Self {
        Self::_new(token.into())
    }

    fn _new(mut token: String) -> Self {
        if !token.starts_with("Bot ") {
            token.insert_str(0, "Bot ");
        }

        Self(Config {
            gateway_url: None,
            http_client: Arc::new(HttpClient::new(token.clone())),
            identify_properties: None,
            large_threshold: 250,
            queue: Arc::new(LocalQueue::new()),
            sequence: None,
            session_id: None,
            shard: [0, 1],
            token: token.into_boxed_str(),
        })
    }

    /// Consume the builder, constructing a shard and its event stream.
    #[must_use]
    pub fn build(self) -> (Shard, Events) {
        let (emitter, events) = Emitter::new();

        (Shard::new_with_config(self.0, emitter), events)
    }

    /// Set the URL used to connect to the gateway.
    ///
    /// Defaults to the URL the service advertises over the REST API.
    pub fn gateway_url(mut self, gateway_url: Option<String>) -> Self {
        self.0.gateway_url = gateway_url.map(String::into_boxed_str);

        self
    }

    /// Set the HTTP client used for fetching gateway information.
    #[allow(clippy::missing_const_for_fn)]
    pub fn http_client(mut self, http_client: Arc<HttpClient>) -> Self {
        self.0.http_client = http_client;

        self
    }

    /// Set the properties to identify with.
    #[allow(clippy::missing_const_for_fn)]
    pub fn identify_properties(mut self, identify_properties: IdentifyProperties) -> Self {
        self.0.identify_properties = Some(identify_properties);

        self
    }

    /// Set the member-list threshold sent with the identify.
    ///
    /// Defaults to 250.
    pub const fn large_threshold(mut self, large_threshold: u64) -> Self {
        self.0.large_threshold = large_threshold;

        self
    }

    /// Set the queue used to serialize identifies.
    ///
    /// Defaults to a queue private to this shard; a [`Cluster`] installs a
    /// queue shared by all of its shards instead.
    ///
    /// [`Cluster`]: crate::cluster::Cluster
    pub fn queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.0.queue = queue;

        self
    }

    /// Set a session to resume instead of identifying on startup.
    ///
    /// There is no guarantee the service will accept the resume.
    #[allow(clippy::missing_const_for_fn)]
    pub fn resume_session(mut self, session_id: String, sequence: u64) -> Self {
        self.0.session_id = Some(session_id);
        self.0.sequence = Some(sequence);

        self
    }

    /// Set the shard ID to connect as, and the total number of shards.
    ///
    /// The shard ID is 0-indexed while the total is 1-indexed, so the
    /// highest valid ID with a total of 19 is 18.
    ///
    /// Defaults to `[0, 1]`, a single shard.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardIdErrorType::IdTooLarge`] error type if the ID is
    /// not less than the total.
    #[allow(clippy::missing_const_for_fn)]
    pub fn shard(mut self, id: u64, total: u64) -> Result<Self, ShardIdError> {
        if id >= total {
            return Err(ShardIdError {
                kind: ShardIdErrorType::IdTooLarge { id, total },
            });
        }

        self.0.shard = [id, total];

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{ShardBuilder, ShardIdError, ShardIdErrorType};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{error::Error, fmt::Debug};

    assert_impl_all!(ShardBuilder: Clone, Debug, Send, Sync);
    assert_fields!(ShardIdErrorType::IdTooLarge: id, total);
    assert_impl_all!(ShardIdError: Error, Send, Sync);

    #[tokio::test]
    async fn token_is_normalized() {
        let builder = ShardBuilder::new("abc");
        assert_eq!("Bot abc", builder.0.token());

        let builder = ShardBuilder::new("Bot abc");
        assert_eq!("Bot abc", builder.0.token());
    }

    #[tokio::test]
    async fn shard_id_must_be_below_total() {
        assert!(ShardBuilder::new("t").shard(0, 1).is_ok());
        assert!(ShardBuilder::new("t").shard(18, 19).is_ok());

        // An ID equal to the total is invalid.
        let error = ShardBuilder::new("t").shard(19, 19).unwrap_err();
        assert!(matches!(
            error.kind(),
            ShardIdErrorType::IdTooLarge { id: 19, total: 19 }
        ));
    }
}
