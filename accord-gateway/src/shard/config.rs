//! Configuration of a single shard.

use accord_gateway_queue::Queue;
use accord_http::Client;
use accord_model::gateway::payload::outgoing::IdentifyProperties;
use std::sync::Arc;

/// Configuration of a [`Shard`].
///
/// Built through a [`ShardBuilder`].
///
/// [`Shard`]: super::Shard
/// [`ShardBuilder`]: super::ShardBuilder
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) gateway_url: Option<Box<str>>,
    pub(crate) http_client: Arc<Client>,
    pub(crate) identify_properties: Option<IdentifyProperties>,
    pub(crate) large_threshold: u64,
    pub(crate) queue: Arc<dyn Queue>,
    pub(crate) sequence: Option<u64>,
    pub(crate) session_id: Option<String>,
    pub(crate) shard: [u64; 2],
    pub(crate) token: Box<str>,
}

impl Config {
    /// URL used to connect to the gateway, when overridden.
    pub fn gateway_url(&self) -> Option<&str> {
        self.gateway_url.as_deref()
    }

    /// The HTTP client used for fetching gateway information.
    pub fn http_client(&self) -> &Arc<Client> {
        &self.http_client
    }

    /// The identify properties to use, when overridden.
    pub const fn identify_properties(&self) -> Option<&IdentifyProperties> {
        self.identify_properties.as_ref()
    }

    /// Member-list threshold sent with the identify.
    pub const fn large_threshold(&self) -> u64 {
        self.large_threshold
    }

    /// The identify gate the shard asks before identifying.
    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    /// Sequence to resume from, if resuming across processes.
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Session ID to resume, if resuming across processes.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The shard's index and the total number of shards.
    pub const fn shard(&self) -> [u64; 2] {
        self.shard
    }

    /// The normalized token in use.
    pub fn token(&self) -> &str {
        &self.token
    }
}
