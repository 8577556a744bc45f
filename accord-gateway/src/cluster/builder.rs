//! Builder to configure and construct a [`Cluster`].

use super::{
    config::Config as ClusterConfig,
    event::Events,
    r#impl::{Cluster, ClusterStartError, ClusterStartErrorType},
    scheme::ShardScheme,
};
use crate::shard::{ResumeSession, ShardBuilder};
use accord_gateway_queue::{LocalQueue, Queue};
use accord_http::Client as HttpClient;
use accord_model::gateway::payload::outgoing::IdentifyProperties;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Builder to configure and construct a [`Cluster`].
///
/// # Examples
///
/// Build a cluster running shards 0 to 9 out of 20, tolerating 5 missing
/// guilds after 10 seconds of silence:
///
/// ```no_run
/// use accord_gateway::cluster::{Cluster, ShardScheme};
/// use std::{env, time::Duration};
///
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let scheme = ShardScheme::range(0, 9, 20)?;
///
/// let (cluster, events) = Cluster::builder(env::var("ACCORD_TOKEN")?)
///     .shard_scheme(scheme)
///     .unavailable_guild_tolerance(5, Duration::from_secs(10))
///     .build()
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct ClusterBuilder(ClusterConfig, ShardBuilder);

impl ClusterBuilder {
    /// Create a new builder to configure and construct a cluster.
    pub fn new(token: impl Into<String>) -> Self {
        Self(
            ClusterConfig {
                allow_events_during_startup: false,
                event_name_remap: HashMap::new(),
                identify_guard: Duration::from_secs(10),
                queue: Arc::new(LocalQueue::new()),
                resume_sessions: HashMap::new(),
                shard_scheme: ShardScheme::Auto,
                unavailable_guild_tolerance: None,
                unavailable_guild_wait: Duration::from_secs(10),
            },
            ShardBuilder::new(token),
        )
    }

    /// Consume the builder and create the cluster.
    ///
    /// When both shard environment variables are set they override the
    /// configured shard plan.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterStartErrorType::InvalidShardPlan`] error type if
    /// the plan, programmatic or from the environment, is invalid.
    ///
    /// Returns a [`ClusterStartErrorType::RetrievingGatewayInfo`] error type
    /// if the recommended shard count was needed and couldn't be fetched.
    pub async fn build(mut self) -> Result<(Cluster, Events), ClusterStartError> {
        match ShardScheme::from_env() {
            Ok(Some(scheme)) => {
                tracing::info!("shard plan overridden from the environment");

                self.0.shard_scheme = scheme;
            }
            Ok(None) => {}
            Err(source) => {
                return Err(ClusterStartError {
                    kind: ClusterStartErrorType::InvalidShardPlan,
                    source: Some(Box::new(source)),
                })
            }
        }

        let http = Arc::clone((self.1).0.http_client());

        let needs_info =
            matches!(self.0.shard_scheme, ShardScheme::Auto) || (self.1).0.gateway_url().is_none();

        let info = if needs_info {
            let info = http.gateway_authed().await.map_err(|source| {
                ClusterStartError {
                    kind: ClusterStartErrorType::RetrievingGatewayInfo,
                    source: Some(Box::new(source)),
                }
            })?;

            Some(info)
        } else {
            None
        };

        let (ids, total) = match &self.0.shard_scheme {
            ShardScheme::Auto => {
                let total = info.as_ref().map_or(1, |info| info.shards);

                ((0..total).collect::<Vec<u64>>(), total)
            }
            scheme => (
                scheme.shard_ids().expect("non-auto scheme has ids"),
                scheme.total().expect("non-auto scheme has a total"),
            ),
        };

        if (self.1).0.gateway_url().is_none() {
            let url = info.map(|info| info.url);

            self.1 = self.1.gateway_url(url);
        }

        self.1 = self.1.queue(Arc::clone(&self.0.queue));

        let mut shards = Vec::with_capacity(ids.len());

        for id in ids {
            let mut shard_builder = self.1.clone().shard(id, total).map_err(|source| {
                ClusterStartError {
                    kind: ClusterStartErrorType::InvalidShardPlan,
                    source: Some(Box::new(source)),
                }
            })?;

            if let Some(resume) = self.0.resume_sessions.get(&id) {
                shard_builder =
                    shard_builder.resume_session(resume.session_id.clone(), resume.sequence);
            }

            let (shard, events) = shard_builder.build();

            shards.push((id, shard, events));
        }

        Ok(Cluster::from_parts(self.0, shards))
    }

    /// Let ordinary dispatches flow during a shard's startup window instead
    /// of being suppressed.
    pub const fn allow_events_during_startup(mut self) -> Self {
        self.0.allow_events_during_startup = true;

        self
    }

    /// Rewrite the names of emitted dispatches.
    ///
    /// Events whose name matches a key are forwarded under the mapped name;
    /// all others forward verbatim.
    #[allow(clippy::missing_const_for_fn)]
    pub fn event_name_remap(mut self, remap: HashMap<Box<str>, Box<str>>) -> Self {
        self.0.event_name_remap = remap;

        self
    }

    /// Set the URL that will be used to connect to the gateway.
    pub fn gateway_url(mut self, gateway_url: Option<String>) -> Self {
        self.1 = self.1.gateway_url(gateway_url);

        self
    }

    /// Set the HTTP client used by the cluster and the shards it manages.
    pub fn http_client(mut self, http_client: Arc<HttpClient>) -> Self {
        self.1 = self.1.http_client(http_client);

        self
    }

    /// Set how long the login loop holds back after being armed.
    ///
    /// Defaults to 10 seconds.
    pub const fn identify_guard(mut self, guard: Duration) -> Self {
        self.0.identify_guard = guard;

        self
    }

    /// Set the properties shards identify with.
    pub fn identify_properties(mut self, identify_properties: IdentifyProperties) -> Self {
        self.1 = self.1.identify_properties(identify_properties);

        self
    }

    /// Set the member-list threshold shards identify with.
    pub fn large_threshold(mut self, large_threshold: u64) -> Self {
        self.1 = self.1.large_threshold(large_threshold);

        self
    }

    /// Set the queue used to serialize identifies.
    ///
    /// Replace the default in-process gate with a remote-capable one when
    /// shards of the bot run in several processes.
    pub fn queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.0.queue = Arc::clone(&queue);
        self.1 = self.1.queue(queue);

        self
    }

    /// Set the sessions to resume shards with, keyed by shard ID.
    ///
    /// Obtained from [`Cluster::down_resumable`]. There is no guarantee the
    /// service will accept the resumes.
    ///
    /// [`Cluster::down_resumable`]: super::Cluster::down_resumable
    #[allow(clippy::missing_const_for_fn)]
    pub fn resume_sessions(mut self, resume_sessions: HashMap<u64, ResumeSession>) -> Self {
        self.0.resume_sessions = resume_sessions;

        self
    }

    /// Set the scheme for which shards to run.
    ///
    /// Defaults to [`ShardScheme::Auto`].
    #[allow(clippy::missing_const_for_fn)]
    pub fn shard_scheme(mut self, scheme: ShardScheme) -> Self {
        self.0.shard_scheme = scheme;

        self
    }

    /// Relax startup completion: when at most `tolerance` guilds are still
    /// missing and none has arrived for `wait`, the shard is considered
    /// complete.
    pub const fn unavailable_guild_tolerance(mut self, tolerance: u64, wait: Duration) -> Self {
        self.0.unavailable_guild_tolerance = Some(tolerance);
        self.0.unavailable_guild_wait = wait;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::ClusterBuilder;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(ClusterBuilder: Debug, Send, Sync);
}
