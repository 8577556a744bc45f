//! Configuration of a cluster.

use super::scheme::ShardScheme;
use crate::shard::ResumeSession;
use accord_gateway_queue::Queue;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Configuration of a [`Cluster`].
///
/// Built through a [`ClusterBuilder`].
///
/// [`Cluster`]: super::Cluster
/// [`ClusterBuilder`]: super::ClusterBuilder
#[derive(Debug)]
pub struct Config {
    pub(crate) allow_events_during_startup: bool,
    pub(crate) event_name_remap: HashMap<Box<str>, Box<str>>,
    pub(crate) identify_guard: Duration,
    pub(crate) queue: Arc<dyn Queue>,
    pub(crate) resume_sessions: HashMap<u64, ResumeSession>,
    pub(crate) shard_scheme: ShardScheme,
    pub(crate) unavailable_guild_tolerance: Option<u64>,
    pub(crate) unavailable_guild_wait: Duration,
}

impl Config {
    /// Whether ordinary dispatches flow during a shard's startup window.
    pub const fn allow_events_during_startup(&self) -> bool {
        self.allow_events_during_startup
    }

    /// The configured event-name rewrites.
    pub const fn event_name_remap(&self) -> &HashMap<Box<str>, Box<str>> {
        &self.event_name_remap
    }

    /// How long the login loop holds back after being armed.
    pub const fn identify_guard(&self) -> Duration {
        self.identify_guard
    }

    /// The identify gate shared by the cluster's shards.
    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    /// Sessions the cluster's shards will try to resume.
    pub const fn resume_sessions(&self) -> &HashMap<u64, ResumeSession> {
        &self.resume_sessions
    }

    /// The shard plan.
    pub const fn shard_scheme(&self) -> &ShardScheme {
        &self.shard_scheme
    }

    /// How many guilds may be missing for the tolerance policy to force
    /// startup completion, if enabled.
    pub const fn unavailable_guild_tolerance(&self) -> Option<u64> {
        self.unavailable_guild_tolerance
    }

    /// How long without a GUILD_CREATE before the tolerance policy fires.
    pub const fn unavailable_guild_wait(&self) -> Duration {
        self.unavailable_guild_wait
    }
}
