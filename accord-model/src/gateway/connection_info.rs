//! Information returned by the authenticated gateway route.

use serde::{Deserialize, Serialize};

/// Current limits on starting new sessions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SessionStartLimit {
    /// Maximum number of session starts the current user is allowed.
    pub total: u64,
    /// Remaining number of session starts the current user is allowed.
    pub remaining: u64,
    /// Milliseconds until the limit resets.
    pub reset_after: u64,
    /// Number of identify requests allowed every 5 seconds.
    pub max_concurrency: u64,
}

/// Gateway connection information for the authenticated user.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ConnectionInfo {
    /// URL to connect to.
    pub url: String,
    /// Recommended number of shards to use.
    pub shards: u64,
    /// Session start limit information.
    pub session_start_limit: SessionStartLimit,
}
