//! Payloads of messages the gateway pushes to the client.

use serde::{Deserialize, Serialize};

/// Payload of the HELLO message sent immediately after connecting.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Hello {
    /// Interval in milliseconds at which the client must heartbeat.
    pub heartbeat_interval: u64,
}

/// A guild the gateway has announced but not yet delivered.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct UnavailableGuild {
    /// ID of the guild.
    pub id: String,
    /// Whether the guild is unavailable.
    #[serde(default = "unavailable_default")]
    pub unavailable: bool,
}

const fn unavailable_default() -> bool {
    true
}

/// Payload of the READY dispatch completing an identify handshake.
///
/// Fields outside what connection management needs are not modeled; the full
/// dispatch is still delivered to the consumer as raw JSON.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Ready {
    /// Gateway API version in use.
    #[serde(default)]
    pub v: u64,
    /// ID of the new session, required for resuming.
    pub session_id: String,
    /// Guilds the session will receive initial snapshots for.
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    /// Shard information associated with the session, if sharded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u64; 2]>,
}

#[cfg(test)]
mod tests {
    use super::{Hello, Ready};
    use serde::{Deserialize, Serialize};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::fmt::Debug;

    assert_fields!(Hello: heartbeat_interval);
    assert_fields!(Ready: v, session_id, guilds, shard);
    assert_impl_all!(Hello: Clone, Copy, Debug, Deserialize<'static>, Send, Serialize, Sync);
    assert_impl_all!(Ready: Clone, Debug, Deserialize<'static>, Send, Serialize, Sync);

    #[test]
    fn ready_minimal() {
        let json = r#"{
            "v": 9,
            "session_id": "deadbeef",
            "guilds": [
                {"id": "1", "unavailable": true},
                {"id": "2", "unavailable": true}
            ],
            "shard": [0, 2]
        }"#;

        let ready: Ready = serde_json::from_str(json).unwrap();
        assert_eq!("deadbeef", ready.session_id);
        assert_eq!(2, ready.guilds.len());
        assert_eq!(Some([0, 2]), ready.shard);
    }

    #[test]
    fn unavailable_defaults_true() {
        let json = r#"{"session_id": "s", "guilds": [{"id": "3"}]}"#;
        let ready: Ready = serde_json::from_str(json).unwrap();

        assert!(ready.guilds[0].unavailable);
    }
}
