//! Events emitted to event streams.
//!
//! Service events are delivered as [`Dispatch`]es carrying the event name
//! and the raw payload; unknown event names forward unchanged. The remaining
//! variants are "meta" events describing what the shards themselves are
//! doing, plus the orchestrator's startup markers.

use accord_model::gateway::payload::incoming::Ready;
use serde_json::Value;

/// A dispatched service event.
#[derive(Clone, Debug)]
pub struct Dispatch {
    /// Raw payload of the event.
    pub data: Value,
    /// Name of the event, possibly rewritten by the configured remap.
    pub name: String,
    /// Sequence number of the event.
    pub seq: u64,
}

/// A shard is now fully connected with a running session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Connected {
    /// Interval at which the shard heartbeats.
    pub heartbeat_interval: u64,
    /// ID of the shard.
    pub shard_id: u64,
}

/// A shard is opening a connection to the gateway.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connecting {
    /// URL being connected to.
    pub gateway: String,
    /// ID of the shard.
    pub shard_id: u64,
}

/// A shard's connection dropped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Disconnected {
    /// Close code, if one was received.
    pub code: Option<u16>,
    /// Close reason, if one was received.
    pub reason: Option<String>,
    /// ID of the shard.
    pub shard_id: u64,
}

/// A shard is sending an identify handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Identifying {
    /// ID of the shard.
    pub shard_id: u64,
    /// Total number of shards.
    pub shard_total: u64,
}

/// A shard is reconnecting after backing off.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Reconnecting {
    /// ID of the shard.
    pub shard_id: u64,
}

/// A shard is resuming an existing session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resuming {
    /// Sequence being resumed from.
    pub seq: u64,
    /// ID of the shard.
    pub shard_id: u64,
}

/// A shard received its whole initial guild snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardStartupComplete {
    /// Whether completion was forced by the tolerance policy rather than
    /// every snapshot arriving.
    pub forced: bool,
    /// ID of the shard.
    pub shard_id: u64,
}

/// An event from the gateway or about the connections to it.
#[derive(Clone, Debug)]
pub enum Event {
    /// A service event was dispatched.
    Dispatch(Box<Dispatch>),
    /// A heartbeat acknowledgement arrived.
    GatewayHeartbeatAck,
    /// A HELLO arrived; the payload is the heartbeat interval.
    GatewayHello(u64),
    /// The session was invalidated; the payload is whether it can be
    /// resumed.
    GatewayInvalidateSession(bool),
    /// The gateway requested a reconnect.
    GatewayReconnect,
    /// A session completed its identify handshake.
    Ready(Box<Ready>),
    /// A session finished replaying missed events.
    Resumed,
    /// See [`Connected`].
    ShardConnected(Connected),
    /// See [`Connecting`].
    ShardConnecting(Connecting),
    /// See [`Disconnected`].
    ShardDisconnected(Disconnected),
    /// See [`Identifying`].
    ShardIdentifying(Identifying),
    /// See [`Reconnecting`].
    ShardReconnecting(Reconnecting),
    /// See [`Resuming`].
    ShardResuming(Resuming),
    /// See [`ShardStartupComplete`]. Emitted by the cluster.
    ShardStartupComplete(ShardStartupComplete),
    /// Every shard completed its startup. Emitted by the cluster.
    StartupComplete,
}

#[cfg(test)]
mod tests {
    use super::{Dispatch, Event};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Dispatch: Clone, Debug, Send, Sync);
    assert_impl_all!(Event: Clone, Debug, Send, Sync);
}
