//! Payloads of messages the client sends over the gateway.

use super::super::OpCode;
use serde::{Deserialize, Serialize};

/// Properties identifying the connecting client.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct IdentifyProperties {
    /// Operating system of the client.
    pub os: String,
    /// Library or browser name.
    pub browser: String,
    /// Device name.
    pub device: String,
}

impl IdentifyProperties {
    /// Create identify properties to send with an [`Identify`].
    pub fn new(
        browser: impl Into<String>,
        device: impl Into<String>,
        os: impl Into<String>,
    ) -> Self {
        Self {
            browser: browser.into(),
            device: device.into(),
            os: os.into(),
        }
    }
}

/// Information to create a new session with.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct IdentifyInfo {
    /// Whether payload compression was requested.
    #[serde(default)]
    pub compress: bool,
    /// Threshold beyond which guild member lists are not sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u64>,
    /// Client properties.
    pub properties: IdentifyProperties,
    /// Shard index and total shard count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u64; 2]>,
    /// Authentication token.
    pub token: String,
}

/// The handshake opening a new session on a shard.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Identify {
    /// Session information.
    pub d: IdentifyInfo,
    /// Opcode of the payload.
    pub op: OpCode,
}

impl Identify {
    /// Create a new identify payload.
    pub const fn new(info: IdentifyInfo) -> Self {
        Self {
            d: info,
            op: OpCode::Identify,
        }
    }
}

/// Information to resume an existing session with.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ResumeInfo {
    /// Sequence of the last dispatch received.
    pub seq: u64,
    /// ID of the session being resumed.
    pub session_id: String,
    /// Authentication token.
    pub token: String,
}

/// The handshake reopening a broken connection onto an existing session.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Resume {
    /// Session information.
    pub d: ResumeInfo,
    /// Opcode of the payload.
    pub op: OpCode,
}

impl Resume {
    /// Create a new resume payload for a session and sequence.
    pub fn new(seq: u64, session_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            d: ResumeInfo {
                seq,
                session_id: session_id.into(),
                token: token.into(),
            },
            op: OpCode::Resume,
        }
    }
}

/// A heartbeat carrying the last received sequence.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Heartbeat {
    /// Sequence of the last dispatch received.
    pub d: u64,
    /// Opcode of the payload.
    pub op: OpCode,
}

impl Heartbeat {
    /// Create a new heartbeat payload.
    pub const fn new(seq: u64) -> Self {
        Self {
            d: seq,
            op: OpCode::Heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Heartbeat, Identify, IdentifyInfo, IdentifyProperties, Resume};
    use serde::{Deserialize, Serialize};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::fmt::Debug;

    assert_fields!(Identify: d, op);
    assert_fields!(Resume: d, op);
    assert_fields!(Heartbeat: d, op);
    assert_impl_all!(Identify: Clone, Debug, Deserialize<'static>, Send, Serialize, Sync);
    assert_impl_all!(Resume: Clone, Debug, Deserialize<'static>, Send, Serialize, Sync);
    assert_impl_all!(Heartbeat: Clone, Copy, Debug, Deserialize<'static>, Send, Serialize, Sync);

    #[test]
    fn identify_wire_form() {
        let identify = Identify::new(IdentifyInfo {
            compress: false,
            large_threshold: Some(250),
            properties: IdentifyProperties::new("accord", "accord", "linux"),
            shard: Some([1, 4]),
            token: "Bot abc".to_owned(),
        });

        let value = serde_json::to_value(&identify).unwrap();
        assert_eq!(2, value["op"]);
        assert_eq!("Bot abc", value["d"]["token"]);
        assert_eq!(1, value["d"]["shard"][0]);
        assert_eq!(4, value["d"]["shard"][1]);
    }

    #[test]
    fn resume_wire_form() {
        let resume = Resume::new(42, "deadbeef", "Bot abc");
        let value = serde_json::to_value(&resume).unwrap();

        assert_eq!(6, value["op"]);
        assert_eq!(42, value["d"]["seq"]);
        assert_eq!("deadbeef", value["d"]["session_id"]);
    }

    #[test]
    fn heartbeat_wire_form() {
        let value = serde_json::to_value(Heartbeat::new(12)).unwrap();

        assert_eq!(1, value["op"]);
        assert_eq!(12, value["d"]);
    }
}
