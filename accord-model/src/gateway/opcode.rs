use serde_repr::{Deserialize_repr, Serialize_repr};

/// Gateway event opcodes.
#[derive(
    Clone, Copy, Debug, Deserialize_repr, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize_repr,
)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched.
    Dispatch = 0,
    /// A heartbeat was sent or requested.
    Heartbeat = 1,
    /// Starts a new session during the initial handshake.
    Identify = 2,
    /// Update the client's presence.
    PresenceUpdate = 3,
    /// Join, move, or disconnect from a voice channel.
    VoiceStateUpdate = 4,
    /// Resume a previous session that was disconnected.
    Resume = 6,
    /// The server is requesting a reconnect.
    Reconnect = 7,
    /// Request information about offline guild members.
    RequestGuildMembers = 8,
    /// The session has been invalidated.
    InvalidSession = 9,
    /// Sent immediately after connecting.
    Hello = 10,
    /// Acknowledgement of a received heartbeat.
    HeartbeatAck = 11,
    /// An opcode this library does not know about.
    #[serde(other)]
    Unknown = u8::MAX,
}

impl OpCode {
    /// Lookup an opcode from its numeric representation.
    ///
    /// Returns `None` if the value maps to no known opcode.
    pub const fn from_repr(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::OpCode;
    use serde::{Deserialize, Serialize};
    use serde_test::{assert_tokens, Token};
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, hash::Hash};

    assert_impl_all!(
        OpCode: Clone,
        Copy,
        Debug,
        Deserialize<'static>,
        Eq,
        Hash,
        PartialEq,
        Send,
        Serialize,
        Sync
    );

    #[test]
    fn serde() {
        assert_tokens(&OpCode::Dispatch, &[Token::U8(0)]);
        assert_tokens(&OpCode::Hello, &[Token::U8(10)]);
        assert_tokens(&OpCode::HeartbeatAck, &[Token::U8(11)]);
    }

    #[test]
    fn from_repr() {
        assert_eq!(Some(OpCode::Dispatch), OpCode::from_repr(0));
        assert_eq!(Some(OpCode::InvalidSession), OpCode::from_repr(9));
        // 5 was never assigned.
        assert!(OpCode::from_repr(5).is_none());
        assert!(OpCode::from_repr(12).is_none());
    }
}
