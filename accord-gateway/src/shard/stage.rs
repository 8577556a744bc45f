//! The connection stage of a shard.

use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Reason for a failure while parsing a value into a [`Stage`].
#[derive(Clone, Debug)]
pub struct StageConversionError {
    /// The value that was provided.
    pub value: u8,
}

impl Display for StageConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("the integer ")?;
        Display::fmt(&self.value, f)?;

        f.write_str(" does not map to a stage")
    }
}

impl Error for StageConversionError {}

/// The current stage of a shard's connection lifecycle.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Stage {
    /// The shard hasn't been started, or drained after a shutdown.
    Idle,
    /// The shard is opening a websocket connection.
    Connecting,
    /// The connection is open and the shard expects a HELLO.
    AwaitingHello,
    /// The shard is waiting for its turn at the identify gate.
    AwaitingIdentify,
    /// IDENTIFY was sent and a READY is expected.
    Identifying,
    /// RESUME was sent and a replay is expected.
    Resuming,
    /// The session is up and dispatching.
    Active,
    /// The connection dropped and the shard is waiting out its backoff.
    Backoff,
    /// Non-recoverable terminal state; the shard will not reconnect.
    Dead,
}

impl Stage {
    /// Whether the shard is in the middle of opening a session.
    #[must_use]
    pub const fn is_handshaking(self) -> bool {
        matches!(self, Self::Identifying | Self::Resuming)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Idle
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::AwaitingIdentify => "AwaitingIdentify",
            Self::Identifying => "Identifying",
            Self::Resuming => "Resuming",
            Self::Active => "Active",
            Self::Backoff => "Backoff",
            Self::Dead => "Dead",
        })
    }
}

impl TryFrom<u8> for Stage {
    type Error = StageConversionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::AwaitingHello,
            3 => Self::AwaitingIdentify,
            4 => Self::Identifying,
            5 => Self::Resuming,
            6 => Self::Active,
            7 => Self::Backoff,
            8 => Self::Dead,
            value => return Err(StageConversionError { value }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Stage;
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, hash::Hash};

    assert_impl_all!(Stage: Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Send, Sync);

    #[test]
    fn conversion() {
        for value in 0..=8u8 {
            let stage = Stage::try_from(value).unwrap();
            assert_eq!(value, stage as u8);
        }

        assert!(Stage::try_from(9).is_err());
    }

    #[test]
    fn handshaking() {
        assert!(Stage::Identifying.is_handshaking());
        assert!(Stage::Resuming.is_handshaking());
        assert!(!Stage::Active.is_handshaking());
        assert!(!Stage::AwaitingIdentify.is_handshaking());
    }
}
