//! Classification of gateway close codes.

/// What a shard does in response to a close code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseAction {
    /// The session is lost for a non-recoverable reason; the shard stops.
    Dead,
    /// The session is unusable: drop it and identify from scratch.
    RestartCleanly,
    /// The session survived; reconnect and resume.
    Resumable,
}

/// Classify a close code.
///
/// Codes this library doesn't know default to [`CloseAction::Resumable`].
#[must_use]
pub const fn classify(code: u16) -> CloseAction {
    match code {
        // Authentication failed, invalid shard, sharding required, invalid
        // or disallowed intents.
        4004 | 4010 | 4011 | 4013 | 4014 => CloseAction::Dead,
        // Invalid sequence on resume, or session timed out.
        4007 | 4009 => CloseAction::RestartCleanly,
        _ => CloseAction::Resumable,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, CloseAction};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(CloseAction: Clone, Copy, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    fn table() {
        assert_eq!(CloseAction::Dead, classify(4004));
        assert_eq!(CloseAction::Dead, classify(4010));
        assert_eq!(CloseAction::Dead, classify(4011));
        assert_eq!(CloseAction::Dead, classify(4013));
        assert_eq!(CloseAction::Dead, classify(4014));

        assert_eq!(CloseAction::RestartCleanly, classify(4007));
        assert_eq!(CloseAction::RestartCleanly, classify(4009));

        // Everything else, including codes from the future, resumes.
        assert_eq!(CloseAction::Resumable, classify(1000));
        assert_eq!(CloseAction::Resumable, classify(1006));
        assert_eq!(CloseAction::Resumable, classify(4000));
        assert_eq!(CloseAction::Resumable, classify(4999));
    }
}
