//! The envelope every gateway message arrives in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw `{op, d, s, t}` gateway message.
///
/// Only the envelope is parsed eagerly; the payload stays a [`Value`] until a
/// consumer knows what to do with it. Dispatches (`op` 0) carry both a
/// sequence number and an event name, every other opcode carries neither.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewayEvent {
    /// Opcode of the message, kept raw so unknown codes survive parsing.
    pub op: u8,
    /// Event payload.
    #[serde(default)]
    pub d: Value,
    /// Sequence number, present on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name, present on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::GatewayEvent;
    use serde::{Deserialize, Serialize};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(
        GatewayEvent: Clone,
        Debug,
        Deserialize<'static>,
        Send,
        Serialize,
        Sync
    );

    #[test]
    fn dispatch_envelope() {
        let json = r#"{"op":0,"s":42,"t":"MESSAGE_CREATE","d":{"content":"hi"}}"#;
        let event: GatewayEvent = serde_json::from_str(json).unwrap();

        assert_eq!(0, event.op);
        assert_eq!(Some(42), event.s);
        assert_eq!(Some("MESSAGE_CREATE"), event.t.as_deref());
        assert_eq!("hi", event.d["content"]);
    }

    #[test]
    fn bare_envelope() {
        let json = r#"{"op":11}"#;
        let event: GatewayEvent = serde_json::from_str(json).unwrap();

        assert_eq!(11, event.op);
        assert!(event.s.is_none());
        assert!(event.t.is_none());
        assert!(event.d.is_null());
    }
}
