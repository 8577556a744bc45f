//! Delivery of events from a shard to its consumer.

use crate::event::Event;
use futures_util::stream::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Sending half used inside the shard.
#[derive(Clone, Debug)]
pub(crate) struct Emitter {
    tx: UnboundedSender<Event>,
}

impl Emitter {
    /// Create an emitter and the stream it feeds.
    pub(crate) fn new() -> (Self, Events) {
        let (tx, rx) = mpsc::unbounded_channel();

        (Self { tx }, Events { rx })
    }

    /// Emit an event; dropped silently if the consumer is gone.
    pub(crate) fn event(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

/// Stream of events from one shard, in receive order.
#[derive(Debug)]
pub struct Events {
    rx: UnboundedReceiver<Event>,
}

impl Stream for Events {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::{Emitter, Events};
    use crate::event::Event;
    use futures_util::StreamExt;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Events: Debug, Send, Sync);

    #[tokio::test]
    async fn delivers_in_order() {
        let (emitter, mut events) = Emitter::new();

        emitter.event(Event::GatewayHello(41_250));
        emitter.event(Event::GatewayHeartbeatAck);

        assert!(matches!(
            events.next().await,
            Some(Event::GatewayHello(41_250))
        ));
        assert!(matches!(events.next().await, Some(Event::GatewayHeartbeatAck)));
    }
}
