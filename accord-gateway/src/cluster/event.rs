//! The merged event stream of a cluster.

use crate::event::Event;
use futures_util::stream::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Stream of events from all shards of a [`Cluster`].
///
/// Each item carries the originating shard's ID. Within a shard, events
/// arrive in receive order; across shards there is no ordering guarantee.
///
/// [`Cluster`]: super::Cluster
#[derive(Debug)]
pub struct Events {
    rx: UnboundedReceiver<(u64, Event)>,
}

impl Events {
    pub(super) fn new(rx: UnboundedReceiver<(u64, Event)>) -> Self {
        Self { rx }
    }
}

impl Stream for Events {
    type Item = (u64, Event);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::Events;
    use futures_util::stream::Stream;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Events: Debug, Send, Stream, Sync);
}
