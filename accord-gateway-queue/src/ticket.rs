//! The RAII guard a shard holds while it identifies.

use tokio::sync::oneshot;

/// Permission to perform one identify handshake.
///
/// Hold the ticket until the session is up or the attempt definitively
/// failed; dropping it releases the gate (and any remote locks backing it).
#[derive(Debug)]
pub struct IdentifyTicket {
    releasers: Vec<oneshot::Sender<()>>,
}

impl IdentifyTicket {
    /// Build a ticket releasing each listener when dropped.
    pub(crate) fn from_parts(releasers: Vec<oneshot::Sender<()>>) -> Self {
        Self { releasers }
    }

    /// A ticket backed by nothing, used when a gate has gone away.
    pub(crate) fn detached() -> Self {
        Self {
            releasers: Vec::new(),
        }
    }

    /// Take the release handles out of the ticket to extend it.
    pub(crate) fn into_parts(mut self) -> Vec<oneshot::Sender<()>> {
        std::mem::take(&mut self.releasers)
    }

    /// Release the ticket. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for IdentifyTicket {
    fn drop(&mut self) {
        for tx in self.releasers.drain(..) {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdentifyTicket;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;
    use tokio::sync::oneshot;

    assert_impl_all!(IdentifyTicket: Debug, Send, Sync);

    #[tokio::test]
    async fn drop_notifies_all() {
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();

        let ticket = IdentifyTicket::from_parts(vec![tx_a, tx_b]);
        ticket.release();

        rx_a.await.unwrap();
        rx_b.await.unwrap();
    }
}
