//! Heartbeat bookkeeping and the background heartbeater task.

use accord_model::gateway::payload::outgoing::Heartbeat;
use rand::Rng;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::UnboundedSender,
    time::{sleep, Instant},
};
use tokio_tungstenite::tungstenite::{
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

/// Information about the latency of a shard's connection.
///
/// Obtained through a shard's `info`.
#[derive(Clone, Debug)]
pub struct Latency {
    average: Option<Duration>,
    heartbeats: u32,
    recent: VecDeque<Duration>,
    received: Option<Instant>,
    sent: Option<Instant>,
}

impl Latency {
    /// Average time between sending a heartbeat and receiving its
    /// acknowledgement over the session.
    ///
    /// `None` before the first acknowledgement.
    #[must_use]
    pub const fn average(&self) -> Option<Duration> {
        self.average
    }

    /// Total number of heartbeats sent during this session.
    #[must_use]
    pub const fn heartbeats(&self) -> u32 {
        self.heartbeats
    }

    /// The most recent latency times, oldest first.
    #[must_use]
    pub const fn recent(&self) -> &VecDeque<Duration> {
        &self.recent
    }

    /// When the last heartbeat acknowledgement was received.
    #[must_use]
    pub const fn received(&self) -> Option<Instant> {
        self.received
    }

    /// When the last heartbeat was sent.
    #[must_use]
    pub const fn sent(&self) -> Option<Instant> {
        self.sent
    }
}

/// Shared record of heartbeats sent and acknowledged.
#[derive(Debug, Default)]
pub(crate) struct Heartbeats {
    received: Mutex<Option<Instant>>,
    recent: Mutex<VecDeque<u64>>,
    sent: Mutex<Option<Instant>>,
    total_iterations: AtomicU32,
    total_time: AtomicU64,
}

impl Heartbeats {
    pub(crate) fn latency(&self) -> Latency {
        let iterations = self.total_iterations.load(Ordering::Relaxed);
        let recent = self
            .recent
            .lock()
            .expect("recent poisoned")
            .iter()
            .map(|millis| Duration::from_millis(*millis))
            .collect();

        Latency {
            average: Duration::from_millis(self.total_time.load(Ordering::Relaxed))
                .checked_div(iterations),
            heartbeats: iterations,
            recent,
            received: *self.received.lock().expect("received poisoned"),
            sent: *self.sent.lock().expect("sent poisoned"),
        }
    }

    /// Whether the last heartbeat sent has been acknowledged.
    pub(crate) fn last_acked(&self) -> bool {
        self.received.lock().expect("received poisoned").is_some()
    }

    /// Record an acknowledgement.
    pub(crate) fn receive(&self) {
        let now = Instant::now();

        self.received.lock().expect("received poisoned").replace(now);
        self.total_iterations.fetch_add(1, Ordering::Relaxed);

        if let Some(sent) = *self.sent.lock().expect("sent poisoned") {
            let millis =
                u64::try_from(now.saturating_duration_since(sent).as_millis()).unwrap_or(u64::MAX);

            self.total_time.fetch_add(millis, Ordering::Relaxed);

            let mut recent = self.recent.lock().expect("recent poisoned");

            if recent.len() == 5 {
                recent.pop_front();
            }

            recent.push_back(millis);
        }
    }

    /// Record a send, clearing the pending acknowledgement.
    pub(crate) fn send(&self) {
        self.received.lock().expect("received poisoned").take();
        self.sent
            .lock()
            .expect("sent poisoned")
            .replace(Instant::now());
    }
}

/// Close frame sent when the connection looks dead, chosen so the session
/// stays resumable.
pub(crate) fn resume_close_frame() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Library(4000),
        reason: "heartbeat acknowledgement timed out".into(),
    }
}

/// Task sending heartbeats on an interval over the session's socket.
///
/// The first heartbeat goes out after a uniform random fraction of the
/// interval, de-synchronizing shards that connected together.
pub(crate) struct Heartbeater {
    heartbeats: Arc<Heartbeats>,
    interval: u64,
    seq: Arc<AtomicU64>,
    tx: UnboundedSender<Message>,
}

impl Heartbeater {
    pub(crate) fn new(
        heartbeats: Arc<Heartbeats>,
        interval: u64,
        seq: Arc<AtomicU64>,
        tx: UnboundedSender<Message>,
    ) -> Self {
        Self {
            heartbeats,
            interval,
            seq,
            tx,
        }
    }

    pub(crate) async fn run(self) {
        let interval = Duration::from_millis(self.interval);
        let jitter = interval.mul_f64(rand::thread_rng().gen_range(0.0..1.0));

        sleep(jitter).await;

        loop {
            if self.beat().is_err() {
                // Channel gone: the session was replaced or shut down, and
                // with it this task's reason to exist.
                return;
            }

            sleep(interval).await;

            if !self.heartbeats.last_acked() {
                tracing::warn!("heartbeat not acknowledged in time, closing connection");

                let _ = self
                    .tx
                    .send(Message::Close(Some(resume_close_frame())));

                return;
            }
        }
    }

    /// Send a single heartbeat with the current sequence.
    fn beat(&self) -> Result<(), ()> {
        let seq = self.seq.load(Ordering::Acquire);

        let bytes = match serde_json::to_vec(&Heartbeat::new(seq)) {
            Ok(bytes) => bytes,
            Err(source) => {
                tracing::error!("serializing a heartbeat failed: {source}");

                return Err(());
            }
        };

        tracing::debug!(seq, "sending heartbeat");

        self.tx.send(Message::Binary(bytes)).map_err(|_| ())?;
        self.heartbeats.send();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Heartbeats, Latency};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Heartbeats: Debug, Default, Send, Sync);
    assert_impl_all!(Latency: Clone, Debug, Send, Sync);

    #[test]
    fn ack_tracking() {
        let heartbeats = Heartbeats::default();
        assert!(!heartbeats.last_acked());

        heartbeats.send();
        assert!(!heartbeats.last_acked());

        heartbeats.receive();
        assert!(heartbeats.last_acked());

        // The next send clears the acknowledgement again.
        heartbeats.send();
        assert!(!heartbeats.last_acked());
    }

    #[test]
    fn latency_accumulates() {
        let heartbeats = Heartbeats::default();

        heartbeats.send();
        heartbeats.receive();

        let latency = heartbeats.latency();
        assert_eq!(1, latency.heartbeats());
        assert!(latency.average().is_some());
        assert_eq!(1, latency.recent().len());
    }
}
