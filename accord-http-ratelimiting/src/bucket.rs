//! A single route budget observed from response headers.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    OnceLock,
};
use tokio::time::Instant;

/// Milliseconds elapsed since the process-wide monotonic epoch.
///
/// All budget scheduling runs on this clock, never the wall clock, so
/// wall-clock jumps can't move resets around.
pub(crate) fn now_millis() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();

    let epoch = *EPOCH.get_or_init(Instant::now);

    u64::try_from(Instant::now().duration_since(epoch).as_millis()).unwrap_or(u64::MAX)
}

/// A route's live ratelimit counter.
///
/// Budgets only tighten: folding observed state in can lower the remaining
/// count or push the reset later, never the reverse. The counter refills
/// locally when its window passes.
#[derive(Debug)]
pub struct Bucket {
    /// Opaque ID assigned by the service.
    id: Box<str>,
    /// Total requests allotted per window.
    limit: AtomicU64,
    /// Requests still allotted in the current window.
    remaining: AtomicU64,
    /// When the current window ends, in [`now_millis`] time.
    reset_at: AtomicU64,
    /// Length of a window in milliseconds.
    reset_after: AtomicU64,
    /// When the budget may be evicted if idle, in [`now_millis`] time.
    expires_at: AtomicU64,
}

impl Bucket {
    /// Create a budget from a first observation.
    pub(crate) fn new(id: Box<str>, limit: u64, remaining: u64, reset_after: u64, now: u64) -> Self {
        let reset_at = now + reset_after;

        Self {
            id,
            limit: AtomicU64::new(limit),
            remaining: AtomicU64::new(remaining.min(limit)),
            reset_at: AtomicU64::new(reset_at),
            reset_after: AtomicU64::new(reset_after),
            expires_at: AtomicU64::new(reset_at + 2 * reset_after),
        }
    }

    /// Opaque ID assigned by the service.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Total requests allotted per window.
    pub fn limit(&self) -> u64 {
        self.limit.load(Ordering::Relaxed)
    }

    /// Requests still allotted in the current window.
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Whether the budget currently allots a request.
    pub(crate) fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// When the budget may be evicted, in [`now_millis`] time.
    pub(crate) fn expires_at(&self) -> u64 {
        self.expires_at.load(Ordering::Relaxed)
    }

    /// Milliseconds until the current window ends; zero if it already has.
    pub(crate) fn reset_in(&self, now: u64) -> u64 {
        self.reset_at.load(Ordering::Relaxed).saturating_sub(now)
    }

    /// Refill the budget if its window has passed.
    ///
    /// Returns whether a refill happened.
    pub(crate) fn try_reset(&self, now: u64) -> bool {
        if self.reset_in(now) > 0 {
            return false;
        }

        let reset_after = self.reset_after.load(Ordering::Relaxed);
        let reset_at = now + reset_after;

        self.remaining.store(self.limit(), Ordering::Relaxed);
        self.reset_at.store(reset_at, Ordering::Release);
        self.expires_at
            .store(reset_at + 2 * reset_after, Ordering::Relaxed);

        true
    }

    /// Consume one request from the budget.
    ///
    /// Returns `false` if none remained: the caller gates on
    /// [`Self::has_remaining`] first, so a `false` here is an internal
    /// invariant violation and must be surfaced, not corrected.
    pub(crate) fn decrement(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    /// Fold an observed state into the budget, tightening only.
    ///
    /// The lower remaining and the later reset win; the window length and
    /// limit always take the service's latest word.
    pub(crate) fn assign_if_stricter(&self, limit: u64, remaining: u64, reset_after: u64, now: u64) {
        self.limit.store(limit, Ordering::Relaxed);
        self.reset_after.store(reset_after, Ordering::Relaxed);

        self.remaining
            .fetch_min(remaining.min(limit), Ordering::AcqRel);

        let candidate = now + reset_after;
        let reset_at = self.reset_at.fetch_max(candidate, Ordering::AcqRel).max(candidate);

        self.expires_at
            .store(reset_at + 2 * reset_after, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::Bucket;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Bucket: Debug, Send, Sync);

    #[test]
    fn tighten_only() {
        let bucket = Bucket::new("b".into(), 5, 3, 1000, 0);

        // A looser remaining doesn't raise the counter.
        bucket.assign_if_stricter(5, 4, 1000, 1);
        assert_eq!(3, bucket.remaining());

        // A stricter remaining lowers it.
        bucket.assign_if_stricter(5, 1, 1000, 2);
        assert_eq!(1, bucket.remaining());

        // The reset never moves backward.
        let before = bucket.reset_in(2);
        bucket.assign_if_stricter(5, 1, 500, 2);
        assert!(bucket.reset_in(2) >= before.min(1000));
    }

    #[test]
    fn remaining_clamped_to_limit() {
        let bucket = Bucket::new("b".into(), 3, 10, 1000, 0);

        assert_eq!(3, bucket.remaining());
    }

    #[test]
    fn decrement_saturates() {
        let bucket = Bucket::new("b".into(), 2, 2, 1000, 0);

        assert!(bucket.decrement());
        assert!(bucket.decrement());
        assert!(!bucket.decrement());
        assert_eq!(0, bucket.remaining());
    }

    #[test]
    fn reset_boundary_is_zero_not_negative() {
        let bucket = Bucket::new("b".into(), 1, 0, 1000, 0);

        assert_eq!(1000, bucket.reset_in(0));
        assert_eq!(990, bucket.reset_in(10));
        // Exactly at the reset, the wait is zero.
        assert_eq!(0, bucket.reset_in(1000));
        assert_eq!(0, bucket.reset_in(2000));
    }

    #[test]
    fn try_reset_refills() {
        let bucket = Bucket::new("b".into(), 5, 0, 1000, 0);

        assert!(!bucket.try_reset(999));
        assert!(bucket.try_reset(1000));
        assert_eq!(5, bucket.remaining());
        assert_eq!(1000, bucket.reset_in(1000));
    }
}
