//! The process-wide request budget, independent of per-route buckets.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

/// Default number of requests allowed per window.
pub const DEFAULT_PERMITS: u64 = 50;

/// Default window length.
///
/// Slightly above one second to absorb scheduling slop on the service side.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1050);

/// Sliding-window counter enforcing the service-wide request rate.
///
/// A request may proceed only if both its route budget and this bucket
/// permit. A response flagged as a global violation additionally trips a
/// cool-down during which nothing proceeds.
#[derive(Debug)]
pub struct GlobalBucket {
    /// Requests allowed per window.
    permits: u64,
    /// Window length in milliseconds.
    window: u64,
    /// Timestamps of grants inside the current window.
    history: Mutex<VecDeque<u64>>,
    /// End of a header-tripped cool-down, zero when none.
    cooldown_until: AtomicU64,
}

impl GlobalBucket {
    /// Create a bucket allowing `permits` requests per `window`.
    #[must_use]
    pub fn new(permits: u64, window: Duration) -> Self {
        Self {
            permits,
            window: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            history: Mutex::new(VecDeque::new()),
            cooldown_until: AtomicU64::new(0),
        }
    }

    /// Milliseconds left on a tripped cool-down; zero when none is active.
    pub(crate) fn cooldown_remaining(&self, now: u64) -> u64 {
        self.cooldown_until
            .load(Ordering::Relaxed)
            .saturating_sub(now)
    }

    /// Try to take a permit.
    ///
    /// Returns zero when granted, otherwise the milliseconds until a permit
    /// frees up.
    pub(crate) fn try_acquire(&self, now: u64) -> u64 {
        let cooldown = self.cooldown_remaining(now);
        if cooldown > 0 {
            return cooldown;
        }

        let mut history = self.history.lock().expect("global history poisoned");

        while history
            .front()
            .is_some_and(|&stamp| stamp + self.window <= now)
        {
            history.pop_front();
        }

        if (history.len() as u64) < self.permits {
            history.push_back(now);

            return 0;
        }

        // Full window: the oldest grant ages out first.
        history.front().map_or(0, |&stamp| stamp + self.window - now)
    }

    /// Trip a cool-down, extending any already in place.
    pub(crate) fn lock_for(&self, duration: u64, now: u64) {
        self.cooldown_until.fetch_max(now + duration, Ordering::AcqRel);
    }
}

impl Default for GlobalBucket {
    fn default() -> Self {
        Self::new(DEFAULT_PERMITS, DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::{GlobalBucket, DEFAULT_PERMITS, DEFAULT_WINDOW};
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, time::Duration};

    assert_impl_all!(GlobalBucket: Debug, Default, Send, Sync);

    #[test]
    fn window_is_enforced() {
        let bucket = GlobalBucket::new(3, Duration::from_millis(100));

        assert_eq!(0, bucket.try_acquire(0));
        assert_eq!(0, bucket.try_acquire(10));
        assert_eq!(0, bucket.try_acquire(20));

        // Fourth request waits until the first grant ages out.
        assert_eq!(80, bucket.try_acquire(20));
        assert_eq!(1, bucket.try_acquire(99));

        // The first grant has aged out.
        assert_eq!(0, bucket.try_acquire(100));
    }

    #[test]
    fn cooldown_trips_regardless_of_permits() {
        let bucket = GlobalBucket::new(50, Duration::from_millis(1000));

        bucket.lock_for(2000, 0);

        assert_eq!(2000, bucket.try_acquire(0));
        assert_eq!(1500, bucket.try_acquire(500));
        assert_eq!(0, bucket.try_acquire(2000));
    }

    #[test]
    fn cooldown_only_extends() {
        let bucket = GlobalBucket::default();

        bucket.lock_for(2000, 0);
        bucket.lock_for(100, 10);

        assert_eq!(1900, bucket.cooldown_remaining(100));
    }

    #[test]
    fn default_parameters() {
        assert_eq!(50, DEFAULT_PERMITS);
        assert_eq!(Duration::from_millis(1050), DEFAULT_WINDOW);
    }
}
