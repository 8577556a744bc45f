//! In-process implementation of the [`Ratelimiter`] contract.

use super::{
    bucket::{now_millis, Bucket},
    global::GlobalBucket,
    headers::RatelimitHeaders,
    request::Path,
    template::TemplateStore,
    AuthorizeFuture, GenericError, Ratelimiter, UpdateFuture,
};
use futures_util::future;
use std::{
    collections::{hash_map::Entry, HashMap},
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{Arc, Mutex},
    time::Duration,
};

/// Cadence at which idle budgets are swept out of the cache.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// A budget invariant was violated.
///
/// Surfaced instead of silently corrected.
#[derive(Debug)]
pub struct BudgetUnderflowError {
    /// Bucket the violation occurred in.
    pub(crate) bucket: Box<str>,
}

impl Display for BudgetUnderflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("budget for bucket '")?;
        f.write_str(&self.bucket)?;

        f.write_str("' was decremented below zero")
    }
}

impl Error for BudgetUnderflowError {}

/// In-memory ratelimiter keeping budgets, templates and the global bucket
/// in-process.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Debug)]
pub struct InMemoryRatelimiter {
    /// Live budgets keyed by the service's opaque bucket ID.
    buckets: Arc<Mutex<HashMap<Box<str>, Arc<Bucket>>>>,
    /// Fingerprint to bucket ID mapping learned from headers.
    routes: Arc<Mutex<HashMap<Path, Box<str>>>>,
    /// Observed bucket defaults for budget assumption.
    templates: Arc<TemplateStore>,
    /// The process-wide request budget.
    global: Arc<GlobalBucket>,
}

impl InMemoryRatelimiter {
    /// Create a new in-memory ratelimiter with default global parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory ratelimiter with a custom global bucket.
    #[must_use]
    pub fn with_global(global: GlobalBucket) -> Self {
        Self {
            buckets: Arc::default(),
            routes: Arc::default(),
            templates: Arc::default(),
            global: Arc::new(global),
        }
    }

    /// Spawn the background task evicting idle budgets.
    ///
    /// Runs at a 5 minute cadence and stops on its own once the ratelimiter
    /// is dropped. Must be called from within a runtime.
    pub fn start_sweep_interval(&self) {
        let buckets = Arc::downgrade(&self.buckets);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let Some(buckets) = buckets.upgrade() else {
                    break;
                };

                sweep(&buckets, now_millis());
            }
        });
    }

    /// Decide whether a request may proceed now.
    fn authorize_sync(&self, path: &Path) -> Result<Duration, GenericError> {
        let now = now_millis();

        // A tripped global cool-down blocks everything.
        let cooldown = self.global.cooldown_remaining(now);
        if cooldown > 0 {
            tracing::debug!(%path, wait = cooldown, "global cool-down active");

            return Ok(Duration::from_millis(cooldown));
        }

        let bucket_id = self
            .routes
            .lock()
            .expect("routes poisoned")
            .get(path)
            .cloned();

        // An unknown fingerprint is admitted optimistically; its headers
        // will link it to a bucket.
        let Some(bucket_id) = bucket_id else {
            tracing::debug!(%path, "fingerprint not linked to a bucket yet");

            return Ok(Duration::ZERO);
        };

        let mut buckets = self.buckets.lock().expect("buckets poisoned");

        let bucket = match buckets.entry(bucket_id.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let Some(assumed) = self.templates.create_assumed(&bucket_id, now) else {
                    // Known bucket but neither budget nor template; treat
                    // like a new route.
                    return Ok(Duration::ZERO);
                };

                tracing::debug!(%path, bucket = &*bucket_id, "assumed budget from template");

                Arc::clone(entry.insert(Arc::new(assumed)))
            }
        };

        if !bucket.has_remaining() {
            let wait = bucket.reset_in(now);

            if wait > 0 {
                tracing::debug!(%path, bucket = bucket.id(), wait, "budget exhausted");

                return Ok(Duration::from_millis(wait));
            }

            bucket.try_reset(now);
        }

        let global_wait = self.global.try_acquire(now);
        if global_wait > 0 {
            tracing::debug!(%path, wait = global_wait, "global bucket exhausted");

            return Ok(Duration::from_millis(global_wait));
        }

        if !bucket.decrement() {
            tracing::error!(%path, bucket = bucket.id(), "budget decremented below zero");

            return Err(Box::new(BudgetUnderflowError {
                bucket: bucket.id().into(),
            }));
        }

        Ok(Duration::ZERO)
    }

    /// Fold a response's headers into the cache.
    fn update_sync(&self, path: &Path, headers: &RatelimitHeaders) {
        let now = now_millis();

        match headers {
            RatelimitHeaders::None => {}
            RatelimitHeaders::GlobalLimited { retry_after } => {
                tracing::warn!(%path, retry_after, "global ratelimit hit");

                self.global.lock_for(*retry_after, now);
            }
            RatelimitHeaders::Present(present) => {
                let Some(bucket_id) = present.bucket() else {
                    tracing::debug!(%path, "ratelimit headers without a bucket id");

                    return;
                };

                self.routes
                    .lock()
                    .expect("routes poisoned")
                    .insert(path.clone(), bucket_id.into());

                let mut buckets = self.buckets.lock().expect("buckets poisoned");

                match buckets.entry(bucket_id.into()) {
                    Entry::Occupied(entry) => entry.get().assign_if_stricter(
                        present.limit(),
                        present.remaining(),
                        present.reset_after(),
                        now,
                    ),
                    Entry::Vacant(entry) => {
                        entry.insert(Arc::new(Bucket::new(
                            bucket_id.into(),
                            present.limit(),
                            present.remaining(),
                            present.reset_after(),
                            now,
                        )));
                    }
                }

                drop(buckets);

                self.templates
                    .upsert(bucket_id, present.limit(), present.reset_after());
            }
        }
    }
}

impl Default for InMemoryRatelimiter {
    fn default() -> Self {
        Self::with_global(GlobalBucket::default())
    }
}

impl Ratelimiter for InMemoryRatelimiter {
    fn authorize(&self, path: &Path) -> AuthorizeFuture {
        Box::pin(future::ready(self.authorize_sync(path)))
    }

    fn update(&self, path: &Path, headers: RatelimitHeaders) -> UpdateFuture {
        self.update_sync(path, &headers);

        Box::pin(future::ok(()))
    }
}

/// Evict budgets whose expiry is in the past.
fn sweep(buckets: &Mutex<HashMap<Box<str>, Arc<Bucket>>>, now: u64) {
    let mut buckets = buckets.lock().expect("buckets poisoned");
    let before = buckets.len();

    buckets.retain(|_, bucket| bucket.expires_at() > now);

    let evicted = before - buckets.len();
    if evicted > 0 {
        tracing::debug!(evicted, "swept idle budgets");
    }
}

#[cfg(test)]
mod tests {
    use super::{sweep, InMemoryRatelimiter};
    use crate::{
        headers::{Present, RatelimitHeaders},
        request::{Method, Path},
        GlobalBucket, Ratelimiter,
    };
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, time::Duration};

    assert_impl_all!(InMemoryRatelimiter: Clone, Debug, Default, Send, Sync);

    fn present(bucket: &str, limit: u64, remaining: u64, reset_after: u64) -> RatelimitHeaders {
        RatelimitHeaders::Present(Present::new(
            Some(bucket.to_owned()),
            limit,
            remaining,
            reset_after,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn admit_exhaust_wait_admit() {
        let ratelimiter = InMemoryRatelimiter::new();
        let path = Path::new(Method::Post, "/channels/1/messages");

        // Unknown fingerprint with no template: admitted immediately.
        assert_eq!(
            Duration::ZERO,
            ratelimiter.authorize(&path).await.unwrap()
        );

        ratelimiter
            .update(&path, present("b", 5, 0, 1000))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(10)).await;

        let wait = ratelimiter.authorize(&path).await.unwrap();
        assert_eq!(Duration::from_millis(990), wait);

        tokio::time::advance(Duration::from_millis(990)).await;

        assert_eq!(
            Duration::ZERO,
            ratelimiter.authorize(&path).await.unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn global_trip_blocks_everything() {
        let ratelimiter = InMemoryRatelimiter::new();
        let limited = Path::new(Method::Post, "/channels/1/messages");
        let unrelated = Path::new(Method::Get, "/guilds/2");

        ratelimiter
            .update(
                &limited,
                RatelimitHeaders::GlobalLimited { retry_after: 2000 },
            )
            .await
            .unwrap();

        let wait = ratelimiter.authorize(&unrelated).await.unwrap();
        assert_eq!(Duration::from_millis(2000), wait);

        tokio::time::advance(Duration::from_millis(2000)).await;

        assert_eq!(
            Duration::ZERO,
            ratelimiter.authorize(&unrelated).await.unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn global_window_caps_throughput() {
        let ratelimiter = InMemoryRatelimiter::with_global(GlobalBucket::new(
            2,
            Duration::from_millis(100),
        ));
        let path = Path::new(Method::Get, "/channels/1");

        // A generous route budget so only the global bucket gates.
        ratelimiter
            .update(&path, present("b", 100, 100, 60_000))
            .await
            .unwrap();

        assert_eq!(Duration::ZERO, ratelimiter.authorize(&path).await.unwrap());
        assert_eq!(Duration::ZERO, ratelimiter.authorize(&path).await.unwrap());

        let wait = ratelimiter.authorize(&path).await.unwrap();
        assert_eq!(Duration::from_millis(100), wait);
    }

    #[tokio::test(start_paused = true)]
    async fn assumed_budget_after_eviction() {
        let ratelimiter = InMemoryRatelimiter::new();
        let path = Path::new(Method::Post, "/channels/1/messages");

        ratelimiter
            .update(&path, present("b", 1, 1, 1000))
            .await
            .unwrap();

        // Past the expiry point the sweep evicts the budget.
        tokio::time::advance(Duration::from_millis(3001)).await;
        sweep(&ratelimiter.buckets, crate::bucket::now_millis());
        assert!(ratelimiter.buckets.lock().unwrap().is_empty());

        // The template recreates a full budget: one grant, then a wait.
        assert_eq!(Duration::ZERO, ratelimiter.authorize(&path).await.unwrap());

        let wait = ratelimiter.authorize(&path).await.unwrap();
        assert_eq!(Duration::from_millis(1000), wait);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_live_budgets() {
        let ratelimiter = InMemoryRatelimiter::new();
        let path = Path::new(Method::Get, "/channels/1");

        ratelimiter
            .update(&path, present("b", 5, 5, 10_000))
            .await
            .unwrap();

        sweep(&ratelimiter.buckets, crate::bucket::now_millis());

        assert_eq!(1, ratelimiter.buckets.lock().unwrap().len());
    }
}
