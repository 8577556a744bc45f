//! The cluster itself and its event pumps.

use super::{config::Config, event::Events, startup::StartupTracker};
use crate::{
    event::{Event, ShardStartupComplete},
    shard::{Events as ShardEvents, Information, ResumeSession, Shard},
};
use futures_util::StreamExt;
use std::{
    collections::HashMap,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::UnboundedSender,
    time::{sleep, sleep_until, Instant},
};

/// Starting a cluster failed.
#[derive(Debug)]
pub struct ClusterStartError {
    pub(super) kind: ClusterStartErrorType,
    pub(super) source: Option<Box<dyn Error + Send + Sync>>,
}

impl ClusterStartError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ClusterStartErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ClusterStartErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for ClusterStartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ClusterStartErrorType::InvalidShardPlan => {
                f.write_str("the configured shard plan is invalid")
            }
            ClusterStartErrorType::RetrievingGatewayInfo => {
                f.write_str("retrieving the bot's gateway info failed")
            }
        }
    }
}

impl Error for ClusterStartError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`ClusterStartError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ClusterStartErrorType {
    /// The shard plan, programmatic or from the environment, is invalid.
    InvalidShardPlan,
    /// The recommended shard count couldn't be fetched from the service.
    RetrievingGatewayInfo,
}

/// State shared by every shard's event pump.
#[derive(Debug)]
struct PumpShared {
    allow_events_during_startup: bool,
    pending_startups: AtomicU64,
    remap: HashMap<Box<str>, Box<str>>,
    tolerance: Option<u64>,
    tx: UnboundedSender<(u64, Event)>,
    wait: Duration,
}

#[derive(Debug)]
struct ClusterRef {
    config: Config,
    shards: HashMap<u64, Shard>,
}

/// A manager for multiple shards.
///
/// Owns the set of shards, logs them in one at a time, tracks each shard's
/// startup window, and fans their events out into one stream. Cheap to
/// clone; clones point at the same cluster.
///
/// # Examples
///
/// Bring up every recommended shard and print event names:
///
/// ```no_run
/// use accord_gateway::{Cluster, Event};
/// use futures_util::StreamExt;
/// use std::env;
///
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (cluster, mut events) = Cluster::builder(env::var("ACCORD_TOKEN")?)
///     .build()
///     .await?;
///
/// tokio::spawn(async move { cluster.up().await });
///
/// while let Some((shard_id, event)) = events.next().await {
///     if let Event::Dispatch(dispatch) = event {
///         println!("shard {shard_id}: {}", dispatch.name);
///     }
/// }
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct Cluster(Arc<ClusterRef>);

impl Cluster {
    /// Create a builder to configure a cluster.
    pub fn builder(token: impl Into<String>) -> super::builder::ClusterBuilder {
        super::builder::ClusterBuilder::new(token)
    }

    /// Assemble a cluster from its resolved parts.
    pub(super) fn from_parts(
        config: Config,
        shards: Vec<(u64, Shard, ShardEvents)>,
    ) -> (Self, Events) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let shared = Arc::new(PumpShared {
            allow_events_during_startup: config.allow_events_during_startup,
            pending_startups: AtomicU64::new(shards.len() as u64),
            remap: config.event_name_remap.clone(),
            tolerance: config.unavailable_guild_tolerance,
            tx,
            wait: config.unavailable_guild_wait,
        });

        let mut map = HashMap::with_capacity(shards.len());

        for (id, shard, events) in shards {
            tokio::spawn(pump(id, events, Arc::clone(&shared)));
            map.insert(id, shard);
        }

        let cluster = Self(Arc::new(ClusterRef {
            config,
            shards: map,
        }));

        (cluster, Events::new(rx))
    }

    /// Immutable reference to the cluster's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Bring up the cluster, logging in its shards one at a time.
    ///
    /// Shards start in plan order. Each second the login loop starts the
    /// next shard iff no other shard is mid-handshake and the guard
    /// timestamp armed at the start of the loop has passed. A shard whose
    /// start fails is requeued at the back.
    ///
    /// Resolves once every shard has started; events flow on the stream
    /// returned by the builder in the meantime.
    pub async fn up(&self) {
        let mut queue: Vec<u64> = {
            let mut ids: Vec<u64> = self.0.shards.keys().copied().collect();
            ids.sort_unstable();
            ids.reverse();

            ids
        };

        let guard_until = Instant::now() + self.0.config.identify_guard;

        while let Some(id) = queue.pop() {
            loop {
                sleep_until(guard_until).await;

                let handshaking = self
                    .0
                    .shards
                    .values()
                    .any(|shard| shard.stage().is_handshaking());

                if !handshaking {
                    break;
                }

                sleep(Duration::from_secs(1)).await;
            }

            let shard = &self.0.shards[&id];

            if let Err(source) = shard.start().await {
                tracing::warn!(shard_id = id, "starting shard failed, requeueing: {source}");

                queue.insert(0, id);
                sleep(Duration::from_secs(1)).await;

                continue;
            }

            tracing::info!(shard_id = id, "shard started");
        }
    }

    /// Bring down the cluster, shutting down every shard.
    pub fn down(&self) {
        for shard in self.0.shards.values() {
            shard.shutdown();
        }
    }

    /// Bring down the cluster resumably.
    ///
    /// The returned map is keyed by shard ID; shards without a session to
    /// resume are absent.
    #[must_use]
    pub fn down_resumable(&self) -> HashMap<u64, ResumeSession> {
        self.0
            .shards
            .values()
            .map(Shard::shutdown_resumable)
            .filter_map(|(id, session)| session.map(|session| (id, session)))
            .collect()
    }

    /// A shard by its ID.
    #[must_use]
    pub fn shard(&self, id: u64) -> Option<Shard> {
        self.0.shards.get(&id).cloned()
    }

    /// IDs of the shards the cluster manages.
    #[must_use]
    pub fn shard_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.0.shards.keys().copied().collect();
        ids.sort_unstable();

        ids
    }

    /// Information about every started shard.
    #[must_use]
    pub fn info(&self) -> HashMap<u64, Information> {
        self.0
            .shards
            .iter()
            .filter_map(|(id, shard)| shard.info().ok().map(|info| (*id, info)))
            .collect()
    }
}

/// Forward one shard's events into the cluster stream, applying startup
/// suppression, the tolerance policy, and the event-name remap.
async fn pump(shard_id: u64, mut events: ShardEvents, shared: Arc<PumpShared>) {
    let mut tracker = StartupTracker::new();
    let mut counted = false;

    loop {
        let maybe = if tracker.in_window() && shared.tolerance.is_some() {
            tokio::select! {
                maybe = events.next() => maybe,
                () = sleep_until(tracker.tolerance_deadline(shared.wait)) => {
                    let tolerance = shared.tolerance.expect("tolerance just checked");

                    if tracker.try_force(tolerance) {
                        tracing::info!(shard_id, "startup completion forced by tolerance");

                        complete(shard_id, &shared, &mut counted, true);
                    }

                    continue;
                }
            }
        } else {
            events.next().await
        };

        let Some(event) = maybe else {
            break;
        };

        match event {
            Event::Ready(ready) => {
                let unavailable = ready
                    .guilds
                    .iter()
                    .filter(|guild| guild.unavailable)
                    .count() as u64;

                tracker.on_ready(unavailable);

                tracing::debug!(shard_id, unavailable, "shard began its startup window");

                let _ = shared.tx.send((shard_id, Event::Ready(ready)));

                // A session with no guilds has nothing to wait for.
                if tracker.is_complete() {
                    complete(shard_id, &shared, &mut counted, false);
                }
            }
            Event::Dispatch(dispatch) if tracker.in_window() => {
                if dispatch.name == "GUILD_CREATE" {
                    if tracker.on_guild_create() {
                        complete(shard_id, &shared, &mut counted, false);
                    }
                } else if shared.allow_events_during_startup {
                    forward_dispatch(shard_id, dispatch, &shared);
                } else {
                    tracing::debug!(
                        shard_id,
                        name = &*dispatch.name,
                        "suppressing event during startup"
                    );
                }
            }
            Event::Dispatch(dispatch) => forward_dispatch(shard_id, dispatch, &shared),
            other => {
                let _ = shared.tx.send((shard_id, other));
            }
        }
    }

    tracing::debug!(shard_id, "event pump ended");
}

/// Forward a dispatch, rewriting its name if a remap entry matches.
fn forward_dispatch(
    shard_id: u64,
    mut dispatch: Box<crate::event::Dispatch>,
    shared: &PumpShared,
) {
    if let Some(renamed) = shared.remap.get(dispatch.name.as_str()) {
        dispatch.name = renamed.to_string();
    }

    let _ = shared.tx.send((shard_id, Event::Dispatch(dispatch)));
}

/// Mark one shard's startup complete, emitting the cluster-wide marker when
/// it was the last.
fn complete(shard_id: u64, shared: &PumpShared, counted: &mut bool, forced: bool) {
    let _ = shared.tx.send((
        shard_id,
        Event::ShardStartupComplete(ShardStartupComplete { forced, shard_id }),
    ));

    // Only a shard's first completion counts toward the cluster total; a
    // re-identified session snapshots again but doesn't re-complete.
    if *counted {
        return;
    }

    *counted = true;

    if shared.pending_startups.fetch_sub(1, Ordering::AcqRel) == 1 {
        tracing::info!("every shard completed startup");

        let _ = shared.tx.send((shard_id, Event::StartupComplete));
    }
}

#[cfg(test)]
mod tests {
    use super::{pump, Cluster, ClusterStartError, ClusterStartErrorType, PumpShared};
    use crate::{
        event::{Dispatch, Event},
        shard::Emitter,
    };
    use accord_model::gateway::payload::incoming::{Ready, UnavailableGuild};
    use static_assertions::assert_impl_all;
    use std::{
        collections::HashMap,
        error::Error,
        fmt::Debug,
        sync::{atomic::AtomicU64, Arc},
        time::Duration,
    };
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    assert_impl_all!(Cluster: Clone, Debug, Send, Sync);
    assert_impl_all!(ClusterStartError: Error, Send, Sync);
    assert_impl_all!(ClusterStartErrorType: Debug, Send, Sync);

    fn ready(guilds: u64) -> Event {
        Event::Ready(Box::new(Ready {
            v: 9,
            session_id: "sess".to_owned(),
            guilds: (0..guilds)
                .map(|id| UnavailableGuild {
                    id: id.to_string(),
                    unavailable: true,
                })
                .collect(),
            shard: None,
        }))
    }

    fn dispatch(name: &str, seq: u64) -> Event {
        Event::Dispatch(Box::new(Dispatch {
            data: serde_json::Value::Null,
            name: name.to_owned(),
            seq,
        }))
    }

    fn spawn_pump(
        tolerance: Option<u64>,
        remap: HashMap<Box<str>, Box<str>>,
    ) -> (Emitter, UnboundedReceiver<(u64, Event)>) {
        let (emitter, events) = Emitter::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(PumpShared {
            allow_events_during_startup: false,
            pending_startups: AtomicU64::new(1),
            remap,
            tolerance,
            tx,
            wait: Duration::from_secs(10),
        });

        tokio::spawn(pump(0, events, shared));

        (emitter, rx)
    }

    async fn settle() {
        // Let the pump drain what it was fed.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn startup_suppresses_and_tolerance_forces() {
        let (emitter, mut rx) = spawn_pump(Some(5), HashMap::new());

        emitter.event(ready(100));
        settle().await;
        assert!(matches!(rx.try_recv(), Ok((0, Event::Ready(_)))));

        // Ordinary traffic during the window is suppressed.
        emitter.event(dispatch("MESSAGE_CREATE", 2));
        settle().await;
        assert!(rx.try_recv().is_err());

        // 97 of 100 snapshots arrive, each suppressed too.
        for seq in 0..97 {
            emitter.event(dispatch("GUILD_CREATE", 3 + seq));
        }
        settle().await;
        assert!(rx.try_recv().is_err());

        // Silence for the configured wait with 3 ≤ 5 missing: forced.
        tokio::time::sleep(Duration::from_secs(11)).await;

        let (_, event) = rx.try_recv().unwrap();
        assert!(
            matches!(event, Event::ShardStartupComplete(complete) if complete.forced),
            "expected a forced startup completion"
        );
        assert!(matches!(rx.try_recv(), Ok((_, Event::StartupComplete))));

        // The window is over; traffic flows again.
        emitter.event(dispatch("MESSAGE_CREATE", 200));
        settle().await;
        assert!(matches!(
            rx.try_recv(),
            Ok((0, Event::Dispatch(dispatch))) if dispatch.name == "MESSAGE_CREATE"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_completes_when_snapshot_finishes() {
        let (emitter, mut rx) = spawn_pump(None, HashMap::new());

        emitter.event(ready(2));
        emitter.event(dispatch("GUILD_CREATE", 2));
        emitter.event(dispatch("GUILD_CREATE", 3));
        settle().await;

        assert!(matches!(rx.try_recv(), Ok((_, Event::Ready(_)))));

        let (_, event) = rx.try_recv().unwrap();
        assert!(
            matches!(event, Event::ShardStartupComplete(complete) if !complete.forced)
        );
        assert!(matches!(rx.try_recv(), Ok((_, Event::StartupComplete))));
    }

    #[tokio::test(start_paused = true)]
    async fn remap_rewrites_event_names() {
        let mut remap = HashMap::new();
        remap.insert(
            Box::<str>::from("MESSAGE_CREATE"),
            Box::<str>::from("messageCreate"),
        );

        let (emitter, mut rx) = spawn_pump(None, remap);

        // No guilds: the window closes immediately.
        emitter.event(ready(0));
        emitter.event(dispatch("MESSAGE_CREATE", 2));
        emitter.event(dispatch("TYPING_START", 3));
        settle().await;

        assert!(matches!(rx.try_recv(), Ok((_, Event::Ready(_)))));
        assert!(matches!(rx.try_recv(), Ok((_, Event::ShardStartupComplete(_)))));
        assert!(matches!(rx.try_recv(), Ok((_, Event::StartupComplete))));

        let (_, event) = rx.try_recv().unwrap();
        assert!(
            matches!(event, Event::Dispatch(dispatch) if dispatch.name == "messageCreate")
        );

        // Unmapped names forward verbatim.
        let (_, event) = rx.try_recv().unwrap();
        assert!(
            matches!(event, Event::Dispatch(dispatch) if dispatch.name == "TYPING_START")
        );
    }
}
