//! Tracking of a shard's initial guild snapshot.

use tokio::time::Instant;

/// Counts a shard's initial guild snapshot down to startup completion.
///
/// READY announces how many guilds will arrive as GUILD_CREATE dispatches;
/// the shard's startup window lasts until all of them have, or until the
/// tolerance policy forces completion.
#[derive(Debug)]
pub(crate) struct StartupTracker {
    complete: bool,
    last_guild_create: Instant,
    remaining: Option<u64>,
}

impl StartupTracker {
    pub(crate) fn new() -> Self {
        Self {
            complete: false,
            last_guild_create: Instant::now(),
            remaining: None,
        }
    }

    /// Whether the shard is inside its startup window: READY has arrived
    /// but the snapshot hasn't completed.
    pub(crate) const fn in_window(&self) -> bool {
        self.remaining.is_some() && !self.complete
    }

    /// Whether the snapshot completed.
    pub(crate) const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Begin a startup window from a READY's unavailable guild count.
    ///
    /// Returns whether the window is already complete, which happens for
    /// sessions with no guilds.
    pub(crate) fn on_ready(&mut self, unavailable_guilds: u64) -> bool {
        self.complete = unavailable_guilds == 0;
        self.last_guild_create = Instant::now();
        self.remaining = Some(unavailable_guilds);

        self.complete
    }

    /// Count one GUILD_CREATE against the snapshot.
    ///
    /// Returns whether this one completed the window.
    pub(crate) fn on_guild_create(&mut self) -> bool {
        self.last_guild_create = Instant::now();

        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(1);

            if *remaining == 0 && !self.complete {
                self.complete = true;

                return true;
            }
        }

        false
    }

    /// When the tolerance policy may next fire.
    pub(crate) fn tolerance_deadline(&self, wait: tokio::time::Duration) -> Instant {
        self.last_guild_create + wait
    }

    /// Force completion if few enough guilds are missing.
    ///
    /// Returns whether completion was forced.
    pub(crate) fn try_force(&mut self, tolerance: u64) -> bool {
        if !self.in_window() {
            return false;
        }

        if self.remaining.is_some_and(|remaining| remaining <= tolerance) {
            self.complete = true;

            return true;
        }

        false
    }
}
