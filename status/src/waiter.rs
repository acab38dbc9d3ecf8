use crate::cache::StatusCache;
use crate::error::Error;
use crate::snapshot::{KnownStatus, StatusSnapshot};
use crate::store::StatusStore;
use log::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct WaiterConfig {
    /// How often the cache is re-read while waiting, on top of write notifications.
    pub poll_interval: Duration,
    /// Hard cap on any wait, whatever the caller asks for.
    pub max_wait: Duration,
    /// Minimum progress movement that counts as a change.
    pub progress_threshold: u8,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
            progress_threshold: 5,
        }
    }
}

/// Result of a long-poll wait.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitOutcome {
    pub snapshot: StatusSnapshot,
    /// The resource reached a terminal state; the client can stop polling.
    pub completed: bool,
    /// Nothing material changed before the deadline.
    pub timed_out: bool,
}

/// Long-poll wait-for-change on top of the status cache.
///
/// A wait suspends on the cache's write notification for the resource, a
/// fixed re-check tick and the deadline, whichever fires first. Dropping the
/// future (client went away) releases everything it holds.
#[derive(Clone)]
pub struct ChangeWaiter {
    cache: Arc<StatusCache>,
    store: Arc<dyn StatusStore>,
    config: WaiterConfig,
}

impl ChangeWaiter {
    pub fn new(cache: Arc<StatusCache>, store: Arc<dyn StatusStore>, config: WaiterConfig) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    pub fn config(&self) -> &WaiterConfig {
        &self.config
    }

    /// The wait actually applied for a requested one.
    pub fn bounded_wait(&self, requested: Duration) -> Duration {
        requested.min(self.config.max_wait)
    }

    /// Whether `current` differs materially from what the client knows.
    ///
    /// Any backwards move in progress counts, so a retried step that resets
    /// progress is never hidden behind the threshold.
    pub fn has_changed(&self, known: &KnownStatus, current: &StatusSnapshot) -> bool {
        if known.state != current.state {
            return true;
        }
        match (known.progress, current.progress) {
            (Some(before), Some(now)) if now < before => true,
            (Some(before), Some(now)) => now - before >= self.config.progress_threshold,
            (None, Some(_)) | (Some(_), None) => true,
            (None, None) => false,
        }
    }

    /// Wait until the resource changes materially, becomes terminal, or
    /// `max_wait` (capped) elapses.
    ///
    /// Fails with `NotFound` when neither the cache nor one fallback store read
    /// knows the resource.
    pub async fn wait_for_change(
        &self,
        resource_id: &str,
        known: Option<&KnownStatus>,
        max_wait: Duration,
    ) -> Result<WaitOutcome, Error> {
        let deadline = Instant::now() + self.bounded_wait(max_wait);

        // Subscribe before the first read so a write in between is not missed.
        let mut changes = self.cache.subscribe(resource_id);
        let mut watching = true;

        let poll_interval = self.config.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut latest = self.current(resource_id).await?;

        loop {
            if let Some(outcome) = self.evaluate(known, &latest) {
                return Ok(outcome);
            }

            tokio::select! {
                _ = time::sleep_until(deadline) => {
                    trace!("Long poll on {resource_id} timed out");
                    let completed = latest.is_terminal();
                    return Ok(WaitOutcome {
                        snapshot: latest,
                        completed,
                        timed_out: true,
                    });
                }
                changed = changes.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    }
                }
                _ = ticker.tick() => {}
            }

            latest = self.current(resource_id).await?;
        }
    }

    fn evaluate(&self, known: Option<&KnownStatus>, current: &StatusSnapshot) -> Option<WaitOutcome> {
        if current.is_terminal() {
            return Some(WaitOutcome {
                snapshot: current.clone(),
                completed: true,
                timed_out: false,
            });
        }

        let changed = match known {
            Some(known) => self.has_changed(known, current),
            None => true,
        };

        changed.then(|| WaitOutcome {
            snapshot: current.clone(),
            completed: false,
            timed_out: false,
        })
    }

    /// Cached snapshot, falling back to a single store read that repopulates the cache.
    async fn current(&self, resource_id: &str) -> Result<StatusSnapshot, Error> {
        if let Some(snapshot) = self.cache.get(resource_id) {
            return Ok(snapshot);
        }

        debug!("Status of {resource_id} not cached, reading from store");
        match self.store.load_snapshot(resource_id).await? {
            Some(snapshot) => Ok(self.cache.put(snapshot)),
            None => Err(Error::not_found(resource_id)),
        }
    }
}
