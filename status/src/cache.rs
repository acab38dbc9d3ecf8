use crate::snapshot::{ResourceId, StatusSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default time-to-live of a cached snapshot.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: StatusSnapshot,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local cache of the last-known snapshot per resource.
///
/// Writes are last-write-wins by call order. Every write also bumps a
/// per-resource version on a `watch` channel so long-poll waiters can suspend
/// until something changes instead of spinning.
pub struct StatusCache {
    entries: DashMap<ResourceId, CacheEntry>,
    versions: DashMap<ResourceId, watch::Sender<u64>>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            versions: DashMap::new(),
            ttl,
        }
    }

    /// Store `snapshot`, stamping `updated_at` so it never goes backwards for
    /// a resource. Returns the snapshot as stored.
    pub fn put(&self, mut snapshot: StatusSnapshot) -> StatusSnapshot {
        let now = chrono::Utc::now();
        let expires_at = Instant::now() + self.ttl;
        let resource_id = snapshot.resource_id.clone();

        match self.entries.entry(resource_id.clone()) {
            Entry::Occupied(mut occupied) => {
                snapshot.updated_at = now.max(occupied.get().snapshot.updated_at);
                occupied.insert(CacheEntry {
                    snapshot: snapshot.clone(),
                    expires_at,
                });
            }
            Entry::Vacant(vacant) => {
                snapshot.updated_at = now;
                vacant.insert(CacheEntry {
                    snapshot: snapshot.clone(),
                    expires_at,
                });
            }
        }

        trace!("Cached {} as {}", resource_id, snapshot.state);
        self.notify(&resource_id);
        snapshot
    }

    /// The cached snapshot, or `None` when absent or expired.
    pub fn get(&self, resource_id: &str) -> Option<StatusSnapshot> {
        if let Some(entry) = self.entries.get(resource_id) {
            if !entry.is_expired() {
                return Some(entry.snapshot.clone());
            }
        }
        // Expired entries behave as absent and are dropped on sight.
        self.entries
            .remove_if(resource_id, |_, entry| entry.is_expired());
        None
    }

    /// Drop a resource from the cache. Waiters are woken so they re-read.
    pub fn evict(&self, resource_id: &str) {
        if self.entries.remove(resource_id).is_some() {
            self.notify(resource_id);
        }
    }

    /// Subscribe to write notifications for a resource. The received value is
    /// a write counter, only its changes matter.
    pub fn subscribe(&self, resource_id: &str) -> watch::Receiver<u64> {
        self.versions
            .entry(resource_id.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// Number of waiters currently suspended on a resource.
    pub fn waiter_count(&self, resource_id: &str) -> usize {
        self.versions
            .get(resource_id)
            .map_or(0, |version| version.receiver_count())
    }

    fn notify(&self, resource_id: &str) {
        if let Some(version) = self.versions.get(resource_id) {
            version.send_modify(|v| *v = v.wrapping_add(1));
        }
    }

    /// Remove expired snapshots and notification slots nobody listens to.
    /// Returns the number of snapshots removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        self.versions.retain(|_, version| version.receiver_count() > 0);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the periodic sweep. The task stops when the returned guard is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> SweepTask {
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!("Purged {removed} expired status snapshot(s)");
                }
            }
        });
        SweepTask { handle }
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Owns the background sweep; aborting on drop ties the timer to the cache's lifetime.
pub struct SweepTask {
    handle: JoinHandle<()>,
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
