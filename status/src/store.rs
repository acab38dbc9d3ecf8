use crate::error::Error;
use crate::snapshot::{ResourceId, StatusSnapshot};
use crate::transition::Assignment;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// The external store that owns the source of truth for resource state.
///
/// The cache is only ever repopulated from here; nothing in this crate assumes
/// the store and the cache agree at every instant.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn load_snapshot(&self, resource_id: &str) -> Result<Option<StatusSnapshot>, Error>;

    /// Record `snapshot` only if the stored one still equals `expected`
    /// (`None` when nothing is stored yet). Returns false, writing nothing,
    /// when another writer got there first.
    async fn compare_and_save(
        &self,
        expected: Option<&StatusSnapshot>,
        snapshot: &StatusSnapshot,
    ) -> Result<bool, Error>;

    /// Parties attached to a resource. Support chats are keyed by room name.
    async fn load_assignment(&self, resource_id: &str) -> Result<Option<Assignment>, Error>;
}

/// In-memory store used by tests and single-node development runs.
#[derive(Default)]
pub struct MemoryStatusStore {
    snapshots: DashMap<ResourceId, StatusSnapshot>,
    assignments: DashMap<ResourceId, Assignment>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, resource_id: impl Into<ResourceId>, assignment: Assignment) {
        self.assignments.insert(resource_id.into(), assignment);
    }

    pub fn insert(&self, snapshot: StatusSnapshot) {
        self.snapshots.insert(snapshot.resource_id.clone(), snapshot);
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn load_snapshot(&self, resource_id: &str) -> Result<Option<StatusSnapshot>, Error> {
        Ok(self.snapshots.get(resource_id).map(|s| s.clone()))
    }

    async fn compare_and_save(
        &self,
        expected: Option<&StatusSnapshot>,
        snapshot: &StatusSnapshot,
    ) -> Result<bool, Error> {
        match self.snapshots.entry(snapshot.resource_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if expected != Some(occupied.get()) {
                    return Ok(false);
                }
                occupied.insert(snapshot.clone());
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(snapshot.clone());
            }
        }
        Ok(true)
    }

    async fn load_assignment(&self, resource_id: &str) -> Result<Option<Assignment>, Error> {
        Ok(self.assignments.get(resource_id).map(|a| a.clone()))
    }
}
