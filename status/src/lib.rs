//! Resource status tracking for polling consumers.
//!
//! - `snapshot`: the lifecycle states of orders and uploads and the cached snapshot type
//! - `transition`: role-gated state machine validation
//! - `cache`: process-local TTL cache with per-resource change notification
//! - `store`: seam to the external store that owns the source of truth
//! - `waiter`: long-poll wait-for-change on top of the cache

pub mod cache;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod transition;
pub mod waiter;

pub use cache::StatusCache;
pub use error::{Error, ErrorKind};
pub use snapshot::{KnownStatus, OrderStatus, ResourceId, StateTag, StatusSnapshot, UploadStatus};
pub use store::{MemoryStatusStore, StatusStore};
pub use transition::{Actor, Assignment, Role};
pub use waiter::{ChangeWaiter, WaitOutcome, WaiterConfig};
