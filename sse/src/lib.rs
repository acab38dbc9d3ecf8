//! Server-Sent Events (SSE) infrastructure for one-way resource updates.
//!
//! Clients open a long-lived stream bound to a single resource (an order or an
//! upload) and receive every status or location change pushed for it.
//!
//! # Architecture
//!
//! - **Per-resource registry**: one map entry per resource holds its streams,
//!   so a push or membership change locks only that resource.
//! - **Bounded buffers**: each stream has a fixed frame buffer. A stream whose
//!   buffer is closed or full is removed on the next write, silently.
//! - **Heartbeats**: a scheduled task writes a `heartbeat` frame to every stream
//!   on a fixed interval, keeping proxies from idling out connections and
//!   flushing out dead ones.
//! - **Scoped lifetime**: `StreamConnection` deregisters itself when dropped,
//!   which is what happens when the HTTP response body is dropped on disconnect.
//! - **Ephemeral messages**: a client that is not connected misses the frame and
//!   catches up through polling.
//!
//! Authorization happens before `open`; the registry trusts its caller.
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry keyed by resource, with type-safe ConnectionId
//! - `manager`: open/close/push, heartbeat task and the scoped StreamConnection

pub mod connection;
pub mod manager;

pub use connection::{ConnectionId, ResourceId, SubscriberId};
pub use manager::{HeartbeatTask, Manager, StreamConnection};
