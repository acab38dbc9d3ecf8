//! Delivery coordinator: the producer-facing facade over the status cache,
//! the stream and room registries and the broker bridge.
//!
//! Every producer action becomes a `DomainEvent` published to two handlers:
//! the `LocalDispatcher`, which serves clients on this process, and the
//! `BrokerForwarder`, which hands the event to other processes. Events from
//! other processes are fed to a second `LocalDispatcher` that also refreshes
//! the local cache.

pub mod authorize;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod forwarder;

pub use authorize::{audience_for, AssignmentAuthorizer, Authorizer};
pub use config::DeliveryConfig;
pub use coordinator::{Coordinator, Location, StatusUpdate};
pub use dispatch::{LocalDispatcher, Origin};
pub use error::{Error, ErrorKind};
pub use forwarder::BrokerForwarder;
