//! Cross-process fan-out of real-time events.
//!
//! Connection registries are process-local. This crate carries events between
//! processes so a client connected to one node hears about a change handled
//! on another.
//!
//! - `Broker`: the external pub/sub seam (`MemoryBroker` in-process, `RedisBroker` for deployments)
//! - `BrokerBridge`: publishes origin-tagged events and re-dispatches received
//!   ones into a local `EventHandler`, skipping the ones this process sent
//! - `channel`: the fixed catalogue of channels
//!
//! Delivery is at-least-once and unordered across channels. Local handlers
//! must tolerate duplicates; re-sending the same frame is harmless.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub mod bridge;
pub mod channel;
pub mod error;
pub mod memory;
pub mod redis;

pub use bridge::{BrokerBridge, BrokerMessage, SubscriptionRecord};
pub use error::{Error, ErrorKind};
pub use memory::MemoryBroker;
pub use self::redis::{RedisBroker, RedisConnectionConfig};

/// Raw payloads received on one channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error>;

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error>;
}
