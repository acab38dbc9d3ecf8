use chrono::{DateTime, Utc};
use dashmap::DashMap;
use events::{DeliveryReport, Envelope};
use log::*;
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

/// Identifier of a streamed resource (an order or an upload).
pub type ResourceId = String;

/// Identity of the authenticated principal behind a connection.
pub type SubscriberId = String;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// One open one-way stream bound to a single resource.
#[derive(Debug, Clone)]
pub struct StreamSubscription {
    pub subscriber: SubscriberId,
    pub joined_at: DateTime<Utc>,
    sender: Sender<Envelope>,
}

impl StreamSubscription {
    /// Write a frame without waiting. A full buffer means the consumer is too
    /// slow, a closed one means it is gone; both end the subscription.
    fn try_push(&self, connection_id: &ConnectionId, envelope: &Envelope) -> bool {
        match self.sender.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Stream consumer {} ({}) is not keeping up, dropping it",
                    connection_id.as_str(),
                    self.subscriber
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Stream consumer {} ({}) has disconnected",
                    connection_id.as_str(),
                    self.subscriber
                );
                false
            }
        }
    }
}

/// Per-resource registry of open streams.
///
/// Each resource's subscriptions live under one map entry, so every mutation
/// of a resource's member set goes through that entry's lock and unrelated
/// resources never contend. Pushes happen under the same lock, which keeps
/// per-resource push order equal to call order.
pub struct ConnectionRegistry {
    resources: DashMap<ResourceId, HashMap<ConnectionId, StreamSubscription>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
        }
    }

    /// Register a new stream for a resource.
    pub fn register(
        &self,
        resource_id: ResourceId,
        subscriber: SubscriberId,
        sender: Sender<Envelope>,
    ) -> ConnectionId {
        let connection_id = ConnectionId::new();

        self.resources.entry(resource_id).or_default().insert(
            connection_id.clone(),
            StreamSubscription {
                subscriber,
                joined_at: Utc::now(),
                sender,
            },
        );

        connection_id
    }

    /// Remove a stream. Returns false when it was already gone.
    pub fn unregister(&self, resource_id: &str, connection_id: &ConnectionId) -> bool {
        let removed = match self.resources.get_mut(resource_id) {
            Some(mut subscriptions) => subscriptions.remove(connection_id).is_some(),
            None => false,
        };

        // Clean up empty resource entries
        self.resources
            .remove_if(resource_id, |_, subscriptions| subscriptions.is_empty());

        removed
    }

    /// Push a frame to every stream of a resource, dropping the ones that fail.
    pub fn send_to_resource(&self, resource_id: &str, envelope: &Envelope) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        if let Some(mut subscriptions) = self.resources.get_mut(resource_id) {
            subscriptions.retain(|connection_id, subscription| {
                let ok = subscription.try_push(connection_id, envelope);
                if ok {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                }
                ok
            });
        }

        if report.dropped > 0 {
            self.resources
                .remove_if(resource_id, |_, subscriptions| subscriptions.is_empty());
        }

        report
    }

    /// Push a frame to every open stream - O(n), used for heartbeats.
    pub fn broadcast(&self, envelope: &Envelope) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for mut entry in self.resources.iter_mut() {
            entry.value_mut().retain(|connection_id, subscription| {
                let ok = subscription.try_push(connection_id, envelope);
                if ok {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                }
                ok
            });
        }

        if report.dropped > 0 {
            self.resources
                .retain(|_, subscriptions| !subscriptions.is_empty());
        }

        report
    }

    pub fn subscriber_count(&self, resource_id: &str) -> usize {
        self.resources
            .get(resource_id)
            .map_or(0, |subscriptions| subscriptions.len())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn connection_count(&self) -> usize {
        self.resources
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
