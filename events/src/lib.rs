//! Event system infrastructure for the delivery platform.
//!
//! This crate provides the event model that decouples "something changed"
//! producers from the infrastructure that delivers the change to clients
//! (streaming registry, room registry, cross-process broker).
//!
//! # Architecture
//!
//! - **DomainEvent**: closed enum of every real-time event in the system
//! - **Envelope**: the `{ type, data, timestamp }` frame written to clients
//! - **DeliveryReport**: how many handles a frame reached
//! - **Actor**: the authenticated principal behind a call or connection
//! - **EventHandler**: trait for implementing event handlers
//! - **EventPublisher**: publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Snapshots and payloads are carried as serialized JSON values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod envelope;
pub mod principal;

pub use envelope::Envelope;
pub use principal::{Actor, Role};

/// Outcome of writing one frame to a set of client handles.
/// Handles that failed are not retried; `dropped` only counts them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Target audience tier of an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    All,
    Customers,
    Restaurants,
    Drivers,
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Audience::All,
        Audience::Customers,
        Audience::Restaurants,
        Audience::Drivers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::All => "all",
            Audience::Customers => "customers",
            Audience::Restaurants => "restaurants",
            Audience::Drivers => "drivers",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Real-time events that represent state changes clients must hear about.
///
/// The set is closed on purpose: every consumer dispatches through an
/// exhaustive `match`, so adding a variant is a compile error until every
/// delivery path handles it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// An order or upload moved to a new snapshot.
    StatusChanged {
        resource_id: String,
        /// Serialized `StatusSnapshot`.
        snapshot: Value,
    },
    /// The driver assigned to an order reported a new position.
    LocationUpdated {
        order_id: String,
        driver_id: String,
        location: Value,
    },
    /// A chat message was posted to a room.
    ChatMessagePosted {
        room: String,
        sender_id: String,
        /// Session the message came from, left out of the room broadcast.
        /// Only meaningful on the process that holds that session.
        #[serde(default)]
        sender_session: Option<String>,
        message: Value,
    },
    /// An operator announcement for one audience tier.
    AnnouncementPublished {
        audience: Audience,
        announcement: Value,
    },
}

impl DomainEvent {
    /// The `type` tag clients see on the envelope built from this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::StatusChanged { .. } => "status_changed",
            DomainEvent::LocationUpdated { .. } => "location_updated",
            DomainEvent::ChatMessagePosted { .. } => "chat_message",
            DomainEvent::AnnouncementPublished { .. } => "announcement",
        }
    }
}

/// Trait for handling domain events.
/// Implementations perform side effects like pushing to connected clients,
/// refreshing caches or forwarding to other processes.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers do not return errors; each one contains and logs its own failures.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            self.log
                .lock()
                .await
                .push(format!("{}:{}", self.name, event.event_type()));
        }
    }

    #[tokio::test]
    async fn test_publisher_calls_handlers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let publisher = EventPublisher::new()
            .with_handler(Arc::new(Recorder {
                name: "first",
                log: log.clone(),
            }))
            .with_handler(Arc::new(Recorder {
                name: "second",
                log: log.clone(),
            }));

        publisher
            .publish(DomainEvent::AnnouncementPublished {
                audience: Audience::All,
                announcement: json!({"title": "maintenance"}),
            })
            .await;

        assert_eq!(
            *log.lock().await,
            vec!["first:announcement", "second:announcement"]
        );
    }

    #[test]
    fn test_domain_event_wire_format_is_tagged() {
        let event = DomainEvent::StatusChanged {
            resource_id: "O1".to_string(),
            snapshot: json!({"state": "ready"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "status_changed");
        assert_eq!(value["resource_id"], "O1");

        let back: DomainEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_audience_names() {
        let names: Vec<&str> = Audience::ALL.iter().map(Audience::as_str).collect();
        assert_eq!(names, vec!["all", "customers", "restaurants", "drivers"]);
    }
}
