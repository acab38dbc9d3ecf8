use async_trait::async_trait;
use broker::BrokerBridge;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Forwards locally produced events to the broker for other processes.
///
/// A failed publish is logged and counted but never surfaces to the producer:
/// local clients were already served, only cross-process delivery of this
/// event is lost.
pub struct BrokerForwarder {
    bridge: Arc<BrokerBridge>,
    failures: AtomicU64,
}

impl BrokerForwarder {
    pub fn new(bridge: Arc<BrokerBridge>) -> Self {
        Self {
            bridge,
            failures: AtomicU64::new(0),
        }
    }

    /// Publishes that failed since startup.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for BrokerForwarder {
    async fn handle(&self, event: &DomainEvent) {
        if let Err(e) = self.bridge.publish(event).await {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Broker unavailable, {} not delivered to other processes: {e}",
                event.event_type()
            );
        }
    }
}
