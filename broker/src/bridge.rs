use crate::channel::channel_for;
use crate::error::Error;
use crate::Broker;
use events::{DomainEvent, EventHandler};
use futures::StreamExt;
use log::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// What travels on a broker channel: the event plus the process that sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub origin: String,
    pub event: DomainEvent,
}

/// One live channel subscription of this process.
pub struct SubscriptionRecord {
    pub channel: String,
    task: JoinHandle<()>,
}

impl SubscriptionRecord {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Publishes local events to the broker and re-dispatches events from other
/// processes into a local handler.
///
/// A process already dispatched its own events locally before publishing, so
/// messages tagged with this process's id are skipped on receipt.
pub struct BrokerBridge {
    broker: Arc<dyn Broker>,
    process_id: String,
    subscriptions: Mutex<Vec<SubscriptionRecord>>,
}

impl BrokerBridge {
    pub fn new(broker: Arc<dyn Broker>, process_id: impl Into<String>) -> Self {
        Self {
            broker,
            process_id: process_id.into(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Publish an event on the channel its kind travels on.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), Error> {
        self.publish_on(&channel_for(event), event).await
    }

    pub async fn publish_on(&self, channel: &str, event: &DomainEvent) -> Result<(), Error> {
        let payload = serde_json::to_string(&BrokerMessage {
            origin: self.process_id.clone(),
            event: event.clone(),
        })?;
        self.broker.publish(channel, payload).await?;
        trace!("Published {} on {channel}", event.event_type());
        Ok(())
    }

    /// Forward every event received on `channel` from other processes to `handler`.
    /// Subscribing to a channel that already has an active subscription is a no-op.
    pub async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), Error> {
        if self.is_subscribed(channel) {
            debug!("Already subscribed to {channel}");
            return Ok(());
        }

        let mut messages = self.broker.subscribe(channel).await?;
        let origin = self.process_id.clone();
        let channel_name = channel.to_string();

        let task = tokio::spawn(async move {
            while let Some(payload) = messages.next().await {
                match serde_json::from_str::<BrokerMessage>(&payload) {
                    Ok(message) if message.origin == origin => {
                        trace!("Skipping own {} on {channel_name}", message.event.event_type());
                    }
                    Ok(message) => {
                        debug!(
                            "Received {} on {channel_name} from {}",
                            message.event.event_type(),
                            message.origin
                        );
                        handler.handle(&message.event).await;
                    }
                    Err(e) => warn!("Ignoring malformed message on {channel_name}: {e}"),
                }
            }
            warn!("Broker subscription to {channel_name} ended");
        });

        info!("Subscribed to broker channel {channel}");
        self.lock_subscriptions().push(SubscriptionRecord {
            channel: channel.to_string(),
            task,
        });
        Ok(())
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.lock_subscriptions()
            .iter()
            .any(|record| record.channel == channel && record.is_active())
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.lock_subscriptions()
            .iter()
            .filter(|record| record.is_active())
            .map(|record| record.channel.clone())
            .collect()
    }

    /// Stop every subscription loop.
    pub fn shutdown(&self) {
        let mut subscriptions = self.lock_subscriptions();
        for record in subscriptions.drain(..) {
            record.task.abort();
        }
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionRecord>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BrokerBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use async_trait::async_trait;
    use events::Audience;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<DomainEvent>);

    #[async_trait]
    impl EventHandler for Forward {
        async fn handle(&self, event: &DomainEvent) {
            let _ = self.0.send(event.clone());
        }
    }

    fn announcement() -> DomainEvent {
        DomainEvent::AnnouncementPublished {
            audience: Audience::All,
            announcement: json!({"title": "rain delays"}),
        }
    }

    #[tokio::test]
    async fn test_event_from_other_process_is_dispatched_once() {
        let broker = Arc::new(MemoryBroker::new());
        let p1 = BrokerBridge::new(broker.clone(), "p1");
        let p2 = BrokerBridge::new(broker.clone(), "p2");

        let (tx, mut rx) = mpsc::unbounded_channel();
        p2.subscribe("announcements-all", Arc::new(Forward(tx)))
            .await
            .unwrap();

        p1.publish(&announcement()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, announcement());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_own_events_are_skipped() {
        let broker = Arc::new(MemoryBroker::new());
        let p1 = BrokerBridge::new(broker.clone(), "p1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        p1.subscribe("announcements-all", Arc::new(Forward(tx)))
            .await
            .unwrap();
        p1.publish(&announcement()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_twice_keeps_one_subscription() {
        let broker = Arc::new(MemoryBroker::new());
        let bridge = BrokerBridge::new(broker, "p1");
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn EventHandler> = Arc::new(Forward(tx));

        bridge.subscribe("room-events", handler.clone()).await.unwrap();
        bridge.subscribe("room-events", handler).await.unwrap();

        assert_eq!(bridge.subscribed_channels(), vec!["room-events".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_fails_when_broker_is_down() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_available(false);
        let bridge = BrokerBridge::new(broker, "p1");

        assert!(bridge.publish(&announcement()).await.is_err());
    }
}
