use crate::error::Error;
use crate::{Broker, MessageStream};
use async_stream::stream;
use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};

/// Capacity of each channel. Subscribers that fall behind skip messages.
const CHANNEL_CAPACITY: usize = 1024;

/// In-process broker. Sharing one instance between several coordinators
/// stands in for several processes on one external broker.
pub struct MemoryBroker {
    channels: DashMap<String, broadcast::Sender<String>>,
    available: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable, publish and subscribe fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable("memory broker is marked unavailable"))
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error> {
        self.check_available()?;
        // send() returns Err if there are no subscribers, that's fine.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error> {
        self.check_available()?;
        let mut receiver = self.sender(channel).subscribe();
        let channel = channel.to_string();

        Ok(Box::pin(stream! {
            loop {
                match receiver.recv().await {
                    Ok(payload) => yield payload,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber on {channel} lagged, skipped {skipped} message(s)");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_every_subscriber_receives_each_publish() {
        let broker = MemoryBroker::new();
        let mut first = broker.subscribe("announcements-all").await.unwrap();
        let mut second = broker.subscribe("announcements-all").await.unwrap();

        broker
            .publish("announcements-all", "hello".to_string())
            .await
            .unwrap();

        assert_eq!(first.next().await.unwrap(), "hello");
        assert_eq!(second.next().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let broker = MemoryBroker::new();
        assert!(broker.publish("nobody", "x".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_outage_fails_publish() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let err = broker.publish("c", "x".to_string()).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Unavailable);
    }
}
