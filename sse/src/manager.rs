use crate::connection::{ConnectionId, ConnectionRegistry, ResourceId, SubscriberId};
use events::{DeliveryReport, Envelope};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default number of frames buffered per stream before it counts as slow.
pub const DEFAULT_BUFFER: usize = 64;

/// Default interval between heartbeat frames.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct Manager {
    registry: Arc<ConnectionRegistry>,
    buffer: usize,
}

impl Manager {
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            buffer: buffer.max(1),
        }
    }

    /// Open a stream on a resource. The caller must already have authorized
    /// `subscriber` against `resource_id`. The stream is deregistered when the
    /// returned connection is dropped.
    pub fn open(&self, resource_id: ResourceId, subscriber: SubscriberId) -> StreamConnection {
        let (tx, rx) = mpsc::channel(self.buffer);
        let connection_id = self.register(resource_id.clone(), subscriber, tx);

        StreamConnection {
            connection_id,
            resource_id,
            receiver: rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Register an externally created handle. Pair with [`Manager::close`].
    pub fn register(
        &self,
        resource_id: ResourceId,
        subscriber: SubscriberId,
        sender: mpsc::Sender<Envelope>,
    ) -> ConnectionId {
        debug!("Opening stream on {resource_id} for {subscriber}");
        self.registry.register(resource_id, subscriber, sender)
    }

    /// Deregister a handle. Closing one that is already gone is a no-op.
    pub fn close(&self, resource_id: &str, connection_id: &ConnectionId) {
        if self.registry.unregister(resource_id, connection_id) {
            debug!(
                "Closed stream {} on {resource_id}",
                connection_id.as_str()
            );
        }
    }

    /// Push a frame to every stream open on a resource.
    pub fn push(&self, resource_id: &str, envelope: &Envelope) -> DeliveryReport {
        let report = self.registry.send_to_resource(resource_id, envelope);
        trace!(
            "Pushed {} on {resource_id}: {} delivered, {} dropped",
            envelope.event_type,
            report.delivered,
            report.dropped
        );
        report
    }

    /// Write one heartbeat frame to every open stream, dropping dead ones.
    pub fn heartbeat(&self) -> DeliveryReport {
        let report = self.registry.broadcast(&Envelope::heartbeat());
        if report.dropped > 0 {
            info!(
                "Heartbeat removed {} dead stream(s), {} still open",
                report.dropped, report.delivered
            );
        }
        report
    }

    /// Start the periodic heartbeat. The task stops when the returned guard is dropped.
    pub fn spawn_heartbeat(self: &Arc<Self>, every: Duration) -> HeartbeatTask {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                manager.heartbeat();
            }
        });
        HeartbeatTask { handle }
    }

    pub fn subscriber_count(&self, resource_id: &str) -> usize {
        self.registry.subscriber_count(resource_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

/// The receiving side of one stream. Dropping it deregisters the stream.
pub struct StreamConnection {
    connection_id: ConnectionId,
    resource_id: ResourceId,
    receiver: mpsc::Receiver<Envelope>,
    registry: Arc<ConnectionRegistry>,
}

impl StreamConnection {
    pub fn id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Next frame, or `None` once the registry has dropped this stream.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("connection_id", &self.connection_id)
            .field("resource_id", &self.resource_id)
            .finish_non_exhaustive()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if self
            .registry
            .unregister(&self.resource_id, &self.connection_id)
        {
            debug!(
                "Stream {} on {} closed by client",
                self.connection_id.as_str(),
                self.resource_id
            );
        }
    }
}

/// Owns the heartbeat timer; aborting on drop ties it to the manager's owner.
pub struct HeartbeatTask {
    handle: JoinHandle<()>,
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
