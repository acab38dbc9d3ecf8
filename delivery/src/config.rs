use status::WaiterConfig;
use std::time::Duration;

/// Tunables of the delivery subsystem, built by the service layer from its
/// command line / environment configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Identifies this process on the broker; events carrying it are not re-dispatched here.
    pub process_id: String,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub waiter: WaiterConfig,
    /// Interval of the stream and session heartbeats; dead clients are gone within one.
    pub heartbeat_interval: Duration,
    /// How long a finished room with no members keeps its participant history.
    pub room_retention: Duration,
    /// Frames buffered per streaming consumer before it is dropped as slow.
    pub stream_buffer: usize,
    /// Frames buffered per bidirectional session.
    pub session_buffer: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            process_id: uuid::Uuid::new_v4().to_string(),
            cache_ttl: status::cache::DEFAULT_TTL,
            cache_sweep_interval: Duration::from_secs(60),
            waiter: WaiterConfig::default(),
            heartbeat_interval: sse::manager::DEFAULT_HEARTBEAT_INTERVAL,
            room_retention: Duration::from_secs(60 * 60),
            stream_buffer: sse::manager::DEFAULT_BUFFER,
            session_buffer: 256,
        }
    }
}
