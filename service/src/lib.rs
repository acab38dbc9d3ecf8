use broker::{Broker, MemoryBroker, RedisBroker, RedisConnectionConfig};
use config::Config;
use delivery::Coordinator;
use log::*;
use status::StatusStore;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Connect to the configured fan-out broker, or fall back to an in-process one
/// when no broker URL is set. Only a single-process deployment should run without one.
pub async fn init_broker(config: &Config) -> Result<Arc<dyn Broker>, broker::Error> {
    match config.broker_url() {
        Some(url) => {
            info!("Connecting to fan-out broker at {url}");
            let broker = RedisBroker::connect(url, &RedisConnectionConfig::default()).await?;
            Ok(Arc::new(broker))
        }
        None => {
            warn!("No broker URL configured, events will not reach other processes");
            Ok(Arc::new(MemoryBroker::new()))
        }
    }
}

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, coordinator: &Arc<Coordinator>) -> Self {
        Self {
            coordinator: Arc::clone(coordinator),
            config: app_config,
        }
    }

    /// Build the coordinator over the given store and broker.
    pub fn build(app_config: Config, store: Arc<dyn StatusStore>, broker: Arc<dyn Broker>) -> Self {
        let coordinator = Arc::new(Coordinator::new(app_config.delivery_config(), store, broker));
        Self::new(app_config, &coordinator)
    }

    pub fn coordinator(&self) -> &Coordinator {
        self.coordinator.as_ref()
    }
}
