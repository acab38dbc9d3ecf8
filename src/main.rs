use log::*;
use service::{config::Config, init_broker, logging::Logger, AppState};
use status::MemoryStatusStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::new();
    Logger::init_logger(&config)?;

    info!(
        "Starting delivery platform in {} mode",
        config.runtime_env()
    );

    let broker = init_broker(&config).await?;
    // The source of truth lives outside this service; the in-memory store
    // stands in until a store adapter is plugged in here.
    let store = Arc::new(MemoryStatusStore::new());

    let app_state = AppState::build(config, store, broker);
    app_state.coordinator.start().await?;

    web::init_server(app_state).await?;
    Ok(())
}
