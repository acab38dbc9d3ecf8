//! HTTP and WebSocket surface of the delivery platform.
//!
//! Handlers stay thin: they authenticate the caller from gateway headers,
//! translate the request and hand it to the `Coordinator`.

use axum::http::{header, HeaderValue, Method};
use log::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
mod error;
mod extractors;
pub mod router;
mod sse;
mod ws;

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let host = format!("{interface}:{}", app_state.config.port);

    info!("Server starting... listening for connections on http://{host}");

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_credentials(true)
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            extractors::authenticated_user::USER_ID_HEADER,
            extractors::authenticated_user::USER_ROLE_HEADER,
        ])
        .allow_origin(
            app_state
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Ignoring invalid allowed origin {origin}: {e}");
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        );

    let coordinator = app_state.coordinator.clone();
    let listener = TcpListener::bind(&host).await?;
    let app = router::define_routes(app_state).layer(cors_layer);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    coordinator.shutdown();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}
