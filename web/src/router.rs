use crate::controller::{
    announcement_controller, health_check_controller, location_controller, room_controller,
    status_controller,
};
use crate::{sse, ws, AppState};
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(status_routes(app_state.clone()))
        .merge(location_routes(app_state.clone()))
        .merge(announcement_routes(app_state.clone()))
        .merge(room_routes(app_state.clone()))
        .merge(ws_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn status_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/status/:resource_id", get(status_controller::read))
        .route("/status/:resource_id", put(status_controller::update))
        .route("/status/:resource_id/wait", get(status_controller::wait))
        .route("/status/:resource_id/stream", get(sse::handler::sse_handler))
        .with_state(app_state)
}

fn location_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/orders/:order_id/location",
            post(location_controller::create),
        )
        .with_state(app_state)
}

fn announcement_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/announcements", post(announcement_controller::create))
        .with_state(app_state)
}

fn room_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/rooms/:room/state", put(room_controller::update_state))
        .with_state(app_state)
}

fn ws_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handler::ws_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use events::{Actor, Role};
    use service::config::Config;
    use status::{Assignment, MemoryStatusStore, OrderStatus};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MemoryStatusStore>) {
        let store = Arc::new(MemoryStatusStore::new());
        store.assign(
            "O1",
            Assignment {
                customer_id: Some("c1".to_string()),
                restaurant_id: Some("r1".to_string()),
                driver_id: Some("d1".to_string()),
            },
        );
        let config = Config::parse_from(["delivery_platform"]);
        let app_state = AppState::build(config, store.clone(), Arc::new(broker::MemoryBroker::new()));
        (define_routes(app_state), store)
    }

    fn request(method: &str, uri: &str, actor: Option<&Actor>, body: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header("x-user-id", actor.id.as_str())
                .header("x-user-role", actor.role.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_responds() {
        let (app, _) = app();
        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let (app, _) = app();
        let response = app
            .oneshot(request("GET", "/status/O1", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_report_then_poll_status() {
        let (app, _) = app();
        let customer = Actor::new("c1", Role::Customer);

        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                "/status/O1",
                Some(&customer),
                Some(r#"{"state":"confirmed"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("GET", "/status/O1", Some(&customer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["state"], "confirmed");
    }

    #[tokio::test]
    async fn test_invalid_transition_is_unprocessable() {
        let (app, store) = app();
        store.insert(status::StatusSnapshot::new("O1", OrderStatus::Confirmed));
        let driver = Actor::new("d1", Role::Driver);

        let response = app
            .oneshot(request(
                "PUT",
                "/status/O1",
                Some(&driver),
                Some(r#"{"state":"delivered"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_long_poll_returns_completed_for_terminal_order() {
        let (app, store) = app();
        store.insert(status::StatusSnapshot::new("O1", OrderStatus::Delivered));
        let customer = Actor::new("c1", Role::Customer);

        let response = app
            .oneshot(request(
                "GET",
                "/status/O1/wait?state=picked_up&max_wait_ms=5000",
                Some(&customer),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["data"]["completed"], true);
        assert_eq!(body["data"]["snapshot"]["state"], "delivered");
    }

    #[tokio::test]
    async fn test_foreign_customer_cannot_poll() {
        let (app, _) = app();
        let stranger = Actor::new("c2", Role::Customer);
        let response = app
            .oneshot(request("GET", "/status/O1", Some(&stranger), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
