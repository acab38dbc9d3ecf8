use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use delivery::StatusUpdate;
use log::*;
use status::{KnownStatus, StateTag};
use std::time::Duration;

/// Body of a producer's status report.
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub state: StateTag,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// What a long-polling client last saw, and how long it is willing to wait.
#[derive(Debug, Deserialize)]
pub struct WaitParams {
    pub state: Option<StateTag>,
    pub progress: Option<u8>,
    pub max_wait_ms: Option<u64>,
}

impl WaitParams {
    fn known(&self) -> Option<KnownStatus> {
        self.state.map(|state| KnownStatus {
            state,
            progress: self.progress,
        })
    }
}

/// GET /status/:resource_id
/// Short poll. `data` is left out when nothing is known about the resource yet.
pub async fn read(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET status of {resource_id} for {}", user.id);

    let coordinator = app_state.coordinator();
    coordinator.authorize_watch(&user, &resource_id).await?;

    let snapshot = coordinator.poll_status(&resource_id).await?;

    // An unknown resource is an absent snapshot, not an error.
    Ok(Json(ApiResponse {
        status_code: StatusCode::OK.into(),
        data: snapshot,
    }))
}

/// GET /status/:resource_id/wait?state=..&progress=..&max_wait_ms=..
/// Long poll. Answers as soon as the resource moved on from `state`/`progress`,
/// completed, or the (capped) wait elapsed.
pub async fn wait(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(params): Query<WaitParams>,
) -> Result<impl IntoResponse, Error> {
    let coordinator = app_state.coordinator();
    coordinator.authorize_watch(&user, &resource_id).await?;

    let max_wait = params
        .max_wait_ms
        .map(Duration::from_millis)
        .unwrap_or(coordinator.config().waiter.max_wait);
    debug!("Long poll on {resource_id} for {} up to {max_wait:?}", user.id);

    let outcome = coordinator
        .wait_for_status_change(&resource_id, params.known(), max_wait)
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), outcome)))
}

/// PUT /status/:resource_id
/// Producer report of a new state. Illegal moves are answered with 422.
pub async fn update(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(resource_id): Path<String>,
    Json(request): Json<ReportRequest>,
) -> Result<impl IntoResponse, Error> {
    debug!("PUT status of {resource_id} to {} by {}", request.state, user.id);

    let snapshot = app_state
        .coordinator()
        .report_status_change(
            &user,
            StatusUpdate {
                resource_id,
                state: request.state,
                progress: request.progress,
                detail: request.detail,
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), snapshot)))
}
