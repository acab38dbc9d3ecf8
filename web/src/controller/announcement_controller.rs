use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use events::Audience;
use log::*;

#[derive(Debug, Deserialize)]
pub struct AnnouncementRequest {
    pub audience: Audience,
    pub announcement: Value,
}

/// POST /announcements
/// Operator announcement to one audience tier, on every process.
pub async fn create(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(request): Json<AnnouncementRequest>,
) -> Result<impl IntoResponse, Error> {
    info!("POST announcement for {} by {}", request.audience, user.id);

    app_state
        .coordinator()
        .announce(&user, request.audience, request.announcement)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())),
    ))
}
