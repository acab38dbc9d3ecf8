use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use log::*;
use rooms::RoomState;

#[derive(Debug, Deserialize)]
pub struct RoomStateRequest {
    pub state: RoomState,
}

/// PUT /rooms/:room/state
/// Resolve or close a room.
pub async fn update_state(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(room): Path<String>,
    Json(request): Json<RoomStateRequest>,
) -> Result<impl IntoResponse, Error> {
    debug!("PUT state of {room} to {} by {}", request.state, user.id);

    app_state
        .coordinator()
        .set_room_state(&user, &room, request.state)?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "room": room, "state": request.state }),
    )))
}
