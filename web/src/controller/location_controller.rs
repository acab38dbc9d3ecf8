use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use delivery::Location;
use log::*;

/// POST /orders/:order_id/location
/// Position report from the driver assigned to the order.
pub async fn create(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(order_id): Path<String>,
    Json(location): Json<Location>,
) -> Result<impl IntoResponse, Error> {
    trace!("POST location of {order_id} from {}", user.id);

    app_state
        .coordinator()
        .update_location(&user, &order_id, location)
        .await?;

    Ok(Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())))
}
