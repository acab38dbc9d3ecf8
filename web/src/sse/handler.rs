use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use async_stream::stream;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use log::*;
use std::convert::Infallible;

/// GET /status/:resource_id/stream
/// Opens a one-way stream of every status and location change of a resource.
///
/// The registry writes a `heartbeat` frame on a fixed interval, so no extra
/// keep-alive is configured here. When the client goes away the response body
/// is dropped, which drops the `StreamConnection` and deregisters it.
pub(crate) async fn sse_handler(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let mut connection = app_state
        .coordinator()
        .open_stream(&user, &resource_id)
        .await?;

    debug!(
        "Established SSE stream {} on {resource_id} for {}",
        connection.id().as_str(),
        user.id
    );

    let stream = stream! {
        while let Some(envelope) = connection.recv().await {
            yield Ok(Event::default()
                .event(envelope.event_type.clone())
                .data(envelope.to_json()));
        }

        // The registry dropped this stream as slow or closed.
        debug!("SSE stream {} on {} ended", connection.id().as_str(), connection.resource_id());
    };

    Ok(Sse::new(stream))
}
