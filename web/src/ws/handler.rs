use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::ws::protocol;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use events::Actor;
use futures::{SinkExt, StreamExt};
use log::*;

/// GET /ws
/// Upgrades to a WebSocket session. The session starts in the announcement
/// rooms for the caller's role and joins further rooms on request.
pub(crate) async fn ws_handler(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    debug!("WebSocket upgrade requested by {} {}", user.role, user.id);
    ws.on_upgrade(move |socket| run_session(socket, app_state, user))
}

async fn run_session(socket: WebSocket, app_state: AppState, actor: Actor) {
    let coordinator = app_state.coordinator.clone();
    let (handle, mut outbound) = coordinator.open_session();
    let session_id = handle.id().clone();

    if let Err(e) = coordinator.join_announcements(&actor, &handle).await {
        warn!("Session {} could not join announcements: {e}", session_id.as_str());
    }

    let (mut sink, mut inbound) = socket.split();

    // Writer: drains frames queued for this session by rooms and replies.
    let mut writer = tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            if sink.send(Message::Text(envelope.to_json())).await.is_err() {
                break;
            }
        }
    });

    info!("Session {} opened for {}", session_id.as_str(), actor.id);

    let reader = async {
        while let Some(message) = inbound.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Some(reply) =
                        protocol::handle_text(&coordinator, &actor, &handle, &text).await
                    {
                        handle.send(&reply);
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Session {} read failed: {e}", session_id.as_str());
                    break;
                }
            }
        }
    };

    // Whichever half fails first ends the session.
    tokio::select! {
        _ = reader => {}
        _ = &mut writer => {
            debug!("Session {} could no longer be written to", session_id.as_str());
        }
    }

    let left = coordinator.disconnect(&session_id);
    writer.abort();
    info!(
        "Session {} closed for {}, left {left} room(s)",
        session_id.as_str(),
        actor.id
    );
}
