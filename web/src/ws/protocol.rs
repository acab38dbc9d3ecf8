use delivery::Coordinator;
use events::{Actor, Envelope};
use log::*;
use rooms::SessionHandle;
use serde::Deserialize;
use serde_json::{json, Value};

/// A frame received from a client: `{ "type": ..., "data": ... }`.
#[derive(Debug, Deserialize)]
pub(crate) struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct RoomData {
    room: String,
}

#[derive(Debug, Deserialize)]
struct ChatData {
    room: String,
    message: Value,
}

/// Handle one text frame from a session. Returns the direct reply to that
/// session, if any. Frames of unknown type are ignored.
pub(crate) async fn handle_text(
    coordinator: &Coordinator,
    actor: &Actor,
    handle: &SessionHandle,
    text: &str,
) -> Option<Envelope> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Malformed frame from session {}: {e}", handle.id().as_str());
            return Some(error_reply(format!("malformed frame: {e}")));
        }
    };

    match frame.frame_type.as_str() {
        "ping" => Some(Envelope::new("pong", json!({}))),
        "join" => {
            let RoomData { room } = parse(frame.data)?;
            match coordinator.join_room(actor, &room, handle).await {
                Ok(_) => Some(Envelope::new("joined", json!({ "room": room }))),
                Err(e) => Some(error_reply(e.to_string())),
            }
        }
        "leave" => {
            let RoomData { room } = parse(frame.data)?;
            coordinator.leave_room(&room, handle.id());
            Some(Envelope::new("left", json!({ "room": room })))
        }
        "chat_message" => {
            let ChatData { room, message } = parse(frame.data)?;
            match coordinator
                .post_chat_message(&room, handle, actor, message)
                .await
            {
                // The acknowledgement was already sent to the session.
                Ok(()) => None,
                Err(e) => Some(error_reply(e.to_string())),
            }
        }
        other => {
            trace!("Ignoring frame of unknown type {other}");
            None
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!("Ignoring frame with unexpected data: {e}");
            None
        }
    }
}

fn error_reply(message: String) -> Envelope {
    Envelope::new("error", json!({ "message": message }))
}
