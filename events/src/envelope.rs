use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type tag used for keep-alive frames.
pub const HEARTBEAT: &str = "heartbeat";

/// The frame every push and broadcast is written as: `{ type, data, timestamp }`.
///
/// Consumers must ignore `type` values they do not recognise, so new event
/// types can be added without breaking older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// A heartbeat frame carries an empty object as its data.
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT, Value::Object(Map::new()))
    }

    pub fn is_heartbeat(&self) -> bool {
        self.event_type == HEARTBEAT
    }

    /// Serialized JSON text of the whole frame.
    pub fn to_json(&self) -> String {
        // Serializing a struct of String/Value/DateTime cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
