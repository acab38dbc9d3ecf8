use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an order or an upload job.
pub type ResourceId = String;

/// Order lifecycle: `confirmed → preparing → ready → picked_up → delivered`,
/// with `cancelled` reachable before pickup.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Confirmed => write!(fmt, "confirmed"),
            OrderStatus::Preparing => write!(fmt, "preparing"),
            OrderStatus::Ready => write!(fmt, "ready"),
            OrderStatus::PickedUp => write!(fmt, "picked_up"),
            OrderStatus::Delivered => write!(fmt, "delivered"),
            OrderStatus::Cancelled => write!(fmt, "cancelled"),
        }
    }
}

/// Upload lifecycle: `uploading → processing → {completed | failed}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Uploading => write!(fmt, "uploading"),
            UploadStatus::Processing => write!(fmt, "processing"),
            UploadStatus::Completed => write!(fmt, "completed"),
            UploadStatus::Failed => write!(fmt, "failed"),
        }
    }
}

/// The state tag of a snapshot. Serialized as the bare state name
/// (`"preparing"`, `"processing"`), the two lifecycles share no names.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateTag {
    Order(OrderStatus),
    Upload(UploadStatus),
}

impl StateTag {
    pub fn is_terminal(&self) -> bool {
        match self {
            StateTag::Order(status) => status.is_terminal(),
            StateTag::Upload(status) => status.is_terminal(),
        }
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTag::Order(status) => fmt::Display::fmt(status, fmt),
            StateTag::Upload(status) => fmt::Display::fmt(status, fmt),
        }
    }
}

impl From<OrderStatus> for StateTag {
    fn from(status: OrderStatus) -> Self {
        StateTag::Order(status)
    }
}

impl From<UploadStatus> for StateTag {
    fn from(status: UploadStatus) -> Self {
        StateTag::Upload(status)
    }
}

/// Last-known state of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub resource_id: ResourceId,
    pub state: StateTag,
    /// 0 to 100, only meaningful for uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn new(resource_id: impl Into<ResourceId>, state: impl Into<StateTag>) -> Self {
        Self {
            resource_id: resource_id.into(),
            state: state.into(),
            progress: None,
            detail: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn known(&self) -> KnownStatus {
        KnownStatus {
            state: self.state,
            progress: self.progress,
        }
    }
}

/// What a long-polling client last saw. Only the fields that decide whether a
/// change is material are compared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnownStatus {
    pub state: StateTag,
    #[serde(default)]
    pub progress: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_tag_serializes_as_bare_name() {
        assert_eq!(
            serde_json::to_value(StateTag::Order(OrderStatus::PickedUp)).unwrap(),
            json!("picked_up")
        );
        let tag: StateTag = serde_json::from_value(json!("processing")).unwrap();
        assert_eq!(tag, StateTag::Upload(UploadStatus::Processing));
    }

    #[test]
    fn test_terminal_states() {
        for terminal in [
            StateTag::Order(OrderStatus::Delivered),
            StateTag::Order(OrderStatus::Cancelled),
            StateTag::Upload(UploadStatus::Completed),
            StateTag::Upload(UploadStatus::Failed),
        ] {
            assert!(terminal.is_terminal(), "{terminal} should be terminal");
        }
        assert!(!StateTag::Order(OrderStatus::PickedUp).is_terminal());
        assert!(!StateTag::Upload(UploadStatus::Processing).is_terminal());
    }

    #[test]
    fn test_snapshot_omits_empty_optional_fields() {
        let snapshot = StatusSnapshot::new("O1", OrderStatus::Ready);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], "ready");
        assert!(value.get("progress").is_none());
        assert!(value.get("detail").is_none());
    }
}
