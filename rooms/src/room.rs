use events::Audience;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a room: `active → {resolved | closed}`, both terminal.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    #[default]
    Active,
    Resolved,
    Closed,
}

impl RoomState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoomState::Active)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomState::Active => write!(fmt, "active"),
            RoomState::Resolved => write!(fmt, "resolved"),
            RoomState::Closed => write!(fmt, "closed"),
        }
    }
}

/// Room of everyone following one order (customer, restaurant, driver, support).
pub fn order_room(order_id: &str) -> String {
    format!("order:{order_id}")
}

/// Support chat room.
pub fn chat_room(chat_id: &str) -> String {
    format!("chat:{chat_id}")
}

/// Room that receives announcements for one audience tier.
pub fn announcement_room(audience: Audience) -> String {
    format!("announcements:{audience}")
}

/// The kind of room a name denotes, for authorization upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomKind<'a> {
    Order(&'a str),
    Chat(&'a str),
    Announcements(&'a str),
    Other,
}

pub fn room_kind(room: &str) -> RoomKind<'_> {
    match room.split_once(':') {
        Some(("order", id)) => RoomKind::Order(id),
        Some(("chat", id)) => RoomKind::Chat(id),
        Some(("announcements", tier)) => RoomKind::Announcements(tier),
        _ => RoomKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_kind_recognises_generated_names() {
        assert_eq!(room_kind(&order_room("O1")), RoomKind::Order("O1"));
        assert_eq!(room_kind(&chat_room("42")), RoomKind::Chat("42"));
        assert_eq!(
            room_kind(&announcement_room(Audience::Drivers)),
            RoomKind::Announcements("drivers")
        );
        assert_eq!(room_kind("lobby"), RoomKind::Other);
    }

    #[test]
    fn test_only_active_is_not_terminal() {
        assert!(!RoomState::Active.is_terminal());
        assert!(RoomState::Resolved.is_terminal());
        assert!(RoomState::Closed.is_terminal());
    }
}
