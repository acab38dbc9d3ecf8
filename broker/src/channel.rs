//! Catalogue of broker channels every process subscribes to.

use events::{Audience, DomainEvent};

/// Status and location changes of orders and uploads.
pub const RESOURCE_EVENTS: &str = "resource-events";

/// Chat messages posted to rooms.
pub const ROOM_EVENTS: &str = "room-events";

/// One channel per announcement audience tier, e.g. `announcements-all`.
pub fn announcement_channel(audience: Audience) -> String {
    format!("announcements-{audience}")
}

/// The channel an event travels on.
pub fn channel_for(event: &DomainEvent) -> String {
    match event {
        DomainEvent::StatusChanged { .. } | DomainEvent::LocationUpdated { .. } => {
            RESOURCE_EVENTS.to_string()
        }
        DomainEvent::ChatMessagePosted { .. } => ROOM_EVENTS.to_string(),
        DomainEvent::AnnouncementPublished { audience, .. } => announcement_channel(*audience),
    }
}

/// Every channel a process subscribes to at startup.
pub fn all_channels() -> Vec<String> {
    let mut channels: Vec<String> = Audience::ALL
        .iter()
        .map(|audience| announcement_channel(*audience))
        .collect();
    channels.push(RESOURCE_EVENTS.to_string());
    channels.push(ROOM_EVENTS.to_string());
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_four_announcement_channels_plus_resource_and_room() {
        let channels = all_channels();
        assert_eq!(channels.len(), 6);
        assert!(channels.contains(&"announcements-all".to_string()));
        assert!(channels.contains(&"announcements-customers".to_string()));
        assert!(channels.contains(&"announcements-restaurants".to_string()));
        assert!(channels.contains(&"announcements-drivers".to_string()));
    }

    #[test]
    fn test_events_route_to_their_channel() {
        let announcement = DomainEvent::AnnouncementPublished {
            audience: Audience::Drivers,
            announcement: json!({}),
        };
        assert_eq!(channel_for(&announcement), "announcements-drivers");

        let chat = DomainEvent::ChatMessagePosted {
            room: "chat:1".to_string(),
            sender_id: "u1".to_string(),
            sender_session: None,
            message: json!({}),
        };
        assert_eq!(channel_for(&chat), ROOM_EVENTS);
    }
}
