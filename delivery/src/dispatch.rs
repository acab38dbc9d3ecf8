use async_trait::async_trait;
use events::{DomainEvent, Envelope, EventHandler};
use log::*;
use rooms::{announcement_room, order_room, RoomRegistry, SessionId};
use serde_json::json;
use sse::Manager;
use status::{StateTag, StatusCache, StatusSnapshot};
use std::sync::Arc;

/// Where an event being dispatched came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced on this process; the cache already holds the snapshot.
    Local,
    /// Received from another process through the broker.
    Remote,
}

/// Delivers domain events to the clients connected to this process.
///
/// This handler is the single dispatch table for every event kind:
/// 1. Refreshing the status cache for changes made on other processes
/// 2. Pushing frames to the streams open on the affected resource
/// 3. Broadcasting frames to the rooms that follow the resource or audience
pub struct LocalDispatcher {
    cache: Arc<StatusCache>,
    streams: Arc<Manager>,
    rooms: Arc<RoomRegistry>,
    origin: Origin,
}

impl LocalDispatcher {
    pub fn new(
        cache: Arc<StatusCache>,
        streams: Arc<Manager>,
        rooms: Arc<RoomRegistry>,
        origin: Origin,
    ) -> Self {
        Self {
            cache,
            streams,
            rooms,
            origin,
        }
    }

    fn status_changed(&self, resource_id: &str, snapshot: &serde_json::Value) {
        let parsed: StatusSnapshot = match serde_json::from_value(snapshot.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Dropping status change for {resource_id} with unreadable snapshot: {e}");
                return;
            }
        };

        if self.origin == Origin::Remote {
            self.cache.put(parsed.clone());
        }

        let envelope = Envelope::new("status_changed", snapshot.clone());
        let streamed = self.streams.push(resource_id, &envelope);

        let broadcast = match parsed.state {
            StateTag::Order(_) => self.rooms.broadcast(&order_room(resource_id), &envelope),
            StateTag::Upload(_) => Default::default(),
        };

        debug!(
            "Status of {resource_id} is now {}: {} stream(s), {} room member(s)",
            parsed.state, streamed.delivered, broadcast.delivered
        );
    }
}

#[async_trait]
impl EventHandler for LocalDispatcher {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::StatusChanged {
                resource_id,
                snapshot,
            } => {
                self.status_changed(resource_id, snapshot);
            }

            DomainEvent::LocationUpdated {
                order_id,
                driver_id,
                location,
            } => {
                let envelope = Envelope::new(
                    event.event_type(),
                    json!({
                        "order_id": order_id,
                        "driver_id": driver_id,
                        "location": location,
                    }),
                );
                let streamed = self.streams.push(order_id, &envelope);
                let broadcast = self.rooms.broadcast(&order_room(order_id), &envelope);

                trace!(
                    "Location of {order_id} sent to {} stream(s), {} room member(s)",
                    streamed.delivered,
                    broadcast.delivered
                );
            }

            DomainEvent::ChatMessagePosted {
                room,
                sender_id,
                sender_session,
                message,
            } => {
                let envelope = Envelope::new(
                    event.event_type(),
                    json!({
                        "room": room,
                        "sender_id": sender_id,
                        "message": message,
                    }),
                );
                let report = match sender_session {
                    Some(session) => self.rooms.broadcast_except(
                        room,
                        &envelope,
                        &SessionId::from(session.clone()),
                    ),
                    None => self.rooms.broadcast(room, &envelope),
                };

                debug!(
                    "Chat message from {sender_id} in {room} delivered to {} member(s)",
                    report.delivered
                );
            }

            DomainEvent::AnnouncementPublished {
                audience,
                announcement,
            } => {
                let envelope = Envelope::new(
                    event.event_type(),
                    json!({
                        "audience": audience,
                        "announcement": announcement,
                    }),
                );
                let report = self.rooms.broadcast(&announcement_room(*audience), &envelope);

                info!(
                    "Announcement for {audience} delivered to {} local session(s)",
                    report.delivered
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{Actor, Audience, Role};
    use rooms::SessionHandle;
    use status::OrderStatus;

    fn dispatcher(origin: Origin) -> (LocalDispatcher, Arc<StatusCache>, Arc<Manager>, Arc<RoomRegistry>) {
        let cache = Arc::new(StatusCache::default());
        let streams = Arc::new(Manager::default());
        let rooms = Arc::new(RoomRegistry::new());
        (
            LocalDispatcher::new(cache.clone(), streams.clone(), rooms.clone(), origin),
            cache,
            streams,
            rooms,
        )
    }

    fn status_event(state: OrderStatus) -> DomainEvent {
        DomainEvent::StatusChanged {
            resource_id: "O1".to_string(),
            snapshot: serde_json::to_value(StatusSnapshot::new("O1", state)).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_status_change_reaches_streams_and_order_room() {
        let (dispatcher, _cache, streams, rooms) = dispatcher(Origin::Local);
        let mut stream = streams.open("O1".into(), "c1".into());
        let (handle, mut session) = SessionHandle::channel(4);
        rooms.join(&order_room("O1"), handle, Actor::new("r1", Role::Restaurant));

        dispatcher.handle(&status_event(OrderStatus::Preparing)).await;

        assert_eq!(stream.recv().await.unwrap().data["state"], "preparing");
        assert_eq!(session.try_recv().unwrap().event_type, "status_changed");
    }

    #[tokio::test]
    async fn test_remote_status_change_refreshes_cache() {
        let (local, local_cache, _, _) = dispatcher(Origin::Local);
        local.handle(&status_event(OrderStatus::Ready)).await;
        assert!(local_cache.get("O1").is_none());

        let (remote, remote_cache, _, _) = dispatcher(Origin::Remote);
        remote.handle(&status_event(OrderStatus::Ready)).await;
        assert_eq!(
            remote_cache.get("O1").unwrap().state,
            OrderStatus::Ready.into()
        );
    }

    #[tokio::test]
    async fn test_announcement_goes_to_its_tier_room_only() {
        let (dispatcher, _, _, rooms) = dispatcher(Origin::Remote);
        let (driver, mut driver_rx) = SessionHandle::channel(4);
        let (customer, mut customer_rx) = SessionHandle::channel(4);
        rooms.join(&announcement_room(Audience::Drivers), driver, Actor::new("d1", Role::Driver));
        rooms.join(
            &announcement_room(Audience::Customers),
            customer,
            Actor::new("c1", Role::Customer),
        );

        dispatcher
            .handle(&DomainEvent::AnnouncementPublished {
                audience: Audience::Drivers,
                announcement: json!({"title": "surge pricing"}),
            })
            .await;

        assert_eq!(driver_rx.try_recv().unwrap().event_type, "announcement");
        assert!(customer_rx.try_recv().is_err());
    }
}
