use crate::error::Error;
use async_trait::async_trait;
use events::{Actor, Audience, Role};
use rooms::{room_kind, RoomKind};
use status::StatusStore;
use std::sync::Arc;

/// Decides whether a principal may watch a resource or join a room.
/// Checked before any registry is touched.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can_watch(&self, actor: &Actor, resource_id: &str) -> Result<bool, Error>;

    async fn can_join(&self, actor: &Actor, room: &str) -> Result<bool, Error>;
}

/// Announcement tier a role belongs to, besides `all`.
pub fn audience_for(role: Role) -> Option<Audience> {
    match role {
        Role::Customer => Some(Audience::Customers),
        Role::Restaurant => Some(Audience::Restaurants),
        Role::Driver => Some(Audience::Drivers),
        Role::Support | Role::System => None,
    }
}

/// Grants access to the parties assigned to a resource, and to support staff.
pub struct AssignmentAuthorizer {
    store: Arc<dyn StatusStore>,
}

impl AssignmentAuthorizer {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Authorizer for AssignmentAuthorizer {
    async fn can_watch(&self, actor: &Actor, resource_id: &str) -> Result<bool, Error> {
        if matches!(actor.role, Role::Support | Role::System) {
            return Ok(true);
        }
        Ok(self
            .store
            .load_assignment(resource_id)
            .await?
            .is_some_and(|assignment| assignment.involves(actor)))
    }

    async fn can_join(&self, actor: &Actor, room: &str) -> Result<bool, Error> {
        match room_kind(room) {
            RoomKind::Order(order_id) => self.can_watch(actor, order_id).await,
            // Chat assignments are stored under the room name.
            RoomKind::Chat(_) => self.can_watch(actor, room).await,
            RoomKind::Announcements(tier) => Ok(tier == Audience::All.as_str()
                || audience_for(actor.role).is_some_and(|audience| audience.as_str() == tier)),
            RoomKind::Other => Ok(false),
        }
    }
}
