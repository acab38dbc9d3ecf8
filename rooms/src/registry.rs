use crate::room::RoomState;
use crate::session::{SessionHandle, SessionId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use events::{Actor, DeliveryReport, Envelope};
use log::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One session's membership in one room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub handle: SessionHandle,
    pub actor: Actor,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Room {
    state: RoomState,
    members: HashMap<SessionId, RoomMember>,
    /// Every identity that has ever joined, kept for authorization of rejoins.
    participants: HashSet<String>,
    /// When the last member left; cleared on the next join.
    emptied_at: Option<Instant>,
}

impl Room {
    fn is_expired(&self, retention: Duration) -> bool {
        self.state.is_terminal()
            && self.members.is_empty()
            && self
                .emptied_at
                .is_some_and(|emptied_at| emptied_at.elapsed() >= retention)
    }
}

/// Named-room membership table over bidirectional sessions.
///
/// Each room is one map entry, so joins and leaves on the same room serialize
/// on that entry's lock while different rooms proceed independently. The
/// reverse index (session → rooms) makes disconnect cleanup proportional to
/// the rooms that session was in.
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
    memberships: DashMap<SessionId, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Add a session to a room. Returns false when it was already a member.
    pub fn join(&self, room: &str, handle: SessionHandle, actor: Actor) -> bool {
        let session_id = handle.id().clone();
        let identity = actor.id.clone();

        let inserted = {
            let mut entry = self.rooms.entry(room.to_string()).or_default();
            entry.participants.insert(identity.clone());
            entry.emptied_at = None;
            entry
                .members
                .insert(
                    session_id.clone(),
                    RoomMember {
                        handle,
                        actor,
                        joined_at: Utc::now(),
                    },
                )
                .is_none()
        };

        self.memberships
            .entry(session_id.clone())
            .or_default()
            .insert(room.to_string());

        if inserted {
            debug!("Session {} ({identity}) joined {room}", session_id.as_str());
        }
        inserted
    }

    /// Remove a session from a room. Leaving a room twice is a no-op.
    pub fn leave(&self, room: &str, session_id: &SessionId) -> bool {
        let removed = self.remove_member(room, session_id);

        if let Some(mut rooms) = self.memberships.get_mut(session_id) {
            rooms.remove(room);
        }
        self.memberships
            .remove_if(session_id, |_, rooms| rooms.is_empty());

        if removed {
            debug!("Session {} left {room}", session_id.as_str());
        }
        removed
    }

    /// Remove a session from every room it belongs to. Returns how many rooms it left.
    pub fn disconnect(&self, session_id: &SessionId) -> usize {
        let Some((_, rooms)) = self.memberships.remove(session_id) else {
            return 0;
        };

        let left = rooms
            .iter()
            .filter(|room| self.remove_member(room, session_id))
            .count();

        debug!(
            "Session {} disconnected, removed from {left} room(s)",
            session_id.as_str()
        );
        left
    }

    fn remove_member(&self, room: &str, session_id: &SessionId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut entry) => {
                let removed = entry.members.remove(session_id).is_some();
                if entry.members.is_empty() {
                    entry.emptied_at.get_or_insert_with(Instant::now);
                }
                removed
            }
            None => false,
        };

        // Empty active rooms are forgotten; terminal rooms keep their history.
        self.rooms.remove_if(room, |_, entry| {
            entry.members.is_empty() && entry.state == RoomState::Active
        });

        removed
    }

    /// Send a frame to every member of a room.
    pub fn broadcast(&self, room: &str, envelope: &Envelope) -> DeliveryReport {
        self.send_where(room, envelope, |_| true)
    }

    /// Send a frame to every member of a room except one session.
    pub fn broadcast_except(
        &self,
        room: &str,
        envelope: &Envelope,
        exclude: &SessionId,
    ) -> DeliveryReport {
        self.send_where(room, envelope, |session_id| session_id != exclude)
    }

    /// Failed writes are counted and logged but membership is left alone:
    /// only the owning connection removes its session.
    fn send_where(
        &self,
        room: &str,
        envelope: &Envelope,
        include: impl Fn(&SessionId) -> bool,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        if let Some(entry) = self.rooms.get(room) {
            for (session_id, member) in entry.members.iter() {
                if !include(session_id) {
                    continue;
                }
                if member.handle.send(envelope) {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                }
            }
        }

        if report.dropped > 0 {
            warn!(
                "Broadcast of {} to {room} failed for {} member(s)",
                envelope.event_type, report.dropped
            );
        }
        report
    }

    /// Move a room along its lifecycle. On an illegal move the current state is returned.
    pub fn set_state(&self, room: &str, next: RoomState) -> Result<(), RoomState> {
        let mut entry = self.rooms.entry(room.to_string()).or_default();
        if entry.state == next {
            return Ok(());
        }
        if entry.state.is_terminal() || next == RoomState::Active {
            return Err(entry.state);
        }
        info!("Room {room} is now {next}");
        entry.state = next;
        if entry.members.is_empty() {
            entry.emptied_at.get_or_insert_with(Instant::now);
        }
        Ok(())
    }

    /// Write a heartbeat frame to every connected session, then disconnect
    /// the sessions whose connection has gone away. Returns how many were
    /// disconnected. A session that is merely slow is left in place.
    pub fn heartbeat(&self) -> usize {
        let mut sessions: HashMap<SessionId, SessionHandle> = HashMap::new();
        for entry in self.rooms.iter() {
            for (session_id, member) in entry.members.iter() {
                sessions
                    .entry(session_id.clone())
                    .or_insert_with(|| member.handle.clone());
            }
        }

        let heartbeat = Envelope::heartbeat();
        let dead: Vec<SessionId> = sessions
            .into_iter()
            .filter(|(_, handle)| !handle.send(&heartbeat) && handle.is_closed())
            .map(|(session_id, _)| session_id)
            .collect();

        for session_id in &dead {
            self.disconnect(session_id);
        }
        if !dead.is_empty() {
            info!("Heartbeat disconnected {} dead session(s)", dead.len());
        }
        dead.len()
    }

    /// Forget resolved or closed rooms that have had no members for at least
    /// `retention`. Returns the number of rooms removed.
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, room| !room.is_expired(retention));
        before.saturating_sub(self.rooms.len())
    }

    /// Start the periodic heartbeat and purge. The task stops when the
    /// returned guard is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, retention: Duration) -> RoomSweepTask {
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                registry.heartbeat();
                let removed = registry.purge_expired(retention);
                if removed > 0 {
                    debug!("Purged {removed} finished room(s)");
                }
            }
        });
        RoomSweepTask { handle }
    }

    /// Current state, `None` for a room nobody has used.
    pub fn state(&self, room: &str) -> Option<RoomState> {
        self.rooms.get(room).map(|entry| entry.state)
    }

    pub fn has_participated(&self, room: &str, identity: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|entry| entry.participants.contains(identity))
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |entry| entry.members.len())
    }

    pub fn rooms_of(&self, session_id: &SessionId) -> Vec<String> {
        self.memberships
            .get(session_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the room heartbeat; aborting on drop ties it to the registry's owner.
pub struct RoomSweepTask {
    handle: JoinHandle<()>,
}

impl Drop for RoomSweepTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::Role;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn member(registry: &RoomRegistry, room: &str, id: &str) -> (SessionHandle, mpsc::Receiver<Envelope>) {
        let (handle, rx) = SessionHandle::channel(8);
        registry.join(room, handle.clone(), Actor::new(id, Role::Customer));
        (handle, rx)
    }

    #[test]
    fn test_join_and_leave() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = member(&registry, "chat:1", "u1");
        assert_eq!(registry.member_count("chat:1"), 1);

        assert!(registry.leave("chat:1", handle.id()));
        assert_eq!(registry.member_count("chat:1"), 0);
        assert!(registry.rooms_of(handle.id()).is_empty());
    }

    #[test]
    fn test_leave_twice_is_a_no_op() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = member(&registry, "chat:1", "u1");

        assert!(registry.leave("chat:1", handle.id()));
        assert!(!registry.leave("chat:1", handle.id()));
        assert!(!registry.leave("never-existed", handle.id()));
    }

    #[test]
    fn test_broadcast_delivers_identical_payload_to_every_member() {
        let registry = RoomRegistry::new();
        let mut receivers: Vec<_> = (0..10)
            .map(|i| member(&registry, "chat:1", &format!("u{i}")).1)
            .collect();

        let text = "x".repeat(1000);
        let envelope = Envelope::new("chat_message", json!({ "text": text }));
        let report = registry.broadcast("chat:1", &envelope);

        assert_eq!(report.delivered, 10);
        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), envelope);
        }
    }

    #[test]
    fn test_broadcast_except_skips_the_sender() {
        let registry = RoomRegistry::new();
        let (sender, mut sender_rx) = member(&registry, "chat:1", "sender");
        let mut others: Vec<_> = (0..9)
            .map(|i| member(&registry, "chat:1", &format!("u{i}")).1)
            .collect();

        let envelope = Envelope::new("chat_message", json!({"text": "hi"}));
        let report = registry.broadcast_except("chat:1", &envelope, sender.id());

        assert_eq!(report.delivered, 9);
        assert!(sender_rx.try_recv().is_err());
        for rx in others.iter_mut() {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[test]
    fn test_disconnect_removes_session_from_every_room() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = SessionHandle::channel(8);
        let actor = Actor::new("d1", Role::Driver);
        registry.join("order:1", handle.clone(), actor.clone());
        registry.join("announcements:drivers", handle.clone(), actor.clone());
        let (_other, _other_rx) = member(&registry, "order:1", "c1");

        assert_eq!(registry.disconnect(handle.id()), 2);
        assert_eq!(registry.member_count("order:1"), 1);
        assert_eq!(registry.member_count("announcements:drivers"), 0);
        assert_eq!(registry.disconnect(handle.id()), 0);
    }

    #[test]
    fn test_failed_send_does_not_remove_member() {
        let registry = RoomRegistry::new();
        let (handle, rx) = member(&registry, "chat:1", "u1");
        drop(rx);

        let report = registry.broadcast("chat:1", &Envelope::new("chat_message", json!({})));
        assert_eq!(report.dropped, 1);
        assert_eq!(registry.member_count("chat:1"), 1);

        registry.disconnect(handle.id());
        assert_eq!(registry.member_count("chat:1"), 0);
    }

    #[test]
    fn test_room_lifecycle() {
        let registry = RoomRegistry::new();
        let (handle, mut rx) = member(&registry, "chat:1", "u1");

        assert_eq!(registry.set_state("chat:1", RoomState::Resolved), Ok(()));
        assert_eq!(
            registry.set_state("chat:1", RoomState::Closed),
            Err(RoomState::Resolved)
        );
        assert_eq!(
            registry.set_state("chat:1", RoomState::Active),
            Err(RoomState::Resolved)
        );

        // Terminal rooms still broadcast to whoever is connected.
        registry.broadcast("chat:1", &Envelope::new("chat_resolved", json!({})));
        assert!(rx.try_recv().is_ok());

        // And remember their participants after everyone has left.
        registry.leave("chat:1", handle.id());
        assert_eq!(registry.state("chat:1"), Some(RoomState::Resolved));
        assert!(registry.has_participated("chat:1", "u1"));
        assert!(!registry.has_participated("chat:1", "stranger"));
    }

    #[test]
    fn test_heartbeat_disconnects_sessions_whose_connection_is_gone() {
        let registry = RoomRegistry::new();
        let (alive, mut alive_rx) = member(&registry, "order:1", "c1");
        let (dead, dead_rx) = SessionHandle::channel(8);
        let actor = Actor::new("d1", Role::Driver);
        registry.join("order:1", dead.clone(), actor.clone());
        registry.join("announcements:drivers", dead.clone(), actor);
        drop(dead_rx);

        assert_eq!(registry.heartbeat(), 1);
        assert!(registry.rooms_of(dead.id()).is_empty());
        assert_eq!(registry.member_count("order:1"), 1);
        assert_eq!(alive_rx.try_recv().unwrap().event_type, "heartbeat");
        assert_eq!(registry.rooms_of(alive.id()), vec!["order:1".to_string()]);
    }

    #[test]
    fn test_heartbeat_keeps_slow_sessions() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = SessionHandle::channel(1);
        registry.join("chat:1", handle.clone(), Actor::new("u1", Role::Customer));
        registry.broadcast("chat:1", &Envelope::new("chat_message", json!({})));

        assert_eq!(registry.heartbeat(), 0);
        assert_eq!(registry.member_count("chat:1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_rooms_are_purged_after_retention() {
        let registry = RoomRegistry::new();
        let retention = Duration::from_secs(60);
        let (handle, _rx) = member(&registry, "chat:1", "u1");
        let (_busy, _busy_rx) = member(&registry, "chat:2", "u2");
        registry.set_state("chat:1", RoomState::Resolved).unwrap();
        registry.set_state("chat:2", RoomState::Closed).unwrap();
        registry.leave("chat:1", handle.id());

        assert_eq!(registry.purge_expired(retention), 0);
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(registry.purge_expired(retention), 1);
        assert_eq!(registry.state("chat:1"), None);
        assert!(!registry.has_participated("chat:1", "u1"));
        assert_eq!(registry.state("chat:2"), Some(RoomState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_dead_sessions_within_one_interval() {
        let registry = Arc::new(RoomRegistry::new());
        let (handle, rx) = member(&registry, "order:1", "c1");
        let _task = registry.spawn_sweeper(Duration::from_secs(30), Duration::from_secs(3600));
        drop(rx);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(registry.rooms_of(handle.id()).is_empty());
        assert_eq!(registry.member_count("order:1"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_and_leaves_keep_member_set_consistent() {
        let registry = Arc::new(RoomRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = SessionHandle::channel(1);
                registry.join("chat:busy", handle.clone(), Actor::new(format!("u{i}"), Role::Customer));
                if i % 2 == 0 {
                    registry.leave("chat:busy", handle.id());
                }
                (handle, rx)
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            kept.push(task.await.unwrap());
        }

        assert_eq!(registry.member_count("chat:busy"), 25);
    }
}
