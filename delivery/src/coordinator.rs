use crate::authorize::{audience_for, AssignmentAuthorizer, Authorizer};
use crate::config::DeliveryConfig;
use crate::dispatch::{LocalDispatcher, Origin};
use crate::error::Error;
use crate::forwarder::BrokerForwarder;
use broker::{channel, Broker, BrokerBridge};
use dashmap::DashMap;
use events::{Actor, Audience, DeliveryReport, DomainEvent, Envelope, EventPublisher, Role};
use log::*;
use rooms::{
    announcement_room, room_kind, RoomKind, RoomRegistry, RoomState, RoomSweepTask, SessionHandle,
    SessionId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sse::{ConnectionId, HeartbeatTask, Manager, StreamConnection};
use status::cache::SweepTask;
use status::{
    transition, ChangeWaiter, KnownStatus, ResourceId, StateTag, StatusCache, StatusSnapshot,
    StatusStore, WaitOutcome,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// A producer's request to move a resource to a new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub resource_id: ResourceId,
    pub state: StateTag,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl StatusUpdate {
    pub fn new(resource_id: impl Into<ResourceId>, state: impl Into<StateTag>) -> Self {
        Self {
            resource_id: resource_id.into(),
            state: state.into(),
            progress: None,
            detail: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

struct BackgroundTasks {
    _heartbeat: HeartbeatTask,
    _sweeper: SweepTask,
    _rooms: RoomSweepTask,
}

/// The facade producers call. Owns the process-local registries and decides,
/// per event kind, which of cache update, stream push, room broadcast and
/// broker publish to perform.
///
/// One instance is created at process start and torn down with [`Coordinator::shutdown`].
pub struct Coordinator {
    config: DeliveryConfig,
    store: Arc<dyn StatusStore>,
    cache: Arc<StatusCache>,
    waiter: ChangeWaiter,
    streams: Arc<Manager>,
    rooms: Arc<RoomRegistry>,
    bridge: Arc<BrokerBridge>,
    forwarder: Arc<BrokerForwarder>,
    authorizer: Arc<dyn Authorizer>,
    publisher: EventPublisher,
    /// Serializes validate-then-write per resource.
    write_locks: DashMap<ResourceId, Arc<tokio::sync::Mutex<()>>>,
    background: Mutex<Option<BackgroundTasks>>,
}

impl Coordinator {
    pub fn new(config: DeliveryConfig, store: Arc<dyn StatusStore>, broker: Arc<dyn Broker>) -> Self {
        let cache = Arc::new(StatusCache::new(config.cache_ttl));
        let waiter = ChangeWaiter::new(cache.clone(), store.clone(), config.waiter.clone());
        let streams = Arc::new(Manager::new(config.stream_buffer));
        let rooms = Arc::new(RoomRegistry::new());
        let bridge = Arc::new(BrokerBridge::new(broker, config.process_id.clone()));
        let forwarder = Arc::new(BrokerForwarder::new(bridge.clone()));
        let authorizer: Arc<dyn Authorizer> = Arc::new(AssignmentAuthorizer::new(store.clone()));

        let publisher = EventPublisher::new()
            .with_handler(Arc::new(LocalDispatcher::new(
                cache.clone(),
                streams.clone(),
                rooms.clone(),
                Origin::Local,
            )))
            .with_handler(forwarder.clone());

        Self {
            config,
            store,
            cache,
            waiter,
            streams,
            rooms,
            bridge,
            forwarder,
            authorizer,
            publisher,
            write_locks: DashMap::new(),
            background: Mutex::new(None),
        }
    }

    /// Replace the assignment based authorizer.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Subscribe to every broker channel and start the stream and session
    /// heartbeats and the cache sweep. Calling it again is a no-op.
    pub async fn start(&self) -> Result<(), Error> {
        let remote: Arc<LocalDispatcher> = Arc::new(LocalDispatcher::new(
            self.cache.clone(),
            self.streams.clone(),
            self.rooms.clone(),
            Origin::Remote,
        ));
        for channel in channel::all_channels() {
            self.bridge.subscribe(&channel, remote.clone()).await?;
        }

        let mut background = self.lock_background();
        if background.is_none() {
            *background = Some(BackgroundTasks {
                _heartbeat: self.streams.spawn_heartbeat(self.config.heartbeat_interval),
                _sweeper: self.cache.spawn_sweeper(self.config.cache_sweep_interval),
                _rooms: self
                    .rooms
                    .spawn_sweeper(self.config.heartbeat_interval, self.config.room_retention),
            });
            info!(
                "Delivery coordinator {} started, heartbeat every {:?}",
                self.config.process_id, self.config.heartbeat_interval
            );
        }
        Ok(())
    }

    /// Stop background tasks and broker subscriptions.
    pub fn shutdown(&self) {
        self.lock_background().take();
        self.bridge.shutdown();
        info!("Delivery coordinator {} stopped", self.config.process_id);
    }

    /// Validate and apply a state change, then deliver it locally and to other
    /// processes. Returns the snapshot as recorded.
    ///
    /// An illegal move fails with `InvalidTransition` and leaves the recorded
    /// state untouched. A broker outage does not fail the call.
    pub async fn report_status_change(
        &self,
        actor: &Actor,
        update: StatusUpdate,
    ) -> Result<StatusSnapshot, Error> {
        let lock = self
            .write_locks
            .entry(update.resource_id.clone())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Other processes write through the same store, so validate against it
        // rather than this process's cache.
        let current = self.store.load_snapshot(&update.resource_id).await?;
        if let Some(current) = &current {
            self.refresh_cache(current);
        }
        let assignment = self
            .store
            .load_assignment(&update.resource_id)
            .await?
            .unwrap_or_default();

        transition::validate(
            current.as_ref(),
            update.state,
            update.progress,
            actor,
            &assignment,
        )?;

        let mut snapshot = StatusSnapshot::new(update.resource_id.clone(), update.state);
        snapshot.progress = update.progress;
        snapshot.detail = update.detail;
        if let Some(current) = &current {
            snapshot.updated_at = snapshot.updated_at.max(current.updated_at);
        }

        if !self
            .store
            .compare_and_save(current.as_ref(), &snapshot)
            .await?
        {
            return Err(Error::invalid_transition(format!(
                "{} changed while the update was being applied",
                update.resource_id
            )));
        }
        let snapshot = self.cache.put(snapshot);

        info!(
            "{} {} moved {} to {}",
            actor.role, actor.id, snapshot.resource_id, snapshot.state
        );

        self.publisher
            .publish(DomainEvent::StatusChanged {
                resource_id: snapshot.resource_id.clone(),
                snapshot: serde_json::to_value(&snapshot)?,
            })
            .await;

        if snapshot.is_terminal() {
            self.write_locks.remove(&snapshot.resource_id);
        }
        Ok(snapshot)
    }

    /// Relay a position reported by the driver assigned to an order.
    pub async fn update_location(
        &self,
        actor: &Actor,
        order_id: &str,
        location: Location,
    ) -> Result<(), Error> {
        let assignment = self.store.load_assignment(order_id).await?.unwrap_or_default();
        if !assignment.is_driver(actor) {
            return Err(Error::unauthorized(format!(
                "{} is not the driver assigned to {order_id}",
                actor.id
            )));
        }

        self.publisher
            .publish(DomainEvent::LocationUpdated {
                order_id: order_id.to_string(),
                driver_id: actor.id.clone(),
                location: serde_json::to_value(location)?,
            })
            .await;
        Ok(())
    }

    /// Post a chat message from a session that is a member of `room`. Only
    /// order and support chat rooms carry chat; announcements go through
    /// [`Coordinator::announce`].
    ///
    /// Every other member receives a `chat_message` frame; the sender receives
    /// one `message_sent` acknowledgement instead of an echo.
    pub async fn post_chat_message(
        &self,
        room: &str,
        sender: &SessionHandle,
        actor: &Actor,
        message: Value,
    ) -> Result<(), Error> {
        if !matches!(room_kind(room), RoomKind::Chat(_) | RoomKind::Order(_)) {
            return Err(Error::unauthorized(format!("{room} does not accept chat messages")));
        }
        if !self.rooms.rooms_of(sender.id()).iter().any(|r| r == room) {
            return Err(Error::unauthorized(format!(
                "session {} has not joined {room}",
                sender.id().as_str()
            )));
        }

        self.publisher
            .publish(DomainEvent::ChatMessagePosted {
                room: room.to_string(),
                sender_id: actor.id.clone(),
                sender_session: Some(sender.id().as_str().to_string()),
                message,
            })
            .await;

        sender.send(&Envelope::new(
            "message_sent",
            json!({
                "room": room,
                "message_id": uuid::Uuid::new_v4().to_string(),
            }),
        ));
        Ok(())
    }

    /// Publish an operator announcement to one audience tier on every process.
    pub async fn announce(
        &self,
        actor: &Actor,
        audience: Audience,
        announcement: Value,
    ) -> Result<(), Error> {
        if !matches!(actor.role, Role::Support | Role::System) {
            return Err(Error::unauthorized(format!(
                "{} {} may not publish announcements",
                actor.role, actor.id
            )));
        }

        self.publisher
            .publish(DomainEvent::AnnouncementPublished {
                audience,
                announcement,
            })
            .await;
        Ok(())
    }

    /// Short poll: the cached snapshot, else the store's, repopulating the cache.
    pub async fn poll_status(&self, resource_id: &str) -> Result<Option<StatusSnapshot>, Error> {
        if let Some(snapshot) = self.cache.get(resource_id) {
            return Ok(Some(snapshot));
        }
        Ok(self
            .store
            .load_snapshot(resource_id)
            .await?
            .map(|snapshot| self.cache.put(snapshot)))
    }

    /// Long poll: suspend until the resource changes materially, completes, or
    /// `max_wait` (capped) elapses.
    pub async fn wait_for_status_change(
        &self,
        resource_id: &str,
        known: Option<KnownStatus>,
        max_wait: Duration,
    ) -> Result<WaitOutcome, Error> {
        Ok(self
            .waiter
            .wait_for_change(resource_id, known.as_ref(), max_wait)
            .await?)
    }

    pub async fn authorize_watch(&self, actor: &Actor, resource_id: &str) -> Result<(), Error> {
        if self.authorizer.can_watch(actor, resource_id).await? {
            Ok(())
        } else {
            Err(Error::unauthorized(format!(
                "{} {} may not watch {resource_id}",
                actor.role, actor.id
            )))
        }
    }

    /// Open a stream on a resource after checking the caller may watch it.
    pub async fn open_stream(
        &self,
        actor: &Actor,
        resource_id: &str,
    ) -> Result<StreamConnection, Error> {
        self.authorize_watch(actor, resource_id).await?;
        Ok(self.streams.open(resource_id.to_string(), actor.id.clone()))
    }

    pub fn close_stream(&self, resource_id: &str, connection_id: &ConnectionId) {
        self.streams.close(resource_id, connection_id);
    }

    /// A new bidirectional session handle and the receiver its connection drains.
    pub fn open_session(&self) -> (SessionHandle, mpsc::Receiver<Envelope>) {
        SessionHandle::channel(self.config.session_buffer)
    }

    /// Join a room after authorization. A resolved or closed room only admits
    /// identities that took part in it before.
    pub async fn join_room(
        &self,
        actor: &Actor,
        room: &str,
        handle: &SessionHandle,
    ) -> Result<bool, Error> {
        if !self.authorizer.can_join(actor, room).await? {
            return Err(Error::unauthorized(format!(
                "{} {} may not join {room}",
                actor.role, actor.id
            )));
        }

        if let Some(state) = self.rooms.state(room) {
            if state.is_terminal() && !self.rooms.has_participated(room, &actor.id) {
                return Err(Error::unauthorized(format!(
                    "{room} is {state} and {} never took part in it",
                    actor.id
                )));
            }
        }

        Ok(self.rooms.join(room, handle.clone(), actor.clone()))
    }

    /// Join the `all` announcement room and the one for the actor's role.
    /// Returns the rooms joined.
    pub async fn join_announcements(
        &self,
        actor: &Actor,
        handle: &SessionHandle,
    ) -> Result<Vec<String>, Error> {
        let mut joined = Vec::new();
        let tiers = std::iter::once(Audience::All).chain(audience_for(actor.role));
        for audience in tiers {
            let room = announcement_room(audience);
            self.join_room(actor, &room, handle).await?;
            joined.push(room);
        }
        Ok(joined)
    }

    pub fn leave_room(&self, room: &str, session_id: &SessionId) -> bool {
        self.rooms.leave(room, session_id)
    }

    /// Remove a session from every room it joined. Returns how many.
    pub fn disconnect(&self, session_id: &SessionId) -> usize {
        self.rooms.disconnect(session_id)
    }

    /// Broadcast to the members of a room on this process only.
    pub fn send_to_room(&self, room: &str, envelope: &Envelope) -> DeliveryReport {
        self.rooms.broadcast(room, envelope)
    }

    pub fn send_to_room_except(
        &self,
        room: &str,
        envelope: &Envelope,
        exclude: &SessionId,
    ) -> DeliveryReport {
        self.rooms.broadcast_except(room, envelope, exclude)
    }

    /// Resolve or close a support chat. Only support staff and the chat's
    /// participants may; other rooms have no lifecycle.
    pub fn set_room_state(&self, actor: &Actor, room: &str, next: RoomState) -> Result<(), Error> {
        if !matches!(room_kind(room), RoomKind::Chat(_)) {
            return Err(Error::unauthorized(format!("{room} has no lifecycle to change")));
        }
        let staff = matches!(actor.role, Role::Support | Role::System);
        if !staff && !self.rooms.has_participated(room, &actor.id) {
            return Err(Error::unauthorized(format!(
                "{} may not change the state of {room}",
                actor.id
            )));
        }

        self.rooms.set_state(room, next).map_err(|current| {
            Error::invalid_transition(format!("{room} is {current} and cannot become {next}"))
        })?;

        self.rooms.broadcast(
            room,
            &Envelope::new("room_state", json!({ "room": room, "state": next })),
        );
        Ok(())
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn process_id(&self) -> &str {
        &self.config.process_id
    }

    pub fn streams(&self) -> &Arc<Manager> {
        &self.streams
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// Publishes that could not reach the broker since startup.
    pub fn broker_failures(&self) -> u64 {
        self.forwarder.failures()
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.bridge.subscribed_channels()
    }

    /// Bring the cache in line with a snapshot read from the store, leaving it
    /// alone when it already agrees so waiters are not woken for nothing.
    fn refresh_cache(&self, stored: &StatusSnapshot) {
        let stale = self.cache.get(&stored.resource_id).map_or(true, |cached| {
            cached.state != stored.state || cached.progress != stored.progress
        });
        if stale {
            self.cache.put(stored.clone());
        }
    }

    fn lock_background(&self) -> std::sync::MutexGuard<'_, Option<BackgroundTasks>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
