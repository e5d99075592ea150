//! Real-time room coordination
//!
//! `Coordinator` wires the connection registry, room table, lock arbiter,
//! progress cache and notification bus together. The transport layer only
//! talks to this facade: register a connection, dispatch its inbound
//! events, disconnect it.

pub mod locks;
pub mod notify;
pub mod progress;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod sweeper;

pub use locks::LockArbiter;
pub use notify::NotificationBus;
pub use progress::ProgressCache;
pub use registry::{ConnectionInfo, ConnectionLimits, ConnectionRegistry, RegistryMetrics};
pub use rooms::{Member, Room, RoomManager, RoomTable};
pub use router::{
    outbound_channel, BroadcastRouter, EventReceiver, EventSender, OUTBOUND_CHANNEL_CAPACITY,
};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::models::{ClientEvent, ConnectionId, RoomKey, UserIdentity};

/// Facade over the coordination components
///
/// One per process; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    registry: ConnectionRegistry,
    rooms: RoomManager,
    locks: LockArbiter,
    progress: ProgressCache,
    notify: NotificationBus,
    router: Arc<BroadcastRouter>,
}

impl Coordinator {
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        let router = Arc::new(BroadcastRouter::new());
        let table: RoomTable = Arc::new(DashMap::new());
        let registry = ConnectionRegistry::new(ConnectionLimits {
            max_total: config.max_connections,
            max_per_user: config.max_connections_per_user,
        });

        Self {
            rooms: RoomManager::new(Arc::clone(&table), Arc::clone(&router)),
            locks: LockArbiter::new(Arc::clone(&table), Arc::clone(&router)),
            progress: ProgressCache::new(Arc::clone(&table), Arc::clone(&router)),
            notify: NotificationBus::new(registry.clone(), Arc::clone(&router)),
            registry,
            router,
            config: Arc::new(config),
        }
    }

    /// Bind a freshly authenticated connection to its outbound queue
    ///
    /// Fails on a connection limit; the transport then closes the socket.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        identity: UserIdentity,
        sender: EventSender,
    ) -> Result<()> {
        self.registry.register(connection_id, identity, sender)
    }

    /// Stamp activity for an inbound frame, pongs included
    pub fn touch(&self, connection_id: &ConnectionId) {
        self.registry.touch(connection_id);
    }

    /// Dispatch one inbound event on behalf of a registered connection
    ///
    /// Events from unknown connections are dropped. Room-scoped no-ops
    /// (not a member, not the holder) are absorbed by the components.
    pub fn handle_event(&self, connection_id: &ConnectionId, event: ClientEvent) {
        let Some((identity, sender)) = self.registry.lookup(connection_id) else {
            debug!(
                connection_id = %connection_id,
                event_type = %event.event_type(),
                "Event from an unregistered connection dropped"
            );
            return;
        };

        match event {
            ClientEvent::JoinRoom {
                room_type,
                entity_id,
            } => {
                let key = RoomKey::new(room_type, entity_id);
                self.rooms
                    .join(key.clone(), connection_id.clone(), &identity, sender);
                if !self.registry.track_room(connection_id, key.clone()) {
                    // lost a race with a disconnect; undo the membership
                    self.rooms.leave(&key, connection_id);
                }
            }
            ClientEvent::LeaveRoom {
                room_type,
                entity_id,
            } => {
                let key = RoomKey::new(room_type, entity_id);
                self.rooms.leave(&key, connection_id);
                self.registry.untrack_room(connection_id, &key);
            }
            ClientEvent::RequestLock {
                room_type,
                entity_id,
                lock_type,
            } => {
                self.locks.request(
                    &RoomKey::new(room_type, entity_id),
                    connection_id,
                    &identity,
                    lock_type,
                );
            }
            ClientEvent::ReleaseLock {
                room_type,
                entity_id,
            } => {
                self.locks
                    .release(&RoomKey::new(room_type, entity_id), connection_id, &identity);
            }
            ClientEvent::UpdateProgress {
                room_type,
                entity_id,
                progress,
            } => {
                self.progress.update(
                    &RoomKey::new(room_type, entity_id),
                    connection_id,
                    &identity,
                    progress,
                );
            }
            ClientEvent::BroadcastAction {
                action_type,
                message,
                entity_id,
                metadata,
            } => {
                self.notify
                    .broadcast_action(&identity, action_type, message, entity_id, metadata);
            }
        }
    }

    /// Tear down a connection
    ///
    /// Every room membership is cancelled and any lock its user held in
    /// one of those rooms is released, room by room. Idempotent, so the
    /// transport teardown and the idle sweeper may race freely.
    pub fn disconnect(&self, connection_id: &ConnectionId) {
        let Some(info) = self.registry.unregister(connection_id) else {
            return;
        };
        for key in &info.rooms {
            self.rooms.leave(key, connection_id);
        }
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    #[must_use]
    pub fn locks(&self) -> &LockArbiter {
        &self.locks
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressCache {
        &self.progress
    }

    #[must_use]
    pub fn notify(&self) -> &NotificationBus {
        &self.notify
    }

    /// Get metrics summary across every component
    #[must_use]
    pub fn metrics(&self) -> CoordinatorMetrics {
        let registry = self.registry.metrics();
        CoordinatorMetrics {
            active_connections: registry.active_connections,
            active_users: registry.active_users,
            active_rooms: self.rooms.room_count(),
            total_connections: registry.total_connections,
            events_delivered: self.router.delivered(),
            events_dropped: self.router.dropped(),
        }
    }
}

/// Point-in-time counters for logging and tests
#[derive(Debug, Clone)]
pub struct CoordinatorMetrics {
    pub active_connections: usize,
    pub active_users: usize,
    pub active_rooms: usize,
    pub total_connections: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
}
