//! Room table and presence
//!
//! One `Room` per busy entity, created on first join and removed when the
//! last viewer leaves. Every mutation commits and broadcasts under the
//! room's map entry guard, which is what gives all members of a room the
//! same event order.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::models::{
    ConnectionId, Lock, Progress, RoomKey, RoomState, ServerEvent, UserId, UserIdentity, Viewer,
};

use super::router::{BroadcastRouter, EventSender};

/// One room member: the public viewer record plus the connection's
/// outbound queue
#[derive(Debug, Clone)]
pub struct Member {
    pub viewer: Viewer,
    pub sender: EventSender,
}

/// Live state of one coordinated entity
///
/// Members are kept in join order; a lock may only exist while at least
/// one member is present.
#[derive(Debug, Default)]
pub struct Room {
    members: Vec<Member>,
    pub lock: Option<Lock>,
    pub progress: Option<Progress>,
}

impl Room {
    /// Add or refresh the member entry for a connection
    ///
    /// Returns true if the connection was already a member (a rejoin).
    pub fn insert_member(&mut self, member: Member) -> bool {
        if let Some(existing) = self
            .members
            .iter_mut()
            .find(|m| m.viewer.connection_id == member.viewer.connection_id)
        {
            *existing = member;
            true
        } else {
            self.members.push(member);
            false
        }
    }

    pub fn remove_member(&mut self, connection_id: &ConnectionId) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| m.viewer.connection_id == *connection_id)?;
        Some(self.members.remove(index))
    }

    #[must_use]
    pub fn is_member(&self, connection_id: &ConnectionId) -> bool {
        self.members
            .iter()
            .any(|m| m.viewer.connection_id == *connection_id)
    }

    #[must_use]
    pub fn member_sender(&self, connection_id: &ConnectionId) -> Option<&EventSender> {
        self.members
            .iter()
            .find(|m| m.viewer.connection_id == *connection_id)
            .map(|m| &m.sender)
    }

    /// Whether any connection of this user is still present
    #[must_use]
    pub fn user_still_present(&self, user_id: &UserId) -> bool {
        self.members.iter().any(|m| m.viewer.user_id == *user_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.members.len()
    }

    /// Full snapshot, viewers in join order
    #[must_use]
    pub fn snapshot(&self, key: &RoomKey) -> RoomState {
        RoomState {
            room_id: key.clone(),
            room_type: key.room_type(),
            viewers: self.members.iter().map(|m| m.viewer.clone()).collect(),
            lock_info: self.lock.clone(),
            progress: self.progress.clone(),
        }
    }

    /// Queue an event for every member
    pub fn broadcast(&self, router: &BroadcastRouter, event: &ServerEvent) {
        for member in &self.members {
            router.deliver(&member.viewer.connection_id, &member.sender, event);
        }
    }

    /// Queue an event for every member except one connection
    pub fn broadcast_except(
        &self,
        router: &BroadcastRouter,
        skip: &ConnectionId,
        event: &ServerEvent,
    ) {
        for member in &self.members {
            if member.viewer.connection_id != *skip {
                router.deliver(&member.viewer.connection_id, &member.sender, event);
            }
        }
    }
}

/// Shared room table
///
/// RoomManager, LockArbiter and ProgressCache all commit their mutations
/// under the same per-key entry guards.
pub type RoomTable = Arc<DashMap<RoomKey, Room>>;

/// Presence and room lifecycle
#[derive(Clone)]
pub struct RoomManager {
    rooms: RoomTable,
    router: Arc<BroadcastRouter>,
}

impl RoomManager {
    #[must_use]
    pub fn new(rooms: RoomTable, router: Arc<BroadcastRouter>) -> Self {
        Self { rooms, router }
    }

    /// Add a connection to a room, creating the room on first join
    ///
    /// The joiner's first event for the room is the full `room_state`
    /// snapshot; everyone already present gets `viewer_joined`. A rejoin
    /// refreshes the viewer entry and re-sends the snapshot without
    /// announcing the viewer again.
    pub fn join(
        &self,
        key: RoomKey,
        connection_id: ConnectionId,
        identity: &UserIdentity,
        sender: EventSender,
    ) {
        let viewer = Viewer::new(identity, connection_id.clone());

        let mut room = self.rooms.entry(key.clone()).or_default();
        let rejoin = room.insert_member(Member {
            viewer: viewer.clone(),
            sender: sender.clone(),
        });
        self.router.deliver(
            &connection_id,
            &sender,
            &ServerEvent::room_state(room.snapshot(&key)),
        );
        if !rejoin {
            room.broadcast_except(
                &self.router,
                &connection_id,
                &ServerEvent::ViewerJoined {
                    room_id: key.clone(),
                    viewer,
                },
            );
        }
        let viewer_count = room.viewer_count();
        drop(room);

        info!(
            room = %key,
            connection_id = %connection_id,
            user = %identity.id,
            viewer_count,
            "Viewer joined"
        );
    }

    /// Remove a connection from a room
    ///
    /// If the leaving connection's user held the lock and has no other
    /// connection left in the room, the lock is cleared and announced
    /// before `viewer_left`. The room is destroyed once empty. A no-op if
    /// the connection was never a member.
    pub fn leave(&self, key: &RoomKey, connection_id: &ConnectionId) {
        let Entry::Occupied(mut entry) = self.rooms.entry(key.clone()) else {
            debug!(room = %key, connection_id = %connection_id, "Leave for an unknown room");
            return;
        };

        let room = entry.get_mut();
        let Some(member) = room.remove_member(connection_id) else {
            debug!(room = %key, connection_id = %connection_id, "Leave from a non-member");
            return;
        };
        let user_id = member.viewer.user_id;

        if room
            .lock
            .as_ref()
            .is_some_and(|lock| lock.is_held_by(&user_id))
            && !room.user_still_present(&user_id)
        {
            room.lock = None;
            room.broadcast(
                &self.router,
                &ServerEvent::LockReleased {
                    room_id: key.clone(),
                },
            );
            info!(room = %key, user = %user_id, "Lock released by departure");
        }

        if room.is_empty() {
            entry.remove();
            debug!(room = %key, "Last viewer left, room removed");
        } else {
            room.broadcast(
                &self.router,
                &ServerEvent::ViewerLeft {
                    room_id: key.clone(),
                    connection_id: connection_id.clone(),
                    user_id: user_id.clone(),
                },
            );
        }

        info!(room = %key, connection_id = %connection_id, user = %user_id, "Viewer left");
    }

    /// Point-in-time snapshot of a room, if it exists
    #[must_use]
    pub fn snapshot(&self, key: &RoomKey) -> Option<RoomState> {
        self.rooms.get(key).map(|room| room.snapshot(key))
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
