//! Advisory lock arbitration
//!
//! A room has at most one lock, held by a user. Requests resolve to
//! granted, renewed, or denied under the room's entry guard; a denial
//! changes nothing and is reported to the requester alone. Locks are
//! coordination aids, so every operation degrades to a no-op rather
//! than an error.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::{ConnectionId, Lock, LockType, RoomKey, ServerEvent, UserIdentity};

use super::rooms::RoomTable;
use super::router::BroadcastRouter;

#[derive(Clone)]
pub struct LockArbiter {
    rooms: RoomTable,
    router: Arc<BroadcastRouter>,
}

impl LockArbiter {
    #[must_use]
    pub fn new(rooms: RoomTable, router: Arc<BroadcastRouter>) -> Self {
        Self { rooms, router }
    }

    /// Grant, renew, or deny the room's lock
    ///
    /// A free lock is granted and `lock_acquired` goes to every member,
    /// the requester included. A re-request by the current holder's user
    /// renews the lock (and may switch its type) without moving
    /// `acquiredAt`. A lock held by anyone else is denied outright,
    /// whatever the requested type; only the requester hears about it.
    pub fn request(
        &self,
        key: &RoomKey,
        connection_id: &ConnectionId,
        requester: &UserIdentity,
        lock_type: LockType,
    ) {
        let Some(mut room) = self.rooms.get_mut(key) else {
            debug!(room = %key, connection_id = %connection_id, "Lock request for an unknown room");
            return;
        };
        if !room.is_member(connection_id) {
            debug!(
                room = %key,
                connection_id = %connection_id,
                user = %requester.id,
                "Lock request from a connection that never joined"
            );
            return;
        }

        if let Some(held) = room
            .lock
            .as_ref()
            .filter(|lock| !lock.is_held_by(&requester.id))
        {
            let reason = match held.lock_type {
                LockType::Edit => format!(
                    "This {} is currently being edited by {}",
                    key.room_type(),
                    held.holder_name
                ),
                LockType::View => format!(
                    "This {} is currently being viewed by {}. They must release it first.",
                    key.room_type(),
                    held.holder_name
                ),
            };
            let denied = ServerEvent::LockDenied {
                room_id: key.clone(),
                reason,
                current_lock: Some(held.clone()),
            };
            if let Some(sender) = room.member_sender(connection_id) {
                self.router.deliver(connection_id, sender, &denied);
            }
            debug!(
                room = %key,
                user = %requester.id,
                holder = %held.holder_user_id,
                "Lock denied"
            );
            return;
        }

        let renewed = room.lock.is_some();
        let lock = match room.lock.take() {
            Some(mut held) => {
                held.lock_type = lock_type;
                held.refresh();
                held
            }
            None => Lock::new(requester, lock_type),
        };
        room.lock = Some(lock.clone());
        room.broadcast(
            &self.router,
            &ServerEvent::LockAcquired {
                room_id: key.clone(),
                lock_info: lock,
            },
        );
        drop(room);

        if renewed {
            debug!(room = %key, user = %requester.id, lock_type = %lock_type, "Lock renewed");
        } else {
            info!(room = %key, user = %requester.id, lock_type = %lock_type, "Lock granted");
        }
    }

    /// Clear the lock if the caller's user holds it
    ///
    /// Any connection of the holder's user may release. Everything else
    /// is a silent no-op.
    pub fn release(&self, key: &RoomKey, connection_id: &ConnectionId, requester: &UserIdentity) {
        let Some(mut room) = self.rooms.get_mut(key) else {
            debug!(room = %key, connection_id = %connection_id, "Release for an unknown room");
            return;
        };
        if !room
            .lock
            .as_ref()
            .is_some_and(|lock| lock.is_held_by(&requester.id))
        {
            debug!(room = %key, user = %requester.id, "Release from a non-holder ignored");
            return;
        }

        room.lock = None;
        room.broadcast(
            &self.router,
            &ServerEvent::LockReleased {
                room_id: key.clone(),
            },
        );
        drop(room);

        info!(room = %key, user = %requester.id, "Lock released");
    }

    /// Clear the lock no matter who holds it
    ///
    /// Members are told why via `force_unlock`, then see the usual
    /// `lock_released`. Returns whether a lock was actually cleared.
    pub fn force_unlock(&self, key: &RoomKey, reason: &str) -> bool {
        let Some(mut room) = self.rooms.get_mut(key) else {
            return false;
        };
        let Some(stale) = room.lock.take() else {
            return false;
        };

        room.broadcast(
            &self.router,
            &ServerEvent::ForceUnlock {
                room_id: key.clone(),
                reason: reason.to_string(),
            },
        );
        room.broadcast(
            &self.router,
            &ServerEvent::LockReleased {
                room_id: key.clone(),
            },
        );
        drop(room);

        warn!(
            room = %key,
            holder = %stale.holder_user_id,
            reason = %reason,
            "Lock force-released"
        );
        true
    }

    /// Rooms whose lock has not been refreshed within `ttl`
    #[must_use]
    pub fn stale_locks(&self, ttl: chrono::Duration) -> Vec<RoomKey> {
        let now = Utc::now();
        self.rooms
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .lock
                    .as_ref()
                    .is_some_and(|lock| lock.expired(ttl, now))
            })
            .map(|entry| entry.key().clone())
            .collect()
    }
}
