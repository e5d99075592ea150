//! Per-room progress cache
//!
//! Last-write-wins: each report merges over the cached record and the
//! merged result goes to every member, the reporter included. Reporting
//! does not require the lock, but a reporting holder keeps their lock
//! fresh.

use std::sync::Arc;

use tracing::debug;

use crate::models::{ConnectionId, Progress, ProgressPatch, RoomKey, ServerEvent, UserIdentity};

use super::rooms::RoomTable;
use super::router::BroadcastRouter;

#[derive(Clone)]
pub struct ProgressCache {
    rooms: RoomTable,
    router: Arc<BroadcastRouter>,
}

impl ProgressCache {
    #[must_use]
    pub fn new(rooms: RoomTable, router: Arc<BroadcastRouter>) -> Self {
        Self { rooms, router }
    }

    /// Merge a patch into the room's cached progress and broadcast the
    /// result. A no-op if the room does not exist or the reporter is not
    /// a member.
    pub fn update(
        &self,
        key: &RoomKey,
        connection_id: &ConnectionId,
        reporter: &UserIdentity,
        patch: ProgressPatch,
    ) {
        let Some(mut room) = self.rooms.get_mut(key) else {
            debug!(room = %key, connection_id = %connection_id, "Progress for an unknown room");
            return;
        };
        if !room.is_member(connection_id) {
            debug!(
                room = %key,
                connection_id = %connection_id,
                user = %reporter.id,
                "Progress from a connection that never joined"
            );
            return;
        }

        let merged = Progress::merge(room.progress.as_ref(), patch, reporter);
        room.progress = Some(merged.clone());

        // active work keeps the reporter's lock alive
        if let Some(lock) = room.lock.as_mut() {
            if lock.is_held_by(&reporter.id) {
                lock.refresh();
            }
        }

        room.broadcast(
            &self.router,
            &ServerEvent::ProgressUpdated {
                room_id: key.clone(),
                progress: merged,
            },
        );
        drop(room);

        debug!(room = %key, user = %reporter.id, "Progress updated");
    }
}
