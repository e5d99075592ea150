//! Wire protocol events
//!
//! One JSON object per WebSocket text frame, tagged by `type` with
//! snake_case event names and camelCase payload fields. Room identity
//! arrives as the (`roomType`, `entityId`) pair and leaves as the
//! canonical `roomId` string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::{ConnectionId, EntityId, UserId};
use crate::models::lock::{Lock, LockType};
use crate::models::notification::{Notification, OrderUpdate};
use crate::models::progress::{Progress, ProgressPatch};
use crate::models::room::{RoomKey, RoomState, RoomType, Viewer};

/// Events a client may send to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Enter a room; answered with a `room_state` snapshot
    JoinRoom {
        room_type: RoomType,
        entity_id: EntityId,
    },

    /// Leave a room; a no-op if never joined
    LeaveRoom {
        room_type: RoomType,
        entity_id: EntityId,
    },

    /// Claim the room's advisory lock
    RequestLock {
        room_type: RoomType,
        entity_id: EntityId,
        lock_type: LockType,
    },

    /// Give the lock back; a no-op unless the caller's user holds it
    ReleaseLock {
        room_type: RoomType,
        entity_id: EntityId,
    },

    /// Report pick/pack progress for a joined room
    UpdateProgress {
        room_type: RoomType,
        entity_id: EntityId,
        progress: ProgressPatch,
    },

    /// Announce a business action to every other connected operator
    BroadcastAction {
        action_type: String,
        message: String,
        entity_id: Option<EntityId>,
        metadata: Option<serde_json::Value>,
    },
}

impl ClientEvent {
    /// Get the room this event targets, if room-scoped
    #[must_use]
    pub fn room(&self) -> Option<RoomKey> {
        match self {
            Self::JoinRoom {
                room_type,
                entity_id,
            }
            | Self::LeaveRoom {
                room_type,
                entity_id,
            }
            | Self::RequestLock {
                room_type,
                entity_id,
                ..
            }
            | Self::ReleaseLock {
                room_type,
                entity_id,
            }
            | Self::UpdateProgress {
                room_type,
                entity_id,
                ..
            } => Some(RoomKey::new(*room_type, entity_id.clone())),
            Self::BroadcastAction { .. } => None,
        }
    }

    /// Get a short description of the event type
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::RequestLock { .. } => "request_lock",
            Self::ReleaseLock { .. } => "release_lock",
            Self::UpdateProgress { .. } => "update_progress",
            Self::BroadcastAction { .. } => "broadcast_action",
        }
    }
}

/// Events the coordinator pushes to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full snapshot, unicast to the connection that just joined
    RoomState {
        room_id: RoomKey,
        room_type: RoomType,
        viewers: Vec<Viewer>,
        lock_info: Option<Lock>,
        progress: Option<Progress>,
    },

    /// Someone else entered the room
    ViewerJoined { room_id: RoomKey, viewer: Viewer },

    /// A connection left the room (or disconnected)
    ViewerLeft {
        room_id: RoomKey,
        connection_id: ConnectionId,
        user_id: UserId,
    },

    /// Lock granted or renewed; broadcast to every member
    LockAcquired { room_id: RoomKey, lock_info: Lock },

    /// Lock cleared, by release, cascade, or the sweeper
    LockReleased { room_id: RoomKey },

    /// Lock refused; unicast to the requester only
    LockDenied {
        room_id: RoomKey,
        reason: String,
        current_lock: Option<Lock>,
    },

    /// Progress cache changed; includes the merged result
    ProgressUpdated { room_id: RoomKey, progress: Progress },

    /// The sweeper revoked a stale lock
    ForceUnlock { room_id: RoomKey, reason: String },

    /// Cross-entity announcement
    GlobalNotification { notification: Notification },

    /// Order mutation relayed from the CRUD service
    OrderUpdated {
        order_id: EntityId,
        update_type: crate::models::notification::UpdateType,
        timestamp: DateTime<Utc>,
        updated_by: Option<String>,
    },
}

impl ServerEvent {
    #[must_use]
    pub fn room_state(state: RoomState) -> Self {
        Self::RoomState {
            room_id: state.room_id,
            room_type: state.room_type,
            viewers: state.viewers,
            lock_info: state.lock_info,
            progress: state.progress,
        }
    }

    #[must_use]
    pub fn order_updated(update: OrderUpdate) -> Self {
        Self::OrderUpdated {
            order_id: update.order_id,
            update_type: update.update_type,
            timestamp: update.timestamp,
            updated_by: update.updated_by,
        }
    }

    /// Get the room ID for events scoped to a specific room
    #[must_use]
    pub const fn room_id(&self) -> Option<&RoomKey> {
        match self {
            Self::RoomState { room_id, .. }
            | Self::ViewerJoined { room_id, .. }
            | Self::ViewerLeft { room_id, .. }
            | Self::LockAcquired { room_id, .. }
            | Self::LockReleased { room_id }
            | Self::LockDenied { room_id, .. }
            | Self::ProgressUpdated { room_id, .. }
            | Self::ForceUnlock { room_id, .. } => Some(room_id),
            Self::GlobalNotification { .. } | Self::OrderUpdated { .. } => None,
        }
    }

    /// Get a short description of the event type
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RoomState { .. } => "room_state",
            Self::ViewerJoined { .. } => "viewer_joined",
            Self::ViewerLeft { .. } => "viewer_left",
            Self::LockAcquired { .. } => "lock_acquired",
            Self::LockReleased { .. } => "lock_released",
            Self::LockDenied { .. } => "lock_denied",
            Self::ProgressUpdated { .. } => "progress_updated",
            Self::ForceUnlock { .. } => "force_unlock",
            Self::GlobalNotification { .. } => "global_notification",
            Self::OrderUpdated { .. } => "order_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserIdentity;

    #[test]
    fn test_join_room_deserialization() {
        let json = r#"{"type":"join_room","roomType":"order","entityId":"42"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "join_room");
        assert_eq!(event.room().unwrap().to_string(), "order:42");
    }

    #[test]
    fn test_request_lock_deserialization() {
        let json =
            r#"{"type":"request_lock","roomType":"shipment","entityId":"7","lockType":"edit"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::RequestLock { lock_type, .. } => assert_eq!(lock_type, LockType::Edit),
            other => panic!("Expected RequestLock, got {other:?}"),
        }
    }

    #[test]
    fn test_update_progress_deserialization() {
        let json = r#"{
            "type": "update_progress",
            "roomType": "order",
            "entityId": "42",
            "progress": {"itemsScanned": 3, "totalItems": 10}
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::UpdateProgress { progress, .. } => {
                assert_eq!(progress.items_scanned, Some(3));
                assert_eq!(progress.total_items, Some(10));
                assert!(progress.current_item.is_none());
            }
            other => panic!("Expected UpdateProgress, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_action_has_no_room() {
        let json = r#"{"type":"broadcast_action","actionType":"stock_intake","message":"+50 units"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(event.room().is_none());
    }

    #[test]
    fn test_malformed_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"join_room"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"roomType":"order"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }

    #[test]
    fn test_room_state_serialization() {
        let key: RoomKey = "order:42".parse().unwrap();
        let identity = UserIdentity::new("u-1", "Alice");
        let viewer = Viewer::new(&identity, ConnectionId::from_string("c-1".to_string()));
        let event = ServerEvent::room_state(RoomState {
            room_id: key.clone(),
            room_type: key.room_type(),
            viewers: vec![viewer],
            lock_info: None,
            progress: None,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "room_state");
        assert_eq!(json["roomId"], "order:42");
        assert_eq!(json["roomType"], "order");
        assert!(json["lockInfo"].is_null());
        assert!(json["progress"].is_null());
        assert_eq!(json["viewers"][0]["userName"], "Alice");
        assert_eq!(json["viewers"][0]["connectionId"], "c-1");
    }

    #[test]
    fn test_lock_events_round_trip() {
        let key: RoomKey = "order:42".parse().unwrap();
        let identity = UserIdentity::new("u-1", "Alice");
        let event = ServerEvent::LockAcquired {
            room_id: key.clone(),
            lock_info: Lock::new(&identity, LockType::Edit),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("lock_acquired"));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "lock_acquired");
        assert_eq!(back.room_id(), Some(&key));
    }

    #[test]
    fn test_global_notification_has_no_room() {
        let actor = UserIdentity::new("u-1", "Alice");
        let event = ServerEvent::GlobalNotification {
            notification: crate::models::notification::Notification::new(
                crate::models::notification::Severity::Success,
                &actor,
                "status_change",
                "Order #100 marked shipped",
            ),
        };
        assert!(event.room_id().is_none());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "global_notification");
        assert_eq!(json["notification"]["userId"], "u-1");
    }
}
