//! Cross-entity notification models
//!
//! Ephemeral broadcast payloads: operator action announcements and order
//! update relays. Nothing here is persisted; a user who is offline at
//! broadcast time simply never sees the notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::{generate_id, EntityId, UserId};
use crate::models::user::UserIdentity;

/// Presentation severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
}

/// A cross-entity announcement fanned out to every connected operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub severity: Severity,
    /// Free-form action discriminator ("label_generated", "stock_intake", ...)
    pub action_type: String,
    pub message: String,
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub entity_id: Option<EntityId>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl Notification {
    #[must_use]
    pub fn new(
        severity: Severity,
        actor: &UserIdentity,
        action_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            severity,
            action_type: action_type.into(),
            message: message.into(),
            user_id: actor.id.clone(),
            user_name: actor.name.clone(),
            user_avatar: actor.avatar.clone(),
            entity_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Which part of an order a mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Status,
    Items,
    Shipping,
    General,
}

/// Order mutation relay, forwarded verbatim from the CRUD service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order_id: EntityId,
    pub update_type: UpdateType,
    pub timestamp: DateTime<Utc>,
    pub updated_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_ids_are_unique() {
        let actor = UserIdentity::new("u-1", "Alice");
        let a = Notification::new(Severity::Success, &actor, "stock_intake", "msg");
        let b = Notification::new(Severity::Success, &actor, "stock_intake", "msg");
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 12);
    }

    #[test]
    fn test_notification_wire_shape() {
        let actor = UserIdentity::new("u-1", "Alice").with_avatar("https://cdn/a.png");
        let notification = Notification::new(
            Severity::Warning,
            &actor,
            "order_completed",
            "Order #100 marked shipped",
        )
        .with_entity(EntityId::from("100"));

        let json = serde_json::to_value(&notification).expect("serialize");
        assert_eq!(json["type"], "warning");
        assert_eq!(json["actionType"], "order_completed");
        assert_eq!(json["userId"], "u-1");
        assert_eq!(json["userAvatar"], "https://cdn/a.png");
        assert_eq!(json["entityId"], "100");
        assert!(json["metadata"].is_null());
    }

    #[test]
    fn test_update_type_wire_form() {
        let update = OrderUpdate {
            order_id: EntityId::from("42"),
            update_type: UpdateType::Shipping,
            timestamp: Utc::now(),
            updated_by: Some("Alice".to_string()),
        };
        let json = serde_json::to_value(&update).expect("serialize");
        assert_eq!(json["updateType"], "shipping");
        assert_eq!(json["orderId"], "42");
    }
}
