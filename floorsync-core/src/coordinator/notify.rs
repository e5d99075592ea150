//! Global notification fan-out
//!
//! Orthogonal to rooms: announcements and order-update relays go to every
//! live connection. Best effort, at most once; an operator who is offline
//! when the event fires never sees it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::models::{
    EntityId, Notification, OrderUpdate, ServerEvent, Severity, UserId, UserIdentity,
};

use super::registry::ConnectionRegistry;
use super::router::BroadcastRouter;

#[derive(Clone)]
pub struct NotificationBus {
    registry: ConnectionRegistry,
    router: Arc<BroadcastRouter>,
}

impl NotificationBus {
    #[must_use]
    pub fn new(registry: ConnectionRegistry, router: Arc<BroadcastRouter>) -> Self {
        Self { registry, router }
    }

    /// Announce an operator action to everyone but the actor
    ///
    /// The actor hears nothing on any of their connections; they already
    /// know what they did.
    pub fn broadcast_action(
        &self,
        actor: &UserIdentity,
        action_type: String,
        message: String,
        entity_id: Option<EntityId>,
        metadata: Option<serde_json::Value>,
    ) {
        let mut notification = Notification::new(Severity::Success, actor, action_type, message);
        if let Some(entity_id) = entity_id {
            notification = notification.with_entity(entity_id);
        }
        if let Some(metadata) = metadata {
            notification = notification.with_metadata(metadata);
        }

        let action_type = notification.action_type.clone();
        let recipients = self.fan_out(
            Some(&actor.id),
            &ServerEvent::GlobalNotification { notification },
        );
        info!(
            actor = %actor.id,
            action_type = %action_type,
            recipients,
            "Action broadcast"
        );
    }

    /// Ingress path: deliver a fully-formed notification to everyone
    pub fn publish(&self, notification: Notification) {
        let action_type = notification.action_type.clone();
        let recipients = self.fan_out(None, &ServerEvent::GlobalNotification { notification });
        info!(action_type = %action_type, recipients, "Notification published");
    }

    /// Ingress path: relay an order mutation to everyone
    pub fn relay_order_update(&self, update: OrderUpdate) {
        let order_id = update.order_id.clone();
        let recipients = self.fan_out(None, &ServerEvent::order_updated(update));
        debug!(order_id = %order_id, recipients, "Order update relayed");
    }

    fn fan_out(&self, excluded: Option<&UserId>, event: &ServerEvent) -> usize {
        let mut sent = 0;
        for (connection_id, sender) in self.registry.senders_excluding(excluded) {
            if self.router.deliver(&connection_id, &sender, event) {
                sent += 1;
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::router::{outbound_channel, EventReceiver};
    use crate::models::{ConnectionId, UpdateType};
    use chrono::Utc;

    fn fixture() -> (NotificationBus, ConnectionRegistry) {
        let registry = ConnectionRegistry::default();
        let bus = NotificationBus::new(registry.clone(), Arc::new(BroadcastRouter::new()));
        (bus, registry)
    }

    fn connect(registry: &ConnectionRegistry, user: &str, name: &str) -> EventReceiver {
        let (tx, rx) = outbound_channel();
        registry
            .register(ConnectionId::new(), UserIdentity::new(user, name), tx)
            .unwrap();
        rx
    }

    async fn next(rx: &mut EventReceiver) -> ServerEvent {
        tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    async fn assert_silent(rx: &mut EventReceiver) {
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "expected no event, got {outcome:?}");
    }

    #[tokio::test]
    async fn test_broadcast_action_skips_every_actor_connection() {
        let (bus, registry) = fixture();
        let mut rx_a1 = connect(&registry, "u-a", "Alice");
        let mut rx_a2 = connect(&registry, "u-a", "Alice");
        let mut rx_b = connect(&registry, "u-b", "Bob");

        bus.broadcast_action(
            &UserIdentity::new("u-a", "Alice"),
            "status_change".to_string(),
            "Order #100 marked shipped".to_string(),
            Some(EntityId::from("100")),
            None,
        );

        match next(&mut rx_b).await {
            ServerEvent::GlobalNotification { notification } => {
                assert_eq!(notification.user_id, UserId::from("u-a"));
                assert_eq!(notification.severity, Severity::Success);
                assert_eq!(notification.action_type, "status_change");
                assert_eq!(notification.entity_id, Some(EntityId::from("100")));
            }
            other => panic!("expected global_notification, got {other:?}"),
        }
        assert_silent(&mut rx_b).await;
        assert_silent(&mut rx_a1).await;
        assert_silent(&mut rx_a2).await;
    }

    #[tokio::test]
    async fn test_publish_reaches_everyone() {
        let (bus, registry) = fixture();
        let mut rx_a = connect(&registry, "u-a", "Alice");
        let mut rx_b = connect(&registry, "u-b", "Bob");

        let system = UserIdentity::new("u-a", "Alice");
        bus.publish(Notification::new(
            Severity::Warning,
            &system,
            "stock_low",
            "SKU-9 below reorder point",
        ));

        // the ingress path does not exclude anyone, the actor included
        assert_eq!(next(&mut rx_a).await.event_type(), "global_notification");
        assert_eq!(next(&mut rx_b).await.event_type(), "global_notification");
    }

    #[tokio::test]
    async fn test_relay_order_update_reaches_everyone() {
        let (bus, registry) = fixture();
        let mut rx_a = connect(&registry, "u-a", "Alice");
        let mut rx_b = connect(&registry, "u-b", "Bob");

        bus.relay_order_update(OrderUpdate {
            order_id: EntityId::from("42"),
            update_type: UpdateType::Status,
            timestamp: Utc::now(),
            updated_by: Some("Alice".to_string()),
        });

        for rx in [&mut rx_a, &mut rx_b] {
            match next(rx).await {
                ServerEvent::OrderUpdated {
                    order_id,
                    update_type,
                    ..
                } => {
                    assert_eq!(order_id, EntityId::from("42"));
                    assert_eq!(update_type, UpdateType::Status);
                }
                other => panic!("expected order_updated, got {other:?}"),
            }
        }
    }
}
