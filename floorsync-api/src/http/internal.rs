//! Internal relay ingress
//!
//! The back office service calls these after committing a mutation; the
//! coordinator only fans the result out to connected operators. Callers
//! authenticate with a shared bearer token compared in constant time.
//! With no token configured the routes stay permanently unauthorized.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use floorsync_core::models::{
    EntityId, Notification, OrderUpdate, Severity, UpdateType, UserIdentity,
};

use crate::http::{AppError, AppResult, AppState};

/// Body of `POST /internal/order-updated`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdatedRequest {
    pub order_id: EntityId,
    pub update_type: UpdateType,
    /// Defaults to the relay time when the caller omits it
    pub timestamp: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

/// Body of `POST /internal/notifications`
///
/// The notification id and timestamp are assigned server-side; callers
/// only describe the actor and the action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub action_type: String,
    pub message: String,
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub entity_id: Option<EntityId>,
    pub metadata: Option<serde_json::Value>,
}

/// Relay an order mutation to every connected operator
pub async fn order_updated(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OrderUpdatedRequest>,
) -> AppResult<StatusCode> {
    authorize(&state, &headers)?;

    state.coordinator.notify().relay_order_update(OrderUpdate {
        order_id: body.order_id,
        update_type: body.update_type,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        updated_by: body.updated_by,
    });

    Ok(StatusCode::ACCEPTED)
}

/// Publish a global notification on behalf of the back office service
pub async fn publish_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NotificationRequest>,
) -> AppResult<StatusCode> {
    authorize(&state, &headers)?;

    let mut actor = UserIdentity::new(body.user_id, body.user_name);
    if let Some(avatar) = body.user_avatar {
        actor = actor.with_avatar(avatar);
    }

    let mut notification =
        Notification::new(body.severity, &actor, body.action_type, body.message);
    if let Some(entity_id) = body.entity_id {
        notification = notification.with_entity(entity_id);
    }
    if let Some(metadata) = body.metadata {
        notification = notification.with_metadata(metadata);
    }

    state.coordinator.notify().publish(notification);

    Ok(StatusCode::ACCEPTED)
}

/// Constant-time bearer token check against `auth.internal_token`
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.auth.internal_token.as_deref() else {
        debug!("Internal ingress called with no internal_token configured");
        return Err(AppError::unauthorized("Internal ingress disabled"));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

    if presented.len() != expected.len()
        || !bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
    {
        warn!("Internal ingress auth failed: invalid token");
        return Err(AppError::unauthorized("Invalid token"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockSessionVerifier;
    use crate::http::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    use floorsync_core::coordinator::{outbound_channel, EventReceiver};
    use floorsync_core::models::{ConnectionId, ServerEvent, UserId};
    use floorsync_core::{Config, Coordinator};

    fn router_with_token(token: Option<&str>) -> (Router, Coordinator) {
        let mut config = Config::default();
        config.auth.internal_token = token.map(str::to_string);
        let coordinator = Coordinator::new(config.coordinator.clone());
        let router = create_router(
            coordinator.clone(),
            Arc::new(MockSessionVerifier::new()),
            Arc::new(config),
        );
        (router, coordinator)
    }

    fn connect(coordinator: &Coordinator, user: &str, name: &str) -> EventReceiver {
        let (tx, rx) = outbound_channel();
        coordinator
            .register(ConnectionId::new(), UserIdentity::new(user, name), tx)
            .unwrap();
        rx
    }

    fn post(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_notification_is_published_to_connections() {
        let (router, coordinator) = router_with_token(Some("secret"));
        let mut rx = connect(&coordinator, "u-1", "Alice");

        let response = router
            .oneshot(post(
                "/internal/notifications",
                Some("secret"),
                serde_json::json!({
                    "type": "success",
                    "actionType": "order_completed",
                    "message": "Order #100 marked shipped",
                    "userId": "u-9",
                    "userName": "Packer",
                    "entityId": "100"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);

        match rx.try_recv().unwrap() {
            ServerEvent::GlobalNotification { notification } => {
                assert_eq!(notification.user_id, UserId::from("u-9"));
                assert_eq!(notification.message, "Order #100 marked shipped");
                assert_eq!(notification.entity_id, Some(EntityId::from("100")));
                assert!(!notification.id.is_empty());
            }
            other => panic!("expected global_notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_order_update_defaults_timestamp() {
        let (router, coordinator) = router_with_token(Some("secret"));
        let mut rx = connect(&coordinator, "u-1", "Alice");

        let before = Utc::now();
        let response = router
            .oneshot(post(
                "/internal/order-updated",
                Some("secret"),
                serde_json::json!({
                    "orderId": "42",
                    "updateType": "status",
                    "updatedBy": "Packer"
                }),
            ))
            .await
            .unwrap();
        let after = Utc::now();

        assert_eq!(response.status(), StatusCode::ACCEPTED);

        match rx.try_recv().unwrap() {
            ServerEvent::OrderUpdated {
                order_id,
                timestamp,
                updated_by,
                ..
            } => {
                assert_eq!(order_id, EntityId::from("42"));
                assert_eq!(updated_by.as_deref(), Some("Packer"));
                assert!(timestamp >= before && timestamp <= after);
            }
            other => panic!("expected order_updated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_token_is_rejected() {
        let (router, _coordinator) = router_with_token(Some("secret"));

        let response = router
            .oneshot(post(
                "/internal/order-updated",
                Some("wrong"),
                serde_json::json!({"orderId": "42", "updateType": "status"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_header_is_rejected() {
        let (router, _coordinator) = router_with_token(Some("secret"));

        let response = router
            .oneshot(post(
                "/internal/notifications",
                None,
                serde_json::json!({
                    "type": "info",
                    "actionType": "x",
                    "message": "m",
                    "userId": "u",
                    "userName": "n"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unconfigured_token_disables_ingress() {
        let (router, _coordinator) = router_with_token(None);

        let response = router
            .oneshot(post(
                "/internal/order-updated",
                Some("anything"),
                serde_json::json!({"orderId": "42", "updateType": "status"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
