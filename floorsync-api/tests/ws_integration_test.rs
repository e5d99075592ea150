// Integration tests for the WebSocket surface
//
// Boots the full router on an ephemeral port and drives it with a real
// WebSocket client: handshake auth, the join/lock/deny flow, the
// disconnect cascade and the internal relay ingress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use floorsync_api::auth::SessionVerifier;
use floorsync_api::http::create_router;
use floorsync_core::models::UserIdentity;
use floorsync_core::{Config, Coordinator, Error};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Static token table standing in for the auth service
struct StaticVerifier;

#[async_trait]
impl SessionVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> floorsync_core::Result<UserIdentity> {
        match token {
            "tok-x" => Ok(UserIdentity::new("u-x", "Xena")),
            "tok-y" => Ok(UserIdentity::new("u-y", "Yuri")),
            _ => Err(Error::Authorization("unknown session".to_string())),
        }
    }
}

/// Boot a test server and return its address.
async fn boot_server() -> String {
    let mut config = Config::default();
    config.auth.internal_token = Some("secret".to_string());

    let coordinator = Coordinator::new(config.coordinator.clone());
    let router = create_router(coordinator, Arc::new(StaticVerifier), Arc::new(config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr.to_string()
}

async fn connect(addr: &str, token: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/api/ws?token={token}"))
        .await
        .unwrap();
    ws
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn assert_silent(ws: &mut WsStream) {
    let outcome = timeout(Duration::from_millis(200), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => {}
                other => panic!("stream ended: {other:?}"),
            }
        }
    })
    .await;
    assert!(outcome.is_err(), "expected no event, got {outcome:?}");
}

#[tokio::test]
async fn test_handshake_rejects_bad_token() {
    let addr = boot_server().await;

    let err = connect_async(format!("ws://{addr}/api/ws?token=nope"))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP error, got {other:?}"),
    }

    let err = connect_async(format!("ws://{addr}/api/ws")).await.unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_then_lock_grant_and_deny() {
    let addr = boot_server().await;
    let mut ws_x = connect(&addr, "tok-x").await;
    let mut ws_y = connect(&addr, "tok-y").await;

    send_json(
        &mut ws_x,
        json!({"type": "join_room", "roomType": "order", "entityId": "42"}),
    )
    .await;
    let state = read_json(&mut ws_x).await;
    assert_eq!(state["type"], "room_state");
    assert_eq!(state["roomId"], "order:42");
    assert_eq!(state["viewers"].as_array().unwrap().len(), 1);
    assert!(state["lockInfo"].is_null());

    send_json(
        &mut ws_y,
        json!({"type": "join_room", "roomType": "order", "entityId": "42"}),
    )
    .await;
    assert_eq!(read_json(&mut ws_y).await["type"], "room_state");
    let joined = read_json(&mut ws_x).await;
    assert_eq!(joined["type"], "viewer_joined");
    assert_eq!(joined["viewer"]["userId"], "u-y");

    send_json(
        &mut ws_x,
        json!({"type": "request_lock", "roomType": "order", "entityId": "42", "lockType": "edit"}),
    )
    .await;
    let acquired = read_json(&mut ws_x).await;
    assert_eq!(acquired["type"], "lock_acquired");
    assert_eq!(acquired["lockInfo"]["holderUserId"], "u-x");
    assert_eq!(read_json(&mut ws_y).await["type"], "lock_acquired");

    send_json(
        &mut ws_y,
        json!({"type": "request_lock", "roomType": "order", "entityId": "42", "lockType": "edit"}),
    )
    .await;
    let denied = read_json(&mut ws_y).await;
    assert_eq!(denied["type"], "lock_denied");
    assert_eq!(
        denied["reason"],
        "This order is currently being edited by Xena"
    );
    assert_eq!(denied["currentLock"]["holderUserId"], "u-x");
    assert_silent(&mut ws_x).await;
}

#[tokio::test]
async fn test_closing_socket_runs_disconnect_cascade() {
    let addr = boot_server().await;
    let mut ws_x = connect(&addr, "tok-x").await;
    let mut ws_y = connect(&addr, "tok-y").await;

    for ws in [&mut ws_x, &mut ws_y] {
        send_json(
            ws,
            json!({"type": "join_room", "roomType": "order", "entityId": "42"}),
        )
        .await;
        assert_eq!(read_json(ws).await["type"], "room_state");
    }
    assert_eq!(read_json(&mut ws_x).await["type"], "viewer_joined");

    send_json(
        &mut ws_x,
        json!({"type": "request_lock", "roomType": "order", "entityId": "42", "lockType": "edit"}),
    )
    .await;
    assert_eq!(read_json(&mut ws_y).await["type"], "lock_acquired");

    ws_x.close(None).await.unwrap();

    assert_eq!(read_json(&mut ws_y).await["type"], "lock_released");
    let left = read_json(&mut ws_y).await;
    assert_eq!(left["type"], "viewer_left");
    assert_eq!(left["userId"], "u-x");
}

#[tokio::test]
async fn test_internal_ingress_reaches_connected_clients() {
    let addr = boot_server().await;
    let mut ws_x = connect(&addr, "tok-x").await;
    let mut ws_y = connect(&addr, "tok-y").await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/internal/notifications"))
        .bearer_auth("secret")
        .json(&json!({
            "type": "success",
            "actionType": "order_completed",
            "message": "Order #100 marked shipped",
            "userId": "u-9",
            "userName": "Packer",
            "entityId": "100"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    for ws in [&mut ws_x, &mut ws_y] {
        let event = read_json(ws).await;
        assert_eq!(event["type"], "global_notification");
        assert_eq!(event["notification"]["userId"], "u-9");
        assert_eq!(event["notification"]["message"], "Order #100 marked shipped");
    }

    let response = client
        .post(format!("http://{addr}/internal/order-updated"))
        .bearer_auth("secret")
        .json(&json!({"orderId": "42", "updateType": "items"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    for ws in [&mut ws_x, &mut ws_y] {
        let event = read_json(ws).await;
        assert_eq!(event["type"], "order_updated");
        assert_eq!(event["orderId"], "42");
        assert_eq!(event["updateType"], "items");
    }

    let response = client
        .post(format!("http://{addr}/internal/order-updated"))
        .bearer_auth("wrong")
        .json(&json!({"orderId": "42", "updateType": "items"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_broadcast_action_skips_the_actor() {
    let addr = boot_server().await;
    let mut ws_x = connect(&addr, "tok-x").await;
    let mut ws_y = connect(&addr, "tok-y").await;

    send_json(
        &mut ws_x,
        json!({
            "type": "broadcast_action",
            "actionType": "status_change",
            "message": "Order #100 marked shipped"
        }),
    )
    .await;

    let event = read_json(&mut ws_y).await;
    assert_eq!(event["type"], "global_notification");
    assert_eq!(event["notification"]["userId"], "u-x");
    assert_eq!(event["notification"]["userName"], "Xena");
    assert_silent(&mut ws_x).await;
}

#[tokio::test]
async fn test_malformed_frames_leave_the_connection_alive() {
    let addr = boot_server().await;
    let mut ws_x = connect(&addr, "tok-x").await;

    send_json(&mut ws_x, json!({"type": "no_such_event"})).await;
    ws_x.send(Message::text("not json at all")).await.unwrap();

    // the connection still works afterwards
    send_json(
        &mut ws_x,
        json!({"type": "join_room", "roomType": "shipment", "entityId": "7"}),
    )
    .await;
    let state = read_json(&mut ws_x).await;
    assert_eq!(state["type"], "room_state");
    assert_eq!(state["roomId"], "shipment:7");
}
