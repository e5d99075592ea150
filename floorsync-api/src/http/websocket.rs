//! WebSocket transport
//!
//! One upgraded socket per operator tab. The session token is verified
//! before the upgrade completes; after that a connection is a writer task
//! that owns the sink (outbound events plus keepalive pings) and a reader
//! loop dispatching inbound frames into the coordinator. Whichever half
//! stops first tears the other down and runs the disconnect cascade once.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use floorsync_core::coordinator::{outbound_channel, EventReceiver};
use floorsync_core::models::{ClientEvent, ConnectionId, UserIdentity};
use floorsync_core::Coordinator;

use crate::http::{AppError, AppState};

/// Cap on a single inbound frame; coordination payloads are small
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Query parameters for the WebSocket handshake
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Opaque session token minted by the back office auth service
    pub token: Option<String>,
}

/// WebSocket handler for operator connections
///
/// Clients connect as `GET /api/ws?token={session_token}`; the token is
/// introspected before the upgrade, so a bad session costs an HTTP 401
/// and never reaches the coordinator.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .ok_or_else(|| AppError::unauthorized("Missing token query parameter"))?;

    let identity = state
        .verifier
        .verify(&token)
        .await
        .map_err(|e| AppError::unauthorized(format!("Session verification failed: {e}")))?;

    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: UserIdentity) {
    let connection_id = ConnectionId::new();
    let (sender, outbound) = outbound_channel();

    if let Err(e) =
        state
            .coordinator
            .register(connection_id.clone(), identity.clone(), sender)
    {
        // dropping the socket closes it
        warn!(
            connection_id = %connection_id,
            user = %identity.id,
            "Connection refused: {e}"
        );
        return;
    }

    info!(
        connection_id = %connection_id,
        user = %identity.id,
        "WebSocket connection established"
    );

    let (ws_sink, ws_stream) = socket.split();

    let ping_interval = Duration::from_secs(state.config.server.ping_interval_seconds);
    let writer = tokio::spawn(write_outbound(ws_sink, outbound, ping_interval));

    read_inbound(ws_stream, &state.coordinator, &connection_id).await;

    writer.abort();
    state.coordinator.disconnect(&connection_id);

    info!(
        connection_id = %connection_id,
        user = %identity.id,
        "WebSocket connection closed"
    );
}

/// Writer task: owns the sink, interleaving outbound events with pings
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: EventReceiver,
    ping_interval: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    break;
                };
                let frame = match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!(event_type = %event.event_type(), "Failed to encode outbound event: {e}");
                        continue;
                    }
                };
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Reader loop: every inbound frame stamps activity, text frames dispatch
async fn read_inbound(
    mut stream: SplitStream<WebSocket>,
    coordinator: &Coordinator,
    connection_id: &ConnectionId,
) {
    loop {
        match stream.next().await {
            Some(Ok(frame)) => {
                coordinator.touch(connection_id);

                match frame {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => coordinator.handle_event(connection_id, event),
                        Err(e) => {
                            debug!(
                                connection_id = %connection_id,
                                "Dropping malformed frame: {e}"
                            );
                        }
                    },
                    Message::Close(frame) => {
                        debug!(
                            connection_id = %connection_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                    // pongs count as activity; the protocol layer answers pings
                    Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            Some(Err(e)) => {
                debug!(connection_id = %connection_id, "WebSocket receive error: {e}");
                break;
            }
            None => break,
        }
    }
}
