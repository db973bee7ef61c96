// SPDX-License-Identifier: MIT

//! Websocket endpoint.
//!
//! Authentication happens at upgrade time: the token comes from the
//! `token` query parameter, the session cookie, or a bearer header, and
//! an invalid credential refuses the connection before anything is
//! registered. The authenticated user identity is captured once and
//! threaded through every handler for the connection's lifetime.

use crate::error::AppError;
use crate::middleware::auth::{verify_token, SESSION_COOKIE};
use crate::realtime::events::{ClientMessage, ServerEvent};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Deserialize, Default)]
struct WsAuthQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    jar: CookieJar,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = query
        .token
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or(AppError::Unauthorized)?;

    let user_id = verify_token(&token, &state.config.jwt_signing_key)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, user_id)))
}

/// Per-connection loop, spawned after a successful handshake.
///
/// Outbound events arrive over the connection's unbounded channel (the
/// hub never awaits this socket), inbound frames are handled one at a
/// time in arrival order.
async fn handle_socket(state: Arc<AppState>, socket: WebSocket, user_id: u64) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn_id = state.hub.register(user_id, tx.clone());
    let _ = tx.send(ServerEvent::Connected { user_id });
    tracing::info!(user_id, conn = conn_id.0, "Websocket connected");

    loop {
        tokio::select! {
            // Outbound: forward queued events to the socket.
            Some(event) = rx.recv() => {
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize event");
                    }
                }
            }
            // Inbound: read the next frame.
            maybe_msg = stream.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        let msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                let _ = tx.send(ServerEvent::Error {
                                    message: format!("Invalid message: {}", e),
                                });
                                continue;
                            }
                        };

                        if let Err(err) = state
                            .dispatcher
                            .handle_client_message(conn_id, user_id, msg)
                            .await
                        {
                            // Reported to this caller only; persistence
                            // failures are collapsed to a generic message.
                            let _ = tx.send(ServerEvent::Error {
                                message: err.client_message(),
                            });
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(user_id, error = %e, "Websocket read error");
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }

    state.hub.unregister(conn_id);
    tracing::info!(user_id, conn = conn_id.0, "Websocket disconnected");
}
