//! WebSocket upgrade and per-user connection handling.
//!
//! A connection is the unit of presence: registering puts the user online in
//! the fan-out registry and the users table, disconnecting takes them
//! offline and stamps last_seen.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::server::auth::verify_token;
use crate::server::state::ServerState;
use crate::server::utils::{api_error, now_secs};

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // Browsers cannot set headers on WebSocket requests, so the token rides
    // in the query string.
    let Some(token) = query.token else {
        return api_error(StatusCode::UNAUTHORIZED, "missing bearer token");
    };
    let secret = {
        let st = state.shared.lock().await;
        st.jwt_secret.clone()
    };
    let Some(user_id) = verify_token(&token, &secret) else {
        return api_error(StatusCode::UNAUTHORIZED, "invalid or expired token");
    };

    ws.on_upgrade(move |socket| ws_connection(socket, state, user_id))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: ServerState, user_id: i64) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.presence.register(user_id, tx.clone());
    {
        let st = state.shared.lock().await;
        let _ = st.storage.set_online(user_id, true, now_secs());
    }
    crate::tlog!("ws: {} connected", crate::logging::uid(user_id));

    loop {
        tokio::select! {
            // Forward fan-out events to this user's socket
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    None => break, // replaced by a newer connection
                }
            }
            // Handle incoming frames from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(_)) => break,
                    _ => {} // clients only listen on this channel
                }
            }
        }
    }

    state.presence.unregister(user_id, &tx);
    // A replacement connection may already be registered; only go offline if
    // this was the last one.
    if !state.presence.is_connected(user_id) {
        let st = state.shared.lock().await;
        let _ = st.storage.set_online(user_id, false, now_secs());
    }
    crate::tlog!("ws: {} disconnected", crate::logging::uid(user_id));
}
