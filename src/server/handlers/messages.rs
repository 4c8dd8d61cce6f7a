//! Direct message handlers: send, thread list, history, seen, delete.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::auth::AuthUser;
use crate::server::state::{ServerState, WsEvent};
use crate::server::utils::{api_error, message_to_json, now_secs, storage_error};
use crate::storage::{MessageType, Storage, UserProfile};

#[derive(Deserialize)]
pub struct SendMessagePayload {
    receiver_id: Option<i64>,
    message: Option<String>,
    #[serde(default)]
    message_type: MessageType,
}

pub async fn send_message_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<SendMessagePayload>,
) -> Response {
    let Some(receiver_id) = req.receiver_id else {
        return api_error(StatusCode::BAD_REQUEST, "receiver ID and message are required");
    };
    let Some(body) = req.message.as_deref().filter(|m| !m.trim().is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "receiver ID and message are required");
    };

    let now = now_secs();
    let (message_id, sender_profile) = {
        let st = state.shared.lock().await;

        // Friendship is not required to message, but the receiver must exist.
        match st.storage.get_user(receiver_id) {
            Ok(Some(_)) => {}
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "receiver not found"),
            Err(e) => return storage_error(e),
        }

        let message_id = match st
            .storage
            .insert_message(auth.user_id, receiver_id, body, req.message_type, now)
        {
            Ok(id) => id,
            Err(e) => return storage_error(e),
        };

        let sender_profile = match st.storage.get_user(auth.user_id) {
            Ok(Some(user)) => user.profile(),
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        };

        (message_id, sender_profile)
    };
    // Lock released; push is best-effort and never delays the response.

    crate::tlog!(
        "message: {} -> {} (id={})",
        crate::logging::uid(auth.user_id),
        crate::logging::uid(receiver_id),
        message_id
    );

    state.presence.notify(
        receiver_id,
        WsEvent::NewMessage {
            message_id,
            sender: sender_profile,
            body: body.to_string(),
            message_type: req.message_type,
            sent_at: now,
        },
    );

    (
        StatusCode::CREATED,
        axum::Json(serde_json::json!({
            "success": true,
            "message": "message sent",
            "message_id": message_id,
        })),
    )
        .into_response()
}

/// Look up each distinct user id once per request; profile fields are live,
/// so this is re-read on every call rather than cached.
fn profile_map(
    storage: &Storage,
    ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, UserProfile>, crate::storage::StorageError> {
    let mut map = HashMap::new();
    for id in ids {
        if let std::collections::hash_map::Entry::Vacant(entry) = map.entry(id) {
            if let Some(user) = storage.get_user(id)? {
                entry.insert(user.profile());
            }
        }
    }
    Ok(map)
}

pub async fn list_threads_handler(State(state): State<ServerState>, auth: AuthUser) -> Response {
    let st = state.shared.lock().await;
    let threads = match st.storage.list_threads(auth.user_id) {
        Ok(t) => t,
        Err(e) => return storage_error(e),
    };

    let profiles = match profile_map(
        &st.storage,
        threads
            .iter()
            .flat_map(|t| [t.latest.sender_id, t.latest.receiver_id]),
    ) {
        Ok(p) => p,
        Err(e) => return storage_error(e),
    };

    let json: Vec<serde_json::Value> = threads
        .iter()
        .map(|t| {
            let mut entry = message_to_json(
                &t.latest,
                profiles.get(&t.latest.sender_id),
                profiles.get(&t.latest.receiver_id),
            );
            entry["unread_count"] = serde_json::json!(t.unread_count);
            entry
        })
        .collect();

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "messages": json})),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    receiver_id: Option<i64>,
}

pub async fn list_messages_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(receiver_id) = query.receiver_id else {
        return api_error(StatusCode::BAD_REQUEST, "receiver ID is required");
    };

    let st = state.shared.lock().await;
    let messages = match st.storage.list_pair_messages(auth.user_id, receiver_id) {
        Ok(m) => m,
        Err(e) => return storage_error(e),
    };

    let profiles = match profile_map(
        &st.storage,
        messages.iter().flat_map(|m| [m.sender_id, m.receiver_id]),
    ) {
        Ok(p) => p,
        Err(e) => return storage_error(e),
    };

    let json: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            message_to_json(
                m,
                profiles.get(&m.sender_id),
                profiles.get(&m.receiver_id),
            )
        })
        .collect();

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "messages": json})),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct MarkSeenPayload {
    message_id: Option<i64>,
    receiver_id: Option<i64>,
}

pub async fn mark_seen_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<MarkSeenPayload>,
) -> Response {
    let Some(receiver_id) = req.receiver_id else {
        return api_error(StatusCode::BAD_REQUEST, "receiver ID is required");
    };
    let Some(message_id) = req.message_id else {
        return api_error(StatusCode::BAD_REQUEST, "message ID is required");
    };

    // The caller supplies the exact (sender, receiver) direction; a mismatch
    // updates zero rows and still reports success. Documented contract.
    let st = state.shared.lock().await;
    if let Err(e) = st.storage.mark_seen(message_id, auth.user_id, receiver_id) {
        return storage_error(e);
    }

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "message": "message marked as seen"})),
    )
        .into_response()
}

pub async fn delete_message_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
) -> Response {
    let st = state.shared.lock().await;
    match st.storage.delete_message(message_id, auth.user_id) {
        // One outcome for "absent" and "not yours": existence is not leaked.
        Ok(false) => api_error(
            StatusCode::NOT_FOUND,
            "message not found or you don't have permission to delete it",
        ),
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "message": "message deleted"})),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}
