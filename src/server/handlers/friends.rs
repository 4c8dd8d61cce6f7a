//! Friend request and friendship handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::server::auth::AuthUser;
use crate::server::state::{ServerState, WsEvent};
use crate::server::utils::{api_error, now_secs, storage_error};
use crate::storage::RequestStatus;

#[derive(Deserialize)]
pub struct SendRequestPayload {
    receiver_username: Option<String>,
}

pub async fn send_request_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<SendRequestPayload>,
) -> Response {
    let Some(username) = req.receiver_username.as_deref().filter(|u| !u.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "username is required");
    };

    let (request_id, receiver_id, sender_profile) = {
        let st = state.shared.lock().await;

        let receiver = match st.storage.find_user_by_username(username) {
            Ok(Some(user)) => user,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        };

        // Self-request and duplicate-pair checks live in the storage layer;
        // both directions are blocked whatever the previous row's status.
        let request_id = match st
            .storage
            .insert_friend_request(auth.user_id, receiver.user_id, now_secs())
        {
            Ok(id) => id,
            Err(e) => return storage_error(e),
        };

        let sender_profile = match st.storage.get_user(auth.user_id) {
            Ok(Some(user)) => user.profile(),
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        };

        (request_id, receiver.user_id, sender_profile)
    };
    // Lock released; fan-out never holds the storage lock.

    crate::tlog!(
        "friend-request: {} -> {} (id={})",
        crate::logging::uid(auth.user_id),
        crate::logging::uid(receiver_id),
        request_id
    );

    state.presence.notify(
        receiver_id,
        WsEvent::IncomingFriendRequest {
            request_id,
            sender: sender_profile,
        },
    );

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "success": true,
            "message": "friend request sent",
            "request_id": request_id,
        })),
    )
        .into_response()
}

pub async fn list_requests_handler(State(state): State<ServerState>, auth: AuthUser) -> Response {
    let st = state.shared.lock().await;
    match st.storage.list_incoming_requests(auth.user_id) {
        Ok(requests) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "requests": requests})),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct RequestActionPayload {
    request_id: Option<i64>,
}

pub async fn accept_request_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<RequestActionPayload>,
) -> Response {
    let Some(request_id) = req.request_id else {
        return api_error(StatusCode::BAD_REQUEST, "request_id is required");
    };

    let (sender_id, receiver_profile) = {
        let st = state.shared.lock().await;

        let request = match st.storage.get_friend_request(request_id) {
            Ok(Some(r)) => r,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "request not found"),
            Err(e) => return storage_error(e),
        };

        // Only the receiver may accept; senders probing their own request get
        // the same not-found as strangers.
        if request.receiver_id != auth.user_id {
            return api_error(StatusCode::NOT_FOUND, "request not found");
        }
        if request.status != RequestStatus::Pending {
            return api_error(
                StatusCode::CONFLICT,
                format!("request is already {}", request.status.as_str()),
            );
        }

        // Status update, friendship insert, and lazy conversation creation
        // commit or roll back together.
        if let Err(e) = st.storage.accept_friend_request(&request, now_secs()) {
            return storage_error(e);
        }

        let receiver_profile = match st.storage.get_user(auth.user_id) {
            Ok(Some(user)) => user.profile(),
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        };

        (request.sender_id, receiver_profile)
    };

    crate::tlog!(
        "friend-accept: {} accepted request {} from {}",
        crate::logging::uid(auth.user_id),
        request_id,
        crate::logging::uid(sender_id)
    );

    state.presence.notify(
        sender_id,
        WsEvent::FriendRequestAccepted {
            request_id,
            by: receiver_profile,
        },
    );

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "message": "friend request accepted"})),
    )
        .into_response()
}

pub async fn reject_request_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<RequestActionPayload>,
) -> Response {
    let Some(request_id) = req.request_id else {
        return api_error(StatusCode::BAD_REQUEST, "request_id is required");
    };

    let st = state.shared.lock().await;

    let request = match st.storage.get_friend_request(request_id) {
        Ok(Some(r)) => r,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "request not found"),
        Err(e) => return storage_error(e),
    };
    if request.receiver_id != auth.user_id {
        return api_error(StatusCode::NOT_FOUND, "request not found");
    }
    if request.status != RequestStatus::Pending {
        return api_error(
            StatusCode::CONFLICT,
            format!("request is already {}", request.status.as_str()),
        );
    }

    match st.storage.reject_friend_request(request_id) {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "message": "friend request rejected"})),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "request not found"),
        Err(e) => storage_error(e),
    }
}

pub async fn list_friends_handler(State(state): State<ServerState>, auth: AuthUser) -> Response {
    let st = state.shared.lock().await;
    match st.storage.list_friends(auth.user_id) {
        Ok(friends) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "friends": friends})),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}
