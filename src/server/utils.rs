//! Shared utility functions for the server.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::{MessageRow, UserProfile};

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "success": false, "message": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a storage failure to a response. Validation and lookup errors carry
/// their message; anything from SQLite surfaces as a generic 500 and the
/// detail goes to the log only.
pub fn storage_error(e: crate::storage::StorageError) -> Response {
    use crate::storage::StorageError;
    match e {
        StorageError::InvalidArgument(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        StorageError::NotFound(msg) => api_error(StatusCode::NOT_FOUND, msg),
        StorageError::Conflict(msg) => api_error(StatusCode::CONFLICT, msg),
        StorageError::Sqlite(e) => {
            crate::tlog!("storage error: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "server error")
        }
    }
}

/// JSON shape of a message enriched with both participants' profiles.
pub fn message_to_json(
    m: &MessageRow,
    sender: Option<&UserProfile>,
    receiver: Option<&UserProfile>,
) -> serde_json::Value {
    serde_json::json!({
        "message_id": m.message_id,
        "message": m.body,
        "message_type": m.message_type,
        "is_read": m.is_read,
        "sent_at": m.sent_at,
        "sender": sender,
        "receiver": receiver,
    })
}
