//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::ServerState;
use crate::server::utils::storage_error;

/// Reports the user count as a liveness probe of the database itself; a
/// storage failure here is a 500, not a healthy-looking zero.
pub async fn health_handler(State(state): State<ServerState>) -> Response {
    let st = state.shared.lock().await;
    match st.storage.list_users() {
        Ok(users) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "status": "ok",
                "users": users.len(),
            })),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}
