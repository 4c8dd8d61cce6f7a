//! User account handlers: OTP login, profile, presence, search.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use serde::Deserialize;

use crate::server::auth::{issue_token, AuthUser};
use crate::server::config::OTP_TTL_SECS;
use crate::server::state::ServerState;
use crate::server::utils::{api_error, now_secs, storage_error};
use crate::storage::{RequestStatus, UserPatch, UserRow};

fn user_to_json(u: &UserRow) -> serde_json::Value {
    serde_json::json!({
        "user_id": u.user_id,
        "email": u.email,
        "name": u.name,
        "username": u.username,
        "profile_image": u.profile_image,
        "is_verified": u.is_verified,
        "is_online": u.is_online,
        "last_seen": u.last_seen,
        "created_at": u.created_at,
    })
}

// -- OTP login --

#[derive(Deserialize)]
pub struct RequestOtpPayload {
    email: Option<String>,
    name: Option<String>,
}

pub async fn request_otp_handler(
    State(state): State<ServerState>,
    axum::Json(req): axum::Json<RequestOtpPayload>,
) -> Response {
    let Some(email) = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "email is required");
    };

    let otp = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
    let now = now_secs();

    let st = state.shared.lock().await;
    let user_id = match st
        .storage
        .upsert_user_otp(email, req.name.as_deref(), &otp, now + OTP_TTL_SECS, now)
    {
        Ok(id) => id,
        Err(e) => return storage_error(e),
    };
    drop(st);

    // Mail transport is an external collaborator; the OTP lands in the log
    // so development setups work without a gateway.
    crate::tlog!("otp: issued for {} ({}): {}", email, crate::logging::uid(user_id), otp);

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "message": "OTP sent to email"})),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct VerifyOtpPayload {
    email: Option<String>,
    otp: Option<String>,
}

pub async fn verify_otp_handler(
    State(state): State<ServerState>,
    axum::Json(req): axum::Json<VerifyOtpPayload>,
) -> Response {
    let (Some(email), Some(otp)) = (req.email.as_deref(), req.otp.as_deref()) else {
        return api_error(StatusCode::BAD_REQUEST, "email and OTP are required");
    };

    let st = state.shared.lock().await;
    let user = match st.storage.take_verified_otp(email.trim(), otp.trim(), now_secs()) {
        Ok(Some(user)) => user,
        Ok(None) => return api_error(StatusCode::BAD_REQUEST, "invalid or expired OTP"),
        Err(e) => return storage_error(e),
    };

    let token = match issue_token(user.user_id, &user.email, &st.jwt_secret) {
        Ok(t) => t,
        Err(e) => {
            crate::tlog!("token signing failed: {e}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "server error");
        }
    };
    drop(st);

    crate::tlog!("otp: verified {}", crate::logging::uid(user.user_id));

    let json = serde_json::json!({
        "success": true,
        "message": "OTP verified successfully",
        "token": token,
        "user": user_to_json(&user),
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

// -- Session / profile --

pub async fn me_handler(State(state): State<ServerState>, auth: AuthUser) -> Response {
    let st = state.shared.lock().await;
    match st.storage.get_user(auth.user_id) {
        Ok(Some(user)) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "user": user_to_json(&user)})),
        )
            .into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}

pub async fn logout_handler(State(state): State<ServerState>, auth: AuthUser) -> Response {
    let st = state.shared.lock().await;
    if let Err(e) = st.storage.set_online(auth.user_id, false, now_secs()) {
        return storage_error(e);
    }
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "message": "logged out"})),
    )
        .into_response()
}

pub async fn list_users_handler(State(state): State<ServerState>, _auth: AuthUser) -> Response {
    let st = state.shared.lock().await;
    match st.storage.list_users() {
        Ok(users) => {
            let json: Vec<serde_json::Value> = users.iter().map(user_to_json).collect();
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({
                    "success": true,
                    "count": json.len(),
                    "users": json,
                })),
            )
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}

pub async fn get_user_handler(
    State(state): State<ServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    let st = state.shared.lock().await;
    match st.storage.get_user(id) {
        Ok(Some(user)) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "user": user_to_json(&user)})),
        )
            .into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}

// -- Search --

#[derive(Deserialize)]
pub struct SearchQuery {
    username: Option<String>,
}

pub async fn search_user_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Response {
    let Some(username) = query.username.as_deref().filter(|u| !u.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "username is required");
    };

    let st = state.shared.lock().await;
    let user = match st.storage.find_user_by_username(username) {
        Ok(Some(user)) => user,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    };

    // Relationship status relative to the caller, derived from the pair's
    // single request row.
    let relationship = match st.storage.find_request_between(auth.user_id, user.user_id) {
        Ok(Some(req)) if req.status == RequestStatus::Accepted => "friends",
        Ok(Some(req)) if req.sender_id == auth.user_id => "pending_sent",
        Ok(Some(_)) => "pending_received",
        Ok(None) => "none",
        Err(e) => return storage_error(e),
    };
    drop(st);

    let mut json = user_to_json(&user);
    json["relationship"] = serde_json::json!(relationship);
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({"success": true, "user": json})),
    )
        .into_response()
}

// -- Profile update --

/// Valid usernames are lowercase and limited to `a-z`, `0-9`, `_`, `@`, `.`.
fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '@' | '.'))
}

#[derive(Deserialize)]
pub struct UpdateUserPayload {
    name: Option<String>,
    username: Option<String>,
    profile_image: Option<String>,
}

pub async fn update_user_handler(
    State(state): State<ServerState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<UpdateUserPayload>,
) -> Response {
    let mut patch = UserPatch {
        name: req.name,
        profile_image: req.profile_image,
        ..Default::default()
    };

    let st = state.shared.lock().await;

    if let Some(username) = req.username {
        let username = username.trim().to_lowercase();
        if !valid_username(&username) {
            return api_error(
                StatusCode::BAD_REQUEST,
                "invalid username format: use lowercase letters, numbers, _, @, or .",
            );
        }
        match st.storage.username_taken(&username, auth.user_id) {
            Ok(true) => return api_error(StatusCode::CONFLICT, "username already taken"),
            Ok(false) => {}
            Err(e) => return storage_error(e),
        }
        patch.username = Some(username);
    }

    if patch.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "no fields to update");
    }

    match st.storage.update_user(auth.user_id, &patch) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    }

    match st.storage.get_user(auth.user_id) {
        Ok(Some(user)) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"success": true, "user": user_to_json(&user)})),
        )
            .into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}

pub async fn delete_user_handler(
    State(state): State<ServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    let st = state.shared.lock().await;
    match st.storage.delete_user(id) {
        Ok(true) => {
            crate::tlog!("user: deleted {}", crate::logging::uid(id));
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"success": true, "message": "user deleted"})),
            )
                .into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::valid_username;

    #[test]
    fn username_charset() {
        assert!(valid_username("alice_99"));
        assert!(valid_username("a.b@c"));
        assert!(!valid_username(""));
        assert!(!valid_username("Alice"));
        assert!(!valid_username("has space"));
        assert!(!valid_username("dash-ed"));
    }
}
