//! Axum router construction.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::server::handlers;
use crate::server::state::ServerState;

/// Build the complete router with all API routes.
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_handler))
        // Users API
        .route(
            "/users/request-otp",
            post(handlers::users::request_otp_handler),
        )
        .route(
            "/users/verify-otp",
            post(handlers::users::verify_otp_handler),
        )
        .route("/users/me", get(handlers::users::me_handler))
        .route("/users/logout", post(handlers::users::logout_handler))
        .route(
            "/users",
            get(handlers::users::list_users_handler).put(handlers::users::update_user_handler),
        )
        .route("/users/search", get(handlers::users::search_user_handler))
        .route(
            "/users/:id",
            get(handlers::users::get_user_handler).delete(handlers::users::delete_user_handler),
        )
        // Friends API
        .route(
            "/friends/request",
            post(handlers::friends::send_request_handler),
        )
        .route(
            "/friends/requests",
            get(handlers::friends::list_requests_handler),
        )
        .route(
            "/friends/accept",
            post(handlers::friends::accept_request_handler),
        )
        .route(
            "/friends/reject",
            post(handlers::friends::reject_request_handler),
        )
        .route("/friends/list", get(handlers::friends::list_friends_handler))
        // Chat API
        .route("/chat/new", post(handlers::messages::send_message_handler))
        .route("/chat", get(handlers::messages::list_messages_handler))
        .route(
            "/chat/threads",
            get(handlers::messages::list_threads_handler),
        )
        .route("/chat/seen", put(handlers::messages::mark_seen_handler))
        .route(
            "/chat/:message_id",
            delete(handlers::messages::delete_message_handler),
        )
        // WebSocket
        .route("/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
