//! Shared application state and realtime event types.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::server::presence::Presence;
use crate::storage::{MessageType, Storage, UserProfile};

/// Events pushed to a specific user's WebSocket connection. At-most-once,
/// best-effort: nothing is queued for offline users.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    IncomingFriendRequest {
        request_id: i64,
        sender: UserProfile,
    },
    FriendRequestAccepted {
        request_id: i64,
        by: UserProfile,
    },
    NewMessage {
        message_id: i64,
        sender: UserProfile,
        body: String,
        message_type: MessageType,
        sent_at: u64,
    },
}

pub struct AppState {
    pub storage: Storage,
    pub jwt_secret: String,
}

pub type SharedState = Arc<Mutex<AppState>>;

/// The presence registry lives outside the state mutex so fan-out never
/// contends with storage access.
#[derive(Clone)]
pub struct ServerState {
    pub shared: SharedState,
    pub presence: Arc<Presence>,
}
