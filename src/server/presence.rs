//! Notification fan-out: a process-wide registry of connected users.
//!
//! Maps user ids to the sending half of their WebSocket forwarding channel.
//! Registration and removal are tied to the connection lifecycle in the
//! websocket handler. Delivery is at-most-once and best-effort: events for
//! offline users are dropped, and a delivery failure is logged and evicts
//! the stale handle, never propagating to the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::server::state::WsEvent;
use crate::tlog;

#[derive(Default)]
pub struct Presence {
    inner: Mutex<HashMap<i64, UnboundedSender<WsEvent>>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's connection, replacing any previous one.
    pub fn register(&self, user_id: i64, tx: UnboundedSender<WsEvent>) {
        let mut map = self.inner.lock().unwrap();
        if map.insert(user_id, tx).is_some() {
            tlog!("presence: replaced connection for {}", crate::logging::uid(user_id));
        }
    }

    /// Remove a user's connection. Only removes the handle passed at
    /// registration time if it is still the current one; a reconnect that
    /// already replaced it is left alone.
    pub fn unregister(&self, user_id: i64, tx: &UnboundedSender<WsEvent>) {
        let mut map = self.inner.lock().unwrap();
        if map.get(&user_id).is_some_and(|cur| cur.same_channel(tx)) {
            map.remove(&user_id);
        }
    }

    pub fn is_connected(&self, user_id: i64) -> bool {
        self.inner.lock().unwrap().contains_key(&user_id)
    }

    /// Deliver an event to the target user if connected; otherwise a no-op.
    /// Never blocks: the underlying channel is unbounded, and a closed
    /// channel just evicts the entry.
    pub fn notify(&self, user_id: i64, event: WsEvent) {
        let mut map = self.inner.lock().unwrap();
        let Some(tx) = map.get(&user_id) else {
            return;
        };
        if tx.send(event).is_err() {
            tlog!(
                "presence: dropping dead connection for {}",
                crate::logging::uid(user_id)
            );
            map.remove(&user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MessageType, UserProfile};
    use tokio::sync::mpsc;

    fn profile(user_id: i64) -> UserProfile {
        UserProfile {
            user_id,
            name: None,
            username: None,
            profile_image: None,
            is_online: true,
            last_seen: None,
        }
    }

    fn event() -> WsEvent {
        WsEvent::NewMessage {
            message_id: 1,
            sender: profile(2),
            body: "hi".to_string(),
            message_type: MessageType::Text,
            sent_at: 0,
        }
    }

    #[test]
    fn notify_delivers_to_registered_user() {
        let presence = Presence::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.register(7, tx);
        assert!(presence.is_connected(7));

        presence.notify(7, event());
        assert!(matches!(
            rx.try_recv().unwrap(),
            WsEvent::NewMessage { message_id: 1, .. }
        ));
    }

    #[test]
    fn notify_offline_user_is_noop() {
        let presence = Presence::new();
        presence.notify(7, event());
        assert!(!presence.is_connected(7));
    }

    #[test]
    fn notify_evicts_closed_channel() {
        let presence = Presence::new();
        let (tx, rx) = mpsc::unbounded_channel();
        presence.register(7, tx);
        drop(rx);

        presence.notify(7, event());
        assert!(!presence.is_connected(7));
    }

    #[test]
    fn unregister_ignores_superseded_handle() {
        let presence = Presence::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        presence.register(7, tx1.clone());
        presence.register(7, tx2);

        // The first connection's cleanup must not drop the reconnect
        presence.unregister(7, &tx1);
        assert!(presence.is_connected(7));
        presence.notify(7, event());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn serialized_event_is_tagged() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["message_type"], "text");
    }
}
