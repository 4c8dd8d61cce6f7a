//! HTTP and WebSocket handlers, grouped by resource.

pub mod friends;
pub mod health;
pub mod messages;
pub mod users;
pub mod websocket;
