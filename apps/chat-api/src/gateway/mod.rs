//! Realtime socket gateway.

pub mod events;
pub mod fanout;
pub mod handler;
pub mod notify;
pub mod presence;
pub mod reconcile;
pub mod relay;
pub mod rooms;
pub mod server;
pub mod session;
