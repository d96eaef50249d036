//! WebSocket module for live aggregate streaming

mod connection;
pub mod lifecycle;

pub use connection::{WsSink, ws_handler};
pub use lifecycle::{CloseReason, Session, SessionState};
