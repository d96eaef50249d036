//! Error types for pulse-core

use std::time::Duration;

use thiserror::Error;

/// Errors from an event store.
///
/// Every variant is transient from the ingestion path's point of view: the
/// message is negatively acknowledged and the bus redelivers it later.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("event store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid window width: {0:?}")]
    InvalidWindow(Duration),

    #[error("event store query failed: {0}")]
    Query(String),

    #[error("event store connection failed: {0}")]
    Connection(String),
}

/// Result type alias for event store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A payload that can never become a valid event, no matter how often it is
/// redelivered.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid event: {0}")]
    Invalid(&'static str),
}
