//! Server error types

use std::time::Duration;

use pulse_core::StoreError;
use thiserror::Error;

/// Errors that can occur in the pulse server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// A write to a viewer session failed. The session is treated as gone.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session closed")]
    Closed,

    #[error("session write failed: {0}")]
    Send(String),

    #[error("session write timed out after {0:?}")]
    Timeout(Duration),
}

/// Why a broadcast tick produced nothing.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("aggregate query failed: {0}")]
    Query(#[from] StoreError),

    #[error("failed to encode aggregate: {0}")]
    Encode(#[from] serde_json::Error),
}
