//! Error types for the message bus.

/// Error type for bus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not reach the bus.
    #[error("failed to connect to message bus at {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Stream or consumer setup failed.
    #[error("failed to set up stream: {0}")]
    Stream(String),

    /// Subscription could not be started.
    #[error("failed to subscribe: {0}")]
    Subscribe(String),

    /// Publish was rejected or not confirmed.
    #[error("failed to publish: {0}")]
    Publish(String),

    /// An ack, nak or term could not be sent.
    #[error("failed to settle message: {0}")]
    Settle(String),

    /// The delivery already received its terminal outcome.
    #[error("message already settled")]
    AlreadySettled,

    /// The receive loop ended abnormally.
    #[error("subscription task failed: {0}")]
    Drain(String),
}

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, Error>;
