//! Shared application state for the pulse server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_core::EventStore;
use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastConfig;
use crate::registry::SessionRegistry;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Event store for aggregate queries
    pub store: Arc<dyn EventStore>,
    /// Live viewer sessions
    pub registry: Arc<SessionRegistry>,
    /// Broadcast timing, also used for one-shot `/stats` queries
    pub broadcast: BroadcastConfig,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState over `store`
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            registry: Arc::new(SessionRegistry::new()),
            broadcast: BroadcastConfig::default(),
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_broadcast_config(mut self, broadcast: BroadcastConfig) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
