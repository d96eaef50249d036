//! pulse-server - ingestion and live broadcast for pulse
//!
//! This crate holds the event pipeline: the [`IngestionWorker`] that turns bus
//! deliveries into stored events, and the read side that pushes windowed
//! counts to every connected viewer. Viewers connect over WebSocket at `/ws`
//! and are tracked in a [`SessionRegistry`]; a [`BroadcastScheduler`] fans the
//! current aggregate out to them once per interval.

pub mod broadcast;
pub mod consumers;
mod error;
pub mod http;
pub mod registry;
mod state;
pub mod ws;

use std::sync::Arc;

use pulse_core::EventStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use broadcast::{BroadcastConfig, BroadcastReport, BroadcastScheduler};
pub use consumers::{DEFAULT_INSERT_TIMEOUT, IngestOutcome, IngestionWorker, start_ingest_consumer};
pub use error::{ServerError, SessionError, TickError};
pub use http::create_router;
pub use registry::{SessionId, SessionRegistry, SessionSink};
pub use state::AppState;

/// The viewer-facing server: HTTP routes, WebSocket sessions and the
/// broadcast timer.
pub struct PulseServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl PulseServer {
    /// Create a new server over `store`
    pub fn new(config: ServerConfig, store: Arc<dyn EventStore>) -> Self {
        let state = AppState::new(store).with_broadcast_config(config.broadcast);
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("pulse server listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Run the server on an already-bound listener until the shutdown token
    /// is cancelled.
    ///
    /// Shutdown stops the broadcast timer (letting a running tick finish),
    /// stops accepting connections and closes every live session.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let shutdown = self.shutdown_token();

        let scheduler = Arc::new(BroadcastScheduler::new(
            Arc::clone(&self.state.store),
            Arc::clone(&self.state.registry),
            self.state.broadcast,
        ));
        let scheduler_handle = scheduler.spawn(shutdown.clone());

        let registry = Arc::clone(&self.state.registry);
        let router = create_router(self.state);
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .map_err(ServerError::Serve);

        // A serve error also has to stop the timer and the sessions.
        shutdown.cancel();
        if let Err(e) = scheduler_handle.await {
            tracing::error!(error = %e, "Broadcast scheduler task failed");
        }

        let closed = registry.close_all();
        tracing::info!(closed, "pulse server stopped");
        served
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Broadcast timer settings
    pub broadcast: BroadcastConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            broadcast: BroadcastConfig::default(),
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:8080")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
