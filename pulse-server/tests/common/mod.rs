//! Shared test utilities for pulse-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pulse_core::InMemoryEventStore;
use pulse_server::{AppState, BroadcastConfig, PulseServer, ServerConfig};
use tokio::net::TcpListener;

/// Broadcast timing short enough for tests to observe several ticks.
#[allow(dead_code)]
pub fn fast_broadcast() -> BroadcastConfig {
    BroadcastConfig {
        interval: Duration::from_millis(50),
        window: Duration::from_secs(1),
        write_timeout: Duration::from_millis(200),
        query_timeout: Duration::from_millis(500),
    }
}

/// Creates a test server over an empty in-memory store
#[allow(dead_code)]
pub async fn create_test_server() -> (Arc<AppState>, Arc<InMemoryEventStore>, SocketAddr) {
    create_test_server_with_store(Arc::new(InMemoryEventStore::new())).await
}

/// Creates a test server over `store`, returns state, store and address
#[allow(dead_code)]
pub async fn create_test_server_with_store(
    store: Arc<InMemoryEventStore>,
) -> (Arc<AppState>, Arc<InMemoryEventStore>, SocketAddr) {
    let state = Arc::new(
        AppState::new(Arc::clone(&store) as Arc<dyn pulse_core::EventStore>)
            .with_broadcast_config(fast_broadcast()),
    );

    let server = PulseServer::with_state(ServerConfig::new("127.0.0.1", 0), Arc::clone(&state));
    let addr = spawn_server(server).await;

    (state, store, addr)
}

/// Spawns server in background task, returns bound address
async fn spawn_server(server: PulseServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    addr
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
