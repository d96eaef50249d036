//! In-memory EventStore implementation for testing.
//!
//! Keeps events in a vector and can simulate an outage, so the ingestion
//! and broadcast paths can be exercised without a database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bucket::{TimeBucket, bucketize};
use crate::error::{Result, StoreError};
use crate::event::AnalyticsEvent;
use crate::store::EventStore;

/// In-memory implementation of EventStore.
pub struct InMemoryEventStore {
    events: RwLock<Vec<AnalyticsEvent>>,
    available: AtomicBool,
    insert_delay: Option<Duration>,
}

impl InMemoryEventStore {
    /// Create an empty, reachable store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            insert_delay: None,
        }
    }

    /// Delay every insert, to exercise caller timeouts.
    #[must_use]
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    /// Simulate the store going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Copy of every stored event, in insertion order.
    pub async fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.read().await.clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("simulated outage".to_string()))
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<()> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn windowed_count(&self, width: Duration) -> Result<Vec<TimeBucket>> {
        self.check_available()?;
        let events = self.events.read().await;
        bucketize(events.iter().map(|e| e.created_at), width)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn close(&self) {}
}
