//! The event store seam.

use std::time::Duration;

use async_trait::async_trait;

use crate::bucket::TimeBucket;
use crate::error::Result;
use crate::event::AnalyticsEvent;

/// Durable storage for analytics events.
///
/// Implementations must tolerate concurrent calls: the ingestion path inserts
/// from many tasks at once while the broadcaster queries on its own cadence.
/// Each call is atomic on its own; nothing stronger than read-committed is
/// promised across calls.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event. Not idempotent: inserting the same event twice
    /// stores two rows.
    async fn insert(&self, event: &AnalyticsEvent) -> Result<()>;

    /// Count events per fixed-width window, ordered by window start.
    async fn windowed_count(&self, width: Duration) -> Result<Vec<TimeBucket>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Release the underlying connections.
    async fn close(&self);
}
