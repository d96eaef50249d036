//! Ingestion worker.
//!
//! Invoked once per bus delivery, concurrently and in no particular order.
//! Each delivery ends in exactly one settlement:
//!
//! - payload does not decode: `term` (redelivery can never help)
//! - insert succeeds within the timeout: `ack`
//! - insert fails or times out: `nak`, and the bus redelivers on its own backoff

use std::sync::Arc;
use std::time::Duration;

use pulse_bus::{Delivery, DeliveryHandler, MessageBus, Subscription};
use pulse_core::{AnalyticsEvent, EventStore, StoreError};
use tracing::{debug, error, warn};

/// Default upper bound on one insert.
pub const DEFAULT_INSERT_TIMEOUT: Duration = Duration::from_secs(5);

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Acked,
    Retried,
    Terminated,
}

pub struct IngestionWorker {
    store: Arc<dyn EventStore>,
    insert_timeout: Duration,
}

impl IngestionWorker {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            insert_timeout: DEFAULT_INSERT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_insert_timeout(mut self, insert_timeout: Duration) -> Self {
        self.insert_timeout = insert_timeout;
        self
    }

    /// Decode, persist and settle one delivery.
    ///
    /// The insert timeout runs on its own clock: shutdown does not cut an
    /// insert short, it only stops new deliveries arriving.
    pub async fn handle(&self, delivery: &dyn Delivery) -> IngestOutcome {
        let event = match AnalyticsEvent::from_json(delivery.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    error = %e,
                    redeliveries = delivery.redelivery_count(),
                    "Dropping undecodable event"
                );
                if let Err(e) = delivery.term().await {
                    error!(error = %e, "Failed to terminate message");
                }
                return IngestOutcome::Terminated;
            }
        };

        let inserted = tokio::time::timeout(self.insert_timeout, self.store.insert(&event))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.insert_timeout)));

        match inserted {
            Ok(()) => {
                debug!(
                    user_id = event.user_id,
                    event_type = %event.event_type,
                    "Event persisted"
                );
                if let Err(e) = delivery.ack().await {
                    error!(error = %e, user_id = event.user_id, "Failed to ack message");
                }
                IngestOutcome::Acked
            }
            Err(e) => {
                warn!(
                    error = %e,
                    user_id = event.user_id,
                    event_type = %event.event_type,
                    redeliveries = delivery.redelivery_count(),
                    "Insert failed, requesting redelivery"
                );
                if let Err(e) = delivery.nak().await {
                    error!(error = %e, user_id = event.user_id, "Failed to nak message");
                }
                IngestOutcome::Retried
            }
        }
    }

    /// Wrap the worker as a bus handler.
    pub fn handler(self: Arc<Self>) -> DeliveryHandler {
        Arc::new(move |delivery| {
            let worker = Arc::clone(&self);
            Box::pin(async move {
                worker.handle(delivery.as_ref()).await;
            })
        })
    }
}

/// Subscribe the ingestion worker to the bus.
///
/// Drain the returned subscription before closing the store so in-flight
/// inserts can finish.
pub async fn start_ingest_consumer(
    bus: &dyn MessageBus,
    worker: Arc<IngestionWorker>,
) -> pulse_bus::Result<Subscription> {
    bus.subscribe(worker.handler()).await
}
