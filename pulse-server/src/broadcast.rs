//! Periodic aggregate broadcast.
//!
//! Every interval the scheduler queries the windowed count once, serializes
//! it once, snapshots the registry and writes the same payload to every
//! session concurrently. A session whose write fails or times out is removed
//! on the spot; the rest of the fan-out carries on.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pulse_core::{EventStore, StoreError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SessionError, TickError};
use crate::registry::SessionRegistry;

/// Timing for the broadcast loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Bucket width passed to the windowed count.
    pub window: Duration,
    /// Upper bound on one session write.
    pub write_timeout: Duration,
    /// Upper bound on the aggregate query.
    pub query_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            window: Duration::from_secs(1),
            write_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct BroadcastScheduler {
    store: Arc<dyn EventStore>,
    registry: Arc<SessionRegistry>,
    config: BroadcastConfig,
}

impl BroadcastScheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: Arc<SessionRegistry>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run one cycle: query, serialize, fan out.
    pub async fn tick(&self) -> Result<BroadcastReport, TickError> {
        let buckets = tokio::time::timeout(
            self.config.query_timeout,
            self.store.windowed_count(self.config.window),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.config.query_timeout))??;

        let payload: Arc<str> = serde_json::to_string(&buckets)?.into();
        Ok(self.fan_out(payload).await)
    }

    /// Write `payload` to every session in a fresh snapshot.
    pub async fn fan_out(&self, payload: Arc<str>) -> BroadcastReport {
        let sessions = self.registry.snapshot();
        if sessions.is_empty() {
            return BroadcastReport::default();
        }

        let write_timeout = self.config.write_timeout;
        let writes = sessions.into_iter().map(|(id, sink)| {
            let payload = Arc::clone(&payload);
            let registry = Arc::clone(&self.registry);
            async move {
                let result = match tokio::time::timeout(write_timeout, sink.send(payload)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::Timeout(write_timeout)),
                };
                if let Err(e) = &result {
                    warn!(session_id = %id, error = %e, "Broadcast write failed, dropping session");
                    registry.remove(id);
                }
                result.is_ok()
            }
        });

        let results = join_all(writes).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        BroadcastReport {
            delivered,
            failed: results.len() - delivered,
        }
    }

    /// Start the timer. Cancelling `shutdown` stops further ticks; a tick
    /// already running is left to finish.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?self.config.interval, "Broadcast scheduler started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match self.tick().await {
                    Ok(report) => debug!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "Broadcast tick"
                    ),
                    Err(e) => warn!(error = %e, "Skipping broadcast tick"),
                }
            }

            info!("Broadcast scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::RecordingSink;
    use chrono::{TimeZone, Utc};
    use pulse_core::{AnalyticsEvent, EventType, InMemoryEventStore, TimeBucket};

    fn fast_config() -> BroadcastConfig {
        BroadcastConfig {
            interval: Duration::from_millis(20),
            window: Duration::from_secs(1),
            write_timeout: Duration::from_millis(50),
            query_timeout: Duration::from_millis(200),
        }
    }

    async fn store_with_events() -> Arc<InMemoryEventStore> {
        let store = Arc::new(InMemoryEventStore::new());
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        for ms in [200, 800, 1100] {
            let event = AnalyticsEvent::new(EventType::PageView, 1)
                .with_created_at(base + chrono::Duration::milliseconds(ms));
            store.insert(&event).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn tick_delivers_same_payload_to_every_session() {
        let store = store_with_events().await;
        let registry = Arc::new(SessionRegistry::new());
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        registry.add(a.clone());
        registry.add(b.clone());

        let scheduler = BroadcastScheduler::new(store, registry, fast_config());
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert_eq!(a.sent(), b.sent());

        let buckets: Vec<TimeBucket> = serde_json::from_str(&a.sent()[0]).unwrap();
        let counts: Vec<i64> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1]);
    }

    #[tokio::test]
    async fn failed_writes_remove_exactly_those_sessions() {
        let store = store_with_events().await;
        let registry = Arc::new(SessionRegistry::new());
        let (good_a, _) = registry.add(Arc::new(RecordingSink::default()));
        let (bad_a, _) = registry.add(Arc::new(RecordingSink::failing()));
        let (good_b, _) = registry.add(Arc::new(RecordingSink::default()));
        let (bad_b, _) = registry.add(Arc::new(RecordingSink::failing()));

        let scheduler = BroadcastScheduler::new(store, Arc::clone(&registry), fast_config());
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 2 });
        assert!(registry.contains(good_a));
        assert!(registry.contains(good_b));
        assert!(!registry.contains(bad_a));
        assert!(!registry.contains(bad_b));
    }

    #[tokio::test]
    async fn slow_session_times_out_without_stalling_others() {
        let store = store_with_events().await;
        let registry = Arc::new(SessionRegistry::new());
        let fast = Arc::new(RecordingSink::default());
        registry.add(fast.clone());
        let (slow, _) = registry.add(Arc::new(RecordingSink::stalling(Duration::from_secs(5))));

        let scheduler = BroadcastScheduler::new(store, Arc::clone(&registry), fast_config());
        let started = std::time::Instant::now();
        let report = scheduler.tick().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert_eq!(fast.sent().len(), 1);
        assert!(!registry.contains(slow));
    }

    #[tokio::test]
    async fn query_failure_skips_tick() {
        let store = store_with_events().await;
        store.set_available(false);
        let registry = Arc::new(SessionRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        let (id, _) = registry.add(sink.clone());

        let scheduler = BroadcastScheduler::new(store, Arc::clone(&registry), fast_config());
        let result = scheduler.tick().await;

        assert!(matches!(result, Err(TickError::Query(_))));
        assert!(sink.sent().is_empty());
        assert!(registry.contains(id));
    }

    #[tokio::test]
    async fn loop_keeps_running_after_failed_tick_and_stops_on_shutdown() {
        let store = store_with_events().await;
        store.set_available(false);
        let registry = Arc::new(SessionRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        registry.add(sink.clone());

        let scheduler = Arc::new(BroadcastScheduler::new(
            Arc::clone(&store) as Arc<dyn EventStore>,
            registry,
            fast_config(),
        ));
        let shutdown = CancellationToken::new();
        let handle = Arc::clone(&scheduler).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.sent().is_empty());

        store.set_available(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sink.sent().is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();

        let after_stop = sink.sent().len();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.sent().len(), after_stop);
    }

    #[tokio::test]
    async fn empty_registry_is_a_no_op() {
        let store = store_with_events().await;
        let scheduler =
            BroadcastScheduler::new(store, Arc::new(SessionRegistry::new()), fast_config());

        assert_eq!(scheduler.tick().await.unwrap(), BroadcastReport::default());
    }
}
