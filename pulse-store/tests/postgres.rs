//! Postgres event store integration tests.
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p pulse-store --features integration

#![cfg(feature = "integration")]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pulse_core::{AnalyticsEvent, EventStore, EventType};
use pulse_store::PgEventStore;

async fn connect() -> PgEventStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgEventStore::connect(&url, 2).await.expect("connect");
    store.ensure_schema().await.expect("schema");
    sqlx::query("TRUNCATE analytics_events")
        .execute(store.pool())
        .await
        .expect("truncate");
    store
}

fn at(s: u32, ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, s).unwrap() + chrono::Duration::milliseconds(ms)
}

#[tokio::test]
async fn windowed_count_groups_inserted_events() {
    let store = connect().await;

    for ts in [at(0, 200), at(0, 800), at(1, 100)] {
        let event = AnalyticsEvent::new(EventType::PageView, 1)
            .with_created_at(ts)
            .with_data("page", "/dashboard");
        store.insert(&event).await.unwrap();
    }

    let buckets = store.windowed_count(Duration::from_secs(1)).await.unwrap();

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].bucket_start, at(0, 0));
    assert_eq!(buckets[0].count, 2);
    assert_eq!(buckets[1].bucket_start, at(1, 0));
    assert_eq!(buckets[1].count, 1);

    store.close().await;
}

#[tokio::test]
async fn event_data_is_stored_verbatim() {
    let store = connect().await;
    let event = AnalyticsEvent::new(EventType::UserLogin, 9)
        .with_created_at(at(5, 0))
        .with_data("nested", serde_json::json!({"k": [1, "two", null]}));

    store.insert(&event).await.unwrap();

    let (data,): (serde_json::Value,) =
        sqlx::query_as("SELECT event_data FROM analytics_events WHERE user_id = 9")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(data["nested"], serde_json::json!({"k": [1, "two", null]}));

    store.close().await;
}
