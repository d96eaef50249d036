use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{AnalyticsEvent, EventStore, Result, StoreError, TimeBucket};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS analytics_events (
        id          BIGSERIAL,
        event_type  TEXT        NOT NULL,
        user_id     BIGINT      NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        event_data  JSONB       NOT NULL DEFAULT '{}'::jsonb
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS analytics_events_created_at_idx
        ON analytics_events (created_at)
"#;

const INSERT_EVENT: &str = r#"
    INSERT INTO analytics_events (event_type, user_id, created_at, event_data)
    VALUES ($1, $2, $3, $4)
"#;

const WINDOWED_COUNT: &str = r#"
    SELECT date_bin($1::bigint * INTERVAL '1 millisecond', created_at, TIMESTAMPTZ '1970-01-01 00:00:00+00') AS bucket_start,
           COUNT(*) AS count
    FROM analytics_events
    GROUP BY bucket_start
    ORDER BY bucket_start
"#;

#[derive(Debug, FromRow)]
struct BucketRow {
    bucket_start: DateTime<Utc>,
    count: i64,
}

impl From<BucketRow> for TimeBucket {
    fn from(row: BucketRow) -> Self {
        TimeBucket {
            bucket_start: row.bucket_start,
            count: row.count,
        }
    }
}

/// EventStore backed by a Postgres connection pool.
///
/// The pool is safe to share between the ingestion path and the
/// broadcaster; no extra locking is needed on top of it.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and verify it answers.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.ping().await?;

        info!(max_connections, "Connected to event store");
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the events table and its index if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query(CREATE_INDEX)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!("Event store schema ready");
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(INSERT_EVENT)
            .bind(event.event_type.as_str())
            .bind(event.user_id)
            .bind(event.created_at)
            .bind(Json(event.event_data.clone()))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn windowed_count(&self, width: Duration) -> Result<Vec<TimeBucket>> {
        let width_ms = window_millis(width)?;

        let rows = sqlx::query_as::<_, BucketRow>(WINDOWED_COUNT)
            .bind(width_ms)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TimeBucket::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Event store connections closed");
    }
}

/// Window width in whole milliseconds; zero is rejected.
fn window_millis(width: Duration) -> Result<i64> {
    i64::try_from(width.as_millis())
        .ok()
        .filter(|ms| *ms > 0)
        .ok_or(StoreError::InvalidWindow(width))
}

/// Pool and I/O failures mean the store is unreachable; anything else is a
/// failed statement.
fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_millis_accepts_whole_milliseconds() {
        assert_eq!(window_millis(Duration::from_secs(1)).unwrap(), 1000);
        assert_eq!(window_millis(Duration::from_millis(250)).unwrap(), 250);
    }

    #[test]
    fn window_millis_rejects_zero() {
        assert!(matches!(
            window_millis(Duration::ZERO),
            Err(StoreError::InvalidWindow(_))
        ));
        assert!(matches!(
            window_millis(Duration::from_micros(500)),
            Err(StoreError::InvalidWindow(_))
        ));
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }

    #[test]
    fn bucket_row_converts_to_time_bucket() {
        let start = DateTime::from_timestamp(1_714_557_600, 0).unwrap();
        let bucket = TimeBucket::from(BucketRow {
            bucket_start: start,
            count: 4,
        });
        assert_eq!(bucket.bucket_start, start);
        assert_eq!(bucket.count, 4);
    }
}
