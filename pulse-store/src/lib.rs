//! Postgres event store for pulse.
//!
//! Events land in a single `analytics_events` table. Aggregation uses
//! `date_bin`, so plain Postgres 14+ works as well as TimescaleDB.

mod postgres;

pub use postgres::{DEFAULT_MAX_CONNECTIONS, PgEventStore};
