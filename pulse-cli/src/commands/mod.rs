pub mod config;
pub mod consume;
pub mod produce;
pub mod serve;

use anyhow::{Context, Result};
use pulse_store::PgEventStore;

use crate::config::PulseConfig;

/// Connect to the event store named by `config` and create its schema.
async fn connect_store(config: &PulseConfig) -> Result<PgEventStore> {
    let url = config.database_url()?;
    let store = PgEventStore::connect(url, config.database.max_connections)
        .await
        .context("failed to connect to event store")?;
    store
        .ensure_schema()
        .await
        .context("failed to prepare event store schema")?;
    Ok(store)
}
