//! Fixed-width time buckets.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// One row of a windowed count.
///
/// Computed fresh for every broadcast and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Start of the window, inclusive.
    #[serde(rename = "time")]
    pub bucket_start: DateTime<Utc>,
    /// Number of events with `created_at` in `[bucket_start, bucket_start + width)`.
    pub count: i64,
}

/// Floor a timestamp to the start of its window.
///
/// Windows are aligned to the Unix epoch. Returns `None` for widths below
/// one millisecond.
pub fn floor_to_window(ts: DateTime<Utc>, width: Duration) -> Option<DateTime<Utc>> {
    let width_ms = i64::try_from(width.as_millis()).ok().filter(|w| *w > 0)?;
    let floored = ts.timestamp_millis().div_euclid(width_ms) * width_ms;
    DateTime::from_timestamp_millis(floored)
}

/// Group timestamps into buckets, ordered by bucket start.
///
/// An unusable `width` is an error even when there is nothing to group.
pub fn bucketize<I>(timestamps: I, width: Duration) -> Result<Vec<TimeBucket>>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    floor_to_window(DateTime::<Utc>::UNIX_EPOCH, width)
        .ok_or(StoreError::InvalidWindow(width))?;

    let mut counts: BTreeMap<DateTime<Utc>, i64> = BTreeMap::new();
    for ts in timestamps {
        let start = floor_to_window(ts, width).ok_or(StoreError::InvalidWindow(width))?;
        *counts.entry(start).or_default() += 1;
    }

    Ok(counts
        .into_iter()
        .map(|(bucket_start, count)| TimeBucket {
            bucket_start,
            count,
        })
        .collect())
}
