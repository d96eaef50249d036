//! Core model for pulse.
//!
//! Analytics events flow in from the message bus, land in an [`EventStore`],
//! and come back out as [`TimeBucket`] aggregates for live viewers.
//!
//! # Key Types
//!
//! - [`AnalyticsEvent`] - One tracked user action, as carried on the bus
//! - [`TimeBucket`] - One row of a windowed count
//! - [`EventStore`] - Trait for persisting events and querying aggregates
//! - [`InMemoryEventStore`] - In-memory store for tests and local runs

pub mod bucket;
pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use bucket::{TimeBucket, bucketize, floor_to_window};
pub use error::{DecodeError, Result, StoreError};
pub use event::{ANALYTICS_SUBJECT, AnalyticsEvent, EventData, EventType};
pub use memory::InMemoryEventStore;
pub use store::EventStore;
