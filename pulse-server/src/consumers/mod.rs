//! Bus consumers.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   JetStream stream ANALYTICS             │
//! │   subject events.analytics               │
//! └────────────────────┬─────────────────────┘
//!                      │ durable pull consumer, explicit ack
//!                      ▼
//!            ┌───────────────────┐        ┌─────────────┐
//!            │ IngestionWorker   │──────▶ │ EventStore  │
//!            │ (task per message)│ insert └─────────────┘
//!            └───────────────────┘
//!               ack / nak / term
//! ```

pub mod ingest;

pub use ingest::{DEFAULT_INSERT_TIMEOUT, IngestOutcome, IngestionWorker, start_ingest_consumer};
