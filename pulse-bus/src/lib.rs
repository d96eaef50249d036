//! Acknowledgement-based message bus for pulse.
//!
//! Consumers receive each message as a [`Delivery`] and must settle it with
//! exactly one outcome: acknowledge (processed), negative-acknowledge
//! (redeliver later) or terminate (poison, never redeliver).
//!
//! # Key Types
//!
//! - [`MessageBus`] - Trait for subscribing a handler to the analytics subject
//! - [`Publisher`] - Trait for publishing payloads to the analytics subject
//! - [`Delivery`] - One delivered message plus its settlement primitives
//! - [`Subscription`] - Running subscription that can be drained on shutdown
//! - [`NatsBus`] - NATS JetStream implementation
//! - [`InMemoryBus`] - In-memory implementation with redelivery, for tests

pub mod config;
pub mod error;
pub mod memory;
pub mod nats;
pub mod subscription;
pub mod traits;

// Re-exports
pub use config::BusConfig;
pub use error::{Error, Result};
pub use memory::{BusStats, InMemoryBus};
pub use nats::NatsBus;
pub use subscription::Subscription;
pub use traits::{Delivery, DeliveryHandler, MessageBus, Publisher};
