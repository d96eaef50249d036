//! Core traits for message bus operations.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::subscription::Subscription;

/// One message handed to a consumer.
///
/// The consumer settles it with exactly one of [`ack`](Delivery::ack),
/// [`nak`](Delivery::nak) or [`term`](Delivery::term).
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// How many times this message was delivered before this attempt.
    fn redelivery_count(&self) -> u64;

    /// Processed; never deliver again.
    async fn ack(&self) -> crate::Result<()>;

    /// Not processed; deliver again after the bus's backoff.
    async fn nak(&self) -> crate::Result<()>;

    /// Can never be processed; drop without redelivery.
    async fn term(&self) -> crate::Result<()>;
}

/// Type alias for async delivery handlers.
pub type DeliveryHandler =
    Arc<dyn Fn(Box<dyn Delivery>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Trait for consuming the analytics subject.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Start delivering messages to `handler`.
    ///
    /// Each delivery runs in its own task, so handlers run concurrently and
    /// in no particular order.
    async fn subscribe(&self, handler: DeliveryHandler) -> crate::Result<Subscription>;
}

/// Trait for publishing to the analytics subject.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one payload.
    async fn publish(&self, payload: Vec<u8>) -> crate::Result<()>;
}
