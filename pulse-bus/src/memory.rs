//! In-memory message bus for testing.
//!
//! Messages sit in an unbounded queue. A nak puts the message back on the
//! queue after `redelivery_delay`, a term moves it to the dead-letter list.
//! Counters record every settlement so tests can assert on outcomes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{Error, Result};
use crate::subscription::Subscription;
use crate::traits::{Delivery, DeliveryHandler, MessageBus, Publisher};

/// Default delay before a nak'd message is redelivered.
const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_millis(10);

/// Settlement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub acked: u64,
    pub naked: u64,
    pub terminated: u64,
}

struct Envelope {
    payload: Vec<u8>,
    deliveries: u64,
}

struct Inner {
    queue: mpsc::UnboundedSender<Envelope>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    dead_letters: Mutex<Vec<Vec<u8>>>,
    redelivery_delay: Duration,
    max_deliver: Option<u64>,
    published: AtomicU64,
    acked: AtomicU64,
    naked: AtomicU64,
    terminated: AtomicU64,
}

/// In-memory implementation of MessageBus and Publisher.
///
/// Supports a single subscriber, like a durable consumer bound to one
/// worker group.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
    max_in_flight: usize,
}

impl InMemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_redelivery(DEFAULT_REDELIVERY_DELAY, None)
    }

    /// Create a bus with a custom redelivery delay and delivery cap.
    ///
    /// Once a message has been delivered `max_deliver` times a further nak
    /// drops it to the dead-letter list instead of redelivering.
    #[must_use]
    pub fn with_redelivery(redelivery_delay: Duration, max_deliver: Option<u64>) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                queue,
                receiver: Mutex::new(Some(receiver)),
                dead_letters: Mutex::new(Vec::new()),
                redelivery_delay,
                max_deliver,
                published: AtomicU64::new(0),
                acked: AtomicU64::new(0),
                naked: AtomicU64::new(0),
                terminated: AtomicU64::new(0),
            }),
            max_in_flight: 16,
        }
    }

    /// Bound the number of concurrent handlers.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Current settlement counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::SeqCst),
            acked: self.inner.acked.load(Ordering::SeqCst),
            naked: self.inner.naked.load(Ordering::SeqCst),
            terminated: self.inner.terminated.load(Ordering::SeqCst),
        }
    }

    /// Payloads that were terminated or ran out of deliveries.
    pub fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.inner
            .dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        self.inner
            .queue
            .send(Envelope {
                payload,
                deliveries: 0,
            })
            .map_err(|_| Error::Publish("bus closed".to_string()))?;
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn subscribe(&self, handler: DeliveryHandler) -> Result<Subscription> {
        let receiver = self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Subscribe("bus already has a subscriber".to_string()))?;

        let inner = Arc::clone(&self.inner);
        let deliveries = UnboundedReceiverStream::new(receiver).map(move |mut envelope| {
            envelope.deliveries += 1;
            Box::new(InMemoryDelivery {
                envelope,
                inner: Arc::clone(&inner),
                settled: AtomicBool::new(false),
            }) as Box<dyn Delivery>
        });

        Ok(Subscription::spawn(deliveries, handler, self.max_in_flight))
    }
}

struct InMemoryDelivery {
    envelope: Envelope,
    inner: Arc<Inner>,
    settled: AtomicBool,
}

impl InMemoryDelivery {
    fn settle(&self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadySettled);
        }
        Ok(())
    }
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.envelope.payload
    }

    fn redelivery_count(&self) -> u64 {
        self.envelope.deliveries.saturating_sub(1)
    }

    async fn ack(&self) -> Result<()> {
        self.settle()?;
        self.inner.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nak(&self) -> Result<()> {
        self.settle()?;
        self.inner.naked.fetch_add(1, Ordering::SeqCst);

        if self
            .inner
            .max_deliver
            .is_some_and(|max| self.envelope.deliveries >= max)
        {
            self.inner
                .dead_letters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(self.envelope.payload.clone());
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let envelope = Envelope {
            payload: self.envelope.payload.clone(),
            deliveries: self.envelope.deliveries,
        };
        tokio::spawn(async move {
            tokio::time::sleep(inner.redelivery_delay).await;
            // Fails only once the bus itself is gone.
            let _ = inner.queue.send(envelope);
        });
        Ok(())
    }

    async fn term(&self) -> Result<()> {
        self.settle()?;
        self.inner.terminated.fetch_add(1, Ordering::SeqCst);
        self.inner
            .dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.envelope.payload.clone());
        Ok(())
    }
}
