//! Receive loop shared by every bus implementation.
//!
//! The loop pulls deliveries from a stream and hands each one to the handler
//! in its own task, bounded by `max_in_flight`. Draining stops the pull side
//! first and then waits for every handler already running.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::{Delivery, DeliveryHandler};

/// A running subscription.
pub struct Subscription {
    shutdown: CancellationToken,
    receiver: JoinHandle<()>,
    tracker: TaskTracker,
}

impl Subscription {
    /// Spawn the receive loop over `deliveries`.
    pub fn spawn<S>(deliveries: S, handler: DeliveryHandler, max_in_flight: usize) -> Self
    where
        S: Stream<Item = Box<dyn Delivery>> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));

        let receiver = {
            let shutdown = shutdown.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let mut deliveries = Box::pin(deliveries);
                info!(max_in_flight, "Subscription started");

                loop {
                    let permit = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        permit = Arc::clone(&permits).acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let delivery = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        next = deliveries.next() => match next {
                            Some(delivery) => delivery,
                            None => {
                                warn!("Delivery stream ended");
                                break;
                            }
                        },
                    };

                    let handler = Arc::clone(&handler);
                    tracker.spawn(async move {
                        handler(delivery).await;
                        drop(permit);
                    });
                }

                debug!("Subscription stopped receiving");
            })
        };

        Self {
            shutdown,
            receiver,
            tracker,
        }
    }

    /// Number of handlers currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop receiving and wait for in-flight handlers to finish.
    pub async fn drain(self) -> Result<()> {
        info!(in_flight = self.tracker.len(), "Draining subscription");
        self.shutdown.cancel();

        let receiver_result = self.receiver.await;

        self.tracker.close();
        self.tracker.wait().await;
        info!("Subscription drained");

        receiver_result.map_err(|e| Error::Drain(e.to_string()))
    }
}
