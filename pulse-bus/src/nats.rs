//! NATS JetStream bus.
//!
//! Events live in a file-backed stream bound to the analytics subject.
//! Consumers share a durable pull consumer with explicit acks, so a restarted
//! worker resumes from the last settled message and anything left unsettled
//! past `ack_wait` is redelivered.

use async_nats::jetstream::{
    self,
    consumer::{AckPolicy, pull::Config as ConsumerConfig},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind, Context,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::subscription::Subscription;
use crate::traits::{Delivery, DeliveryHandler, MessageBus, Publisher};

/// JetStream-backed MessageBus and Publisher.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: Context,
    config: BusConfig,
}

impl NatsBus {
    /// Connect to the server and make sure the stream exists.
    pub async fn connect(config: BusConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| Error::Connect {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;
        let jetstream = jetstream::new(client.clone());

        let bus = Self {
            client,
            jetstream,
            config,
        };
        bus.ensure_stream().await?;

        info!(
            url = %bus.config.url,
            stream = %bus.config.stream,
            subject = %bus.config.subject,
            "Connected to NATS"
        );
        Ok(bus)
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    async fn ensure_stream(&self) -> Result<()> {
        match self.jetstream.get_stream(&self.config.stream).await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.jetstream
                    .create_stream(StreamConfig {
                        name: self.config.stream.clone(),
                        subjects: vec![self.config.subject.clone()],
                        retention: RetentionPolicy::Limits,
                        storage: StorageType::File,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| Error::Stream(e.to_string()))?;
                debug!(stream = %self.config.stream, "Created stream");
                Ok(())
            }
        }
    }

    /// Flush pending publishes.
    pub async fn close(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }
}

#[async_trait]
impl Publisher for NatsBus {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        self.jetstream
            .publish(self.config.subject.clone(), payload.into())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?
            .await
            .map_err(|e| Error::Publish(format!("ack failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn subscribe(&self, handler: DeliveryHandler) -> Result<Subscription> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream)
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable_name,
                ConsumerConfig {
                    durable_name: Some(self.config.durable_name.clone()),
                    filter_subject: self.config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    max_deliver: self.config.max_deliver.unwrap_or(-1),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!(
            durable = %self.config.durable_name,
            subject = %self.config.subject,
            "Subscribed to JetStream consumer"
        );

        let deliveries = messages.filter_map(|next| async move {
            match next {
                Ok(message) => Some(Box::new(NatsDelivery { message }) as Box<dyn Delivery>),
                Err(e) => {
                    warn!(error = %e, "Failed to receive message");
                    None
                }
            }
        });

        Ok(Subscription::spawn(
            deliveries,
            handler,
            self.config.max_in_flight,
        ))
    }
}

struct NatsDelivery {
    message: jetstream::Message,
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn redelivery_count(&self) -> u64 {
        self.message
            .info()
            .map(|info| info.delivered.saturating_sub(1) as u64)
            .unwrap_or(0)
    }

    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| Error::Settle(e.to_string()))
    }

    async fn nak(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| Error::Settle(e.to_string()))
    }

    async fn term(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| Error::Settle(e.to_string()))
    }
}
