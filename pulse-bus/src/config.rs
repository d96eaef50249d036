//! Configuration for the message bus client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for connecting to and consuming from the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Server address, e.g. `nats://127.0.0.1:4222`.
    pub url: String,

    /// Subject carrying analytics events.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// JetStream stream bound to the subject.
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Durable consumer name; restarts resume where the last run stopped.
    #[serde(default = "default_durable_name")]
    pub durable_name: String,

    /// Maximum handlers running at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// How long the server waits for a settlement before redelivering.
    #[serde(default = "default_ack_wait", with = "humantime_serde")]
    pub ack_wait: Duration,

    /// Give up on a message after this many deliveries. Unlimited when unset.
    #[serde(default)]
    pub max_deliver: Option<i64>,
}

fn default_subject() -> String {
    "events.analytics".to_string()
}

fn default_stream() -> String {
    "ANALYTICS".to_string()
}

fn default_durable_name() -> String {
    "pulse-ingest".to_string()
}

fn default_max_in_flight() -> usize {
    64
}

fn default_ack_wait() -> Duration {
    Duration::from_secs(30)
}

impl BusConfig {
    /// Create a config for `url` with every other field defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject: default_subject(),
            stream: default_stream(),
            durable_name: default_durable_name(),
            max_in_flight: default_max_in_flight(),
            ack_wait: default_ack_wait(),
            max_deliver: None,
        }
    }

    /// Use a different subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Use a different durable consumer name.
    #[must_use]
    pub fn with_durable_name(mut self, name: impl Into<String>) -> Self {
        self.durable_name = name.into();
        self
    }

    /// Bound the number of concurrent handlers.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }
}
