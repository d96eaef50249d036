use std::time::Duration;

use pulse_bus::BusConfig;
use pulse_server::BroadcastConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default host for the pulse server
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default port for the pulse server
pub const DEFAULT_PORT: u16 = 8080;
/// Default pool size for the event store
pub const DEFAULT_MAX_CONNECTIONS: u32 = pulse_store::DEFAULT_MAX_CONNECTIONS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not configured (set {env} or `{key}` in config.toml)")]
    Missing {
        key: &'static str,
        env: &'static str,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawPulseConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub broadcast: RawBroadcastConfig,

    #[serde(default)]
    pub ingest: RawIngestConfig,

    #[serde(default)]
    pub database: RawDatabaseConfig,

    #[serde(default)]
    pub nats: RawNatsConfig,

    #[serde(default)]
    pub produce: RawProduceConfig,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawBroadcastConfig {
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub window: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub query_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawIngestConfig {
    #[serde(default, with = "humantime_serde")]
    pub insert_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawDatabaseConfig {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawNatsConfig {
    pub url: Option<String>,
    pub subject: Option<String>,
    pub stream: Option<String>,
    pub durable_name: Option<String>,
    pub max_in_flight: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub ack_wait: Option<Duration>,
    pub max_deliver: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawProduceConfig {
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PulseConfig {
    pub server: ServerSection,
    pub broadcast: BroadcastSection,
    pub ingest: IngestSection,
    pub database: DatabaseSection,
    pub nats: NatsSection,
    pub produce: ProduceSection,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BroadcastSection {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestSection {
    #[serde(with = "humantime_serde")]
    pub insert_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatabaseSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NatsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub subject: String,
    pub stream: String,
    pub durable_name: String,
    pub max_in_flight: usize,
    #[serde(with = "humantime_serde")]
    pub ack_wait: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_deliver: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProduceSection {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl PulseConfig {
    /// Reject values that would stall or crash a component at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("broadcast.interval", self.broadcast.interval),
            ("broadcast.write_timeout", self.broadcast.write_timeout),
            ("broadcast.query_timeout", self.broadcast.query_timeout),
            ("ingest.insert_timeout", self.ingest.insert_timeout),
            ("produce.interval", self.produce.interval),
        ];
        if let Some(&(key, _)) = non_zero.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid {
                key,
                reason: "must be greater than zero",
            });
        }

        // Buckets have millisecond resolution
        if self.broadcast.window < Duration::from_millis(1) {
            return Err(ConfigError::Invalid {
                key: "broadcast.window",
                reason: "must be at least 1ms",
            });
        }

        if self.nats.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                key: "nats.max_in_flight",
                reason: "must be greater than zero",
            });
        }

        Ok(())
    }

    /// Connection string for the event store. Required by every command
    /// that touches the database.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing {
                key: "database.url",
                env: "DATABASE_URL",
            })
    }

    /// Bus settings. Fails if no bus address is configured.
    pub fn bus_config(&self) -> Result<BusConfig, ConfigError> {
        let url = self
            .nats
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing {
                key: "nats.url",
                env: "NATS_URL",
            })?;

        let mut config = BusConfig::new(url)
            .with_subject(self.nats.subject.clone())
            .with_durable_name(self.nats.durable_name.clone())
            .with_max_in_flight(self.nats.max_in_flight);
        config.stream = self.nats.stream.clone();
        config.ack_wait = self.nats.ack_wait;
        config.max_deliver = self.nats.max_deliver;
        Ok(config)
    }

    pub fn server_config(&self) -> pulse_server::ServerConfig {
        let mut config = pulse_server::ServerConfig::new(self.server.host.clone(), self.server.port);
        config.broadcast = BroadcastConfig {
            interval: self.broadcast.interval,
            window: self.broadcast.window,
            write_timeout: self.broadcast.write_timeout,
            query_timeout: self.broadcast.query_timeout,
        };
        config
    }
}
