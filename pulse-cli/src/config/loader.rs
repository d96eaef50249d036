use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use pulse_server::{BroadcastConfig, DEFAULT_INSERT_TIMEOUT};

use super::types::{
    BroadcastSection, ConfigError, DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
    DatabaseSection, IngestSection, NatsSection, ProduceSection, PulseConfig, RawBroadcastConfig,
    RawDatabaseConfig, RawIngestConfig, RawNatsConfig, RawProduceConfig, RawPulseConfig,
    RawServerConfig, ServerSection,
};

/// Interval between synthetic events when none is configured
const DEFAULT_PRODUCE_INTERVAL: Duration = Duration::from_secs(1);

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + environment)
    pub fn load() -> Result<PulseConfig, ConfigError> {
        Self::load_with(RawPulseConfig::default())
    }

    /// Load merged configuration, then apply `overrides` (usually CLI flags)
    /// on top of everything else.
    pub fn load_with(overrides: RawPulseConfig) -> Result<PulseConfig, ConfigError> {
        Self::load_layers(
            Self::user_config_path().as_deref(),
            &Self::project_config_path(),
            overrides,
        )
    }

    /// Layering order, lowest first: user file, project file, `DATABASE_URL`
    /// and `NATS_URL`, then `overrides`.
    fn load_layers(
        user_path: Option<&Path>,
        project_path: &Path,
        overrides: RawPulseConfig,
    ) -> Result<PulseConfig, ConfigError> {
        let mut raw = RawPulseConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user_path
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(user_path)?);
        }

        // Layer 2: Project config
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project_path)?);
        }

        // Layer 3: Environment
        raw = Self::merge_raw(raw, Self::env_overrides());

        // Layer 4: Command line
        raw = Self::merge_raw(raw, overrides);

        let config = Self::finalize(raw);
        config.validate()?;
        Ok(config)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pulse").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with PULSE_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("PULSE_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".pulse/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawPulseConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn env_overrides() -> RawPulseConfig {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        RawPulseConfig {
            database: RawDatabaseConfig {
                url: non_empty("DATABASE_URL"),
                ..Default::default()
            },
            nats: RawNatsConfig {
                url: non_empty("NATS_URL"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawPulseConfig, overlay: RawPulseConfig) -> RawPulseConfig {
        RawPulseConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
            },
            broadcast: RawBroadcastConfig {
                interval: overlay.broadcast.interval.or(base.broadcast.interval),
                window: overlay.broadcast.window.or(base.broadcast.window),
                write_timeout: overlay.broadcast.write_timeout.or(base.broadcast.write_timeout),
                query_timeout: overlay.broadcast.query_timeout.or(base.broadcast.query_timeout),
            },
            ingest: RawIngestConfig {
                insert_timeout: overlay.ingest.insert_timeout.or(base.ingest.insert_timeout),
            },
            database: RawDatabaseConfig {
                url: overlay.database.url.or(base.database.url),
                max_connections: overlay
                    .database
                    .max_connections
                    .or(base.database.max_connections),
            },
            nats: RawNatsConfig {
                url: overlay.nats.url.or(base.nats.url),
                subject: overlay.nats.subject.or(base.nats.subject),
                stream: overlay.nats.stream.or(base.nats.stream),
                durable_name: overlay.nats.durable_name.or(base.nats.durable_name),
                max_in_flight: overlay.nats.max_in_flight.or(base.nats.max_in_flight),
                ack_wait: overlay.nats.ack_wait.or(base.nats.ack_wait),
                max_deliver: overlay.nats.max_deliver.or(base.nats.max_deliver),
            },
            produce: RawProduceConfig {
                interval: overlay.produce.interval.or(base.produce.interval),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawPulseConfig) -> PulseConfig {
        let broadcast = BroadcastConfig::default();
        let bus = pulse_bus::BusConfig::new("");

        PulseConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
            },
            broadcast: BroadcastSection {
                interval: raw.broadcast.interval.unwrap_or(broadcast.interval),
                window: raw.broadcast.window.unwrap_or(broadcast.window),
                write_timeout: raw.broadcast.write_timeout.unwrap_or(broadcast.write_timeout),
                query_timeout: raw.broadcast.query_timeout.unwrap_or(broadcast.query_timeout),
            },
            ingest: IngestSection {
                insert_timeout: raw.ingest.insert_timeout.unwrap_or(DEFAULT_INSERT_TIMEOUT),
            },
            database: DatabaseSection {
                url: raw.database.url,
                max_connections: raw
                    .database
                    .max_connections
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            },
            nats: NatsSection {
                url: raw.nats.url,
                subject: raw.nats.subject.unwrap_or(bus.subject),
                stream: raw.nats.stream.unwrap_or(bus.stream),
                durable_name: raw.nats.durable_name.unwrap_or(bus.durable_name),
                max_in_flight: raw.nats.max_in_flight.unwrap_or(bus.max_in_flight),
                ack_wait: raw.nats.ack_wait.unwrap_or(bus.ack_wait),
                max_deliver: raw.nats.max_deliver,
            },
            produce: ProduceSection {
                interval: raw.produce.interval.unwrap_or(DEFAULT_PRODUCE_INTERVAL),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("NATS_URL");
        }
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_load_defaults_when_no_files() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");

        let config =
            ConfigLoader::load_layers(None, &missing, RawPulseConfig::default()).unwrap();

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.broadcast.interval, Duration::from_secs(1));
        assert_eq!(config.broadcast.window, Duration::from_secs(1));
        assert_eq!(config.ingest.insert_timeout, Duration::from_secs(5));
        assert_eq!(config.nats.subject, "events.analytics");
        assert!(config.database.url.is_none());
        assert!(config.nats.url.is_none());
    }

    #[test]
    #[serial]
    fn test_project_overrides_user() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            &temp_dir,
            "user.toml",
            "[server]\nport = 9000\nhost = \"127.0.0.1\"\n\n[broadcast]\nwindow = \"5s\"\n",
        );
        let project = write(&temp_dir, "project.toml", "[server]\nport = 9100\n");

        let config =
            ConfigLoader::load_layers(Some(&user), &project, RawPulseConfig::default()).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.broadcast.window, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_env_overrides_files() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(
            &temp_dir,
            "project.toml",
            "[database]\nurl = \"postgres://file/db\"\n\n[nats]\nurl = \"nats://file:4222\"\n",
        );
        unsafe { std::env::set_var("DATABASE_URL", "postgres://env/db") };

        let config =
            ConfigLoader::load_layers(None, &project, RawPulseConfig::default()).unwrap();
        clear_env();

        assert_eq!(config.database.url.as_deref(), Some("postgres://env/db"));
        assert_eq!(config.nats.url.as_deref(), Some("nats://file:4222"));
    }

    #[test]
    #[serial]
    fn test_empty_env_var_is_ignored() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(&temp_dir, "project.toml", "[nats]\nurl = \"nats://file:4222\"\n");
        unsafe { std::env::set_var("NATS_URL", "") };

        let config =
            ConfigLoader::load_layers(None, &project, RawPulseConfig::default()).unwrap();
        clear_env();

        assert_eq!(config.nats.url.as_deref(), Some("nats://file:4222"));
    }

    #[test]
    #[serial]
    fn test_overrides_win_over_env() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        unsafe { std::env::set_var("NATS_URL", "nats://env:4222") };

        let overrides = RawPulseConfig {
            nats: RawNatsConfig {
                url: Some("nats://flag:4222".to_string()),
                ..Default::default()
            },
            server: RawServerConfig {
                port: Some(3000),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = ConfigLoader::load_layers(None, &missing, overrides).unwrap();
        clear_env();

        assert_eq!(config.nats.url.as_deref(), Some("nats://flag:4222"));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    #[serial]
    fn test_invalid_file_reports_path() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(&temp_dir, "project.toml", "[server\nport = ");

        let err = ConfigLoader::load_layers(None, &project, RawPulseConfig::default()).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == &project));
    }

    #[test]
    #[serial]
    fn test_missing_urls_are_reported() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        let config =
            ConfigLoader::load_layers(None, &missing, RawPulseConfig::default()).unwrap();

        let err = config.database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
        let err = config.bus_config().unwrap_err();
        assert!(err.to_string().contains("NATS_URL"));
    }

    #[test]
    #[serial]
    fn test_bus_config_carries_nats_section() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(
            &temp_dir,
            "project.toml",
            "[nats]\nurl = \"nats://bus:4222\"\nsubject = \"events.test\"\nack_wait = \"10s\"\nmax_deliver = 5\n",
        );

        let config =
            ConfigLoader::load_layers(None, &project, RawPulseConfig::default()).unwrap();
        let bus = config.bus_config().unwrap();

        assert_eq!(bus.url, "nats://bus:4222");
        assert_eq!(bus.subject, "events.test");
        assert_eq!(bus.ack_wait, Duration::from_secs(10));
        assert_eq!(bus.max_deliver, Some(5));
        assert_eq!(bus.durable_name, "pulse-ingest");
    }

    #[test]
    #[serial]
    fn test_server_config_carries_broadcast_section() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(
            &temp_dir,
            "project.toml",
            "[broadcast]\ninterval = \"250ms\"\nwrite_timeout = \"1s\"\n",
        );

        let config =
            ConfigLoader::load_layers(None, &project, RawPulseConfig::default()).unwrap();
        let server = config.server_config();

        assert_eq!(server.broadcast.interval, Duration::from_millis(250));
        assert_eq!(server.broadcast.write_timeout, Duration::from_secs(1));
        assert_eq!(server.port, DEFAULT_PORT);
    }

    #[test]
    #[serial]
    fn test_show_output_omits_unset_urls() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        let config =
            ConfigLoader::load_layers(None, &missing, RawPulseConfig::default()).unwrap();

        let rendered = toml::to_string_pretty(&config).unwrap();

        assert!(rendered.contains("[broadcast]"));
        assert!(rendered.contains("interval = \"1s\""));
        assert!(!rendered.contains("url"));
    }

    fn load_project(dir: &TempDir, contents: &str) -> Result<PulseConfig, ConfigError> {
        let project = write(dir, "project.toml", contents);
        ConfigLoader::load_layers(None, &project, RawPulseConfig::default())
    }

    fn assert_invalid(result: Result<PulseConfig, ConfigError>, expected: &str) {
        match result {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, expected),
            other => panic!("expected {expected} to be rejected, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_zero_broadcast_interval_is_rejected() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let result = load_project(&temp_dir, "[broadcast]\ninterval = \"0s\"\n");

        assert_invalid(result, "broadcast.interval");
    }

    #[test]
    #[serial]
    fn test_zero_broadcast_window_is_rejected() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let result = load_project(&temp_dir, "[broadcast]\nwindow = \"0s\"\n");

        assert_invalid(result, "broadcast.window");
    }

    #[test]
    #[serial]
    fn test_sub_millisecond_window_is_rejected() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let result = load_project(&temp_dir, "[broadcast]\nwindow = \"500us\"\n");

        assert_invalid(result, "broadcast.window");
    }

    #[test]
    #[serial]
    fn test_zero_produce_interval_is_rejected() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let result = load_project(&temp_dir, "[produce]\ninterval = \"0ms\"\n");

        assert_invalid(result, "produce.interval");
    }

    #[test]
    #[serial]
    fn test_zero_interval_override_is_rejected() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        let overrides = RawPulseConfig {
            produce: RawProduceConfig {
                interval: Some(Duration::ZERO),
            },
            ..Default::default()
        };

        let result = ConfigLoader::load_layers(None, &missing, overrides);

        assert_invalid(result, "produce.interval");
    }

    #[test]
    #[serial]
    fn test_zero_timeouts_and_in_flight_are_rejected() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        assert_invalid(
            load_project(&temp_dir, "[broadcast]\nwrite_timeout = \"0s\"\n"),
            "broadcast.write_timeout",
        );
        assert_invalid(
            load_project(&temp_dir, "[ingest]\ninsert_timeout = \"0s\"\n"),
            "ingest.insert_timeout",
        );
        assert_invalid(
            load_project(&temp_dir, "[nats]\nmax_in_flight = 0\n"),
            "nats.max_in_flight",
        );
    }
}
