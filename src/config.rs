//! Configuration resolution.
//!
//! Settings are layered, highest precedence first:
//!
//! 1. command-line flags ([`Overrides`])
//! 2. `ESMETRICS_*` environment variables
//! 3. an optional configuration file (format picked from its extension)
//! 4. built-in defaults
//!
//! The result is an immutable [`Settings`] that is shared read-only by every
//! task for the life of the process.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::fetcher::HealthFetcher;

/// Default Elasticsearch HTTP port.
pub const DEFAULT_ELASTIC_PORT: u16 = 9200;
/// Default Carbon plaintext port.
pub const DEFAULT_GRAPHITE_PORT: u16 = 2003;
/// Default metric namespace.
pub const DEFAULT_GRAPHITE_DB: &str = "elasticsearch.cluster";
/// Default poll interval.
pub const DEFAULT_POLL: &str = "20s";
/// Default connect timeout.
pub const DEFAULT_TIMEOUT: &str = "5s";

const ENV_PREFIX: &str = "ESMETRICS";

/// Values supplied on the command line. `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub elastic_host: Option<String>,
    pub elastic_port: Option<u16>,
    pub graphite_host: Option<String>,
    pub graphite_port: Option<u16>,
    pub graphite_db: Option<String>,
    pub poll: Option<String>,
    pub timeout: Option<String>,
}

/// Merged but not yet validated settings.
#[derive(Debug, Deserialize)]
struct RawSettings {
    elastic_host: Option<String>,
    elastic_port: u16,
    graphite_host: Option<String>,
    graphite_port: u16,
    graphite_db: String,
    poll: String,
    timeout: String,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Cluster health URL of the monitored node.
    pub elastic_url: String,
    /// Carbon collector address, `host:port`.
    pub graphite_addr: String,
    /// Prefix for every metric path.
    pub graphite_db: String,
    /// Sleep between ticks.
    pub poll: Duration,
    /// Bound on the HTTP request and the collector connect.
    pub timeout: Duration,
}

impl Settings {
    /// Resolve settings from an optional file, the process environment and `overrides`.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::load_from(file, Environment::with_prefix(ENV_PREFIX), overrides)
    }

    fn load_from(
        file: Option<&Path>,
        env: Environment,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("elastic_port", i64::from(DEFAULT_ELASTIC_PORT))?
            .set_default("graphite_port", i64::from(DEFAULT_GRAPHITE_PORT))?
            .set_default("graphite_db", DEFAULT_GRAPHITE_DB)?
            .set_default("poll", DEFAULT_POLL)?
            .set_default("timeout", DEFAULT_TIMEOUT)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let raw: RawSettings = builder
            .add_source(env.try_parsing(true))
            .set_override_option("elastic_host", overrides.elastic_host.clone())?
            .set_override_option("elastic_port", overrides.elastic_port.map(i64::from))?
            .set_override_option("graphite_host", overrides.graphite_host.clone())?
            .set_override_option("graphite_port", overrides.graphite_port.map(i64::from))?
            .set_override_option("graphite_db", overrides.graphite_db.clone())?
            .set_override_option("poll", overrides.poll.clone())?
            .set_override_option("timeout", overrides.timeout.clone())?
            .build()?
            .try_deserialize()?;

        raw.resolve()
    }
}

impl RawSettings {
    fn resolve(self) -> Result<Settings, ConfigError> {
        let elastic_host = non_empty(self.elastic_host).ok_or(ConfigError::Missing("elastic_host"))?;
        let graphite_host =
            non_empty(self.graphite_host).ok_or(ConfigError::Missing("graphite_host"))?;

        if self.graphite_db.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "graphite_db",
                reason: "namespace must not be empty".to_string(),
            });
        }

        let poll = duration_setting("poll", &self.poll)?;
        let timeout = duration_setting("timeout", &self.timeout)?;

        Ok(Settings {
            elastic_url: HealthFetcher::cluster_health_url(&elastic_host, self.elastic_port),
            graphite_addr: format!("{}:{}", graphite_host, self.graphite_port),
            graphite_db: self.graphite_db,
            poll,
            timeout,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn duration_setting(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(value).map_err(|_| ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
    })?;

    if duration.is_zero() {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(duration)
}
