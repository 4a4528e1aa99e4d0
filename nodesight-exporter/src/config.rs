//! Configuration for the node exporter.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use nodesight_common::engine::DEFAULT_CYCLE_TIMEOUT;
use nodesight_common::{EngineConfig, ExecutionMode, LoggingConfig};
use nodesight_probes::ProbesConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Scrape-cycle scheduling.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Force probes on (`true`) or off (`false`) regardless of their default.
    #[serde(default)]
    pub collectors: BTreeMap<String, bool>,

    /// Per-probe settings.
    #[serde(default)]
    pub probes: ProbesConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:9100").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Scrape-cycle scheduling as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// "parallel" (default) or "sequential".
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Per-probe bound in parallel mode (seconds). Unset waits for every probe.
    #[serde(default)]
    pub probe_timeout_secs: Option<f64>,

    /// Overall bound of a cycle in either mode (seconds).
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: f64,
}

fn default_cycle_timeout() -> f64 {
    DEFAULT_CYCLE_TIMEOUT.as_secs_f64()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            probe_timeout_secs: None,
            cycle_timeout_secs: default_cycle_timeout(),
        }
    }
}

fn positive_duration(secs: f64, field: &str) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::Validation(format!(
            "{field} must be a positive number of seconds, got {secs}"
        ))),
    }
}

impl EngineSettings {
    /// Convert into the engine's runtime settings.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let probe_timeout = self
            .probe_timeout_secs
            .map(|secs| positive_duration(secs, "engine.probe_timeout_secs"))
            .transpose()?;

        let cycle_timeout = positive_duration(self.cycle_timeout_secs, "engine.cycle_timeout_secs")?;

        Ok(EngineConfig {
            mode: self.mode,
            probe_timeout,
            cycle_timeout,
        })
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate listen address format
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        // Validate path starts with /
        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.http.path == "/health" {
            return Err(ConfigError::Validation(
                "Metrics path must not be /health".to_string(),
            ));
        }

        self.engine.to_engine_config()?;
        self.probes.validate().map_err(ConfigError::Validation)?;

        Ok(())
    }
}
