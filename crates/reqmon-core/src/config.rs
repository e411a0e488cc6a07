//! Configuration management for reqmon
//!
//! Values come from the built-in defaults, an optional configuration file and
//! `REQMON__`-prefixed environment variables, in that order of precedence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Prefix of the environment variables overriding configuration values
pub const ENV_PREFIX: &str = "REQMON";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Monitoring configuration
    pub monitoring: MonitoringConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load the configuration from an optional file and the environment.
    ///
    /// Environment variables use a double underscore as separator, e.g.
    /// `REQMON__MONITORING__DISABLED=true`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!(path, "Reading configuration file");
            builder = builder.add_source(::config::File::with_name(path));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("monitoring.displayed_counters")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?;

        config.monitoring.validate()?;
        Ok(config)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
    /// Path of the monitoring page
    pub monitoring_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            monitoring_path: "/monitoring".to_string(),
        }
    }
}

/// Monitoring configuration, fixed for the lifetime of a monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Turns off every interception
    pub disabled: bool,

    /// Names of the counters to display (None = all counters)
    pub displayed_counters: Option<Vec<String>>,

    /// Fixed warning threshold for mean durations, in milliseconds.
    /// Defaults to the global mean plus one standard deviation.
    pub warning_threshold_millis: Option<i64>,

    /// Fixed severe threshold for mean durations, in milliseconds.
    /// Defaults to the global mean plus two standard deviations.
    pub severe_threshold_millis: Option<i64>,

    /// Number of errors kept by error counters
    pub max_error_count: usize,

    /// Number of distinct requests a counter tracks before warning
    pub max_requests_count: usize,

    /// Measure CPU time of monitored requests
    pub cpu_tracking: bool,

    /// Measure allocated memory of monitored requests (needs a probe)
    pub allocation_tracking: bool,

    /// Show the PDF dependencies link on business facade counters
    pub pdf_enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            displayed_counters: None,
            warning_threshold_millis: None,
            severe_threshold_millis: None,
            max_error_count: 100,
            max_requests_count: 10_000,
            cpu_tracking: true,
            allocation_tracking: false,
            pdf_enabled: false,
        }
    }
}

impl MonitoringConfig {
    /// Whether `displayed_counters` hides the named counter
    pub fn is_counter_hidden(&self, counter_name: &str) -> bool {
        self.displayed_counters
            .as_ref()
            .is_some_and(|names| !names.iter().any(|name| name == counter_name))
    }

    /// Check that the thresholds are consistent
    pub fn validate(&self) -> Result<()> {
        match (self.warning_threshold_millis, self.severe_threshold_millis) {
            (Some(warning), _) if warning < 0 => Err(crate::Error::config(
                "warning_threshold_millis must not be negative",
            )),
            (_, Some(severe)) if severe < 0 => Err(crate::Error::config(
                "severe_threshold_millis must not be negative",
            )),
            (Some(warning), Some(severe)) if warning > severe => Err(crate::Error::config(
                format!("warning threshold {warning}ms is above severe threshold {severe}ms"),
            )),
            _ => Ok(()),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
