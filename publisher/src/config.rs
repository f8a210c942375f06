use crate::aggregation::MetricsAggregation;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("wait_timeout_secs cannot be 0")]
    InvalidTimeout,

    #[error("poll_interval_millis cannot be 0")]
    InvalidPollInterval,

    #[error("empty path for {0}")]
    EmptyPath(&'static str),

    #[error("duplicate meter collector: {0}")]
    DuplicateMeterCollector(String),
}

fn default_wait_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_millis() -> u64 {
    500
}

/// Publisher configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// IDE log dir. Published as an artifact and scanned for meter files.
    pub log_dir: PathBuf,
    /// Log of the test run, published next to the log dir when present.
    pub test_log_file: Option<PathBuf>,
    /// Product build number such as `IU-243.1234`
    pub build_number: Option<String>,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub teamcity: TeamCityConfig,
    /// Meter collectors merged into the report after the span metrics
    #[serde(default)]
    pub meters: Vec<MeterCollectorConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(ValidationError::EmptyPath("log_dir"));
        }

        self.telemetry.validate()?;

        let mut seen = HashSet::new();
        for meter in &self.meters {
            let key = (meter.aggregation, meter.name_prefix.clone());
            if !seen.insert(key) {
                return Err(ValidationError::DuplicateMeterCollector(format!(
                    "{:?} {}",
                    meter.aggregation,
                    meter.name_prefix.as_deref().unwrap_or("*")
                )));
            }
        }

        Ok(())
    }
}

/// Where and how spans are read
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// JSON export written by the OpenTelemetry span exporter
    pub spans_file: PathBuf,
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
    /// Child spans with these names are dropped together with their subtree
    #[serde(default)]
    pub ignored_spans: Vec<String>,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.spans_file.as_os_str().is_empty() {
            return Err(ValidationError::EmptyPath("telemetry.spans_file"));
        }
        if self.wait_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.poll_interval_millis == 0 {
            return Err(ValidationError::InvalidPollInterval);
        }
        Ok(())
    }
}

/// Overrides for the values normally read from the TeamCity build properties
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TeamCityConfig {
    /// Properties file to use instead of `TEAMCITY_BUILD_PROPERTIES_FILE`
    pub properties_file: Option<PathBuf>,
    /// Directory artifacts are staged in before TeamCity picks them up
    pub artifacts_dir: Option<PathBuf>,
    pub server_url: Option<Url>,
    /// Query the REST API for build details missing from the properties
    #[serde(default)]
    pub fetch_build_details: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MeterCollectorConfig {
    pub aggregation: MetricsAggregation,
    /// Only meters whose name starts with this prefix are collected
    pub name_prefix: Option<String>,
}
