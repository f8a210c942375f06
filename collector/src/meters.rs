//! Meter samples exported by the IDE next to its logs.
//!
//! The exporter appends to `open-telemetry-meters*.csv` files, one sample per
//! line: `name,epoch_start_nanos,epoch_end_nanos,value`.

use crate::errors::{CollectorError, Result};
use crate::metrics::Metric;
use crate::metrics_defs::METER_SAMPLES_READ;
use crate::selection::MetricsSelectionStrategy;
use shared::counter;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const METERS_FILE_PREFIX: &str = "open-telemetry-meters";
const METERS_FILE_EXTENSION: &str = "csv";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeterSample {
    pub name: String,
    pub epoch_nanos: u64,
    pub value: i64,
}

/// A source of additional metrics read from the IDE log dir.
pub trait MetricsCollector: Send + Sync {
    fn collect(&self, log_dir: &Path) -> Result<Vec<Metric>>;
}

type MeterFilter = dyn Fn(&str, &[i64]) -> bool + Send + Sync;

/// Reduces every accepted meter to one counter using a selection strategy.
#[derive(Clone)]
pub struct OpenTelemetryMeterCollector {
    strategy: MetricsSelectionStrategy,
    filter: Arc<MeterFilter>,
}

impl OpenTelemetryMeterCollector {
    /// `filter` receives the meter name and all of its values.
    pub fn new<F>(strategy: MetricsSelectionStrategy, filter: F) -> Self
    where
        F: Fn(&str, &[i64]) -> bool + Send + Sync + 'static,
    {
        OpenTelemetryMeterCollector {
            strategy,
            filter: Arc::new(filter),
        }
    }

    pub fn strategy(&self) -> MetricsSelectionStrategy {
        self.strategy
    }
}

impl fmt::Debug for OpenTelemetryMeterCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenTelemetryMeterCollector")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl MetricsCollector for OpenTelemetryMeterCollector {
    fn collect(&self, log_dir: &Path) -> Result<Vec<Metric>> {
        let mut by_name: BTreeMap<String, Vec<MeterSample>> = BTreeMap::new();
        for sample in read_meter_samples(log_dir)? {
            by_name.entry(sample.name.clone()).or_default().push(sample);
        }

        let mut metrics = Vec::new();
        for (name, samples) in by_name {
            let values: Vec<i64> = samples.iter().map(|s| s.value).collect();
            if !(self.filter)(&name, &values) {
                continue;
            }
            if let Some(value) = self.strategy.select(&samples) {
                metrics.push(Metric::counter(name, value));
            }
        }

        tracing::debug!(
            strategy = ?self.strategy,
            metrics = metrics.len(),
            "Collected meter metrics"
        );
        Ok(metrics)
    }
}

/// Reads samples from every meters file directly inside `log_dir`, ordered
/// by file name. A missing dir has no samples.
pub fn read_meter_samples(log_dir: &Path) -> Result<Vec<MeterSample>> {
    if !log_dir.is_dir() {
        tracing::warn!(log_dir = %log_dir.display(), "Log dir does not exist, no meters collected");
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(log_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_meters_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(METERS_FILE_PREFIX))
            && path.extension().is_some_and(|e| e == METERS_FILE_EXTENSION);
        if is_meters_file {
            files.push(path.to_path_buf());
        }
    }
    files.sort();

    let mut samples = Vec::new();
    for file in files {
        let content = fs::read_to_string(&file)?;
        samples.extend(parse_meter_samples(&file, &content)?);
    }

    counter!(METER_SAMPLES_READ).increment(samples.len() as u64);
    Ok(samples)
}

fn parse_meter_samples(file: &Path, content: &str) -> Result<Vec<MeterSample>> {
    let mut samples = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (idx == 0 && line.starts_with("NAME")) {
            continue;
        }

        let parse_error = |reason: String| CollectorError::MeterParse {
            file: file.to_path_buf(),
            line: idx + 1,
            reason,
        };

        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        let [name, _start, end, value] = columns[..] else {
            return Err(parse_error(format!(
                "expected 4 columns, found {}",
                columns.len()
            )));
        };
        if name.is_empty() {
            return Err(parse_error("empty meter name".into()));
        }

        let epoch_nanos = end
            .parse::<u64>()
            .map_err(|e| parse_error(format!("bad end time {end:?}: {e}")))?;
        let value = value
            .parse::<i64>()
            .map_err(|e| parse_error(format!("bad value {value:?}: {e}")))?;

        samples.push(MeterSample {
            name: name.to_string(),
            epoch_nanos,
            value,
        });
    }

    Ok(samples)
}
