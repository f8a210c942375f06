//! The `metrics.performance.json` report picked up by the dashboard collector.

use collector::{Metric, MetricId};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const REPORT_VERSION: &str = "1";
const SNAPSHOT: &str = "SNAPSHOT";

/// Product build number, e.g. `IU-243.1234`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildNumber {
    pub product_code: String,
    pub build: String,
}

impl BuildNumber {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::snapshot();
        }
        match raw.split_once('-') {
            Some((code, build))
                if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                BuildNumber {
                    product_code: code.to_string(),
                    build: build.to_string(),
                }
            }
            _ => BuildNumber {
                product_code: String::new(),
                build: raw.to_string(),
            },
        }
    }

    pub fn snapshot() -> Self {
        BuildNumber {
            product_code: String::new(),
            build: SNAPSHOT.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiServerBuildInfo {
    pub build_id: String,
    pub type_id: String,
    pub config_name: String,
    pub build_number: String,
    pub branch_name: String,
    pub url: String,
    pub is_personal: bool,
    pub timestamp: String,
}

/// `d` is set for durations, `c` for counters; `v` always carries the value.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MetricDto {
    pub n: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<i64>,
    pub v: i64,
}

impl From<&Metric> for MetricDto {
    fn from(metric: &Metric) -> Self {
        let (d, c) = match metric.id {
            MetricId::Duration(_) => (Some(metric.value), None),
            MetricId::Counter(_) => (None, Some(metric.value)),
        };
        MetricDto {
            n: metric.name().to_string(),
            d,
            c,
            v: metric.value,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetricsDto {
    pub version: String,
    pub generated: String,
    pub project: String,
    #[serde(rename = "projectURL")]
    pub project_url: String,
    pub project_description: String,
    pub os: String,
    pub os_family: String,
    pub runtime: String,
    pub build: String,
    pub product_code: String,
    pub branch: String,
    pub method_name: String,
    pub metrics: Vec<MetricDto>,
    pub tc: CiServerBuildInfo,
}

impl PerformanceMetricsDto {
    pub fn create(
        project_name: &str,
        project_url: &str,
        project_description: &str,
        method_name: &str,
        build_number: &BuildNumber,
        metrics: &[Metric],
        build_info: CiServerBuildInfo,
    ) -> Self {
        PerformanceMetricsDto {
            version: REPORT_VERSION.to_string(),
            generated: local_timestamp(),
            project: project_name.to_string(),
            project_url: project_url.to_string(),
            project_description: project_description.to_string(),
            os: std::env::consts::OS.to_string(),
            os_family: std::env::consts::FAMILY.to_string(),
            runtime: concat!("perfpub/", env!("CARGO_PKG_VERSION")).to_string(),
            build: build_number.build.clone(),
            product_code: build_number.product_code.clone(),
            branch: build_info.branch_name.clone(),
            method_name: method_name.to_string(),
            metrics: metrics.iter().map(MetricDto::from).collect(),
            tc: build_info,
        }
    }

    pub fn write_pretty(&self, path: &Path) -> Result<(), crate::PublisherError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// One `name value` row per metric.
    pub fn metrics_table(&self) -> String {
        self.metrics
            .iter()
            .map(|m| format!("{:<60} {:>6}", m.n, m.v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Local date-time without offset, to the second.
pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}
