//! Publishes performance metrics of IDE tests as TeamCity artifacts.
//!
//! Metrics will be stored as TeamCity artifacts and later collected by the
//! performance dashboard collector, roughly once or twice per hour.

pub mod aggregation;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod publisher;
pub mod report;
pub mod teamcity;

pub use errors::{PublisherError, Result};

use crate::aggregation::TelemetryMeterCollector;
use crate::publisher::MetricsPublisher;
use crate::report::PerformanceMetricsDto;
use crate::teamcity::TeamCityClient;

/// Validates the config, sets up the TeamCity client and publishes the report
/// for `test_id` using the meter collectors declared in the config.
pub async fn run(config: config::Config, test_id: &str) -> Result<PerformanceMetricsDto> {
    config.validate()?;

    let mut client = TeamCityClient::from_env(&config.teamcity)?;
    if config.teamcity.fetch_build_details {
        // Missing details only degrade the report.
        if let Err(e) = client.refresh_from_server().await {
            tracing::warn!(error = %e, "Could not fetch build details from TeamCity");
        }
    }

    let collectors: Vec<TelemetryMeterCollector> = config
        .meters
        .iter()
        .map(|m| TelemetryMeterCollector::with_name_prefix(m.aggregation, m.name_prefix.clone()))
        .collect();

    MetricsPublisher::new(config, client)
        .publish(test_id, &collectors)
        .await
}
