use collector::{MetricsSelectionStrategy, OpenTelemetryMeterCollector};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How samples of one meter are reduced, as requested by a test.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricsAggregation {
    Earliest,
    Latest,
    Minimum,
    Maximum,
    Sum,
    Average,
}

impl From<MetricsAggregation> for MetricsSelectionStrategy {
    fn from(aggregation: MetricsAggregation) -> Self {
        match aggregation {
            MetricsAggregation::Earliest => MetricsSelectionStrategy::Earliest,
            MetricsAggregation::Latest => MetricsSelectionStrategy::Latest,
            MetricsAggregation::Minimum => MetricsSelectionStrategy::Minimum,
            MetricsAggregation::Maximum => MetricsSelectionStrategy::Maximum,
            MetricsAggregation::Sum => MetricsSelectionStrategy::Sum,
            MetricsAggregation::Average => MetricsSelectionStrategy::Average,
        }
    }
}

impl FromStr for MetricsAggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" => Ok(MetricsAggregation::Earliest),
            "latest" => Ok(MetricsAggregation::Latest),
            "minimum" => Ok(MetricsAggregation::Minimum),
            "maximum" => Ok(MetricsAggregation::Maximum),
            "sum" => Ok(MetricsAggregation::Sum),
            "average" => Ok(MetricsAggregation::Average),
            other => Err(format!("unknown aggregation `{other}`")),
        }
    }
}

type MetersFilter = dyn Fn(&str, &[i64]) -> bool + Send + Sync;

/// A test-supplied meter collector: an aggregation plus a filter over
/// `(meter name, values)`.
#[derive(Clone)]
pub struct TelemetryMeterCollector {
    pub aggregation: MetricsAggregation,
    meters_filter: Arc<MetersFilter>,
}

impl TelemetryMeterCollector {
    pub fn new<F>(aggregation: MetricsAggregation, meters_filter: F) -> Self
    where
        F: Fn(&str, &[i64]) -> bool + Send + Sync + 'static,
    {
        TelemetryMeterCollector {
            aggregation,
            meters_filter: Arc::new(meters_filter),
        }
    }

    pub fn with_name_prefix(aggregation: MetricsAggregation, prefix: Option<String>) -> Self {
        match prefix {
            Some(prefix) => Self::new(aggregation, move |name, _| name.starts_with(&prefix)),
            None => Self::new(aggregation, |_, _| true),
        }
    }

    pub fn into_complete_collector(self) -> OpenTelemetryMeterCollector {
        let filter = self.meters_filter;
        OpenTelemetryMeterCollector::new(self.aggregation.into(), move |name, values| {
            filter(name, values)
        })
    }
}

impl fmt::Debug for TelemetryMeterCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryMeterCollector")
            .field("aggregation", &self.aggregation)
            .finish_non_exhaustive()
    }
}
