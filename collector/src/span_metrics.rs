//! Turns a selected span tree into duration metrics.

use crate::errors::{CollectorError, Result};
use crate::metrics::Metric;
use crate::metrics_defs::SPAN_EXPORT_WAIT;
use crate::selection::saturate;
use crate::telemetry::{SpanElement, SpanFilter, SpanParser};
use indexmap::IndexMap;
use shared::histogram;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, sleep};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregates spans by name. Warmup spans are left out entirely.
///
/// Every name yields its total duration. Names seen more than once also get
/// `#count`, `#mean_value` and `#standard_deviation`.
pub fn metrics_from_spans(spans: &[SpanElement]) -> Vec<Metric> {
    let mut by_name: IndexMap<&str, Vec<i64>> = IndexMap::new();
    let mut warmup = 0usize;

    for span in spans {
        if span.is_warmup {
            warmup += 1;
            continue;
        }
        by_name
            .entry(span.name.as_str())
            .or_default()
            .push(span.duration_millis());
    }

    if warmup > 0 {
        tracing::debug!(warmup, "Skipped warmup spans");
    }

    let mut metrics = Vec::with_capacity(by_name.len());
    for (name, durations) in by_name {
        let count = durations.len() as i64;
        let sum: i128 = durations.iter().copied().map(i128::from).sum();
        metrics.push(Metric::duration(name, saturate(sum)));

        if count > 1 {
            let mean = sum as f64 / count as f64;
            let variance = durations
                .iter()
                .map(|&d| (d as f64 - mean).powi(2))
                .sum::<f64>()
                / count as f64;

            metrics.push(Metric::counter(format!("{name}#count"), count));
            metrics.push(Metric::duration(
                format!("{name}#mean_value"),
                saturate(sum / i128::from(count)),
            ));
            metrics.push(Metric::duration(
                format!("{name}#standard_deviation"),
                variance.sqrt().round() as i64,
            ));
        }
    }

    metrics
}

/// Reads span metrics of a finished test from the telemetry export.
///
/// The exporter flushes asynchronously, so the file is polled until the span
/// named after the test shows up.
#[derive(Clone, Debug)]
pub struct SpanMetricsExtractor {
    spans_file: PathBuf,
    child_filter: SpanFilter,
    poll_interval: Duration,
    timeout: Duration,
}

impl SpanMetricsExtractor {
    pub fn new(spans_file: impl Into<PathBuf>) -> Self {
        SpanMetricsExtractor {
            spans_file: spans_file.into(),
            child_filter: SpanFilter::any(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_child_filter(mut self, child_filter: SpanFilter) -> Self {
        self.child_filter = child_filter;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn wait_till_metrics_exported(&self, test_id: &str) -> Result<Vec<Metric>> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            match self.try_extract(test_id).await {
                Ok(Some(metrics)) => {
                    histogram!(SPAN_EXPORT_WAIT).record(started.elapsed().as_secs_f64());
                    tracing::info!(
                        test_id,
                        metrics = metrics.len(),
                        "Collected span metrics"
                    );
                    return Ok(metrics);
                }
                Ok(None) => {
                    tracing::debug!(test_id, "Test span not exported yet");
                }
                // The exporter may be in the middle of writing the file.
                Err(e) => {
                    tracing::debug!(test_id, error = %e, "Spans file not readable yet");
                }
            }

            if Instant::now() >= deadline {
                return Err(CollectorError::SpansNotExported {
                    span: test_id.to_string(),
                    file: self.spans_file.clone(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn try_extract(&self, test_id: &str) -> Result<Option<Vec<Metric>>> {
        let path = self.spans_file.clone();
        let parser = SpanParser::with_child_filter(
            SpanFilter::name_equals(test_id),
            self.child_filter.clone(),
        );

        let selected = tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(Vec::new());
            }
            parser.parse_file(&path)
        })
        .await??;

        if selected.is_empty() {
            return Ok(None);
        }
        Ok(Some(metrics_from_spans(&selected)))
    }
}
