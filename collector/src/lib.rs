//! Collection of performance metrics from IDE telemetry.
//!
//! Two sources feed a report:
//! - spans exported by the OpenTelemetry tracer, filtered down to the subtree
//!   of a single test span ([`telemetry::SpanParser`]) and turned into
//!   duration metrics ([`span_metrics`]);
//! - meter samples written to the log dir, reduced to one value per meter
//!   with a [`MetricsSelectionStrategy`] ([`meters`]).

pub mod errors;
pub mod meters;
pub mod metrics;
pub mod metrics_defs;
pub mod selection;
pub mod span_metrics;
pub mod telemetry;

pub use errors::{CollectorError, Result};
pub use meters::{MeterSample, MetricsCollector, OpenTelemetryMeterCollector};
pub use metrics::{Metric, MetricId};
pub use selection::MetricsSelectionStrategy;
pub use span_metrics::SpanMetricsExtractor;
pub use telemetry::{SpanElement, SpanFilter, SpanParser};
