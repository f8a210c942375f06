//! Metrics definitions for the collector.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SPANS_READ: MetricDef = MetricDef {
    name: "collector.spans.read",
    metric_type: MetricType::Counter,
    description: "Number of spans read from telemetry exports",
};

pub const SPANS_SELECTED: MetricDef = MetricDef {
    name: "collector.spans.selected",
    metric_type: MetricType::Counter,
    description: "Number of spans kept after root and child filtering",
};

pub const SPAN_EXPORT_WAIT: MetricDef = MetricDef {
    name: "collector.spans.export_wait",
    metric_type: MetricType::Histogram,
    description: "Time spent waiting for the test span to be exported, in seconds",
};

pub const METER_SAMPLES_READ: MetricDef = MetricDef {
    name: "collector.meters.samples",
    metric_type: MetricType::Counter,
    description: "Number of meter samples read from the log dir",
};

pub const ALL_METRICS: &[MetricDef] = &[
    SPANS_READ,
    SPANS_SELECTED,
    SPAN_EXPORT_WAIT,
    METER_SAMPLES_READ,
];
