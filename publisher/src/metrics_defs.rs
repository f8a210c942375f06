use shared::metrics_defs::{MetricDef, MetricType};

pub const ARTIFACTS_PUBLISHED: MetricDef = MetricDef {
    name: "publisher.artifacts.published",
    metric_type: MetricType::Counter,
    description: "Number of artifacts staged for TeamCity",
};

pub const REPORTS_PUBLISHED: MetricDef = MetricDef {
    name: "publisher.reports.published",
    metric_type: MetricType::Counter,
    description: "Number of performance reports published",
};

pub const PUBLISH_DURATION: MetricDef = MetricDef {
    name: "publisher.publish.duration",
    metric_type: MetricType::Histogram,
    description: "Time to collect and publish a report in seconds",
};

pub const REPORT_METRICS: MetricDef = MetricDef {
    name: "publisher.report.metrics",
    metric_type: MetricType::Gauge,
    description: "Number of metrics in the last published report",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ARTIFACTS_PUBLISHED,
    REPORTS_PUBLISHED,
    PUBLISH_DURATION,
    REPORT_METRICS,
];
