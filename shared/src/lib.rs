pub mod metrics_defs;

pub use metrics_defs::{MetricDef, MetricType};
