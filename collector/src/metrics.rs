use std::fmt;

/// Identifies a metric in a published report. Durations are milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricId {
    Duration(String),
    Counter(String),
}

impl MetricId {
    pub fn name(&self) -> &str {
        match self {
            MetricId::Duration(name) | MetricId::Counter(name) => name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metric {
    pub id: MetricId,
    pub value: i64,
}

impl Metric {
    pub fn duration(name: impl Into<String>, value_ms: i64) -> Self {
        Metric {
            id: MetricId::Duration(name.into()),
            value: value_ms,
        }
    }

    pub fn counter(name: impl Into<String>, value: i64) -> Self {
        Metric {
            id: MetricId::Counter(name.into()),
            value,
        }
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            MetricId::Duration(name) => write!(f, "{name}: {}ms", self.value),
            MetricId::Counter(name) => write!(f, "{name}: {}", self.value),
        }
    }
}
