use crate::meters::MeterSample;
use serde::Deserialize;

/// Rule used to reduce several samples of the same meter to a single value.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSelectionStrategy {
    Earliest,
    Latest,
    Minimum,
    Maximum,
    Sum,
    Average,
}

impl MetricsSelectionStrategy {
    /// Returns `None` for an empty sample list.
    pub fn select(&self, samples: &[MeterSample]) -> Option<i64> {
        if samples.is_empty() {
            return None;
        }

        let values = samples.iter().map(|s| s.value);
        match self {
            // min_by_key keeps the first of equal keys, max_by_key the last
            MetricsSelectionStrategy::Earliest => samples
                .iter()
                .min_by_key(|s| s.epoch_nanos)
                .map(|s| s.value),
            MetricsSelectionStrategy::Latest => samples
                .iter()
                .max_by_key(|s| s.epoch_nanos)
                .map(|s| s.value),
            MetricsSelectionStrategy::Minimum => values.min(),
            MetricsSelectionStrategy::Maximum => values.max(),
            MetricsSelectionStrategy::Sum => Some(saturate(values.map(i128::from).sum())),
            MetricsSelectionStrategy::Average => {
                let sum: i128 = values.map(i128::from).sum();
                Some(saturate(sum / samples.len() as i128))
            }
        }
    }
}

pub(crate) fn saturate(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
