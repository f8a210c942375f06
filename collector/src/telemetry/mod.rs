//! Span telemetry exported by the IDE's OpenTelemetry tracer.

mod filter;
mod format;
mod parser;

pub use filter::SpanFilter;
pub use format::read_spans;
pub use parser::SpanParser;

/// A single span, flattened out of the export file.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanElement {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_micros: i64,
    pub duration_micros: i64,
    pub tags: Vec<(String, String)>,
    /// Recorded during warm-up. Inherited by every descendant once the span
    /// is walked by a [`SpanParser`].
    pub is_warmup: bool,
}

impl SpanElement {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn duration_millis(&self) -> i64 {
        self.duration_micros / 1000
    }
}
