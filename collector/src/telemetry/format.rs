//! Reader for the Jaeger-style JSON document the IDE exporter writes:
//!
//! ```json
//! {"data": [{"traceID": "..", "spans": [{"traceID": "..", "spanID": "..",
//!   "operationName": "..", "references": [{"refType": "CHILD_OF", "spanID": ".."}],
//!   "startTime": 1700000000000000, "duration": 1500,
//!   "tags": [{"key": "warmup", "type": "bool", "value": true}]}]}]}
//! ```

use super::SpanElement;
use crate::errors::Result;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;

const CHILD_OF: &str = "CHILD_OF";
const WARMUP_TAG: &str = "warmup";

#[derive(Deserialize)]
struct ExportDocument {
    #[serde(default)]
    data: Vec<TraceRecord>,
}

#[derive(Deserialize)]
struct TraceRecord {
    #[serde(default)]
    spans: Vec<SpanRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpanRecord {
    #[serde(rename = "traceID", default)]
    trace_id: String,
    #[serde(rename = "spanID")]
    span_id: String,
    operation_name: String,
    #[serde(default)]
    references: Vec<ReferenceRecord>,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    tags: Vec<TagRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceRecord {
    ref_type: String,
    #[serde(rename = "spanID")]
    span_id: String,
}

#[derive(Deserialize)]
struct TagRecord {
    key: String,
    #[serde(default)]
    value: Value,
}

impl SpanRecord {
    fn into_span_element(self) -> SpanElement {
        let parent_span_id = self
            .references
            .into_iter()
            .find(|r| r.ref_type == CHILD_OF)
            .map(|r| r.span_id);

        let tags: Vec<(String, String)> = self
            .tags
            .into_iter()
            .map(|t| {
                let value = match t.value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (t.key, value)
            })
            .collect();

        let is_warmup = tags.iter().any(|(k, v)| k == WARMUP_TAG && v == "true");

        SpanElement {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id,
            name: self.operation_name,
            start_micros: self.start_time,
            duration_micros: self.duration,
            tags,
            is_warmup,
        }
    }
}

/// Flattens every trace in the document into one list, in file order.
pub fn read_spans<R: Read>(reader: R) -> Result<Vec<SpanElement>> {
    let document: ExportDocument = serde_json::from_reader(reader)?;

    Ok(document
        .data
        .into_iter()
        .flat_map(|trace| trace.spans)
        .map(SpanRecord::into_span_element)
        .collect())
}
