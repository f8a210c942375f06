use super::{SpanElement, SpanFilter, read_spans};
use crate::errors::Result;
use crate::metrics_defs::{SPANS_READ, SPANS_SELECTED};
use indexmap::IndexMap;
use shared::counter;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Selects the spans matching a filter together with their descendants.
///
/// Descendants are found through the parent span id. A warmup span passes the
/// flag to each of its children before the child filter is applied, so the
/// whole subtree of a warmup span is reported as warmup.
#[derive(Clone, Debug)]
pub struct SpanParser {
    span_filter: SpanFilter,
    child_filter: Option<SpanFilter>,
}

impl SpanParser {
    /// Collects every descendant of a matching span.
    pub fn new(span_filter: SpanFilter) -> Self {
        SpanParser {
            span_filter,
            child_filter: None,
        }
    }

    /// Collects only descendants accepted by `child_filter`. A rejected child
    /// is not walked, so its subtree is dropped with it.
    pub fn with_child_filter(span_filter: SpanFilter, child_filter: SpanFilter) -> Self {
        SpanParser {
            span_filter,
            child_filter: Some(child_filter),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<Vec<SpanElement>> {
        let file = File::open(path)?;
        let spans = read_spans(BufReader::new(file))?;
        Ok(self.select(spans))
    }

    /// Returns the selected spans in the order they were first reached, each
    /// span id at most once.
    pub fn select(&self, spans: Vec<SpanElement>) -> Vec<SpanElement> {
        let mut spans = spans;
        counter!(SPANS_READ).increment(spans.len() as u64);

        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, span) in spans.iter().enumerate() {
            if let Some(parent) = &span.parent_span_id {
                children.entry(parent.clone()).or_default().push(idx);
            }
        }

        // span id -> position in `spans`
        let mut selected: IndexMap<String, usize> = IndexMap::new();

        for root in 0..spans.len() {
            if !self.span_filter.filter(&spans[root]) {
                continue;
            }
            if selected.contains_key(&spans[root].span_id) {
                // Already reached from an earlier root together with its subtree.
                continue;
            }
            selected.insert(spans[root].span_id.clone(), root);

            // Depth-first, children in file order. Each frame is (span, next child).
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(frame) = stack.last_mut() {
                let (parent, pos) = *frame;
                let kids = children
                    .get(spans[parent].span_id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);

                let Some(&child) = kids.get(pos) else {
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                let warmed = spans[parent].is_warmup && !spans[child].is_warmup;
                if warmed {
                    spans[child].is_warmup = true;
                }
                if !self.accepts_child(&spans[child]) {
                    continue;
                }
                if selected.contains_key(&spans[child].span_id) {
                    // Walked before without the flag, so its subtree has to see it now.
                    // A span turns warmup at most once, so cyclic parent links still end.
                    if warmed {
                        stack.push((child, 0));
                    }
                    continue;
                }
                selected.insert(spans[child].span_id.clone(), child);
                stack.push((child, 0));
            }
        }

        tracing::debug!(
            filter = ?self.span_filter,
            total = spans.len(),
            selected = selected.len(),
            "Selected spans"
        );
        counter!(SPANS_SELECTED).increment(selected.len() as u64);

        let mut slots: Vec<Option<SpanElement>> = spans.into_iter().map(Some).collect();
        selected
            .into_values()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }

    fn accepts_child(&self, span: &SpanElement) -> bool {
        self.child_filter
            .as_ref()
            .is_none_or(|filter| filter.filter(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::testutils::{span, warmup};
    use std::io::Write;

    fn names(spans: &[SpanElement]) -> Vec<&str> {
        spans.iter().map(|s| s.name.as_str()).collect()
    }

    fn tree() -> Vec<SpanElement> {
        vec![
            span("1", None, "test", 100_000),
            span("2", Some("1"), "open", 40_000),
            span("3", Some("2"), "open.read", 10_000),
            span("4", Some("1"), "gc", 5_000),
            span("5", Some("4"), "gc.sweep", 1_000),
            span("6", None, "unrelated", 1_000),
            span("7", Some("6"), "unrelated.child", 1_000),
            span("8", Some("1"), "close", 2_000),
        ]
    }

    #[test]
    fn test_collects_all_descendants() {
        let parser = SpanParser::new(SpanFilter::name_equals("test"));
        let selected = parser.select(tree());
        assert_eq!(
            names(&selected),
            vec!["test", "open", "open.read", "gc", "gc.sweep", "close"]
        );
    }

    #[test]
    fn test_child_filter_drops_subtree() {
        let parser = SpanParser::with_child_filter(
            SpanFilter::name_equals("test"),
            SpanFilter::not(SpanFilter::name_equals("gc")),
        );
        let selected = parser.select(tree());
        assert_eq!(names(&selected), vec!["test", "open", "open.read", "close"]);
    }

    #[test]
    fn test_child_filter_not_applied_to_roots() {
        let parser =
            SpanParser::with_child_filter(SpanFilter::name_equals("test"), SpanFilter::none());
        let selected = parser.select(tree());
        assert_eq!(names(&selected), vec!["test"]);
    }

    #[test]
    fn test_warmup_propagates_to_descendants() {
        let mut spans = tree();
        spans[1] = warmup(spans[1].clone());

        let parser = SpanParser::new(SpanFilter::name_equals("test"));
        let selected = parser.select(spans);

        let warmup: Vec<(&str, bool)> = selected
            .iter()
            .map(|s| (s.name.as_str(), s.is_warmup))
            .collect();
        assert_eq!(
            warmup,
            vec![
                ("test", false),
                ("open", true),
                ("open.read", true),
                ("gc", false),
                ("gc.sweep", false),
                ("close", false),
            ]
        );
    }

    #[test]
    fn test_warmup_is_set_before_child_filter() {
        let mut spans = tree();
        spans[0] = warmup(spans[0].clone());

        let parser = SpanParser::with_child_filter(
            SpanFilter::name_equals("test"),
            SpanFilter::from_fn("warmup only", |s| s.is_warmup),
        );
        let selected = parser.select(spans);
        assert_eq!(selected.len(), 6);
        assert!(selected.iter().all(|s| s.is_warmup));
    }

    #[test]
    fn test_warmup_reaches_subtree_selected_earlier() {
        let spans = vec![
            span("x", Some("p"), "child", 1_000),
            span("y", Some("x"), "grandchild", 1_000),
            warmup(span("p", None, "parent", 1_000)),
        ];
        let parser = SpanParser::new(SpanFilter::any());
        let selected = parser.select(spans);

        let warmup: Vec<(&str, bool)> = selected
            .iter()
            .map(|s| (s.name.as_str(), s.is_warmup))
            .collect();
        assert_eq!(
            warmup,
            vec![("child", true), ("grandchild", true), ("parent", true)]
        );
    }

    #[test]
    fn test_warmup_cycle_terminates() {
        let spans = vec![
            span("a", Some("b"), "loop", 1_000),
            warmup(span("b", Some("a"), "loop.child", 1_000)),
        ];
        let parser = SpanParser::new(SpanFilter::any());
        let selected = parser.select(spans);
        assert_eq!(names(&selected), vec!["loop", "loop.child"]);
        assert!(selected.iter().all(|s| s.is_warmup));
    }

    #[test]
    fn test_multiple_roots_are_not_duplicated() {
        let parser = SpanParser::new(SpanFilter::name_in_list(["test", "open"]));
        let selected = parser.select(tree());
        assert_eq!(
            names(&selected),
            vec!["test", "open", "open.read", "gc", "gc.sweep", "close"]
        );
    }

    #[test]
    fn test_cycles_terminate() {
        let spans = vec![
            span("a", Some("b"), "loop", 1_000),
            span("b", Some("a"), "loop.child", 1_000),
            span("c", Some("c"), "self", 1_000),
        ];
        let parser = SpanParser::new(SpanFilter::any());
        let selected = parser.select(spans);
        assert_eq!(names(&selected), vec!["loop", "loop.child", "self"]);
    }

    #[test]
    fn test_deep_tree() {
        let depth = 200_000;
        let mut spans = vec![span("0", None, "root", 1)];
        for i in 1..depth {
            spans.push(span(&i.to_string(), Some(&(i - 1).to_string()), "nested", 1));
        }
        let parser = SpanParser::new(SpanFilter::name_equals("root"));
        assert_eq!(parser.select(spans).len(), depth);
    }

    #[test]
    fn test_no_match() {
        let parser = SpanParser::new(SpanFilter::name_equals("missing"));
        assert!(parser.select(tree()).is_empty());
        assert!(parser.select(Vec::new()).is_empty());
    }

    #[test]
    fn test_parse_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{"data": [{{"spans": [
                {{"spanID": "1", "operationName": "test", "duration": 3000}},
                {{"spanID": "2", "operationName": "step", "duration": 1000,
                  "references": [{{"refType": "CHILD_OF", "spanID": "1"}}]}}
            ]}}]}}"#
        )
        .unwrap();

        let parser = SpanParser::new(SpanFilter::name_equals("test"));
        let selected = parser.parse_file(tmp.path()).unwrap();
        assert_eq!(names(&selected), vec!["test", "step"]);

        let missing = parser.parse_file(Path::new("/nonexistent/spans.json"));
        assert!(missing.is_err());
    }
}
