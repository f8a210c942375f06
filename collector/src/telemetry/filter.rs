use super::SpanElement;
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&SpanElement) -> bool + Send + Sync;

/// A cloneable predicate over spans.
#[derive(Clone)]
pub struct SpanFilter {
    predicate: Arc<Predicate>,
    description: String,
}

impl SpanFilter {
    pub fn from_fn<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SpanElement) -> bool + Send + Sync + 'static,
    {
        SpanFilter {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    pub fn any() -> Self {
        Self::from_fn("any", |_| true)
    }

    pub fn none() -> Self {
        Self::from_fn("none", |_| false)
    }

    pub fn name_equals(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::from_fn(format!("name == {name:?}"), move |span| span.name == name)
    }

    pub fn name_contains(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        Self::from_fn(format!("name contains {fragment:?}"), move |span| {
            span.name.contains(&fragment)
        })
    }

    pub fn name_in_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self::from_fn(format!("name in {names:?}"), move |span| {
            names.iter().any(|n| *n == span.name)
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: SpanFilter) -> Self {
        let description = format!("not ({})", filter.description);
        Self::from_fn(description, move |span| !filter.filter(span))
    }

    pub fn and(self, other: SpanFilter) -> Self {
        let description = format!("({}) and ({})", self.description, other.description);
        Self::from_fn(description, move |span| {
            self.filter(span) && other.filter(span)
        })
    }

    pub fn filter(&self, span: &SpanElement) -> bool {
        (self.predicate)(span)
    }
}

impl fmt::Debug for SpanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SpanFilter").field(&self.description).finish()
    }
}
