use std::fmt;
use std::sync::Arc;

use wordfeed_core::types::ParsedExample;

/// Caller-supplied keep/drop predicate over parsed examples.
///
/// Drops are counted (`examples_filtered_total`), never logged per example
/// and never errors.
#[derive(Clone)]
pub struct ExampleFilter {
    predicate: Arc<dyn Fn(&ParsedExample) -> bool + Send + Sync>,
}

impl ExampleFilter {
    pub fn new(predicate: impl Fn(&ParsedExample) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn keeps(&self, example: &ParsedExample) -> bool {
        (self.predicate)(example)
    }

    /// Keep examples at least `minimum` pixels wide.
    pub fn min_width(minimum: i32) -> Self {
        Self::new(move |example| example.width >= minimum)
    }

    /// Keep examples at most `threshold` pixels wide.
    pub fn max_width(threshold: i32) -> Self {
        Self::new(move |example| example.width <= threshold)
    }

    /// Keep examples with at most `threshold` labels.
    pub fn max_length(threshold: i32) -> Self {
        Self::new(move |example| example.length <= threshold)
    }

    /// Conjunction; `None` when `filters` is empty.
    pub fn all(filters: Vec<ExampleFilter>) -> Option<Self> {
        if filters.is_empty() {
            return None;
        }
        Some(Self::new(move |example| {
            filters.iter().all(|f| f.keeps(example))
        }))
    }

    /// Builds the standard threshold filter from configuration fields;
    /// `None` when no threshold is set.
    pub fn from_thresholds(
        minimum_width: Option<i32>,
        width_threshold: Option<i32>,
        length_threshold: Option<i32>,
    ) -> Option<Self> {
        let mut filters = Vec::new();
        if let Some(minimum) = minimum_width {
            filters.push(Self::min_width(minimum));
        }
        if let Some(threshold) = width_threshold {
            filters.push(Self::max_width(threshold));
        }
        if let Some(threshold) = length_threshold {
            filters.push(Self::max_length(threshold));
        }
        Self::all(filters)
    }
}

impl fmt::Debug for ExampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExampleFilter(..)")
    }
}
