use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How entities returned by a query are tracked for changes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryTrackingBehavior {
    #[default]
    TrackAll,
    NoTracking,
    NoTrackingWithIdentityResolution,
}

/// State accumulated while compiling a single query.
///
/// Query metadata operators (`AsNoTracking`, `TagWith`, `IgnoreQueryFilters`, ...) are removed
/// from the expression tree during normalization and recorded here instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCompilationContext {
    pub tracking_behavior: QueryTrackingBehavior,
    /// Set by `IgnoreQueryFilters`; when true, no query filters apply
    pub ignore_query_filters: bool,
    /// Names of individual query filters to ignore, set by `IgnoreNamedQueryFilters`. `None`
    /// means no named filters are ignored.
    pub ignored_query_filters: Option<BTreeSet<String>>,
    /// Tags to attach to the generated query, in the order the operators were applied
    pub tags: Vec<String>,
    pub ignore_auto_includes: bool,
}

impl QueryCompilationContext {
    pub fn new(tracking_behavior: QueryTrackingBehavior) -> Self {
        Self {
            tracking_behavior,
            ..Default::default()
        }
    }

    pub fn add_tag<S: Into<String>>(&mut self, tag: S) {
        self.tags.push(tag.into());
    }

    /// Ignore every query filter, discarding any individually ignored filter names
    pub fn ignore_all_query_filters(&mut self) {
        self.ignored_query_filters = None;
        self.ignore_query_filters = true;
    }

    /// Ignore the named query filters in addition to any already ignored. An empty set of names
    /// has no effect.
    pub fn ignore_named_query_filters<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = names.into_iter().map(Into::into).peekable();
        if names.peek().is_some() {
            self.ignored_query_filters
                .get_or_insert_with(BTreeSet::new)
                .extend(names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_filters_union() {
        let mut context = QueryCompilationContext::default();
        context.ignore_named_query_filters(["a", "b"]);
        context.ignore_named_query_filters(["b", "c"]);
        assert_eq!(
            context.ignored_query_filters,
            Some(BTreeSet::from(["a".into(), "b".into(), "c".into()]))
        );
    }

    #[test]
    fn empty_named_filters_are_ignored() {
        let mut context = QueryCompilationContext::default();
        context.ignore_named_query_filters(Vec::<String>::new());
        assert_eq!(context.ignored_query_filters, None);
    }

    #[test]
    fn ignore_all_clears_named() {
        let mut context = QueryCompilationContext::default();
        context.ignore_named_query_filters(["a"]);
        context.ignore_all_query_filters();
        assert!(context.ignore_query_filters);
        assert_eq!(context.ignored_query_filters, None);
    }
}
