//! Normalization of query expression trees.
//!
//! [`NormalizeQueryableMethods::normalize`] canonicalizes a tree of query operators into the
//! restricted vocabulary understood by query translation: in-memory (`Enumerable`) operators over
//! query sources become their `Queryable` counterparts, syntactic sugar such as `array[i]` and
//! `list.Count > 0` is desugared into operator calls, annotation operators (`AsNoTracking`,
//! `TagWith`, ...) are removed and recorded in the [`QueryCompilationContext`], and grouped joins
//! are flattened into joins or converted into correlated projections.
//!
//! Normalization runs as two passes: a bottom-up rewrite of every call, followed by a top-down
//! conversion of the `GroupJoin` calls that couldn't be flattened.

mod compilation_context;
mod correlation;
mod group_join_conversion;
mod materialization;
mod normalizer;
mod rewrite_utils;

use qexpr_ast::analysis::ContainsCalls;
use qexpr_ast::analysis::visit_mut::VisitorMut;
use qexpr_ast::{Expr, ParameterGenerator, QUERYABLE_METHODS};
use qexpr_errors::QexprResult;
use serde::{Deserialize, Serialize};
use tracing::{trace, trace_span};

pub use crate::compilation_context::{QueryCompilationContext, QueryTrackingBehavior};
use crate::group_join_conversion::GroupJoinConverter;
use crate::normalizer::QueryableMethodNormalizer;

/// Capabilities of the query provider that affect normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeParams {
    /// Whether the provider can inline parameter values as constants, as requested with
    /// `EF.Constant`. If not, normalizing a query using `EF.Constant` fails.
    pub supports_constant_parameters: bool,
}

/// Extension trait providing the ability to normalize a query expression tree
pub trait NormalizeQueryableMethods: Sized {
    /// Normalize this query, recording the effect of any query metadata operators in `context`
    fn normalize(
        self,
        context: &mut QueryCompilationContext,
        params: NormalizeParams,
    ) -> QexprResult<Self>;
}

impl NormalizeQueryableMethods for Expr {
    fn normalize(
        mut self,
        context: &mut QueryCompilationContext,
        params: NormalizeParams,
    ) -> QexprResult<Self> {
        let span = trace_span!("normalize_queryable_methods").entered();
        trace!(query_pre = %self, "Normalizing query");

        let parameters = ParameterGenerator::following(&self);
        QueryableMethodNormalizer::new(context, params, parameters).visit_expr(&mut self)?;
        trace!(parent: &span, pass = "normalize_queryable_methods", query = %self);
        if self.contains_call_to(&QUERYABLE_METHODS.group_join) {
            GroupJoinConverter.visit_expr(&mut self)?;
            trace!(parent: &span, pass = "convert_group_joins", query = %self);
        }

        trace!(query_post = %self, "Query normalized");
        Ok(self)
    }
}
