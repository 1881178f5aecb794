use std::sync::Arc;

use qexpr_ast::{Expr, Literal, Method, MethodCall, MethodDef, QUERY_METADATA_METHODS};
use qexpr_errors::{QexprResult, internal, internal_err, invariant};
use tracing::debug;

use super::QueryableMethodNormalizer;
use crate::QueryTrackingBehavior;

/// Operators that only annotate a query. They are removed from the tree, and their effect is
/// recorded in the compilation context instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum QueryMetadataOperator {
    AsTracking,
    AsNoTracking,
    AsNoTrackingWithIdentityResolution,
    TagWith,
    TagWithCallSite,
    IgnoreQueryFilters,
    IgnoreNamedQueryFilters,
    IgnoreAutoIncludes,
}

impl QueryMetadataOperator {
    fn definitions() -> [(&'static Arc<MethodDef>, Self); 8] {
        use QueryMetadataOperator::*;
        let methods = &*QUERY_METADATA_METHODS;
        [
            (&methods.as_tracking, AsTracking),
            (&methods.as_no_tracking, AsNoTracking),
            (
                &methods.as_no_tracking_with_identity_resolution,
                AsNoTrackingWithIdentityResolution,
            ),
            (&methods.tag_with, TagWith),
            (&methods.tag_with_call_site, TagWithCallSite),
            (&methods.ignore_query_filters, IgnoreQueryFilters),
            (&methods.ignore_named_query_filters, IgnoreNamedQueryFilters),
            (&methods.ignore_auto_includes, IgnoreAutoIncludes),
        ]
    }

    /// Classify `call`, returning `None` for calls that aren't query metadata operators
    pub(super) fn of(call: &MethodCall) -> Option<Self> {
        Self::definitions()
            .into_iter()
            .find_map(|(definition, operator)| call.is(definition).then_some(operator))
    }
}

fn string_argument(method: &Method, argument: Option<&Expr>) -> QexprResult<String> {
    match argument {
        Some(Expr::Constant {
            value: Literal::String(value),
            ..
        }) => Ok(value.clone()),
        Some(argument) => {
            internal!("Expected a string constant as argument to {method}, got {argument}")
        }
        None => internal!("Missing argument to {method}"),
    }
}

fn integer_argument(method: &Method, argument: Option<&Expr>) -> QexprResult<i64> {
    match argument {
        Some(Expr::Constant {
            value: Literal::Integer(value),
            ..
        }) => Ok(*value),
        Some(argument) => {
            internal!("Expected an integer constant as argument to {method}, got {argument}")
        }
        None => internal!("Missing argument to {method}"),
    }
}

/// Read a constant collection of strings. A null collection is treated as empty.
fn string_list_argument(method: &Method, argument: Option<&Expr>) -> QexprResult<Vec<String>> {
    match argument {
        Some(Expr::Constant {
            value: Literal::Null,
            ..
        }) => Ok(vec![]),
        Some(Expr::Constant {
            value: Literal::List(values),
            ..
        }) => values
            .iter()
            .map(|value| match value {
                Literal::String(s) => Ok(s.clone()),
                value => Err(internal_err!(
                    "Expected a string in argument to {method}, got {value}"
                )),
            })
            .collect(),
        Some(argument) => {
            internal!("Expected a constant collection as argument to {method}, got {argument}")
        }
        None => internal!("Missing argument to {method}"),
    }
}

impl QueryableMethodNormalizer<'_> {
    /// Replace a query metadata call with its (normalized) source, recording its effect in the
    /// compilation context.
    ///
    /// The source is visited before the effect is applied, so that effects are recorded in the
    /// order the operators are applied to the query.
    pub(super) fn extract_query_metadata(
        &mut self,
        operator: QueryMetadataOperator,
        call: MethodCall,
    ) -> QexprResult<Expr> {
        let MethodCall {
            method,
            mut arguments,
            ..
        } = call;
        invariant!(!arguments.is_empty(), "{method} called without a source");
        let source = self.visit(arguments.remove(0))?;
        let mut constants = arguments.iter();

        debug!(%method, "Extracting query metadata");
        match operator {
            QueryMetadataOperator::AsTracking => {
                self.context.tracking_behavior = QueryTrackingBehavior::TrackAll;
            }
            QueryMetadataOperator::AsNoTracking => {
                self.context.tracking_behavior = QueryTrackingBehavior::NoTracking;
            }
            QueryMetadataOperator::AsNoTrackingWithIdentityResolution => {
                self.context.tracking_behavior =
                    QueryTrackingBehavior::NoTrackingWithIdentityResolution;
            }
            QueryMetadataOperator::TagWith => {
                let tag = string_argument(&method, constants.next())?;
                self.context.add_tag(tag);
            }
            QueryMetadataOperator::TagWithCallSite => {
                let file = string_argument(&method, constants.next())?;
                let line = integer_argument(&method, constants.next())?;
                self.context.add_tag(format!("File: {file}:{line}"));
            }
            QueryMetadataOperator::IgnoreQueryFilters => self.context.ignore_all_query_filters(),
            QueryMetadataOperator::IgnoreNamedQueryFilters => {
                let names = string_list_argument(&method, constants.next())?;
                self.context.ignore_named_query_filters(names);
            }
            QueryMetadataOperator::IgnoreAutoIncludes => self.context.ignore_auto_includes = true,
        }

        Ok(source)
    }
}
