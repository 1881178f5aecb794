use qexpr_ast::{Expr, Lambda, MethodCall, QUERY_METADATA_METHODS, SequenceKind};
use qexpr_errors::{QexprResult, internal, invariant_eq};
use tracing::trace;

use super::QueryableMethodNormalizer;
use crate::rewrite_utils::{into_lambda, quote};

/// Returns true if `call` is an eager-loading operator whose navigation selector orders the
/// included collection in memory, such as `Include(c => c.Orders.OrderBy(o => o.Date))`
pub(super) fn is_include_with_ordering(call: &MethodCall) -> bool {
    call.method.is_generic()
        && QUERY_METADATA_METHODS
            .include_family()
            .into_iter()
            .any(|definition| call.is(definition))
        && call
            .arguments
            .get(1)
            .and_then(Expr::unwrap_lambda_from_quote)
            .is_some_and(|selector| {
                selector
                    .return_type()
                    .is_sequence_of_kind(SequenceKind::OrderedEnumerable)
            })
}

impl QueryableMethodNormalizer<'_> {
    /// Normalize the navigation selector of an eager-loading operator. Once the ordering in the
    /// selector has become a queryable ordering, the operator is re-instantiated with the new
    /// navigation type.
    pub(super) fn repair_include_ordering(&mut self, call: MethodCall) -> QexprResult<Expr> {
        let MethodCall {
            method,
            object,
            arguments,
        } = call;
        let Ok([source, selector]) = <[Expr; 2]>::try_from(arguments) else {
            internal!("Malformed call to {method}");
        };

        let quoted = matches!(selector, Expr::Quote(_));
        let source = self.visit(source)?;
        let Lambda { parameters, body } = into_lambda(selector)?;
        invariant_eq!(parameters.len(), 1, "navigation selector of {method}");
        let body = self.visit(*body)?;
        let body_ty = body.ty();

        let selector = Lambda::new(parameters, body);
        let selector = if quoted {
            quote(selector)
        } else {
            Expr::Lambda(selector)
        };

        let method = if body_ty.is_sequence_of_kind(SequenceKind::OrderedQueryable) {
            let mut generic_arguments = method.generic_arguments().to_vec();
            if let Some(navigation) = generic_arguments.last_mut() {
                *navigation = body_ty;
            }
            trace!(%method, "Re-instantiating include over ordered navigation");
            method.with_generic_arguments(generic_arguments)
        } else {
            method
        };

        Ok(Expr::Call(MethodCall {
            method,
            object,
            arguments: vec![source, selector],
        }))
    }
}
