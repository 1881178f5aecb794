//! The main bottom-up normalization pass over queryable method calls.
//!
//! Every rule lives in its own submodule as an `impl` block on [`QueryableMethodNormalizer`];
//! this module holds the dispatch. Nodes synthesized by a rule (such as the `ElementAt` call an
//! array index desugars to) are dispatched through [`QueryableMethodNormalizer::normalize_call`]
//! again, so every rule applies to them as well.

mod enumerable_to_queryable;
mod group_join_flattening;
mod include_ordering;
mod parameter_hints;
mod query_metadata;

use qexpr_ast::analysis::visit_mut::{self, VisitorMut};
use qexpr_ast::{
    BinaryOperator, ENUMERABLE_METHODS, Expr, Lambda, Method, MethodCall, MethodFamily,
    ParameterGenerator, QUERYABLE_METHODS, SequenceInterface, Type, UnaryOperator,
};
use qexpr_errors::{QexprError, QexprResult, internal};
use tracing::trace;

use crate::materialization::verify_return_type;
use crate::rewrite_utils::{is_zero_constant, quote};
use crate::{NormalizeParams, QueryCompilationContext};

pub(crate) struct QueryableMethodNormalizer<'a> {
    context: &'a mut QueryCompilationContext,
    params: NormalizeParams,
    /// Source of parameters for lambdas synthesized by the rewrites
    parameters: ParameterGenerator,
}

impl<'a> QueryableMethodNormalizer<'a> {
    pub(crate) fn new(
        context: &'a mut QueryCompilationContext,
        params: NormalizeParams,
        parameters: ParameterGenerator,
    ) -> Self {
        Self {
            context,
            params,
            parameters,
        }
    }

    /// Normalize an owned expression
    fn visit(&mut self, mut expr: Expr) -> QexprResult<Expr> {
        self.visit_expr(&mut expr)?;
        Ok(expr)
    }

    /// Normalize the receiver and arguments of `call`, leaving the call itself unchanged
    fn walk_call(&mut self, mut call: MethodCall) -> QexprResult<Expr> {
        visit_mut::walk_method_call(self, &mut call)?;
        Ok(Expr::Call(call))
    }

    fn normalize_call(&mut self, call: MethodCall) -> QexprResult<Expr> {
        if *call.method.family() == MethodFamily::QueryMetadata
            && call.method.is_generic()
            && let Some(operator) = query_metadata::QueryMetadataOperator::of(&call)
        {
            return self.extract_query_metadata(operator, call);
        }

        if let Some(mode) = parameter_hints::translation_mode(&call) {
            return self.apply_parameter_hint(mode, call);
        }

        if let Some(element) = list_indexer_element_type(&call) {
            let MethodCall {
                object, arguments, ..
            } = call;
            let Some(receiver) = object else {
                internal!("Indexer called without a receiver");
            };
            trace!("Rewriting list indexer to ElementAt");
            return self.normalize_call(MethodCall {
                method: Method::generic(&ENUMERABLE_METHODS.element_at, vec![element]),
                object: None,
                arguments: [*receiver].into_iter().chain(arguments).collect(),
            });
        }

        let visited = if *call.method.family() == MethodFamily::Enumerable {
            self.convert_enumerable_to_queryable(call)?
        } else if enumerable_to_queryable::is_collection_contains(&call) {
            self.convert_collection_contains(call)?
        } else if include_ordering::is_include_with_ordering(&call) {
            return self.repair_include_ordering(call);
        } else {
            if call.is(&QUERYABLE_METHODS.select)
                && let Some(selector) = call.arguments.get(1).and_then(Expr::unwrap_lambda_from_quote)
                && let [parameter] = selector.parameters.as_slice()
            {
                verify_return_type(&selector.body, parameter)?;
            }
            self.walk_call(call)?
        };

        match visited {
            Expr::Call(call) if call.is_generic_queryable() => {
                let call = self.normalize_order(call)?;
                self.try_flatten_group_join(call)
            }
            expr => Ok(expr),
        }
    }

    /// Rewrite `Order(source)` and `OrderDescending(source)` into `OrderBy(source, p => p)` and
    /// `OrderByDescending(source, p => p)`
    fn normalize_order(&mut self, call: MethodCall) -> QexprResult<MethodCall> {
        let ordering = if call.is(&QUERYABLE_METHODS.order) {
            &QUERYABLE_METHODS.order_by
        } else if call.is(&QUERYABLE_METHODS.order_descending) {
            &QUERYABLE_METHODS.order_by_descending
        } else {
            return Ok(call);
        };

        let MethodCall {
            method, arguments, ..
        } = call;
        let (Some(element), Ok([source])) = (
            method.generic_arguments().first().cloned(),
            <[Expr; 1]>::try_from(arguments),
        ) else {
            internal!("Malformed call to {method}");
        };

        trace!(%method, "Normalizing implicit ordering");
        let parameter = self.parameters.fresh("p", element.clone());
        let key_selector = quote(Lambda::new(vec![parameter.clone()], parameter.into()));
        Ok(MethodCall {
            method: Method::generic(ordering, vec![element.clone(), element]),
            object: None,
            arguments: vec![source, key_selector],
        })
    }
}

/// If `call` reads an element through the indexer of a read-only list, returns the element type
fn list_indexer_element_type(call: &MethodCall) -> Option<Type> {
    if call.method.name() != "get_Item" || call.method.is_static() || call.arguments.len() != 1 {
        return None;
    }
    call.method
        .declaring_type()?
        .element_type_of(SequenceInterface::ReadOnlyList)?;
    call.object.as_ref()?.ty().sequence_type().cloned()
}

/// Desugar comparisons the downstream translator doesn't understand into calls:
///
/// - `source[index]` becomes `source.ElementAt(index)`
/// - `collection.Count > 0` and `collection.Count != 0` become `collection.Any()`
/// - `array.Length > 0` and `array.Length != 0` become `array.Any()`
fn desugar_binary(expr: &Expr) -> Option<MethodCall> {
    let Expr::BinaryOp { lhs, op, rhs } = expr else {
        return None;
    };

    if *op == BinaryOperator::ArrayIndex {
        let element = lhs.ty().sequence_type()?.clone();
        return Some(MethodCall {
            method: Method::generic(&ENUMERABLE_METHODS.element_at, vec![element]),
            object: None,
            arguments: vec![(**lhs).clone(), (**rhs).clone()],
        });
    }

    if !matches!(op, BinaryOperator::Greater | BinaryOperator::NotEqual) || !is_zero_constant(rhs)
    {
        return None;
    }

    let source = match &**lhs {
        Expr::Member {
            expr: Some(source),
            member,
        } if member.name == "Count"
            && member
                .declaring_type
                .element_type_of(SequenceInterface::Collection)
                .is_some() =>
        {
            source
        }
        Expr::UnaryOp {
            op: UnaryOperator::ArrayLength,
            operand,
        } => operand,
        _ => return None,
    };

    let element = source.ty().sequence_type()?.clone();
    Some(MethodCall {
        method: Method::generic(&ENUMERABLE_METHODS.any_without_predicate, vec![element]),
        object: None,
        arguments: vec![(**source).clone()],
    })
}

impl VisitorMut for QueryableMethodNormalizer<'_> {
    type Error = QexprError;

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
        match expr {
            Expr::Call(_) => {
                let Expr::Call(call) = expr.take() else {
                    internal!();
                };
                *expr = self.normalize_call(call)?;
                Ok(())
            }
            Expr::BinaryOp { .. } => match desugar_binary(expr) {
                Some(call) => {
                    *expr = self.normalize_call(call)?;
                    Ok(())
                }
                None => visit_mut::walk_expr(self, expr),
            },
            _ => visit_mut::walk_expr(self, expr),
        }
    }
}
