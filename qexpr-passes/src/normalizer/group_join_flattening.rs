//! Flattening of `SelectMany` over `GroupJoin` into `Join` or `LeftJoin`.
//!
//! A grouped join whose groups are immediately flattened again, such as
//!
//! ```text
//! customers.GroupJoin(orders, c => c.Id, o => o.CustomerId, (c, g) => new { c, g })
//!     .SelectMany(x => x.g.DefaultIfEmpty(), (x, o) => new { x.c, o })
//! ```
//!
//! is the query syntax spelling of a (left) join. When the collection selector only filters the
//! group, the filter is applied to the inner sequence instead and the pair is replaced with a
//! single join operator.

use qexpr_ast::{Expr, Lambda, Method, MethodCall, Parameter, QUERYABLE_METHODS};
use qexpr_errors::QexprResult;
use tracing::debug;

use super::QueryableMethodNormalizer;
use crate::correlation::is_correlated;
use crate::rewrite_utils::{quote, replace_parameter, strip_redundant_as_queryable};

/// If `body` ends in `DefaultIfEmpty()`, returns its source and `true`
fn strip_default_if_empty(body: &Expr) -> (&Expr, bool) {
    match body {
        Expr::Call(call)
            if call.is(&QUERYABLE_METHODS.default_if_empty_without_argument)
                && call.method.is_generic() =>
        {
            match call.arguments.first() {
                Some(source) => (source, true),
                None => (body, false),
            }
        }
        _ => (body, false),
    }
}

/// The pieces of a five-argument `GroupJoin` call
struct GroupJoinParts<'a> {
    method: &'a Method,
    outer: &'a Expr,
    inner: &'a Expr,
    outer_key_selector: &'a Expr,
    inner_key_selector: &'a Lambda,
    inner_key_selector_arg: &'a Expr,
    result_selector: &'a Lambda,
}

impl<'a> GroupJoinParts<'a> {
    fn of(expr: &'a Expr) -> Option<Self> {
        let call = expr.as_call()?;
        if !call.is(&QUERYABLE_METHODS.group_join) {
            return None;
        }
        let [outer, inner, outer_key_selector, inner_key_selector, result_selector] =
            call.arguments.as_slice()
        else {
            return None;
        };
        outer_key_selector.unwrap_lambda_from_quote()?;
        Some(Self {
            method: &call.method,
            outer,
            inner,
            outer_key_selector,
            inner_key_selector: inner_key_selector.unwrap_lambda_from_quote()?,
            inner_key_selector_arg: inner_key_selector,
            result_selector: result_selector.unwrap_lambda_from_quote()?,
        })
    }

    /// The parameter of the result selector bound to each group
    fn group_parameter(&self) -> Option<&'a Parameter> {
        self.result_selector.parameters.get(1)
    }

    /// Build `Join` (or `LeftJoin`) with this group join's sources and key selectors
    fn into_join(self, inner: Expr, result_selector: Lambda, left: bool) -> Expr {
        let mut generic_arguments = self.method.generic_arguments().to_vec();
        if let Some(result) = generic_arguments.last_mut() {
            *result = result_selector.return_type();
        }
        let definition = if left {
            &QUERYABLE_METHODS.left_join
        } else {
            &QUERYABLE_METHODS.join
        };
        Expr::call(
            Method::generic(definition, generic_arguments),
            vec![
                self.outer.clone(),
                inner,
                self.outer_key_selector.clone(),
                self.inner_key_selector_arg.clone(),
                quote(result_selector),
            ],
        )
    }
}

impl QueryableMethodNormalizer<'_> {
    /// Replace `SelectMany` over an uncorrelated `GroupJoin` with a flat join. Any other call is
    /// returned unchanged.
    pub(super) fn try_flatten_group_join(&mut self, call: MethodCall) -> QexprResult<Expr> {
        let flattened = if call.is(&QUERYABLE_METHODS.select_many_with_collection_selector) {
            self.flatten_with_collection_selector(&call)?
        } else if call.is(&QUERYABLE_METHODS.select_many_without_collection_selector) {
            self.flatten_without_collection_selector(&call)?
        } else {
            None
        };
        Ok(flattened.unwrap_or(Expr::Call(call)))
    }

    /// `GroupJoin(...).SelectMany(x => <collection>, (x, i) => <result>)`
    fn flatten_with_collection_selector(
        &mut self,
        select_many: &MethodCall,
    ) -> QexprResult<Option<Expr>> {
        let [source, collection_selector, result_selector] = select_many.arguments.as_slice()
        else {
            return Ok(None);
        };
        let (Some(group_join), Some(collection_selector), Some(result_selector)) = (
            GroupJoinParts::of(source),
            collection_selector.unwrap_lambda_from_quote(),
            result_selector.unwrap_lambda_from_quote(),
        ) else {
            return Ok(None);
        };
        let (Some(group), [collection_parameter], [result_parameter, element_parameter]) = (
            group_join.group_parameter(),
            collection_selector.parameters.as_slice(),
            result_selector.parameters.as_slice(),
        ) else {
            return Ok(None);
        };

        let (collection, left) = strip_default_if_empty(&collection_selector.body);
        let collection = replace_parameter(
            collection.clone(),
            collection_parameter.id,
            &group_join.result_selector.body,
        );
        if is_correlated(&collection, group.id) {
            debug!("Collection selector is correlated, keeping GroupJoin");
            return Ok(None);
        }

        let inner = self.visit(replace_parameter(collection, group.id, group_join.inner))?;
        let inner = strip_redundant_as_queryable(inner);

        let Some(outer_parameter) = group_join.result_selector.parameters.first() else {
            return Ok(None);
        };
        let result_selector = Lambda::new(
            vec![outer_parameter.clone(), element_parameter.clone()],
            replace_parameter(
                (*result_selector.body).clone(),
                result_parameter.id,
                &group_join.result_selector.body,
            ),
        );

        debug!(left, "Flattening GroupJoin with collection selector");
        Ok(Some(group_join.into_join(inner, result_selector, left)))
    }

    /// `GroupJoin(..., (o, g) => <collection>).SelectMany(x => <collection of x>)`
    fn flatten_without_collection_selector(
        &mut self,
        select_many: &MethodCall,
    ) -> QexprResult<Option<Expr>> {
        let [source, selector] = select_many.arguments.as_slice() else {
            return Ok(None);
        };
        let (Some(group_join), Some(selector)) =
            (GroupJoinParts::of(source), selector.unwrap_lambda_from_quote())
        else {
            return Ok(None);
        };
        let (Some(group), Some(outer_parameter), [selector_parameter], [inner_key_parameter]) = (
            group_join.group_parameter(),
            group_join.result_selector.parameters.first(),
            selector.parameters.as_slice(),
            group_join.inner_key_selector.parameters.as_slice(),
        ) else {
            return Ok(None);
        };

        let (collection, left) = strip_default_if_empty(&group_join.result_selector.body);
        if is_correlated(collection, group.id) {
            debug!("Group selector is correlated, keeping GroupJoin");
            return Ok(None);
        }

        let inner = replace_parameter(collection.clone(), group.id, group_join.inner);
        let inner = replace_parameter((*selector.body).clone(), selector_parameter.id, &inner);
        let inner = self.visit(inner)?;

        let element = self
            .parameters
            .fresh(inner_key_parameter.name.clone(), inner_key_parameter.ty.clone());
        let result_selector = Lambda::new(
            vec![outer_parameter.clone(), element.clone()],
            element.into(),
        );

        debug!(left, "Flattening GroupJoin without collection selector");
        Ok(Some(group_join.into_join(inner, result_selector, left)))
    }
}
