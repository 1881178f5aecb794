//! Conversion of the `GroupJoin` operators left over after normalization into a correlated
//! projection: `outer.Select(o => <result selector with inner.Where(<key match>) as the group>)`.

use itertools::Itertools;
use qexpr_ast::analysis::visit_mut::{self, VisitorMut};
use qexpr_ast::{ENUMERABLE_METHODS, Expr, Lambda, MethodCall, QUERYABLE_METHODS, SequenceKind};
use qexpr_errors::{QexprError, QexprResult, internal, invariant_eq};
use tracing::debug;

use crate::rewrite_utils::{
    and_also, call_generic, ensure_queryable, equal, into_lambda, not_null, quote,
    replace_parameter,
};

/// Rewrites every `Queryable.GroupJoin` call in a tree, outermost first.
pub(crate) struct GroupJoinConverter;

impl VisitorMut for GroupJoinConverter {
    type Error = QexprError;

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
        if let Expr::Call(call) = expr
            && call.is(&QUERYABLE_METHODS.group_join)
        {
            *expr = convert_group_join(call)?;
        }
        visit_mut::walk_expr(self, expr)
    }
}

/// The predicate matching an inner element to the outer element: `outer != null && outer ==
/// inner`, or for composite keys built with `new { ... }`, the same over each component.
fn correlation_predicate(outer_key: &Expr, inner_key: &Expr) -> Expr {
    if let (Expr::New(outer), Expr::New(inner)) = (outer_key, inner_key)
        && outer.arguments.len() == inner.arguments.len()
        && let Some(not_null_checks) = outer
            .arguments
            .iter()
            .map(|component| not_null(component.clone()))
            .reduce(and_also)
        && let Some(equalities) = outer
            .arguments
            .iter()
            .zip(&inner.arguments)
            .map(|(outer, inner)| equal(outer.clone(), inner.clone()))
            .reduce(and_also)
    {
        return and_also(not_null_checks, equalities);
    }

    and_also(
        not_null(outer_key.clone()),
        equal(outer_key.clone(), inner_key.clone()),
    )
}

/// Convert `outer.GroupJoin(inner, outerKey, innerKey, (o, g) => result)` into
/// `outer.Select(o => result[g := inner.Where(i => outerKey(o) == innerKey(i))])`
pub(crate) fn convert_group_join(call: &MethodCall) -> QexprResult<Expr> {
    let generic_arguments = call.method.generic_arguments();
    let Some((outer_element, inner_element, _, result)) =
        generic_arguments.iter().cloned().collect_tuple()
    else {
        internal!("Malformed call to {}", call.method);
    };
    let Ok([outer, inner, outer_key_selector, inner_key_selector, result_selector]) =
        <[Expr; 5]>::try_from(call.arguments.clone())
    else {
        internal!("Malformed call to {}", call.method);
    };

    let outer_key_selector = into_lambda(outer_key_selector)?;
    let inner_key_selector = into_lambda(inner_key_selector)?;
    let Lambda {
        parameters: result_parameters,
        body: result_body,
    } = into_lambda(result_selector)?;
    invariant_eq!(
        outer_key_selector.parameters.len(),
        1,
        "outer key selector of {}",
        call.method
    );
    invariant_eq!(result_parameters.len(), 2, "result selector of {}", call.method);
    let outer_key_parameter = &outer_key_selector.parameters[0];
    let (outer_parameter, group_parameter) = (&result_parameters[0], &result_parameters[1]);

    let predicate = replace_parameter(
        correlation_predicate(&outer_key_selector.body, &inner_key_selector.body),
        outer_key_parameter.id,
        &outer_parameter.clone().into(),
    );
    let group = call_generic(
        &QUERYABLE_METHODS.where_,
        vec![inner_element],
        vec![
            ensure_queryable(inner),
            quote(Lambda::new(inner_key_selector.parameters, predicate)),
        ],
    );

    let mut selector = replace_parameter(*result_body, group_parameter.id, &group);
    if result.is_sequence_of_kind(SequenceKind::Enumerable)
        && let Some(element) = result.sequence_type()
    {
        selector = call_generic(
            &ENUMERABLE_METHODS.as_enumerable,
            vec![element.clone()],
            vec![selector],
        );
    }

    debug!(method = %call.method, "Converting GroupJoin to correlated Select");
    Ok(call_generic(
        &QUERYABLE_METHODS.select,
        vec![outer_element, result],
        vec![
            outer,
            quote(Lambda::new(vec![outer_parameter.clone()], selector)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use qexpr_ast::{Literal, NewExpr, Parameter, Type};

    use super::*;

    fn customer() -> Type {
        Type::entity("Customer")
    }

    fn order() -> Type {
        Type::entity("Order")
    }

    fn root(name: &str, element: Type) -> Expr {
        Expr::constant(
            Literal::Reference(format!("DbSet<{name}>()")),
            Type::queryable(element),
        )
    }

    fn convert(mut expr: Expr) -> QexprResult<Expr> {
        GroupJoinConverter.visit_expr(&mut expr)?;
        Ok(expr)
    }

    fn member(parameter: &Parameter, name: &str, ty: Type) -> Expr {
        Expr::member(Expr::from(parameter), name, ty)
    }

    #[test]
    fn group_join_becomes_correlated_select() {
        let c = Parameter::new(0, "c", customer());
        let o = Parameter::new(1, "o", order());
        let rc = Parameter::new(2, "rc", customer());
        let g = Parameter::new(3, "g", Type::enumerable(order()));
        let result = NewExpr::anonymous([("c", Expr::from(&rc)), ("g", Expr::from(&g))]);
        let result_ty = result.ty.clone();
        let outer_key = Expr::quoted_lambda(vec![c.clone()], member(&c, "Id", Type::int()));
        let inner_key = Expr::quoted_lambda(
            vec![o.clone()],
            member(&o, "CustomerId", Type::int()),
        );
        let group_join = call_generic(
            &QUERYABLE_METHODS.group_join,
            vec![customer(), order(), Type::int(), result_ty.clone()],
            vec![
                root("Customer", customer()),
                root("Order", order()),
                outer_key,
                inner_key,
                Expr::quoted_lambda(vec![rc.clone(), g.clone()], Expr::New(result)),
            ],
        );

        let predicate = and_also(
            not_null(member(&rc, "Id", Type::int())),
            equal(member(&rc, "Id", Type::int()), member(&o, "CustomerId", Type::int())),
        );
        let group = call_generic(
            &QUERYABLE_METHODS.where_,
            vec![order()],
            vec![
                root("Order", order()),
                Expr::quoted_lambda(vec![o.clone()], predicate),
            ],
        );
        let expected = call_generic(
            &QUERYABLE_METHODS.select,
            vec![customer(), result_ty.clone()],
            vec![
                root("Customer", customer()),
                Expr::quoted_lambda(
                    vec![rc.clone()],
                    Expr::New(NewExpr {
                        ty: result_ty.clone(),
                        arguments: vec![Expr::from(&rc), group],
                        members: Some(vec!["c".into(), "g".into()]),
                    }),
                ),
            ],
        );

        assert_eq!(convert(group_join).unwrap(), expected);
    }

    #[test]
    fn composite_keys_compare_componentwise() {
        let c = Parameter::new(0, "c", customer());
        let o = Parameter::new(1, "o", order());
        let outer_key = Expr::New(NewExpr::anonymous([
            ("A", member(&c, "A", Type::int())),
            ("B", member(&c, "B", Type::string())),
        ]));
        let inner_key = Expr::New(NewExpr::anonymous([
            ("A", member(&o, "A", Type::int())),
            ("B", member(&o, "B", Type::string())),
        ]));

        assert_eq!(
            correlation_predicate(&outer_key, &inner_key),
            and_also(
                and_also(
                    not_null(member(&c, "A", Type::int())),
                    not_null(member(&c, "B", Type::string()))
                ),
                and_also(
                    equal(member(&c, "A", Type::int()), member(&o, "A", Type::int())),
                    equal(member(&c, "B", Type::string()), member(&o, "B", Type::string())),
                ),
            )
        );
    }

    #[test]
    fn enumerable_result_is_wrapped_and_inner_made_queryable() {
        // customers.GroupJoin(c.Orders, ..., (c, g) => g)
        let c = Parameter::new(0, "c", customer());
        let o = Parameter::new(1, "o", order());
        let rc = Parameter::new(2, "rc", customer());
        let g = Parameter::new(3, "g", Type::enumerable(order()));
        let inner = Expr::constant(Literal::List(vec![]), Type::list(order()));
        let group_join = call_generic(
            &QUERYABLE_METHODS.group_join,
            vec![customer(), order(), Type::int(), Type::enumerable(order())],
            vec![
                root("Customer", customer()),
                inner.clone(),
                Expr::quoted_lambda(vec![c.clone()], member(&c, "Id", Type::int())),
                Expr::quoted_lambda(vec![o.clone()], member(&o, "CustomerId", Type::int())),
                Expr::quoted_lambda(vec![rc.clone(), g.clone()], Expr::from(&g)),
            ],
        );

        let converted = convert(group_join).unwrap();
        let select = converted.as_call().unwrap();
        assert!(select.is(&QUERYABLE_METHODS.select));
        let selector = select.arguments[1].unwrap_lambda_from_quote().unwrap();
        let as_enumerable = selector.body.as_call().unwrap();
        assert!(as_enumerable.is(&ENUMERABLE_METHODS.as_enumerable));
        let group = as_enumerable.arguments[0].as_call().unwrap();
        assert!(group.is(&QUERYABLE_METHODS.where_));
        assert_eq!(
            group.arguments[0],
            crate::rewrite_utils::as_queryable(inner, order())
        );
    }

    #[test]
    fn nested_group_joins_are_converted() {
        let c = Parameter::new(0, "c", customer());
        let o = Parameter::new(1, "o", order());
        let rc = Parameter::new(2, "rc", customer());
        let g = Parameter::new(3, "g", Type::enumerable(order()));
        let group_join = |outer: Expr| {
            call_generic(
                &QUERYABLE_METHODS.group_join,
                vec![customer(), order(), Type::int(), customer()],
                vec![
                    outer,
                    root("Order", order()),
                    Expr::quoted_lambda(vec![c.clone()], member(&c, "Id", Type::int())),
                    Expr::quoted_lambda(vec![o.clone()], member(&o, "CustomerId", Type::int())),
                    Expr::quoted_lambda(vec![rc.clone(), g.clone()], Expr::from(&rc)),
                ],
            )
        };
        let nested = group_join(group_join(root("Customer", customer())));

        let converted = convert(nested).unwrap();
        let outer = converted.as_call().unwrap();
        assert!(outer.is(&QUERYABLE_METHODS.select));
        assert!(outer.arguments[0].as_call().unwrap().is(&QUERYABLE_METHODS.select));
    }

    #[test]
    fn non_lambda_selector_is_internal_error() {
        let group_join = call_generic(
            &QUERYABLE_METHODS.group_join,
            vec![customer(), order(), Type::int(), customer()],
            vec![
                root("Customer", customer()),
                root("Order", order()),
                Expr::null(Type::Object),
                Expr::null(Type::Object),
                Expr::null(Type::Object),
            ],
        );
        assert!(convert(group_join).unwrap_err().is_internal());
    }

    #[test]
    fn result_selector_must_bind_outer_and_group() {
        let c = Parameter::new(0, "c", customer());
        let o = Parameter::new(1, "o", order());
        let rc = Parameter::new(2, "rc", customer());
        let group_join = call_generic(
            &QUERYABLE_METHODS.group_join,
            vec![customer(), order(), Type::int(), customer()],
            vec![
                root("Customer", customer()),
                root("Order", order()),
                Expr::quoted_lambda(vec![c.clone()], member(&c, "Id", Type::int())),
                Expr::quoted_lambda(vec![o.clone()], member(&o, "CustomerId", Type::int())),
                Expr::quoted_lambda(vec![rc.clone()], Expr::from(&rc)),
            ],
        );

        let err = convert(group_join).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("result selector of"), "{err}");
        assert!(err.to_string().contains("right = 2"), "{err}");
    }
}
