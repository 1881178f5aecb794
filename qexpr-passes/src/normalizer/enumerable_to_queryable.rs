//! Conversion of in-memory (`Enumerable`) operators over query sources into their `Queryable`
//! counterparts, so the whole query can be translated.

use std::sync::Arc;

use qexpr_ast::{
    ENUMERABLE_METHODS, Expr, Method, MethodCall, MethodDef, MethodFamily, OPERATOR_SIGNATURES,
    QUERYABLE_METHODS, SequenceInterface, SequenceKind, Type, UnaryOperator,
};
use qexpr_errors::{QexprResult, internal};
use tracing::{debug, trace};

use super::QueryableMethodNormalizer;
use crate::rewrite_utils::{as_queryable, queryable_element_type, quote_if_lambda};

/// Returns true if `call` is `Contains` on a collection type (such as `List<T>.Contains`)
pub(super) fn is_collection_contains(call: &MethodCall) -> bool {
    call.method.name() == "Contains"
        && !call.method.is_static()
        && call
            .method
            .declaring_type()
            .is_some_and(|ty| ty.element_type_of(SequenceInterface::Collection).is_some())
}

/// The generic arguments to instantiate `Queryable` candidates for `method` with.
///
/// `Min` and `Max` have non-generic overloads for numeric sources on `Enumerable` that only
/// exist as generic methods on `Queryable`, so their generic arguments are derived from the
/// return type.
fn candidate_generic_arguments(method: &Method, argument_count: usize) -> Vec<Type> {
    if !matches!(method.name(), "Min" | "Max") {
        return method.generic_arguments().to_vec();
    }

    let declared = method.generic_arguments();
    if !method.is_generic() {
        vec![method.return_type()]
    } else if declared.len() == argument_count {
        declared.to_vec()
    } else {
        vec![declared[0].clone(), method.return_type()]
    }
}

/// Returns true if an argument passed for an `enumerable` parameter can be converted to one for
/// a `queryable` parameter by wrapping it in `AsQueryable`
fn can_convert(enumerable: &Type, queryable: &Type) -> bool {
    match (enumerable, queryable) {
        (Type::Sequence(from, from_element), Type::Sequence(to, to_element)) => {
            from_element == to_element
                && matches!(
                    (from, to),
                    (SequenceKind::Enumerable, SequenceKind::Queryable)
                        | (SequenceKind::OrderedEnumerable, SequenceKind::OrderedQueryable)
                )
        }
        _ => false,
    }
}

/// Convert a sequence argument into a queryable one.
///
/// A trailing `ToList` is dropped, keeping the element type it was called with. Arguments that
/// are already queryables of the right element type are kept as they are; anything else has
/// conversions to other sequence types stripped and is wrapped in `AsQueryable`.
fn convert_argument(argument: Expr, fallback_element: Option<&Type>) -> Expr {
    let mut element = argument.ty().sequence_type().or(fallback_element).cloned();
    let argument = match argument {
        Expr::Call(mut to_list)
            if to_list.is(&ENUMERABLE_METHODS.to_list)
                && to_list.method.return_type().is_sequence_of_kind(SequenceKind::List)
                && !to_list.arguments.is_empty() =>
        {
            element = to_list.method.generic_arguments().first().cloned();
            to_list.arguments.remove(0)
        }
        argument => argument,
    };

    let Some(element) = element else {
        return argument;
    };

    if queryable_element_type(&argument.ty()) == Some(&element) {
        return argument;
    }

    as_queryable(strip_sequence_conversions(argument), element)
}

fn strip_sequence_conversions(expr: Expr) -> Expr {
    match expr {
        Expr::UnaryOp {
            op: UnaryOperator::Convert(ty) | UnaryOperator::TypeAs(ty),
            operand,
        } if ty.sequence_type().is_some() => strip_sequence_conversions(*operand),
        expr => expr,
    }
}

/// Map already-normalized `arguments` of an enumerable method onto the parameters of a
/// queryable candidate. Returns `None` if some argument can't be passed to the candidate.
fn map_arguments(
    enumerable_parameters: &[Type],
    queryable_parameters: &[Type],
    arguments: &[Expr],
) -> Option<Vec<Expr>> {
    let mut mapped = arguments.to_vec();
    for (idx, (enumerable, queryable)) in enumerable_parameters
        .iter()
        .zip(queryable_parameters)
        .enumerate()
    {
        if enumerable == queryable {
            continue;
        }

        if can_convert(enumerable, queryable) {
            let argument = mapped[idx].take();
            mapped[idx] = convert_argument(argument, enumerable.sequence_type());
            continue;
        }

        if queryable.unquoted() == Some(enumerable) {
            continue;
        }

        return None;
    }
    Some(mapped)
}

impl QueryableMethodNormalizer<'_> {
    /// Try to rewrite a call to an `Enumerable` operator into a call to the `Queryable` operator
    /// with the same name and shape. If there isn't one, the call is kept with its arguments
    /// normalized.
    pub(super) fn convert_enumerable_to_queryable(&mut self, call: MethodCall) -> QexprResult<Expr> {
        // `SequenceEqual` may compare binary columns, which are scalars to the translator
        if call.method.name() == "SequenceEqual"
            || call
                .arguments
                .first()
                .is_some_and(Expr::is_object_construction)
        {
            return self.walk_call(call);
        }

        let MethodCall {
            method,
            object,
            arguments,
        } = call;
        let arguments = arguments
            .into_iter()
            .map(|argument| self.visit(argument))
            .collect::<QexprResult<Vec<_>>>()?;

        let generic_arguments = candidate_generic_arguments(&method, arguments.len());
        let enumerable_parameters = method.parameter_types();
        let candidates = OPERATOR_SIGNATURES.candidates(
            &MethodFamily::Queryable,
            method.name(),
            enumerable_parameters.len(),
        );

        for candidate in candidates {
            let Some(queryable_method) = instantiate(candidate, &generic_arguments) else {
                continue;
            };

            if let Some(mapped) = map_arguments(
                &enumerable_parameters,
                &queryable_method.parameter_types(),
                &arguments,
            ) {
                debug!(from = %method, to = %queryable_method, "Converted enumerable operator");
                return Ok(Expr::call(
                    queryable_method,
                    mapped.into_iter().map(quote_if_lambda).collect(),
                ));
            }
        }

        trace!(%method, "No queryable counterpart");
        let object = match object {
            Some(object) => Some(Box::new(self.visit(*object)?)),
            None => None,
        };
        Ok(Expr::Call(MethodCall {
            method,
            object,
            arguments,
        }))
    }

    /// Rewrite `collection.Contains(item)` into
    /// `Queryable.Contains(Queryable.AsQueryable(collection), item)`
    pub(super) fn convert_collection_contains(&mut self, call: MethodCall) -> QexprResult<Expr> {
        if call
            .object
            .as_deref()
            .is_some_and(Expr::is_object_construction)
        {
            return self.walk_call(call);
        }

        let MethodCall {
            method,
            object,
            arguments,
        } = call;
        let Some(element) = method
            .declaring_type()
            .and_then(|ty| ty.element_type_of(SequenceInterface::Collection))
            .cloned()
        else {
            internal!("{method} is not declared on a collection");
        };
        let (Some(object), Ok([item])) = (object, <[Expr; 1]>::try_from(arguments)) else {
            internal!("Malformed call to {method}");
        };

        let source = if object.ty().is_value_type() {
            Expr::unary(
                UnaryOperator::Convert(Type::enumerable(element.clone())),
                *object,
            )
        } else {
            *object
        };

        trace!(%method, "Rewriting collection Contains");
        self.normalize_call(MethodCall {
            method: Method::generic(&QUERYABLE_METHODS.contains, vec![element.clone()]),
            object: None,
            arguments: vec![as_queryable(source, element), item],
        })
    }
}

/// Instantiate a queryable candidate with `generic_arguments`, or `None` if it takes a different
/// number of generic arguments. Non-generic candidates are used as they are.
fn instantiate(candidate: &Arc<MethodDef>, generic_arguments: &[Type]) -> Option<Method> {
    if !candidate.is_generic() {
        return Some(Method::new(Arc::clone(candidate), vec![]));
    }
    (candidate.generic_arity == generic_arguments.len())
        .then(|| Method::generic(candidate, generic_arguments.to_vec()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use qexpr_ast::{Literal, MethodDef, NewExpr, Parameter, ParameterGenerator, ScalarType};

    use super::*;
    use crate::{NormalizeParams, QueryCompilationContext};

    fn normalize(expr: Expr) -> Expr {
        let mut context = QueryCompilationContext::default();
        let parameters = ParameterGenerator::following(&expr);
        QueryableMethodNormalizer::new(&mut context, NormalizeParams::default(), parameters)
            .visit(expr)
            .unwrap()
    }

    fn enumerable(name: &str, parameter_count: usize, index: usize) -> Arc<MethodDef> {
        Arc::clone(
            &OPERATOR_SIGNATURES.candidates(&MethodFamily::Enumerable, name, parameter_count)
                [index],
        )
    }

    fn numbers() -> Expr {
        Expr::constant(
            Literal::List(vec![3.into(), 1.into()]),
            Type::list(Type::int()),
        )
    }

    fn enumerable_numbers() -> Expr {
        Expr::unary(UnaryOperator::Convert(Type::enumerable(Type::int())), numbers())
    }

    #[test]
    fn where_over_plain_sequence() {
        let x = Parameter::new(0, "x", Type::int());
        let predicate = Expr::lambda(
            vec![x.clone()],
            Expr::binary(
                Expr::from(&x),
                qexpr_ast::BinaryOperator::Greater,
                Expr::constant(1, Type::int()),
            ),
        );
        let expr = Expr::call(
            Method::generic(&enumerable("Where", 2, 0), vec![Type::int()]),
            vec![enumerable_numbers(), predicate.clone()],
        );

        let normalized = normalize(expr);
        let call = normalized.as_call().unwrap();
        assert!(call.is(&QUERYABLE_METHODS.where_));
        assert_eq!(
            call.arguments,
            vec![
                as_queryable(numbers(), Type::int()),
                Expr::Quote(Box::new(predicate)),
            ]
        );
    }

    #[test]
    fn to_list_is_unwrapped() {
        let customers = Expr::constant(
            Literal::Reference("DbSet<Customer>()".into()),
            Type::queryable(Type::entity("Customer")),
        );
        let to_list = Expr::call(
            Method::generic(&ENUMERABLE_METHODS.to_list, vec![Type::entity("Customer")]),
            vec![customers.clone()],
        );
        let expr = Expr::call(
            Method::generic(&enumerable("Count", 1, 0), vec![Type::entity("Customer")]),
            vec![to_list],
        );

        let normalized = normalize(expr);
        let call = normalized.as_call().unwrap();
        assert_eq!(*call.method.family(), MethodFamily::Queryable);
        assert_eq!(call.method.name(), "Count");
        // The source already is a queryable of the right element type
        assert_eq!(call.arguments, vec![customers]);
    }

    #[test]
    fn non_generic_min_infers_generic_argument_from_return_type() {
        let expr = Expr::call(
            Method::generic(&enumerable("Min", 1, 0), vec![]),
            vec![enumerable_numbers()],
        );
        assert_eq!(expr.ty(), Type::int());

        let normalized = normalize(expr);
        let call = normalized.as_call().unwrap();
        assert_eq!(*call.method.family(), MethodFamily::Queryable);
        assert_eq!(call.method.generic_arguments(), &[Type::int()]);
        assert_eq!(call.arguments, vec![as_queryable(numbers(), Type::int())]);
    }

    #[test]
    fn max_with_numeric_selector_infers_result_type() {
        // `Max<Order>(IEnumerable<Order>, Func<Order, int>)`
        let order = Type::entity("Order");
        let o = Parameter::new(0, "o", order.clone());
        let orders = Expr::constant(
            Literal::List(vec![]),
            Type::sequence(SequenceKind::Array, order.clone()),
        );
        let definition = OPERATOR_SIGNATURES
            .candidates(&MethodFamily::Enumerable, "Max", 2)
            .iter()
            .find(|def| def.generic_arity == 1 && def.return_type == Type::int())
            .cloned()
            .unwrap();
        let expr = Expr::call(
            Method::new(definition, vec![order.clone()]),
            vec![
                orders.clone(),
                Expr::lambda(
                    vec![o.clone()],
                    Expr::member(Expr::from(&o), "Quantity", Type::int()),
                ),
            ],
        );

        let normalized = normalize(expr);
        let call = normalized.as_call().unwrap();
        assert_eq!(*call.method.family(), MethodFamily::Queryable);
        assert_eq!(call.method.generic_arguments(), &[order.clone(), Type::int()]);
        assert_eq!(call.arguments[0], as_queryable(orders, order));
        assert!(matches!(call.arguments[1], Expr::Quote(_)));
    }

    #[test]
    fn sequence_equal_is_kept() {
        let bytes = Expr::constant(
            Literal::List(vec![]),
            Type::enumerable(Type::Scalar(ScalarType::Int)),
        );
        let expr = Expr::call(
            Method::generic(&enumerable("SequenceEqual", 2, 0), vec![Type::int()]),
            vec![bytes.clone(), bytes],
        );
        assert_eq!(normalize(expr.clone()), expr);
    }

    #[test]
    fn object_construction_source_is_kept() {
        let source = Expr::New(NewExpr {
            ty: Type::list(Type::int()),
            arguments: vec![],
            members: None,
        });
        let expr = Expr::call(
            Method::generic(&enumerable("Count", 1, 0), vec![Type::int()]),
            vec![source],
        );
        assert_eq!(normalize(expr.clone()), expr);
    }

    #[test]
    fn enumerable_only_operators_are_kept() {
        let expr = Expr::call(
            Method::generic(&ENUMERABLE_METHODS.as_enumerable, vec![Type::int()]),
            vec![enumerable_numbers()],
        );
        assert_eq!(normalize(expr.clone()), expr);
    }

    #[test]
    fn list_contains() {
        let list_ty = Type::list(Type::int());
        let contains = Method::non_generic(MethodDef::new_instance(
            list_ty,
            "Contains",
            vec![Type::int()],
            Type::bool(),
        ));
        let item = Expr::constant(1, Type::int());
        let expr = Expr::instance_call(numbers(), contains, vec![item.clone()]);

        let normalized = normalize(expr);
        let call = normalized.as_call().unwrap();
        assert!(call.is(&QUERYABLE_METHODS.contains));
        assert_eq!(
            call.arguments,
            vec![as_queryable(numbers(), Type::int()), item]
        );
    }

    #[test]
    fn value_type_collection_contains_is_boxed() {
        let array_ty = Type::sequence(SequenceKind::ImmutableArray, Type::int());
        let values = Expr::constant(Literal::List(vec![1.into()]), array_ty.clone());
        let contains = Method::non_generic(MethodDef::new_instance(
            array_ty,
            "Contains",
            vec![Type::int()],
            Type::bool(),
        ));
        let item = Expr::constant(1, Type::int());
        let expr = Expr::instance_call(values.clone(), contains, vec![item]);

        let normalized = normalize(expr);
        let call = normalized.as_call().unwrap();
        assert!(call.is(&QUERYABLE_METHODS.contains));
        assert_eq!(
            call.arguments[0],
            as_queryable(
                Expr::unary(UnaryOperator::Convert(Type::enumerable(Type::int())), values),
                Type::int()
            )
        );
    }

    #[test]
    fn static_contains_on_collection_type_is_untouched() {
        let list_ty = Type::list(Type::int());
        let contains = Method::non_generic(MethodDef::new_static(
            MethodFamily::Instance(list_ty.clone()),
            "Contains",
            0,
            vec![list_ty, Type::int()],
            Type::bool(),
        ));
        let expr = Expr::call(contains, vec![numbers(), Expr::constant(1, Type::int())]);
        assert!(!is_collection_contains(expr.as_call().unwrap()));

        assert_eq!(normalize(expr.clone()), expr);
    }
}
