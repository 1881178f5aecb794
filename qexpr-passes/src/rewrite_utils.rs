use std::convert::Infallible;
use std::sync::Arc;

use qexpr_ast::analysis::visit_mut::{self, VisitorMut};
use qexpr_ast::{
    BinaryOperator, Expr, Lambda, MemberBinding, Method, MethodCall, MethodDef, ParamId,
    QUERYABLE_METHODS, SequenceInterface, SequenceKind, Type,
};
use qexpr_errors::{QexprResult, internal_err};

/// Replace every reference to the parameter `id` within `expr` with `replacement`.
///
/// Member accesses whose receiver becomes an object construction after the replacement are
/// simplified to the constructing argument, so replacing `x` with `new { o, g }` in `x.g` yields
/// `g`.
pub(crate) fn replace_parameter(mut expr: Expr, id: ParamId, replacement: &Expr) -> Expr {
    struct ReplaceParameter<'a> {
        id: ParamId,
        replacement: &'a Expr,
    }

    impl VisitorMut for ReplaceParameter<'_> {
        type Error = Infallible;

        fn visit_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
            match expr {
                Expr::Parameter(parameter) if parameter.id == self.id => {
                    *expr = self.replacement.clone();
                    Ok(())
                }
                Expr::Member {
                    expr: Some(receiver),
                    member,
                } => {
                    self.visit_expr(receiver)?;
                    let simplified = member_of_construction(receiver, &member.name).cloned();
                    if let Some(simplified) = simplified {
                        *expr = simplified;
                    }
                    Ok(())
                }
                _ => visit_mut::walk_expr(self, expr),
            }
        }
    }

    let Ok(()) = ReplaceParameter { id, replacement }.visit_expr(&mut expr);
    expr
}

/// If `expr` constructs an object and initializes the member `name`, returns the expression the
/// member is initialized with
fn member_of_construction<'a>(expr: &'a Expr, name: &str) -> Option<&'a Expr> {
    match expr {
        Expr::New(new) => new.argument_for_member(name),
        Expr::MemberInit { bindings, .. } => bindings.iter().find_map(|binding| match binding {
            MemberBinding::Assignment { member, expr } if member == name => Some(expr),
            _ => None,
        }),
        _ => None,
    }
}

/// Unwrap a possibly-quoted lambda argument
pub(crate) fn into_lambda(expr: Expr) -> QexprResult<Lambda> {
    expr.into_lambda_from_quote()
        .map_err(|expr| internal_err!("Expected a lambda, got {expr}"))
}

pub(crate) fn quote(lambda: Lambda) -> Expr {
    Expr::Quote(Box::new(Expr::Lambda(lambda)))
}

/// Quote `expr` if it is a bare lambda
pub(crate) fn quote_if_lambda(expr: Expr) -> Expr {
    match expr {
        Expr::Lambda(lambda) => quote(lambda),
        expr => expr,
    }
}

/// Instantiate `definition` with `generic_arguments` and call it with `arguments`
pub(crate) fn call_generic(
    definition: &Arc<MethodDef>,
    generic_arguments: Vec<Type>,
    arguments: Vec<Expr>,
) -> Expr {
    Expr::call(Method::generic(definition, generic_arguments), arguments)
}

/// `Queryable.AsQueryable<element>(source)`
pub(crate) fn as_queryable(source: Expr, element: Type) -> Expr {
    call_generic(&QUERYABLE_METHODS.as_queryable, vec![element], vec![source])
}

pub(crate) fn equal(lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(lhs, BinaryOperator::Equal, rhs)
}

/// `expr != null`
pub(crate) fn not_null(expr: Expr) -> Expr {
    let ty = expr.ty();
    Expr::binary(expr, BinaryOperator::NotEqual, Expr::null(ty))
}

pub(crate) fn and_also(lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(lhs, BinaryOperator::And, rhs)
}

/// Returns true if `expr` is the integer constant zero
pub(crate) fn is_zero_constant(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant { value, .. } if value.is_zero())
}

/// If `call` is an `AsQueryable` call whose argument already has the call's type, returns that
/// argument
fn redundant_as_queryable(call: MethodCall) -> Result<Expr, MethodCall> {
    if call.is(&QUERYABLE_METHODS.as_queryable)
        && call.arguments.len() == 1
        && call.arguments[0].ty() == call.method.return_type()
    {
        let mut arguments = call.arguments;
        return Ok(arguments.remove(0));
    }
    Err(call)
}

/// Remove `AsQueryable` calls that don't change the type of their argument from the chain of
/// sources (first arguments of `Queryable` calls) starting at `expr`
pub(crate) fn strip_redundant_as_queryable(expr: Expr) -> Expr {
    match expr {
        Expr::Call(call) => match redundant_as_queryable(call) {
            Ok(source) => strip_redundant_as_queryable(source),
            Err(mut call) => {
                if call.is_generic_queryable()
                    && let Some(source) = call.arguments.first_mut()
                {
                    *source = strip_redundant_as_queryable(source.take());
                }
                Expr::Call(call)
            }
        },
        expr => expr,
    }
}

/// If `expr` is a sequence but not an `IQueryable<T>`, wrap it in `AsQueryable`
pub(crate) fn ensure_queryable(expr: Expr) -> Expr {
    let ty = expr.ty();
    match ty.sequence_type() {
        Some(element) if !ty.is_sequence_of_kind(SequenceKind::Queryable) => {
            as_queryable(expr, element.clone())
        }
        _ => expr,
    }
}

/// Returns the element type of `ty` if it implements `IQueryable<T>`
pub(crate) fn queryable_element_type(ty: &Type) -> Option<&Type> {
    ty.element_type_of(SequenceInterface::Queryable)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use qexpr_ast::{Literal, NewExpr, Parameter};

    use super::*;

    fn orders() -> Expr {
        Expr::constant(
            Literal::Reference("DbSet<Order>()".into()),
            Type::queryable(Type::entity("Order")),
        )
    }

    #[test]
    fn replace_simplifies_member_of_new() {
        let o = Parameter::new(0, "o", Type::entity("Customer"));
        let g = Parameter::new(1, "g", Type::enumerable(Type::entity("Order")));
        let construction = Expr::New(NewExpr::anonymous([
            ("o", Expr::from(&o)),
            ("g", Expr::from(&g)),
        ]));
        let x = Parameter::new(2, "x", construction.ty());
        let body = Expr::member(Expr::from(&x), "g", g.ty.clone());

        assert_eq!(replace_parameter(body, x.id, &construction), Expr::from(&g));
    }

    #[test]
    fn replace_simplifies_member_init_assignment() {
        let o = Parameter::new(0, "o", Type::entity("Customer"));
        let dto = Type::entity("CustomerDto");
        let construction = Expr::MemberInit {
            new: NewExpr {
                ty: dto.clone(),
                arguments: vec![],
                members: None,
            },
            bindings: vec![MemberBinding::Assignment {
                member: "Customer".into(),
                expr: Expr::from(&o),
            }],
        };
        let x = Parameter::new(1, "x", dto);
        let body = Expr::member(Expr::from(&x), "Customer", o.ty.clone());
        assert_eq!(replace_parameter(body, x.id, &construction), Expr::from(&o));
    }

    #[test]
    fn replace_keeps_unrelated_parameters() {
        let a = Parameter::new(0, "a", Type::int());
        let b = Parameter::new(1, "b", Type::int());
        let body = equal(Expr::from(&a), Expr::from(&b));
        let replaced = replace_parameter(body, a.id, &Expr::constant(1, Type::int()));
        assert_eq!(replaced, equal(Expr::constant(1, Type::int()), Expr::from(&b)));
    }

    #[test]
    fn strips_as_queryable_along_source_chain() {
        let element = Type::entity("Order");
        let y = Parameter::new(0, "y", element.clone());
        let filtered = call_generic(
            &QUERYABLE_METHODS.where_,
            vec![element.clone()],
            vec![
                as_queryable(orders(), element.clone()),
                Expr::quoted_lambda(vec![y], Expr::constant(true, Type::bool())),
            ],
        );
        let stripped = strip_redundant_as_queryable(as_queryable(filtered, element));
        let call = stripped.as_call().unwrap();
        assert!(call.is(&QUERYABLE_METHODS.where_));
        assert_eq!(call.arguments[0], orders());
    }

    #[test]
    fn keeps_converting_as_queryable() {
        let list = Expr::constant(Literal::List(vec![]), Type::list(Type::int()));
        let wrapped = as_queryable(list, Type::int());
        assert_eq!(strip_redundant_as_queryable(wrapped.clone()), wrapped);
    }

    #[test]
    fn ensure_queryable_wraps_collections_only() {
        let list = Expr::constant(Literal::List(vec![]), Type::list(Type::int()));
        assert!(ensure_queryable(list).as_call().is_some());
        assert_eq!(ensure_queryable(orders()), orders());
    }
}
