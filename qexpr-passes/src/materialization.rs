use qexpr_ast::fmt::fmt_with;
use qexpr_ast::{Expr, MemberBinding, Parameter, SequenceInterface};
use qexpr_errors::{QexprError, QexprResult};

/// Check that the body of a final projection `parameter => body` doesn't yield a deferred
/// sequence (an `IQueryable<T>` or `IOrderedEnumerable<T>`) anywhere that isn't itself an object
/// construction, since those can't be materialized into the result.
pub(crate) fn verify_return_type(body: &Expr, parameter: &Parameter) -> QexprResult<()> {
    match body {
        Expr::New(new) => {
            for argument in &new.arguments {
                verify_return_type(argument, parameter)?;
            }
            Ok(())
        }
        Expr::MemberInit { new, bindings } => {
            for argument in &new.arguments {
                verify_return_type(argument, parameter)?;
            }
            for binding in bindings {
                if let MemberBinding::Assignment { expr, .. } = binding {
                    verify_return_type(expr, parameter)?;
                }
            }
            Ok(())
        }
        _ => {
            let ty = body.ty();
            if ty.element_type_of(SequenceInterface::OrderedEnumerable).is_some()
                || ty.element_type_of(SequenceInterface::Queryable).is_some()
            {
                return Err(QexprError::InvalidMaterializationShape {
                    projection: fmt_with(|f| write!(f, "{parameter} => {body}")).to_string(),
                    ty: ty.short_display_name(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use qexpr_ast::{Literal, Method, NewExpr, QUERYABLE_METHODS, Type};

    use super::*;

    fn customer() -> Parameter {
        Parameter::new(0, "c", Type::entity("Customer"))
    }

    fn ordered_orders(c: &Parameter) -> Expr {
        let o = Parameter::new(1, "o", Type::entity("Order"));
        Expr::call(
            Method::generic(
                &QUERYABLE_METHODS.order_by,
                vec![Type::entity("Order"), Type::int()],
            ),
            vec![
                Expr::member(
                    Expr::from(c),
                    "Orders",
                    Type::queryable(Type::entity("Order")),
                ),
                Expr::quoted_lambda(
                    vec![o.clone()],
                    Expr::member(Expr::from(&o), "Id", Type::int()),
                ),
            ],
        )
    }

    #[test]
    fn scalar_members_are_fine() {
        let c = customer();
        let body = Expr::New(NewExpr::anonymous([(
            "A",
            Expr::member(Expr::from(&c), "Name", Type::string()),
        )]));
        verify_return_type(&body, &c).unwrap();
    }

    #[test]
    fn lists_are_fine() {
        let c = customer();
        let body = Expr::New(NewExpr::anonymous([(
            "A",
            Expr::constant(Literal::List(vec![]), Type::list(Type::int())),
        )]));
        verify_return_type(&body, &c).unwrap();
    }

    #[test]
    fn nested_ordered_sequence_is_rejected() {
        let c = customer();
        let body = Expr::New(NewExpr::anonymous([("A", ordered_orders(&c))]));
        let err = verify_return_type(&body, &c).unwrap_err();
        assert_eq!(
            err,
            QexprError::InvalidMaterializationShape {
                projection: "c => c.Orders.OrderBy(o => o.Id)".into(),
                ty: "IOrderedQueryable<Order>".into(),
            }
        );
    }

    #[test]
    fn member_init_assignments_are_checked() {
        let c = customer();
        let body = Expr::MemberInit {
            new: NewExpr {
                ty: Type::entity("CustomerDto"),
                arguments: vec![],
                members: None,
            },
            bindings: vec![MemberBinding::Assignment {
                member: "Orders".into(),
                expr: ordered_orders(&c),
            }],
        };
        assert!(
            verify_return_type(&body, &c)
                .unwrap_err()
                .is_invalid_materialization_shape()
        );
    }

    #[test]
    fn top_level_queryable_is_rejected() {
        let c = customer();
        let body = Expr::member(
            Expr::from(&c),
            "Orders",
            Type::queryable(Type::entity("Order")),
        );
        assert!(verify_return_type(&body, &c).is_err());
    }
}
