//! Correlation analysis for the collection selector of a grouped join.
//!
//! A collection selector can be hoisted into the inner side of a flat join only if it is built
//! solely from the group parameter through filtering and pass-through operators. Anything else
//! (a reference to the outer element, a free variable, a reshaping operator) makes it
//! *correlated*.

use std::convert::Infallible;

use qexpr_ast::analysis::visit::{self, Visitor};
use qexpr_ast::{Expr, Lambda, MethodCall, MethodFamily, ParamId, Parameter, QUERYABLE_METHODS};

/// `Queryable` operators that may appear in an uncorrelated collection selector
const ALLOWED_QUERYABLE_OPERATORS: &[&str] = &["Where", "AsQueryable"];

/// Returns true if `body` depends on anything other than the parameter `root` (and parameters of
/// lambdas nested within `body`), or reaches `root` through an operator other than a filter or a
/// pass-through.
pub(crate) fn is_correlated(body: &Expr, root: ParamId) -> bool {
    let mut verifier = CorrelationVerifier {
        root,
        allowed_parameters: vec![],
        root_references: 0,
        correlated: false,
    };
    let Ok(()) = verifier.visit_expr(body);

    if verifier.root_references == 1 {
        verifier.check_source_chain(body);
    }

    verifier.correlated
}

struct CorrelationVerifier {
    root: ParamId,
    /// Parameters bound by lambdas enclosing the current position
    allowed_parameters: Vec<ParamId>,
    root_references: usize,
    correlated: bool,
}

impl CorrelationVerifier {
    /// Follow member accesses and `Queryable` sources from `body` down to the parameter they
    /// start from, which must be the root
    fn check_source_chain(&mut self, body: &Expr) {
        let mut expr = body;
        loop {
            match expr {
                Expr::Member {
                    expr: Some(receiver),
                    ..
                } => expr = receiver,
                // Static member; the chain ends without reaching a parameter
                Expr::Member { expr: None, .. } => return,
                Expr::Call(call) if *call.method.family() == MethodFamily::Queryable => {
                    match call.arguments.first() {
                        Some(source) => expr = source,
                        None => {
                            self.correlated = true;
                            return;
                        }
                    }
                }
                Expr::Parameter(parameter) => {
                    if parameter.id != self.root {
                        self.correlated = true;
                    }
                    return;
                }
                _ => {
                    self.correlated = true;
                    return;
                }
            }
        }
    }
}

/// Returns true if `call` is `Queryable.Select(source, x => x)`
fn is_identity_projection(call: &MethodCall) -> bool {
    call.is(&QUERYABLE_METHODS.select)
        && call
            .arguments
            .get(1)
            .and_then(Expr::unwrap_lambda_from_quote)
            .is_some_and(|selector| match (&*selector.body, selector.parameters.first()) {
                (Expr::Parameter(body), Some(parameter)) => body.id == parameter.id,
                _ => false,
            })
}

impl<'ast> Visitor<'ast> for CorrelationVerifier {
    type Error = Infallible;

    fn visit_lambda(&mut self, lambda: &'ast Lambda) -> Result<(), Self::Error> {
        let depth = self.allowed_parameters.len();
        self.allowed_parameters
            .extend(lambda.parameters.iter().map(|p| p.id));
        visit::walk_lambda(self, lambda)?;
        self.allowed_parameters.truncate(depth);
        Ok(())
    }

    fn visit_method_call(&mut self, call: &'ast MethodCall) -> Result<(), Self::Error> {
        if self.correlated {
            return Ok(());
        }

        if *call.method.family() == MethodFamily::Queryable
            && !ALLOWED_QUERYABLE_OPERATORS.contains(&call.method.name())
        {
            if !is_identity_projection(call) {
                self.correlated = true;
            }
            return Ok(());
        }

        visit::walk_method_call(self, call)
    }

    fn visit_parameter(&mut self, parameter: &'ast Parameter) -> Result<(), Self::Error> {
        if self.allowed_parameters.contains(&parameter.id) {
            return Ok(());
        }

        if parameter.id == self.root {
            self.root_references += 1;
        } else {
            self.correlated = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use qexpr_ast::{BinaryOperator, Literal, Method, QueryParameter, Type};

    use super::*;

    fn order() -> Type {
        Type::entity("Order")
    }

    fn group() -> Parameter {
        Parameter::new(1, "g", Type::enumerable(order()))
    }

    fn as_queryable(source: Expr) -> Expr {
        Expr::call(
            Method::generic(&QUERYABLE_METHODS.as_queryable, vec![order()]),
            vec![source],
        )
    }

    fn filter(source: Expr, y: Parameter, predicate: Expr) -> Expr {
        Expr::call(
            Method::generic(&QUERYABLE_METHODS.where_, vec![order()]),
            vec![source, Expr::quoted_lambda(vec![y], predicate)],
        )
    }

    fn quantity_equals(y: &Parameter, rhs: Expr) -> Expr {
        Expr::binary(
            Expr::member(Expr::from(y), "Quantity", Type::int()),
            BinaryOperator::Equal,
            rhs,
        )
    }

    #[test]
    fn bare_group_is_uncorrelated() {
        assert!(!is_correlated(&Expr::from(&group()), group().id));
    }

    #[test]
    fn filtered_group_is_uncorrelated() {
        let y = Parameter::new(2, "y", order());
        let body = filter(
            as_queryable(Expr::from(&group())),
            y.clone(),
            quantity_equals(&y, Expr::constant(1, Type::int())),
        );
        assert!(!is_correlated(&body, group().id));
    }

    #[test]
    fn query_parameters_are_uncorrelated() {
        let y = Parameter::new(2, "y", order());
        let body = filter(
            as_queryable(Expr::from(&group())),
            y.clone(),
            quantity_equals(&y, QueryParameter::new("__quantity_0", Type::int()).into()),
        );
        assert!(!is_correlated(&body, group().id));
    }

    #[test]
    fn reference_to_outer_parameter_is_correlated() {
        let o = Parameter::new(0, "o", Type::entity("Customer"));
        let y = Parameter::new(2, "y", order());
        let body = filter(
            as_queryable(Expr::from(&group())),
            y.clone(),
            quantity_equals(&y, Expr::member(Expr::from(&o), "Id", Type::int())),
        );
        assert!(is_correlated(&body, group().id));
    }

    #[test]
    fn reshaping_operator_is_correlated() {
        let y = Parameter::new(2, "y", order());
        let body = Expr::call(
            Method::generic(&QUERYABLE_METHODS.order_by, vec![order(), Type::int()]),
            vec![
                as_queryable(Expr::from(&group())),
                Expr::quoted_lambda(
                    vec![y.clone()],
                    Expr::member(Expr::from(&y), "Quantity", Type::int()),
                ),
            ],
        );
        assert!(is_correlated(&body, group().id));
    }

    #[test]
    fn identity_projection_is_allowed() {
        let y = Parameter::new(2, "y", order());
        let body = Expr::call(
            Method::generic(&QUERYABLE_METHODS.select, vec![order(), order()]),
            vec![
                as_queryable(Expr::from(&group())),
                Expr::quoted_lambda(vec![y.clone()], Expr::from(&y)),
            ],
        );
        // The identity projection's source isn't visited, so the root is never counted and the
        // source chain isn't checked
        assert!(!is_correlated(&body, group().id));
    }

    #[test]
    fn source_chain_must_end_at_root() {
        // The root is referenced once, but only inside the predicate; the chain itself starts
        // from a constant
        let y = Parameter::new(2, "y", order());
        let source = Expr::constant(
            Literal::Reference("DbSet<Order>()".into()),
            Type::queryable(order()),
        );
        let body = filter(
            source,
            y.clone(),
            Expr::binary(
                Expr::member(Expr::from(&group()), "Count", Type::int()),
                BinaryOperator::Greater,
                Expr::constant(0, Type::int()),
            ),
        );
        assert!(is_correlated(&body, group().id));
    }

    #[test]
    fn static_member_ends_chain() {
        let body = Expr::Member {
            expr: None,
            member: qexpr_ast::Member::new("Empty", Type::entity("Orders"), Type::enumerable(order())),
        };
        assert!(!is_correlated(&body, group().id));
    }
}
