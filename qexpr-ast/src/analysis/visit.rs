//! AST walker for query expressions taking shared references, inspired by [rustc's AST
//! visitor][rustc-ast-visit].
//!
//! [rustc-ast-visit]: https://doc.rust-lang.org/stable/nightly-rustc/rustc_ast/visit/index.html
//!
//! For an equivalent AST walker trait over **mutable references**, see
//! [`crate::analysis::visit_mut`].

// NOTE: remember that this file is effectively duplicated to `visit_mut.rs` - any changes made
// here should be mirrored there!

use crate::{
    Expr, Lambda, Literal, MemberBinding, MethodCall, NewExpr, Parameter, QueryParameter,
};

/// Each method of the `Visitor` trait is a hook to be potentially overridden when recursively
/// traversing expression trees. The default implementation of each method recursively visits the
/// substructure of the input via the corresponding `walk` method, eg `visit_expr` by default calls
/// [`walk_expr`].
///
/// Parameter *declarations* in a lambda are not visited by default, only references to
/// parameters in expression position.
pub trait Visitor<'ast>: Sized {
    /// Errors that can be thrown during execution of this visitor
    type Error;

    fn visit_expr(&mut self, expr: &'ast Expr) -> Result<(), Self::Error> {
        walk_expr(self, expr)
    }

    fn visit_method_call(&mut self, call: &'ast MethodCall) -> Result<(), Self::Error> {
        walk_method_call(self, call)
    }

    fn visit_lambda(&mut self, lambda: &'ast Lambda) -> Result<(), Self::Error> {
        walk_lambda(self, lambda)
    }

    fn visit_parameter(&mut self, _parameter: &'ast Parameter) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_query_parameter(
        &mut self,
        _query_parameter: &'ast QueryParameter,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_literal(&mut self, _literal: &'ast Literal) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_new(&mut self, new: &'ast NewExpr) -> Result<(), Self::Error> {
        walk_new(self, new)
    }

    fn visit_member_binding(&mut self, binding: &'ast MemberBinding) -> Result<(), Self::Error> {
        walk_member_binding(self, binding)
    }
}

pub fn walk_expr<'a, V: Visitor<'a>>(visitor: &mut V, expr: &'a Expr) -> Result<(), V::Error> {
    match expr {
        Expr::Call(call) => visitor.visit_method_call(call),
        Expr::Lambda(lambda) => visitor.visit_lambda(lambda),
        Expr::Quote(inner) => visitor.visit_expr(inner),
        Expr::Parameter(parameter) => visitor.visit_parameter(parameter),
        Expr::Member { expr, .. } => match expr {
            Some(expr) => visitor.visit_expr(expr),
            None => Ok(()),
        },
        Expr::BinaryOp { lhs, rhs, .. } => {
            visitor.visit_expr(lhs)?;
            visitor.visit_expr(rhs)
        }
        Expr::UnaryOp { operand, .. } => visitor.visit_expr(operand),
        Expr::Constant { value, .. } => visitor.visit_literal(value),
        Expr::New(new) => visitor.visit_new(new),
        Expr::MemberInit { new, bindings } => {
            visitor.visit_new(new)?;
            for binding in bindings {
                visitor.visit_member_binding(binding)?;
            }
            Ok(())
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            visitor.visit_expr(test)?;
            visitor.visit_expr(if_true)?;
            visitor.visit_expr(if_false)
        }
        Expr::QueryParameter(qp) => visitor.visit_query_parameter(qp),
    }
}

pub fn walk_method_call<'a, V: Visitor<'a>>(
    visitor: &mut V,
    call: &'a MethodCall,
) -> Result<(), V::Error> {
    if let Some(object) = &call.object {
        visitor.visit_expr(object)?;
    }
    for arg in &call.arguments {
        visitor.visit_expr(arg)?;
    }
    Ok(())
}

pub fn walk_lambda<'a, V: Visitor<'a>>(
    visitor: &mut V,
    lambda: &'a Lambda,
) -> Result<(), V::Error> {
    visitor.visit_expr(&lambda.body)
}

pub fn walk_new<'a, V: Visitor<'a>>(visitor: &mut V, new: &'a NewExpr) -> Result<(), V::Error> {
    for arg in &new.arguments {
        visitor.visit_expr(arg)?;
    }
    Ok(())
}

pub fn walk_member_binding<'a, V: Visitor<'a>>(
    visitor: &mut V,
    binding: &'a MemberBinding,
) -> Result<(), V::Error> {
    match binding {
        MemberBinding::Assignment { expr, .. } => visitor.visit_expr(expr),
        MemberBinding::List { initializers, .. } => {
            for initializer in initializers {
                visitor.visit_expr(initializer)?;
            }
            Ok(())
        }
    }
}
