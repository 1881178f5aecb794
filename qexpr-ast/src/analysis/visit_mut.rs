//! AST walker for query expressions taking mutable references, inspired by [rustc's AST
//! visitor][rustc-ast-visit].
//!
//! [rustc-ast-visit]: https://doc.rust-lang.org/stable/nightly-rustc/rustc_ast/visit/index.html
//!
//! For an equivalent AST walker trait over **shared references**, see
//! [`crate::analysis::visit`].
//!
//! Unlike [`Visitor`](crate::analysis::visit::Visitor), this trait has no lifetime parameter:
//! rewriting visitors routinely build a new node and visit it before splicing it into the tree,
//! so visited nodes can't be required to outlive the visitor.

// NOTE: remember that this file is effectively duplicated to `visit.rs` - any changes made here
// should be mirrored there!

use crate::{
    Expr, Lambda, Literal, MemberBinding, MethodCall, NewExpr, Parameter, QueryParameter,
};

/// Each method of the `VisitorMut` trait is a hook to be potentially overridden when recursively
/// traversing expression trees. The default implementation of each method recursively visits the
/// substructure of the input via the corresponding `walk` method, eg `visit_expr` by default calls
/// [`walk_expr`].
///
/// Rewrites replace the node they are given in place, typically by [`Expr::take`]-ing it,
/// building the replacement, and assigning it back.
pub trait VisitorMut: Sized {
    /// Errors that can be thrown during execution of this visitor
    type Error;

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
        walk_expr(self, expr)
    }

    fn visit_method_call(&mut self, call: &mut MethodCall) -> Result<(), Self::Error> {
        walk_method_call(self, call)
    }

    fn visit_lambda(&mut self, lambda: &mut Lambda) -> Result<(), Self::Error> {
        walk_lambda(self, lambda)
    }

    fn visit_parameter(&mut self, _parameter: &mut Parameter) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_query_parameter(
        &mut self,
        _query_parameter: &mut QueryParameter,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_literal(&mut self, _literal: &mut Literal) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_new(&mut self, new: &mut NewExpr) -> Result<(), Self::Error> {
        walk_new(self, new)
    }

    fn visit_member_binding(&mut self, binding: &mut MemberBinding) -> Result<(), Self::Error> {
        walk_member_binding(self, binding)
    }
}

pub fn walk_expr<V: VisitorMut>(visitor: &mut V, expr: &mut Expr) -> Result<(), V::Error> {
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

pub fn walk_method_call<V: VisitorMut>(
    visitor: &mut V,
    call: &mut MethodCall,
) -> Result<(), V::Error> {
    if let Some(object) = &mut call.object {
        visitor.visit_expr(object)?;
    }
    for arg in &mut call.arguments {
        visitor.visit_expr(arg)?;
    }
    Ok(())
}

pub fn walk_lambda<V: VisitorMut>(visitor: &mut V, lambda: &mut Lambda) -> Result<(), V::Error> {
    visitor.visit_expr(&mut lambda.body)
}

pub fn walk_new<V: VisitorMut>(visitor: &mut V, new: &mut NewExpr) -> Result<(), V::Error> {
    for arg in &mut new.arguments {
        visitor.visit_expr(arg)?;
    }
    Ok(())
}

pub fn walk_member_binding<V: VisitorMut>(
    visitor: &mut V,
    binding: &mut MemberBinding,
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
