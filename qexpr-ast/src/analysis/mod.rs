pub mod visit;
pub mod visit_mut;

use visit::Visitor;

use crate::{Expr, MethodCall, MethodDef, MethodFamily};

/// Extension trait for finding calls within an expression
pub trait ContainsCalls {
    /// Returns true if any call in `self` matches `predicate`
    fn contains_call_matching<F>(&self, predicate: F) -> bool
    where
        F: Fn(&MethodCall) -> bool;

    /// Returns true if `self` contains a call to an instantiation of `definition`
    fn contains_call_to(&self, definition: &MethodDef) -> bool {
        self.contains_call_matching(|call| call.is(definition))
    }

    /// Returns true if `self` contains a call to any method of `family`
    fn contains_call_in_family(&self, family: &MethodFamily) -> bool {
        self.contains_call_matching(|call| call.method.family() == family)
    }
}

impl ContainsCalls for Expr {
    fn contains_call_matching<F>(&self, predicate: F) -> bool
    where
        F: Fn(&MethodCall) -> bool,
    {
        struct FindCall<F>(F);

        impl<'ast, F: Fn(&MethodCall) -> bool> Visitor<'ast> for FindCall<F> {
            type Error = ();

            fn visit_method_call(&mut self, call: &'ast MethodCall) -> Result<(), Self::Error> {
                if (self.0)(call) {
                    return Err(());
                }
                visit::walk_method_call(self, call)
            }
        }

        FindCall(predicate).visit_expr(self).is_err()
    }
}
