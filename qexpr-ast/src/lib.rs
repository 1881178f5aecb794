//! Expression trees for queries composed of sequence operators, together with the type model,
//! method model and the static table of operator signatures the normalizer rewrites against.
//!
//! Trees are built bottom-up from [`Expr`] nodes. A query such as
//! `customers.Where(c => c.Id > 3)` is a [`MethodCall`] to `Queryable.Where` whose second argument
//! is a quoted [`Lambda`]. Parameters are identified by [`ParamId`]; two parameter nodes refer to
//! the same binding exactly when their ids are equal.

pub mod analysis;
mod expression;
pub mod fmt;
mod literal;
mod method;
mod signatures;
mod ty;

pub use crate::expression::{
    BinaryOperator, Expr, Lambda, Member, MemberBinding, MethodCall, NewExpr, ParamId, Parameter,
    ParameterGenerator, ParameterTranslationMode, QueryParameter, UnaryOperator,
};
pub use crate::literal::Literal;
pub use crate::method::{Method, MethodDef, MethodFamily};
pub use crate::signatures::{
    ENUMERABLE_METHODS, EnumerableMethods, OPERATOR_SIGNATURES, OperatorSignatures,
    PARAMETER_HINT_METHODS, ParameterHintMethods, QUERY_METADATA_METHODS, QUERYABLE_METHODS,
    QueryMetadataMethods, QueryableMethods,
};
pub use crate::ty::{RecordType, ScalarType, SequenceInterface, SequenceKind, Type};
