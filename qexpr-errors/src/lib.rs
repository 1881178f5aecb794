//! Error handling, definitions, and utilities shared by the expression crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// General error type used across the expression normalization crates.
#[derive(Serialize, Deserialize, Error, Debug, Clone, PartialEq, Eq)]
pub enum QexprError {
    /// A constant parameter hint was used but the query provider cannot inline parameter values
    /// as constants.
    #[error("Constant parameter hints are not supported by the current query provider")]
    UnsupportedConstantCapability,

    /// A final projector yields a collection type that cannot be materialized.
    #[error(
        "The query contains a projection '{projection}' of type '{ty}'. Collections in the final \
         projection must be an 'IEnumerable<T>' type such as 'List<T>'. Consider using 'ToList' \
         or some other mechanism to convert the 'IQueryable<T>' or 'IOrderedEnumerable<T>' into \
         a collection."
    )]
    InvalidMaterializationShape {
        /// Printable form of the offending projection, as `param => expression`.
        projection: String,
        /// Short display name of the offending expression's type.
        ty: String,
    },

    /// An internal invariant has been violated.
    ///
    /// This is produced by the [`internal!`] and [`invariant!`] macros, as well as by
    /// [`internal_err`].
    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

impl QexprError {
    /// Returns `true` if the error is an [`InvalidMaterializationShape`].
    ///
    /// [`InvalidMaterializationShape`]: QexprError::InvalidMaterializationShape
    pub fn is_invalid_materialization_shape(&self) -> bool {
        matches!(self, Self::InvalidMaterializationShape { .. })
    }

    /// Returns `true` if the error is [`Internal`].
    ///
    /// [`Internal`]: QexprError::Internal
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// Make a new [`QexprError::Internal`] with the provided string-able argument.
pub fn internal_err<T: Into<String>>(err: T) -> QexprError {
    QexprError::Internal(err.into())
}

/// Standard issue [`Result`] alias.
pub type QexprResult<T> = ::std::result::Result<T, QexprError>;

/// Renders information about the current source location *if* building in debug mode, for use in
/// error-generating macros
#[doc(hidden)]
#[macro_export]
macro_rules! __location_info {
    ($fstr: literal) => {
        if cfg!(debug_assertions) {
            format!(
                $fstr,
                format!("{}:{}:{}", std::file!(), std::line!(), std::column!(),)
            )
        } else {
            "".to_owned()
        }
    };
}

/// Make a new [`QexprError::Internal`], capturing the source location in debug builds.
#[macro_export]
macro_rules! internal_err {
    ($($tt:tt)*) => {
        $crate::internal_err(format!(
            "{}{}",
            $crate::__location_info!("in {}: "),
            format_args!($($tt)*)
        ))
    };
}

/// Return a [`QexprError::Internal`] from the current function.
///
/// Usage is like [`panic!`], in that you can pass a format string and arguments. When building in
/// debug mode, the returned error also captures file, line, and column information.
///
/// When called with no arguments, generates an internal error with the text
/// "entered unreachable code".
#[macro_export]
macro_rules! internal {
    () => {
        $crate::internal!("entered unreachable code")
    };
    ($($tt:tt)*) => {
        return Err($crate::internal_err!($($tt)*).into())
    };
}

/// Return a [`QexprError::Internal`] from the current function, if and only if the argument
/// evaluates to false.
#[macro_export]
macro_rules! invariant {
    ($expr:expr, $($tt:tt)*) => {
        if !$expr {
            $crate::internal!($($tt)*);
        }
    };
    ($expr:expr) => {
        if !$expr {
            $crate::internal!("assertion failed: {}", std::stringify!($expr));
        }
    };
}

/// Return a [`QexprError::Internal`] from the current function if the two arguments are not
/// equal.
#[macro_export]
macro_rules! invariant_eq {
    ($expr:expr, $expr2:expr, $($tt:tt)*) => {
        if $expr != $expr2 {
            $crate::internal!(
                "assertion failed: {} == {} ({});\nleft = {:?};\nright = {:?}",
                std::stringify!($expr),
                std::stringify!($expr2),
                format_args!($($tt)*),
                $expr,
                $expr2
            )
        }
    };
    ($expr:expr, $expr2:expr) => {
        if $expr != $expr2 {
            $crate::internal!(
                "assertion failed: {} == {};\nleft = {:?};\nright = {:?}",
                std::stringify!($expr),
                std::stringify!($expr2),
                $expr,
                $expr2
            )
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_invariant(n: usize) -> QexprResult<usize> {
        invariant!(n > 1, "n must be greater than one, got {}", n);
        Ok(n)
    }

    fn fails_invariant_eq(n: usize) -> QexprResult<()> {
        invariant_eq!(n, 5);
        Ok(())
    }

    #[test]
    fn invariant_returns_internal_error() {
        let err = fails_invariant(1).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("n must be greater than one, got 1"));
        assert_eq!(fails_invariant(3), Ok(3));
    }

    #[test]
    fn invariant_eq_renders_both_sides() {
        let err = fails_invariant_eq(2).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("left = 2"), "{message}");
        assert!(message.contains("right = 5"), "{message}");
    }

    #[test]
    fn materialization_shape_message_names_projection_and_type() {
        let err = QexprError::InvalidMaterializationShape {
            projection: "c => c.Orders.OrderBy(o => o.Id)".into(),
            ty: "IOrderedEnumerable<Order>".into(),
        };
        let message = err.to_string();
        assert!(message.contains("'c => c.Orders.OrderBy(o => o.Id)'"));
        assert!(message.contains("of type 'IOrderedEnumerable<Order>'"));
        assert!(err.is_invalid_materialization_shape());
    }
}
