use std::fmt;

use itertools::Itertools;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

/// The value of a constant expression
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    String(String),
    /// An in-memory collection of values
    List(Vec<Literal>),
    /// An opaque object reference, such as the query root of an entity set or a captured closure
    /// object, identified by a display name
    Reference(String),
}

impl Literal {
    /// Returns true if this is the integer zero
    pub fn is_zero(&self) -> bool {
        matches!(self, Literal::Integer(0))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Literal::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Integer(i)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Integer(i.into())
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_owned())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Literal::List(values) => write!(f, "{{ {} }}", values.iter().format(", ")),
            Literal::Reference(name) => f.write_str(name),
        }
    }
}

impl Arbitrary for Literal {
    type Parameters = ();
    type Strategy = BoxedStrategy<Literal>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let leaf = prop_oneof![
            Just(Literal::Null),
            any::<bool>().prop_map(Literal::Boolean),
            any::<i64>().prop_map(Literal::Integer),
            "[a-z]{0,8}".prop_map(Literal::String),
        ];
        leaf.prop_recursive(2, 8, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Literal::List)
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_escapes_quotes() {
        assert_eq!(Literal::from("a\"b").to_string(), "\"a\\\"b\"");
    }

    #[test]
    fn display_list() {
        let list = Literal::List(vec![1.into(), 2.into()]);
        assert_eq!(list.to_string(), "{ 1, 2 }");
    }
}
