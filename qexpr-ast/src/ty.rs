use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use test_strategy::Arbitrary;

/// Primitive value types that can appear in query expressions
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize, Arbitrary,
)]
pub enum ScalarType {
    Bool,
    Int,
    Long,
    Double,
    Decimal,
    String,
    /// `byte[]`, which is treated as a scalar rather than as a sequence of bytes
    Bytes,
    DateTime,
    Guid,
    Char,
}

impl ScalarType {
    /// Returns true if values of this type are passed by value rather than by reference
    pub fn is_value_type(self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Long => "long",
            ScalarType::Double => "double",
            ScalarType::Decimal => "decimal",
            ScalarType::String => "string",
            ScalarType::Bytes => "byte[]",
            ScalarType::DateTime => "DateTime",
            ScalarType::Guid => "Guid",
            ScalarType::Char => "char",
        }
    }
}

/// The concrete shape of a sequence type.
///
/// Each kind implements a fixed set of [`SequenceInterface`]s, see [`SequenceKind::implements`].
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize, Arbitrary,
)]
pub enum SequenceKind {
    /// `IEnumerable<T>`
    Enumerable,
    /// `IOrderedEnumerable<T>`
    OrderedEnumerable,
    /// `IQueryable<T>`
    Queryable,
    /// `IOrderedQueryable<T>`
    OrderedQueryable,
    /// `ICollection<T>`
    Collection,
    /// `IReadOnlyList<T>`
    ReadOnlyList,
    /// `List<T>`
    List,
    /// `T[]`
    Array,
    /// `HashSet<T>`
    HashSet,
    /// `ImmutableArray<T>`, the only value-type sequence
    ImmutableArray,
}

/// Capabilities a sequence type may implement
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum SequenceInterface {
    Enumerable,
    OrderedEnumerable,
    Queryable,
    OrderedQueryable,
    Collection,
    ReadOnlyList,
}

impl SequenceKind {
    /// Returns true if a sequence of this kind implements the given interface
    pub fn implements(self, interface: SequenceInterface) -> bool {
        use SequenceInterface as I;
        match self {
            SequenceKind::Enumerable => interface == I::Enumerable,
            SequenceKind::OrderedEnumerable => {
                matches!(interface, I::Enumerable | I::OrderedEnumerable)
            }
            SequenceKind::Queryable => matches!(interface, I::Enumerable | I::Queryable),
            SequenceKind::OrderedQueryable => matches!(
                interface,
                I::Enumerable | I::Queryable | I::OrderedQueryable
            ),
            SequenceKind::Collection | SequenceKind::HashSet => {
                matches!(interface, I::Enumerable | I::Collection)
            }
            SequenceKind::ReadOnlyList => matches!(interface, I::Enumerable | I::ReadOnlyList),
            SequenceKind::List | SequenceKind::Array | SequenceKind::ImmutableArray => matches!(
                interface,
                I::Enumerable | I::Collection | I::ReadOnlyList
            ),
        }
    }
}

/// Anonymous types, tuples and other structural records
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordType {
    /// `None` for anonymous types
    pub name: Option<String>,
    pub fields: Vec<(String, Type)>,
    pub is_value_type: bool,
}

impl RecordType {
    /// Look up the type of a field by name
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find_map(|(field, ty)| (field == name).then_some(ty))
    }
}

/// The static type of an expression
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    /// `object`, also used as the type of untyped placeholder expressions
    Object,
    Scalar(ScalarType),
    /// A mapped entity type, identified by name
    Entity(String),
    Record(RecordType),
    Sequence(SequenceKind, Box<Type>),
    /// `IGrouping<TKey, TElement>`, which is an enumerable of `TElement`
    Grouping { key: Box<Type>, element: Box<Type> },
    /// `IIncludableQueryable<TEntity, TProperty>`, which is a queryable of `TEntity`
    Includable {
        entity: Box<Type>,
        property: Box<Type>,
    },
    /// A delegate type (`Func<..., TResult>`)
    Function {
        parameters: Vec<Type>,
        result: Box<Type>,
    },
    /// A quoted delegate type (`Expression<Func<...>>`)
    Expression(Box<Type>),
    /// A generic method parameter, only present in method definitions
    Generic(usize),
}

impl Type {
    pub fn bool() -> Self {
        Type::Scalar(ScalarType::Bool)
    }

    pub fn int() -> Self {
        Type::Scalar(ScalarType::Int)
    }

    pub fn long() -> Self {
        Type::Scalar(ScalarType::Long)
    }

    pub fn double() -> Self {
        Type::Scalar(ScalarType::Double)
    }

    pub fn string() -> Self {
        Type::Scalar(ScalarType::String)
    }

    pub fn entity<S: Into<String>>(name: S) -> Self {
        Type::Entity(name.into())
    }

    pub fn sequence(kind: SequenceKind, element: Type) -> Self {
        Type::Sequence(kind, Box::new(element))
    }

    pub fn enumerable(element: Type) -> Self {
        Self::sequence(SequenceKind::Enumerable, element)
    }

    pub fn ordered_enumerable(element: Type) -> Self {
        Self::sequence(SequenceKind::OrderedEnumerable, element)
    }

    pub fn queryable(element: Type) -> Self {
        Self::sequence(SequenceKind::Queryable, element)
    }

    pub fn ordered_queryable(element: Type) -> Self {
        Self::sequence(SequenceKind::OrderedQueryable, element)
    }

    pub fn list(element: Type) -> Self {
        Self::sequence(SequenceKind::List, element)
    }

    pub fn array(element: Type) -> Self {
        Self::sequence(SequenceKind::Array, element)
    }

    pub fn func(parameters: Vec<Type>, result: Type) -> Self {
        Type::Function {
            parameters,
            result: Box::new(result),
        }
    }

    pub fn quoted(delegate: Type) -> Self {
        Type::Expression(Box::new(delegate))
    }

    pub fn grouping(key: Type, element: Type) -> Self {
        Type::Grouping {
            key: Box::new(key),
            element: Box::new(element),
        }
    }

    pub fn includable(entity: Type, property: Type) -> Self {
        Type::Includable {
            entity: Box::new(entity),
            property: Box::new(property),
        }
    }

    /// An anonymous record type with the given fields
    pub fn anonymous<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Type)>,
        S: Into<String>,
    {
        Type::Record(RecordType {
            name: None,
            fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
            is_value_type: false,
        })
    }

    /// If this type implements the given sequence interface, returns its element type
    pub fn element_type_of(&self, interface: SequenceInterface) -> Option<&Type> {
        match self {
            Type::Sequence(kind, element) if kind.implements(interface) => Some(element),
            Type::Grouping { element, .. } if interface == SequenceInterface::Enumerable => {
                Some(element)
            }
            Type::Includable { entity, .. }
                if matches!(
                    interface,
                    SequenceInterface::Enumerable | SequenceInterface::Queryable
                ) =>
            {
                Some(entity)
            }
            _ => None,
        }
    }

    /// Returns the element type if this type is any kind of sequence
    pub fn sequence_type(&self) -> Option<&Type> {
        self.element_type_of(SequenceInterface::Enumerable)
    }

    /// Returns true if this type is exactly a sequence of the given kind (not merely a type
    /// implementing it)
    pub fn is_sequence_of_kind(&self, kind: SequenceKind) -> bool {
        matches!(self, Type::Sequence(k, _) if *k == kind)
    }

    pub fn is_value_type(&self) -> bool {
        match self {
            Type::Scalar(scalar) => scalar.is_value_type(),
            Type::Record(record) => record.is_value_type,
            Type::Sequence(kind, _) => *kind == SequenceKind::ImmutableArray,
            _ => false,
        }
    }

    /// Replace all generic method parameters in this type with the given arguments
    pub fn substitute(&self, arguments: &[Type]) -> Type {
        match self {
            Type::Generic(idx) => arguments.get(*idx).cloned().unwrap_or(Type::Generic(*idx)),
            Type::Object | Type::Scalar(_) | Type::Entity(_) => self.clone(),
            Type::Record(record) => Type::Record(RecordType {
                name: record.name.clone(),
                fields: record
                    .fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.substitute(arguments)))
                    .collect(),
                is_value_type: record.is_value_type,
            }),
            Type::Sequence(kind, element) => Type::sequence(*kind, element.substitute(arguments)),
            Type::Grouping { key, element } => {
                Type::grouping(key.substitute(arguments), element.substitute(arguments))
            }
            Type::Includable { entity, property } => {
                Type::includable(entity.substitute(arguments), property.substitute(arguments))
            }
            Type::Function { parameters, result } => Type::func(
                parameters.iter().map(|p| p.substitute(arguments)).collect(),
                result.substitute(arguments),
            ),
            Type::Expression(delegate) => Type::quoted(delegate.substitute(arguments)),
        }
    }

    /// The delegate type wrapped by an `Expression<...>` type
    pub fn unquoted(&self) -> Option<&Type> {
        match self {
            Type::Expression(delegate) => Some(delegate),
            _ => None,
        }
    }

    /// A short, human-readable name of this type, used in diagnostics
    pub fn short_display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => write!(f, "object"),
            Type::Scalar(scalar) => write!(f, "{}", scalar.name()),
            Type::Entity(name) => write!(f, "{name}"),
            Type::Record(RecordType {
                name: Some(name), ..
            }) => write!(f, "{name}"),
            Type::Record(RecordType {
                name: None,
                fields,
                is_value_type: true,
            }) => write!(
                f,
                "ValueTuple<{}>",
                fields.iter().map(|(_, ty)| ty).format(", ")
            ),
            Type::Record(RecordType {
                name: None, fields, ..
            }) => write!(
                f,
                "AnonymousType<{}>",
                fields.iter().map(|(_, ty)| ty).format(", ")
            ),
            Type::Sequence(kind, element) => {
                let name = match kind {
                    SequenceKind::Array => return write!(f, "{element}[]"),
                    SequenceKind::Enumerable => "IEnumerable",
                    SequenceKind::OrderedEnumerable => "IOrderedEnumerable",
                    SequenceKind::Queryable => "IQueryable",
                    SequenceKind::OrderedQueryable => "IOrderedQueryable",
                    SequenceKind::Collection => "ICollection",
                    SequenceKind::ReadOnlyList => "IReadOnlyList",
                    SequenceKind::List => "List",
                    SequenceKind::HashSet => "HashSet",
                    SequenceKind::ImmutableArray => "ImmutableArray",
                };
                write!(f, "{name}<{element}>")
            }
            Type::Grouping { key, element } => write!(f, "IGrouping<{key}, {element}>"),
            Type::Includable { entity, property } => {
                write!(f, "IIncludableQueryable<{entity}, {property}>")
            }
            Type::Function { parameters, result } => {
                if parameters.is_empty() {
                    write!(f, "Func<{result}>")
                } else {
                    write!(f, "Func<{}, {result}>", parameters.iter().format(", "))
                }
            }
            Type::Expression(delegate) => write!(f, "Expression<{delegate}>"),
            Type::Generic(idx) => write!(f, "T{idx}"),
        }
    }
}
