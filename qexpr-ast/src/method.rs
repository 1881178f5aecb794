use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Type;

/// The family a method belongs to, analogous to the static class declaring it
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MethodFamily {
    /// In-memory sequence operators (`System.Linq.Enumerable`)
    Enumerable,
    /// Query-provider sequence operators (`System.Linq.Queryable`)
    Queryable,
    /// Operators that annotate a query rather than shaping its results (tracking, tags, query
    /// filters, eager loading)
    QueryMetadata,
    /// `EF.Constant` and `EF.Parameter`
    ParameterHint,
    /// Provider-specific parameter hints such as `MultipleParameters`
    RelationalParameterHint,
    /// Instance methods declared on the given type
    Instance(Type),
    /// Any other static class, identified by name
    Other(String),
}

impl fmt::Display for MethodFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFamily::Enumerable => f.write_str("Enumerable"),
            MethodFamily::Queryable => f.write_str("Queryable"),
            MethodFamily::QueryMetadata => f.write_str("EntityFrameworkQueryableExtensions"),
            MethodFamily::ParameterHint => f.write_str("EF"),
            MethodFamily::RelationalParameterHint => f.write_str("EF.Relational"),
            MethodFamily::Instance(ty) => write!(f, "{ty}"),
            MethodFamily::Other(name) => f.write_str(name),
        }
    }
}

/// The definition of a method: a (possibly generic) signature with [`Type::Generic`]
/// placeholders for its generic parameters
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub family: MethodFamily,
    pub name: String,
    /// Number of generic parameters; zero for non-generic methods
    pub generic_arity: usize,
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub is_static: bool,
}

impl MethodDef {
    /// Construct the definition of a static method
    pub fn new_static<S: Into<String>>(
        family: MethodFamily,
        name: S,
        generic_arity: usize,
        parameters: Vec<Type>,
        return_type: Type,
    ) -> Self {
        Self {
            family,
            name: name.into(),
            generic_arity,
            parameters,
            return_type,
            is_static: true,
        }
    }

    /// Construct the definition of a non-generic instance method declared on `declaring_type`
    pub fn new_instance<S: Into<String>>(
        declaring_type: Type,
        name: S,
        parameters: Vec<Type>,
        return_type: Type,
    ) -> Self {
        Self {
            family: MethodFamily::Instance(declaring_type),
            name: name.into(),
            generic_arity: 0,
            parameters,
            return_type,
            is_static: false,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.generic_arity > 0
    }
}

/// A reference to a method as invoked by a call: its definition plus the generic arguments it was
/// instantiated with
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Method {
    definition: Arc<MethodDef>,
    generic_arguments: Vec<Type>,
}

impl Method {
    /// Instantiate `definition` with the given generic arguments
    pub fn new(definition: Arc<MethodDef>, generic_arguments: Vec<Type>) -> Self {
        debug_assert_eq!(
            definition.generic_arity,
            generic_arguments.len(),
            "wrong number of generic arguments for {}",
            definition.name
        );
        Self {
            definition,
            generic_arguments,
        }
    }

    /// Instantiate a generic method definition. Shorthand for [`Method::new`] taking the
    /// definition by reference.
    pub fn generic(definition: &Arc<MethodDef>, generic_arguments: Vec<Type>) -> Self {
        Self::new(Arc::clone(definition), generic_arguments)
    }

    /// A non-generic method
    pub fn non_generic(definition: MethodDef) -> Self {
        Self::new(Arc::new(definition), vec![])
    }

    pub fn definition(&self) -> &Arc<MethodDef> {
        &self.definition
    }

    /// Returns true if this method is an instantiation of `definition`
    pub fn is(&self, definition: &MethodDef) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.definition), definition) || *self.definition == *definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn family(&self) -> &MethodFamily {
        &self.definition.family
    }

    pub fn is_generic(&self) -> bool {
        self.definition.is_generic()
    }

    pub fn is_static(&self) -> bool {
        self.definition.is_static
    }

    pub fn generic_arguments(&self) -> &[Type] {
        &self.generic_arguments
    }

    /// The type declaring an instance method
    pub fn declaring_type(&self) -> Option<&Type> {
        match &self.definition.family {
            MethodFamily::Instance(ty) => Some(ty),
            _ => None,
        }
    }

    /// Parameter types with generic arguments substituted
    pub fn parameter_types(&self) -> Vec<Type> {
        self.definition
            .parameters
            .iter()
            .map(|ty| ty.substitute(&self.generic_arguments))
            .collect()
    }

    /// Return type with generic arguments substituted
    pub fn return_type(&self) -> Type {
        self.definition.return_type.substitute(&self.generic_arguments)
    }

    /// The same generic definition instantiated with different generic arguments
    pub fn with_generic_arguments(&self, generic_arguments: Vec<Type>) -> Self {
        Self::new(Arc::clone(&self.definition), generic_arguments)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.definition.family, self.definition.name)?;
        if !self.generic_arguments.is_empty() {
            f.write_str("<")?;
            crate::fmt::comma_separated(f, &self.generic_arguments, |f, ty| write!(f, "{ty}"))?;
            f.write_str(">")?;
        }
        Ok(())
    }
}
