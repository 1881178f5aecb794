use std::fmt;
use std::mem;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::analysis::visit::{self, Visitor};
use crate::fmt::comma_separated;
use crate::{Literal, Method, MethodDef, MethodFamily, Type};

/// Unique identifier of a lambda parameter. Parameters are the same binding if and only if their
/// ids are equal; names are only used for display.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    Eq,
    From,
    Hash,
    PartialEq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[display("#{_0}")]
pub struct ParamId(pub u32);

/// A lambda parameter, or a reference to one
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParamId,
    pub name: String,
    pub ty: Type,
}

impl Parameter {
    pub fn new<S: Into<String>>(id: u32, name: S, ty: Type) -> Self {
        Self {
            id: ParamId(id),
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "p{}", self.id.0)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Allocates parameters with ids that don't collide with any parameter in a given tree.
///
/// Generators seeded from the same tree hand out the same ids in the same order, which keeps
/// rewrites that introduce parameters deterministic.
#[derive(Debug, Clone, Default)]
pub struct ParameterGenerator {
    next: u32,
}

impl ParameterGenerator {
    /// A generator whose ids follow the largest parameter id occurring anywhere in `expr`
    pub fn following(expr: &Expr) -> Self {
        #[derive(Default)]
        struct MaxParamId(Option<u32>);

        impl<'ast> Visitor<'ast> for MaxParamId {
            type Error = std::convert::Infallible;

            fn visit_parameter(&mut self, parameter: &'ast Parameter) -> Result<(), Self::Error> {
                self.0 = self.0.max(Some(parameter.id.0));
                Ok(())
            }

            fn visit_lambda(&mut self, lambda: &'ast Lambda) -> Result<(), Self::Error> {
                for parameter in &lambda.parameters {
                    self.visit_parameter(parameter)?;
                }
                visit::walk_lambda(self, lambda)
            }
        }

        let mut max = MaxParamId::default();
        let Ok(()) = max.visit_expr(expr);
        Self {
            next: max.0.map_or(0, |id| id + 1),
        }
    }

    /// Allocate a new parameter
    pub fn fresh<S: Into<String>>(&mut self, name: S, ty: Type) -> Parameter {
        let id = self.next;
        self.next += 1;
        Parameter::new(id, name, ty)
    }
}

/// A field or property, as accessed by [`Expr::Member`]
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub declaring_type: Type,
    pub ty: Type,
}

impl Member {
    pub fn new<S: Into<String>>(name: S, declaring_type: Type, ty: Type) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            ty,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    /// Short-circuiting logical and
    And,
    /// Short-circuiting logical or
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Coalesce,
    /// `array[index]`
    ArrayIndex,
}

impl BinaryOperator {
    /// Returns true if this operator always produces a boolean
    pub fn is_predicate(self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            Equal | NotEqual | Greater | GreaterOrEqual | Less | LessOrEqual | And | Or
        )
    }

    fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Equal => "==",
            NotEqual => "!=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Less => "<",
            LessOrEqual => "<=",
            And => "&&",
            Or => "||",
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            Coalesce => "??",
            ArrayIndex => "[]",
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// `array.Length`
    ArrayLength,
    /// `(T)operand`
    Convert(Type),
    /// `operand as T`
    TypeAs(Type),
    Not,
    Negate,
}

/// How a query parameter should be sent to the database
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ParameterTranslationMode {
    /// No hint was given; the provider decides
    #[default]
    Plain,
    /// Inline the value into the query as a constant
    Constant,
    /// Send the value as a single parameter
    Parameter,
    /// Expand a collection value into one parameter per element
    MultipleParameters,
}

/// A placeholder for a value supplied when the query is executed, such as a captured variable
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub ty: Type,
    pub translation_mode: ParameterTranslationMode,
    pub is_non_nullable_reference_type: bool,
}

impl QueryParameter {
    pub fn new<S: Into<String>>(name: S, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            translation_mode: ParameterTranslationMode::Plain,
            is_non_nullable_reference_type: false,
        }
    }

    /// The same placeholder with a different translation mode
    pub fn with_translation_mode(&self, translation_mode: ParameterTranslationMode) -> Self {
        Self {
            translation_mode,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: Method,
    /// Receiver of instance methods; `None` for static methods
    pub object: Option<Box<Expr>>,
    pub arguments: Vec<Expr>,
}

impl MethodCall {
    /// Returns true if this is a call to an instantiation of `definition`
    pub fn is(&self, definition: &MethodDef) -> bool {
        self.method.is(definition)
    }

    /// Returns true if this calls a generic `Queryable` operator
    pub fn is_generic_queryable(&self) -> bool {
        *self.method.family() == MethodFamily::Queryable && self.method.is_generic()
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub parameters: Vec<Parameter>,
    pub body: Box<Expr>,
}

impl Lambda {
    pub fn new(parameters: Vec<Parameter>, body: Expr) -> Self {
        Self {
            parameters,
            body: Box::new(body),
        }
    }

    /// The delegate type of this lambda
    pub fn ty(&self) -> Type {
        Type::func(
            self.parameters.iter().map(|p| p.ty.clone()).collect(),
            self.body.ty(),
        )
    }

    pub fn return_type(&self) -> Type {
        self.body.ty()
    }
}

/// Construction of an object, optionally naming the members each argument initializes
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct NewExpr {
    pub ty: Type,
    pub arguments: Vec<Expr>,
    /// For anonymous types, the member each argument is assigned to
    pub members: Option<Vec<String>>,
}

impl NewExpr {
    /// Construct an anonymous object: `new { a = ..., b = ... }`
    pub fn anonymous<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        let (members, arguments): (Vec<String>, Vec<Expr>) =
            fields.into_iter().map(|(n, e)| (n.into(), e)).unzip();
        let ty = Type::anonymous(members.iter().cloned().zip(arguments.iter().map(Expr::ty)));
        Self {
            ty,
            arguments,
            members: Some(members),
        }
    }

    /// The argument initializing the member called `name`, if any
    pub fn argument_for_member(&self, name: &str) -> Option<&Expr> {
        let members = self.members.as_ref()?;
        let idx = members.iter().position(|m| m == name)?;
        self.arguments.get(idx)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum MemberBinding {
    /// `Member = expr`
    Assignment { member: String, expr: Expr },
    /// `Member = { a, b, ... }`
    List {
        member: String,
        initializers: Vec<Expr>,
    },
}

/// A node in a query expression tree
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Call(MethodCall),
    Lambda(Lambda),
    /// A lambda passed as data rather than as a delegate
    Quote(Box<Expr>),
    Parameter(Parameter),
    /// Access of a field or property; `expr` is `None` for static members
    Member {
        expr: Option<Box<Expr>>,
        member: Member,
    },
    BinaryOp {
        lhs: Box<Expr>,
        op: BinaryOperator,
        rhs: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Constant {
        value: Literal,
        ty: Type,
    },
    New(NewExpr),
    MemberInit {
        new: NewExpr,
        bindings: Vec<MemberBinding>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    QueryParameter(QueryParameter),
}

impl Expr {
    /// A call to a static method
    pub fn call(method: Method, arguments: Vec<Expr>) -> Self {
        Expr::Call(MethodCall {
            method,
            object: None,
            arguments,
        })
    }

    /// A call to an instance method on `object`
    pub fn instance_call(object: Expr, method: Method, arguments: Vec<Expr>) -> Self {
        Expr::Call(MethodCall {
            method,
            object: Some(Box::new(object)),
            arguments,
        })
    }

    pub fn lambda(parameters: Vec<Parameter>, body: Expr) -> Self {
        Expr::Lambda(Lambda::new(parameters, body))
    }

    /// A quoted lambda, the form lambdas take as arguments to queryable operators
    pub fn quoted_lambda(parameters: Vec<Parameter>, body: Expr) -> Self {
        Expr::Quote(Box::new(Self::lambda(parameters, body)))
    }

    pub fn constant<L: Into<Literal>>(value: L, ty: Type) -> Self {
        Expr::Constant {
            value: value.into(),
            ty,
        }
    }

    /// `null` of the given type
    pub fn null(ty: Type) -> Self {
        Self::constant(Literal::Null, ty)
    }

    /// Access of `name` on `expr`, declared on `expr`'s type
    pub fn member<S: Into<String>>(expr: Expr, name: S, ty: Type) -> Self {
        let declaring_type = expr.ty();
        Expr::Member {
            expr: Some(Box::new(expr)),
            member: Member::new(name, declaring_type, ty),
        }
    }

    pub fn binary(lhs: Expr, op: BinaryOperator, rhs: Expr) -> Self {
        Expr::BinaryOp {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// The static type of the value this expression produces
    pub fn ty(&self) -> Type {
        match self {
            Expr::Call(call) => call.method.return_type(),
            Expr::Lambda(lambda) => lambda.ty(),
            Expr::Quote(inner) => Type::quoted(inner.ty()),
            Expr::Parameter(parameter) => parameter.ty.clone(),
            Expr::Member { member, .. } => member.ty.clone(),
            Expr::BinaryOp { lhs, op, rhs } => match op {
                op if op.is_predicate() => Type::bool(),
                BinaryOperator::ArrayIndex => {
                    lhs.ty().sequence_type().cloned().unwrap_or(Type::Object)
                }
                BinaryOperator::Coalesce => rhs.ty(),
                _ => lhs.ty(),
            },
            Expr::UnaryOp { op, operand } => match op {
                UnaryOperator::ArrayLength => Type::int(),
                UnaryOperator::Convert(ty) | UnaryOperator::TypeAs(ty) => ty.clone(),
                UnaryOperator::Not | UnaryOperator::Negate => operand.ty(),
            },
            Expr::Constant { ty, .. } => ty.clone(),
            Expr::New(new) | Expr::MemberInit { new, .. } => new.ty.clone(),
            Expr::Conditional { if_true, .. } => if_true.ty(),
            Expr::QueryParameter(qp) => qp.ty.clone(),
        }
    }

    /// Replace this expression with a placeholder and return the original, so it can be rewritten
    /// by value
    pub fn take(&mut self) -> Self {
        mem::replace(self, Expr::null(Type::Object))
    }

    pub fn as_call(&self) -> Option<&MethodCall> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    /// The lambda this expression is, or quotes
    pub fn unwrap_lambda_from_quote(&self) -> Option<&Lambda> {
        match self {
            Expr::Quote(inner) => inner.unwrap_lambda_from_quote(),
            Expr::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// Like [`Expr::unwrap_lambda_from_quote`], but by value. Returns the expression back if it
    /// is not a lambda.
    pub fn into_lambda_from_quote(self) -> Result<Lambda, Expr> {
        match self {
            Expr::Quote(inner) => inner.into_lambda_from_quote(),
            Expr::Lambda(lambda) => Ok(lambda),
            expr => Err(expr),
        }
    }

    pub fn is_object_construction(&self) -> bool {
        matches!(self, Expr::New(_) | Expr::MemberInit { .. })
    }
}

impl From<Parameter> for Expr {
    fn from(parameter: Parameter) -> Self {
        Expr::Parameter(parameter)
    }
}

impl From<&Parameter> for Expr {
    fn from(parameter: &Parameter) -> Self {
        Expr::Parameter(parameter.clone())
    }
}

impl From<MethodCall> for Expr {
    fn from(call: MethodCall) -> Self {
        Expr::Call(call)
    }
}

impl From<Lambda> for Expr {
    fn from(lambda: Lambda) -> Self {
        Expr::Lambda(lambda)
    }
}

impl From<QueryParameter> for Expr {
    fn from(qp: QueryParameter) -> Self {
        Expr::QueryParameter(qp)
    }
}

/// Operands that need parentheses when printed inside a binary or conditional expression
fn needs_parens(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::BinaryOp { op, .. } if *op != BinaryOperator::ArrayIndex
    ) || matches!(expr, Expr::Conditional { .. } | Expr::Lambda(_))
}

struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if needs_parens(self.0) {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for NewExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.members {
            Some(members) => {
                f.write_str("new { ")?;
                let fields: Vec<_> = members.iter().zip(&self.arguments).collect();
                comma_separated(f, &fields, |f, (member, arg)| write!(f, "{member} = {arg}"))?;
                f.write_str(" }")
            }
            None => {
                write!(f, "new {}(", self.ty)?;
                comma_separated(f, &self.arguments, |f, arg| write!(f, "{arg}"))?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameters.as_slice() {
            [parameter] => write!(f, "{parameter} => {}", self.body),
            parameters => {
                f.write_str("(")?;
                comma_separated(f, parameters, |f, p| write!(f, "{p}"))?;
                write!(f, ") => {}", self.body)
            }
        }
    }
}

impl fmt::Display for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.method.name();
        match (&self.object, self.method.family()) {
            (Some(object), _) => {
                write!(f, "{}.{name}(", Operand(object))?;
                comma_separated(f, &self.arguments, |f, arg| write!(f, "{arg}"))?;
                f.write_str(")")
            }
            // Extension methods print with their first argument as the receiver
            (
                None,
                MethodFamily::Queryable | MethodFamily::Enumerable | MethodFamily::QueryMetadata,
            ) if !self.arguments.is_empty() => {
                write!(f, "{}.{name}(", Operand(&self.arguments[0]))?;
                comma_separated(f, &self.arguments[1..], |f, arg| write!(f, "{arg}"))?;
                f.write_str(")")
            }
            (None, family) => {
                write!(f, "{family}.{name}(")?;
                comma_separated(f, &self.arguments, |f, arg| write!(f, "{arg}"))?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Call(call) => write!(f, "{call}"),
            Expr::Lambda(lambda) => write!(f, "{lambda}"),
            Expr::Quote(inner) => write!(f, "{inner}"),
            Expr::Parameter(parameter) => write!(f, "{parameter}"),
            Expr::Member {
                expr: Some(expr),
                member,
            } => write!(f, "{}.{}", Operand(expr), member.name),
            Expr::Member { expr: None, member } => {
                write!(f, "{}.{}", member.declaring_type, member.name)
            }
            Expr::BinaryOp {
                lhs,
                op: BinaryOperator::ArrayIndex,
                rhs,
            } => write!(f, "{}[{rhs}]", Operand(lhs)),
            Expr::BinaryOp { lhs, op, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOperator::ArrayLength => write!(f, "{}.Length", Operand(operand)),
                UnaryOperator::Convert(ty) => write!(f, "({ty}){}", Operand(operand)),
                UnaryOperator::TypeAs(ty) => write!(f, "({} as {ty})", Operand(operand)),
                UnaryOperator::Not => write!(f, "!{}", Operand(operand)),
                UnaryOperator::Negate => write!(f, "-{}", Operand(operand)),
            },
            Expr::Constant { value, .. } => write!(f, "{value}"),
            Expr::New(new) => write!(f, "{new}"),
            Expr::MemberInit { new, bindings } => {
                write!(f, "{new} {{ ")?;
                comma_separated(f, bindings, |f, binding| match binding {
                    MemberBinding::Assignment { member, expr } => write!(f, "{member} = {expr}"),
                    MemberBinding::List {
                        member,
                        initializers,
                    } => {
                        write!(f, "{member} = {{ ")?;
                        comma_separated(f, initializers, |f, e| write!(f, "{e}"))?;
                        f.write_str(" }")
                    }
                })?;
                f.write_str(" }")
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(
                f,
                "{} ? {} : {}",
                Operand(test),
                Operand(if_true),
                Operand(if_false)
            ),
            Expr::QueryParameter(qp) => write!(f, "@{}", qp.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::QUERYABLE_METHODS;

    fn customers() -> Expr {
        Expr::constant(
            Literal::Reference("DbSet<Customer>()".into()),
            Type::queryable(Type::entity("Customer")),
        )
    }

    #[test]
    fn parameter_generator_follows_largest_id() {
        let c = Parameter::new(7, "c", Type::entity("Customer"));
        let expr = Expr::call(
            Method::generic(&QUERYABLE_METHODS.where_, vec![Type::entity("Customer")]),
            vec![
                customers(),
                Expr::quoted_lambda(
                    vec![c.clone()],
                    Expr::binary(
                        Expr::member((&c).into(), "Id", Type::int()),
                        BinaryOperator::Equal,
                        Expr::constant(1, Type::int()),
                    ),
                ),
            ],
        );
        let mut generator = ParameterGenerator::following(&expr);
        assert_eq!(generator.fresh("x", Type::int()).id, ParamId(8));
        assert_eq!(generator.fresh("y", Type::int()).id, ParamId(9));
        assert_eq!(
            ParameterGenerator::following(&customers())
                .fresh("z", Type::int())
                .id,
            ParamId(0)
        );
    }

    #[test]
    fn display_where_call() {
        let c = Parameter::new(0, "c", Type::entity("Customer"));
        let expr = Expr::call(
            Method::generic(&QUERYABLE_METHODS.where_, vec![Type::entity("Customer")]),
            vec![
                customers(),
                Expr::quoted_lambda(
                    vec![c.clone()],
                    Expr::binary(
                        Expr::binary(
                            Expr::member((&c).into(), "Name", Type::string()),
                            BinaryOperator::NotEqual,
                            Expr::null(Type::string()),
                        ),
                        BinaryOperator::And,
                        Expr::binary(
                            Expr::member((&c).into(), "Id", Type::int()),
                            BinaryOperator::Greater,
                            Expr::constant(3, Type::int()),
                        ),
                    ),
                ),
            ],
        );
        assert_eq!(
            expr.to_string(),
            "DbSet<Customer>().Where(c => (c.Name != null) && (c.Id > 3))"
        );
    }

    #[test]
    fn display_anonymous_object() {
        let c = Parameter::new(0, "c", Type::entity("Customer"));
        let new = Expr::New(NewExpr::anonymous([
            ("Id", Expr::member((&c).into(), "Id", Type::int())),
            ("Tag", Expr::constant("x", Type::string())),
        ]));
        assert_eq!(new.to_string(), "new { Id = c.Id, Tag = \"x\" }");
        assert_eq!(
            new.ty(),
            Type::anonymous([("Id", Type::int()), ("Tag", Type::string())])
        );
    }

    #[test]
    fn array_index_type_is_element_type() {
        let array = Expr::constant(
            Literal::List(vec![1.into()]),
            Type::array(Type::int()),
        );
        let index = Expr::binary(
            array,
            BinaryOperator::ArrayIndex,
            Expr::constant(0, Type::int()),
        );
        assert_eq!(index.ty(), Type::int());
        assert_eq!(index.to_string(), "{ 1 }[0]");
    }

    #[test]
    fn unwrap_lambda_through_quote() {
        let p = Parameter::new(0, "p", Type::int());
        let quoted = Expr::quoted_lambda(vec![p.clone()], (&p).into());
        assert_eq!(
            quoted.unwrap_lambda_from_quote().map(|l| l.parameters.len()),
            Some(1)
        );
        assert!(quoted.clone().into_lambda_from_quote().is_ok());
        assert!(customers().into_lambda_from_quote().is_err());
        assert_eq!(
            quoted.ty(),
            Type::quoted(Type::func(vec![Type::int()], Type::int()))
        );
    }

    #[test]
    fn take_leaves_placeholder() {
        let mut expr = customers();
        let taken = expr.take();
        assert_eq!(taken, customers());
        assert_eq!(expr, Expr::null(Type::Object));
    }
}
