//! Static knowledge about the query operators: definitions for every operator the normalizer
//! recognizes, grouped by family, plus a lookup table used to find the queryable-domain
//! counterpart of an enumerable-domain operator.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::{MethodDef, MethodFamily, Type};

lazy_static! {
    /// Definitions of the `Queryable` operators
    pub static ref QUERYABLE_METHODS: QueryableMethods = QueryableMethods::new();
    /// Definitions of the `Enumerable` operators
    pub static ref ENUMERABLE_METHODS: EnumerableMethods = EnumerableMethods::new();
    /// Definitions of the query metadata and eager-loading operators
    pub static ref QUERY_METADATA_METHODS: QueryMetadataMethods = QueryMetadataMethods::new();
    /// Definitions of the parameter translation hints
    pub static ref PARAMETER_HINT_METHODS: ParameterHintMethods = ParameterHintMethods::new();
    /// All operator definitions, indexed by family, name and parameter count
    pub static ref OPERATOR_SIGNATURES: OperatorSignatures = OperatorSignatures::new();
}

fn t(idx: usize) -> Type {
    Type::Generic(idx)
}

fn q(element: Type) -> Type {
    Type::queryable(element)
}

fn oq(element: Type) -> Type {
    Type::ordered_queryable(element)
}

fn e(element: Type) -> Type {
    Type::enumerable(element)
}

fn oe(element: Type) -> Type {
    Type::ordered_enumerable(element)
}

/// Quoted delegate type, the shape of lambda parameters to queryable operators
fn x(parameters: Vec<Type>, result: Type) -> Type {
    Type::quoted(Type::func(parameters, result))
}

/// Unquoted delegate type, the shape of lambda parameters to enumerable operators
fn f(parameters: Vec<Type>, result: Type) -> Type {
    Type::func(parameters, result)
}

/// Collects definitions of one family as they are declared, preserving declaration order
struct FamilyBuilder {
    family: MethodFamily,
    all: Vec<Arc<MethodDef>>,
}

impl FamilyBuilder {
    fn new(family: MethodFamily) -> Self {
        Self {
            family,
            all: vec![],
        }
    }

    fn def(
        &mut self,
        name: &str,
        generic_arity: usize,
        parameters: Vec<Type>,
        return_type: Type,
    ) -> Arc<MethodDef> {
        let def = Arc::new(MethodDef::new_static(
            self.family.clone(),
            name,
            generic_arity,
            parameters,
            return_type,
        ));
        self.all.push(Arc::clone(&def));
        def
    }

    /// Declare the element-returning operators (`First`, `Single`, ...) with and without a
    /// predicate
    fn element_operators(&mut self, source: fn(Type) -> Type, predicate: fn(Type) -> Type) {
        for name in [
            "First",
            "FirstOrDefault",
            "Single",
            "SingleOrDefault",
            "Last",
            "LastOrDefault",
        ] {
            self.def(name, 1, vec![source(t(0))], t(0));
            self.def(name, 1, vec![source(t(0)), predicate(t(0))], t(0));
        }
    }

    /// Declare the set operators taking a second sequence (`Concat`, `Union`, ...)
    fn set_operators(&mut self, source: fn(Type) -> Type) {
        for name in ["Concat", "Union", "Intersect", "Except"] {
            self.def(name, 1, vec![source(t(0)), e(t(0))], source(t(0)));
        }
    }
}

/// Definitions of the `Queryable` operators. Operators the normalizer constructs directly are
/// exposed as fields; every declared operator is listed in `all`, in declaration order.
pub struct QueryableMethods {
    pub as_queryable: Arc<MethodDef>,
    pub where_: Arc<MethodDef>,
    pub select: Arc<MethodDef>,
    pub select_many_without_collection_selector: Arc<MethodDef>,
    pub select_many_with_collection_selector: Arc<MethodDef>,
    pub join: Arc<MethodDef>,
    pub left_join: Arc<MethodDef>,
    pub group_join: Arc<MethodDef>,
    pub order_by: Arc<MethodDef>,
    pub order_by_descending: Arc<MethodDef>,
    pub order: Arc<MethodDef>,
    pub order_descending: Arc<MethodDef>,
    pub contains: Arc<MethodDef>,
    pub default_if_empty_without_argument: Arc<MethodDef>,
    pub all: Vec<Arc<MethodDef>>,
}

impl QueryableMethods {
    fn new() -> Self {
        let mut b = FamilyBuilder::new(MethodFamily::Queryable);
        let pred = |ty: Type| x(vec![ty], Type::bool());

        let as_queryable = b.def("AsQueryable", 1, vec![e(t(0))], q(t(0)));
        let where_ = b.def("Where", 1, vec![q(t(0)), pred(t(0))], q(t(0)));
        b.def(
            "Where",
            1,
            vec![q(t(0)), x(vec![t(0), Type::int()], Type::bool())],
            q(t(0)),
        );
        let select = b.def("Select", 2, vec![q(t(0)), x(vec![t(0)], t(1))], q(t(1)));
        b.def(
            "Select",
            2,
            vec![q(t(0)), x(vec![t(0), Type::int()], t(1))],
            q(t(1)),
        );
        let select_many_without_collection_selector = b.def(
            "SelectMany",
            2,
            vec![q(t(0)), x(vec![t(0)], e(t(1)))],
            q(t(1)),
        );
        let select_many_with_collection_selector = b.def(
            "SelectMany",
            3,
            vec![
                q(t(0)),
                x(vec![t(0)], e(t(1))),
                x(vec![t(0), t(1)], t(2)),
            ],
            q(t(2)),
        );
        let join_parameters = vec![
            q(t(0)),
            e(t(1)),
            x(vec![t(0)], t(2)),
            x(vec![t(1)], t(2)),
            x(vec![t(0), t(1)], t(3)),
        ];
        let join = b.def("Join", 4, join_parameters.clone(), q(t(3)));
        let left_join = b.def("LeftJoin", 4, join_parameters, q(t(3)));
        let group_join = b.def(
            "GroupJoin",
            4,
            vec![
                q(t(0)),
                e(t(1)),
                x(vec![t(0)], t(2)),
                x(vec![t(1)], t(2)),
                x(vec![t(0), e(t(1))], t(3)),
            ],
            q(t(3)),
        );
        let order_by = b.def("OrderBy", 2, vec![q(t(0)), x(vec![t(0)], t(1))], oq(t(0)));
        let order_by_descending = b.def(
            "OrderByDescending",
            2,
            vec![q(t(0)), x(vec![t(0)], t(1))],
            oq(t(0)),
        );
        b.def("ThenBy", 2, vec![oq(t(0)), x(vec![t(0)], t(1))], oq(t(0)));
        b.def(
            "ThenByDescending",
            2,
            vec![oq(t(0)), x(vec![t(0)], t(1))],
            oq(t(0)),
        );
        let order = b.def("Order", 1, vec![q(t(0))], oq(t(0)));
        let order_descending = b.def("OrderDescending", 1, vec![q(t(0))], oq(t(0)));
        b.def(
            "GroupBy",
            2,
            vec![q(t(0)), x(vec![t(0)], t(1))],
            q(Type::grouping(t(1), t(0))),
        );
        b.def("Any", 1, vec![q(t(0))], Type::bool());
        b.def("Any", 1, vec![q(t(0)), pred(t(0))], Type::bool());
        b.def("All", 1, vec![q(t(0)), pred(t(0))], Type::bool());
        b.def("Count", 1, vec![q(t(0))], Type::int());
        b.def("Count", 1, vec![q(t(0)), pred(t(0))], Type::int());
        b.def("LongCount", 1, vec![q(t(0))], Type::long());
        b.element_operators(q, pred);
        b.def("ElementAt", 1, vec![q(t(0)), Type::int()], t(0));
        b.def("ElementAtOrDefault", 1, vec![q(t(0)), Type::int()], t(0));
        b.def("Skip", 1, vec![q(t(0)), Type::int()], q(t(0)));
        b.def("Take", 1, vec![q(t(0)), Type::int()], q(t(0)));
        b.def("Distinct", 1, vec![q(t(0))], q(t(0)));
        b.def("Reverse", 1, vec![q(t(0))], q(t(0)));
        let contains = b.def("Contains", 1, vec![q(t(0)), t(0)], Type::bool());
        b.set_operators(q);
        let default_if_empty_without_argument =
            b.def("DefaultIfEmpty", 1, vec![q(t(0))], q(t(0)));
        b.def("DefaultIfEmpty", 1, vec![q(t(0)), t(0)], q(t(0)));
        for name in ["Min", "Max"] {
            b.def(name, 1, vec![q(t(0))], t(0));
            b.def(name, 2, vec![q(t(0)), x(vec![t(0)], t(1))], t(1));
        }
        for scalar in [Type::int(), Type::double()] {
            b.def("Sum", 0, vec![q(scalar.clone())], scalar.clone());
            b.def("Sum", 1, vec![q(t(0)), x(vec![t(0)], scalar.clone())], scalar.clone());
            b.def("Average", 0, vec![q(scalar.clone())], Type::double());
            b.def("Average", 1, vec![q(t(0)), x(vec![t(0)], scalar)], Type::double());
        }
        b.def("SequenceEqual", 1, vec![q(t(0)), e(t(0))], Type::bool());

        Self {
            as_queryable,
            where_,
            select,
            select_many_without_collection_selector,
            select_many_with_collection_selector,
            join,
            left_join,
            group_join,
            order_by,
            order_by_descending,
            order,
            order_descending,
            contains,
            default_if_empty_without_argument,
            all: b.all,
        }
    }
}

/// Definitions of the `Enumerable` operators
pub struct EnumerableMethods {
    pub element_at: Arc<MethodDef>,
    pub any_without_predicate: Arc<MethodDef>,
    pub as_enumerable: Arc<MethodDef>,
    pub to_list: Arc<MethodDef>,
    pub default_if_empty_without_argument: Arc<MethodDef>,
    pub all: Vec<Arc<MethodDef>>,
}

impl EnumerableMethods {
    fn new() -> Self {
        let mut b = FamilyBuilder::new(MethodFamily::Enumerable);
        let pred = |ty: Type| f(vec![ty], Type::bool());

        let as_enumerable = b.def("AsEnumerable", 1, vec![e(t(0))], e(t(0)));
        let to_list = b.def("ToList", 1, vec![e(t(0))], Type::list(t(0)));
        b.def("ToArray", 1, vec![e(t(0))], Type::array(t(0)));
        b.def("Where", 1, vec![e(t(0)), pred(t(0))], e(t(0)));
        b.def(
            "Where",
            1,
            vec![e(t(0)), f(vec![t(0), Type::int()], Type::bool())],
            e(t(0)),
        );
        b.def("Select", 2, vec![e(t(0)), f(vec![t(0)], t(1))], e(t(1)));
        b.def(
            "Select",
            2,
            vec![e(t(0)), f(vec![t(0), Type::int()], t(1))],
            e(t(1)),
        );
        b.def("SelectMany", 2, vec![e(t(0)), f(vec![t(0)], e(t(1)))], e(t(1)));
        b.def(
            "SelectMany",
            3,
            vec![
                e(t(0)),
                f(vec![t(0)], e(t(1))),
                f(vec![t(0), t(1)], t(2)),
            ],
            e(t(2)),
        );
        let join_parameters = vec![
            e(t(0)),
            e(t(1)),
            f(vec![t(0)], t(2)),
            f(vec![t(1)], t(2)),
            f(vec![t(0), t(1)], t(3)),
        ];
        b.def("Join", 4, join_parameters.clone(), e(t(3)));
        b.def("LeftJoin", 4, join_parameters, e(t(3)));
        b.def(
            "GroupJoin",
            4,
            vec![
                e(t(0)),
                e(t(1)),
                f(vec![t(0)], t(2)),
                f(vec![t(1)], t(2)),
                f(vec![t(0), e(t(1))], t(3)),
            ],
            e(t(3)),
        );
        b.def("OrderBy", 2, vec![e(t(0)), f(vec![t(0)], t(1))], oe(t(0)));
        b.def(
            "OrderByDescending",
            2,
            vec![e(t(0)), f(vec![t(0)], t(1))],
            oe(t(0)),
        );
        b.def("ThenBy", 2, vec![oe(t(0)), f(vec![t(0)], t(1))], oe(t(0)));
        b.def(
            "ThenByDescending",
            2,
            vec![oe(t(0)), f(vec![t(0)], t(1))],
            oe(t(0)),
        );
        b.def("Order", 1, vec![e(t(0))], oe(t(0)));
        b.def("OrderDescending", 1, vec![e(t(0))], oe(t(0)));
        b.def(
            "GroupBy",
            2,
            vec![e(t(0)), f(vec![t(0)], t(1))],
            e(Type::grouping(t(1), t(0))),
        );
        let any_without_predicate = b.def("Any", 1, vec![e(t(0))], Type::bool());
        b.def("Any", 1, vec![e(t(0)), pred(t(0))], Type::bool());
        b.def("All", 1, vec![e(t(0)), pred(t(0))], Type::bool());
        b.def("Count", 1, vec![e(t(0))], Type::int());
        b.def("Count", 1, vec![e(t(0)), pred(t(0))], Type::int());
        b.def("LongCount", 1, vec![e(t(0))], Type::long());
        b.element_operators(e, pred);
        let element_at = b.def("ElementAt", 1, vec![e(t(0)), Type::int()], t(0));
        b.def("ElementAtOrDefault", 1, vec![e(t(0)), Type::int()], t(0));
        b.def("Skip", 1, vec![e(t(0)), Type::int()], e(t(0)));
        b.def("Take", 1, vec![e(t(0)), Type::int()], e(t(0)));
        b.def("Distinct", 1, vec![e(t(0))], e(t(0)));
        b.def("Reverse", 1, vec![e(t(0))], e(t(0)));
        b.def("Contains", 1, vec![e(t(0)), t(0)], Type::bool());
        b.set_operators(e);
        let default_if_empty_without_argument =
            b.def("DefaultIfEmpty", 1, vec![e(t(0))], e(t(0)));
        b.def("DefaultIfEmpty", 1, vec![e(t(0)), t(0)], e(t(0)));
        for name in ["Min", "Max"] {
            for scalar in [Type::int(), Type::double()] {
                b.def(name, 0, vec![e(scalar.clone())], scalar.clone());
                b.def(name, 1, vec![e(t(0)), f(vec![t(0)], scalar.clone())], scalar);
            }
            b.def(name, 1, vec![e(t(0))], t(0));
            b.def(name, 2, vec![e(t(0)), f(vec![t(0)], t(1))], t(1));
        }
        for scalar in [Type::int(), Type::double()] {
            b.def("Sum", 0, vec![e(scalar.clone())], scalar.clone());
            b.def("Sum", 1, vec![e(t(0)), f(vec![t(0)], scalar.clone())], scalar.clone());
            b.def("Average", 0, vec![e(scalar.clone())], Type::double());
            b.def("Average", 1, vec![e(t(0)), f(vec![t(0)], scalar)], Type::double());
        }
        b.def("SequenceEqual", 1, vec![e(t(0)), e(t(0))], Type::bool());

        Self {
            element_at,
            any_without_predicate,
            as_enumerable,
            to_list,
            default_if_empty_without_argument,
            all: b.all,
        }
    }
}

/// Definitions of the operators that annotate a query: change tracking, tags, query filters and
/// eager loading
pub struct QueryMetadataMethods {
    pub as_tracking: Arc<MethodDef>,
    pub as_no_tracking: Arc<MethodDef>,
    pub as_no_tracking_with_identity_resolution: Arc<MethodDef>,
    pub tag_with: Arc<MethodDef>,
    pub tag_with_call_site: Arc<MethodDef>,
    pub ignore_query_filters: Arc<MethodDef>,
    pub ignore_named_query_filters: Arc<MethodDef>,
    pub ignore_auto_includes: Arc<MethodDef>,
    pub include: Arc<MethodDef>,
    pub include_with_navigation_path: Arc<MethodDef>,
    pub then_include_after_enumerable: Arc<MethodDef>,
    pub then_include_after_reference: Arc<MethodDef>,
    pub not_quite_include: Arc<MethodDef>,
    pub all: Vec<Arc<MethodDef>>,
}

impl QueryMetadataMethods {
    fn new() -> Self {
        let mut b = FamilyBuilder::new(MethodFamily::QueryMetadata);

        let as_tracking = b.def("AsTracking", 1, vec![q(t(0))], q(t(0)));
        let as_no_tracking = b.def("AsNoTracking", 1, vec![q(t(0))], q(t(0)));
        let as_no_tracking_with_identity_resolution = b.def(
            "AsNoTrackingWithIdentityResolution",
            1,
            vec![q(t(0))],
            q(t(0)),
        );
        let tag_with = b.def("TagWith", 1, vec![q(t(0)), Type::string()], q(t(0)));
        let tag_with_call_site = b.def(
            "TagWithCallSite",
            1,
            vec![q(t(0)), Type::string(), Type::int()],
            q(t(0)),
        );
        let ignore_query_filters = b.def("IgnoreQueryFilters", 1, vec![q(t(0))], q(t(0)));
        let ignore_named_query_filters = b.def(
            "IgnoreNamedQueryFilters",
            1,
            vec![q(t(0)), e(Type::string())],
            q(t(0)),
        );
        let ignore_auto_includes = b.def("IgnoreAutoIncludes", 1, vec![q(t(0))], q(t(0)));
        let include = b.def(
            "Include",
            2,
            vec![q(t(0)), x(vec![t(0)], t(1))],
            Type::includable(t(0), t(1)),
        );
        let include_with_navigation_path =
            b.def("Include", 1, vec![q(t(0)), Type::string()], q(t(0)));
        let then_include_after_enumerable = b.def(
            "ThenInclude",
            3,
            vec![
                Type::includable(t(0), e(t(1))),
                x(vec![t(1)], t(2)),
            ],
            Type::includable(t(0), t(2)),
        );
        let then_include_after_reference = b.def(
            "ThenInclude",
            3,
            vec![Type::includable(t(0), t(1)), x(vec![t(1)], t(2))],
            Type::includable(t(0), t(2)),
        );
        let not_quite_include = b.def(
            "NotQuiteInclude",
            2,
            vec![q(t(0)), x(vec![t(0)], t(1))],
            Type::includable(t(0), t(1)),
        );

        Self {
            as_tracking,
            as_no_tracking,
            as_no_tracking_with_identity_resolution,
            tag_with,
            tag_with_call_site,
            ignore_query_filters,
            ignore_named_query_filters,
            ignore_auto_includes,
            include,
            include_with_navigation_path,
            then_include_after_enumerable,
            then_include_after_reference,
            not_quite_include,
            all: b.all,
        }
    }

    /// The eager-loading operators whose selector may carry an ordering
    pub fn include_family(&self) -> [&Arc<MethodDef>; 4] {
        [
            &self.include,
            &self.then_include_after_enumerable,
            &self.then_include_after_reference,
            &self.not_quite_include,
        ]
    }
}

/// Definitions of the parameter translation hints (`EF.Constant`, `EF.Parameter` and the
/// relational `MultipleParameters`)
pub struct ParameterHintMethods {
    pub constant: Arc<MethodDef>,
    pub parameter: Arc<MethodDef>,
    pub multiple_parameters: Arc<MethodDef>,
}

impl ParameterHintMethods {
    fn new() -> Self {
        let mut hints = FamilyBuilder::new(MethodFamily::ParameterHint);
        let constant = hints.def("Constant", 1, vec![t(0)], t(0));
        let parameter = hints.def("Parameter", 1, vec![t(0)], t(0));
        let mut relational = FamilyBuilder::new(MethodFamily::RelationalParameterHint);
        let multiple_parameters = relational.def("MultipleParameters", 1, vec![t(0)], t(0));
        Self {
            constant,
            parameter,
            multiple_parameters,
        }
    }

    fn all(&self) -> [&Arc<MethodDef>; 3] {
        [&self.constant, &self.parameter, &self.multiple_parameters]
    }
}

/// Index of operator definitions keyed by (family, name, parameter count). Candidates sharing a
/// key are kept in declaration order.
pub struct OperatorSignatures {
    by_signature: HashMap<(MethodFamily, String, usize), Vec<Arc<MethodDef>>>,
}

impl OperatorSignatures {
    fn new() -> Self {
        let mut by_signature: HashMap<_, Vec<_>> = HashMap::new();
        let definitions = QUERYABLE_METHODS
            .all
            .iter()
            .chain(&ENUMERABLE_METHODS.all)
            .chain(&QUERY_METADATA_METHODS.all)
            .chain(PARAMETER_HINT_METHODS.all());
        for def in definitions {
            by_signature
                .entry((def.family.clone(), def.name.clone(), def.parameters.len()))
                .or_default()
                .push(Arc::clone(def));
        }
        Self { by_signature }
    }

    /// All definitions in `family` named `name` taking `arity` parameters
    pub fn candidates(&self, family: &MethodFamily, name: &str, arity: usize) -> &[Arc<MethodDef>] {
        // Avoid allocating a key for families that never have entries
        if matches!(family, MethodFamily::Instance(_) | MethodFamily::Other(_)) {
            return &[];
        }
        self.by_signature
            .get(&(family.clone(), name.to_owned(), arity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if an operator with this name exists in `family`, with any parameter count
    pub fn contains_name(&self, family: &MethodFamily, name: &str) -> bool {
        self.by_signature
            .keys()
            .any(|(fam, n, _)| fam == family && n == name)
    }
}
