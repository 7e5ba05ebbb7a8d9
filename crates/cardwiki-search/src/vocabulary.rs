//! Fixed operator and modifier words.
//!
//! These tables are process-wide constants; everything else a search can
//! mention comes from the store's dictionaries.

use cardwiki_store::{AggregateFunc, Func, SortDirection};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    /// "per", "each", "grouped": group by the next collection/attribute.
    Group,
    /// "without", "not", "except", ...: remove the next subject.
    Deselect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorClass {
    Aggregate(AggregateFunc),
    SortLimit(SortDirection),
    /// Boolean row filter; contributes no output column.
    Filter(Func),
    /// Row calculation; contributes a `result` column.
    Arithmetic(Func),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatorDescriptor {
    pub symbol: &'static str,
    /// Operands including the implicit left operand of an infix operator.
    pub arity: usize,
    pub infix: bool,
    pub class: OperatorClass,
    /// Attribute the operator compares implicitly ("older" → `age`).
    pub attribute: Option<&'static str>,
    /// Named argument slots, in operand order. Empty for sort-limit
    /// operators, whose operands are read by kind instead.
    pub args: &'static [&'static str],
}

impl OperatorDescriptor {
    /// Operands that must follow the operator word.
    pub fn trailing_operands(&self) -> usize {
        if self.infix {
            self.arity.saturating_sub(1)
        } else {
            self.arity
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.class, OperatorClass::Aggregate(_))
    }

    pub fn is_sort_limit(&self) -> bool {
        matches!(self.class, OperatorClass::SortLimit(_))
    }

    pub fn is_filter(&self) -> bool {
        matches!(self.class, OperatorClass::Filter(_))
    }
}

const VALUE_ARG: &[&str] = &["value"];
const BINARY_ARGS: &[&str] = &["a", "b"];
const CONTAINS_ARGS: &[&str] = &["haystack", "needle"];

const fn aggregate(symbol: &'static str, func: AggregateFunc, arity: usize) -> OperatorDescriptor {
    OperatorDescriptor {
        symbol,
        arity,
        infix: false,
        class: OperatorClass::Aggregate(func),
        attribute: None,
        args: if arity == 0 { &[] } else { VALUE_ARG },
    }
}

const fn sort_limit(arity: usize, direction: SortDirection) -> OperatorDescriptor {
    OperatorDescriptor {
        symbol: "sort limit",
        arity,
        infix: false,
        class: OperatorClass::SortLimit(direction),
        attribute: None,
        args: &[],
    }
}

const fn filter(symbol: &'static str, func: Func, attribute: Option<&'static str>) -> OperatorDescriptor {
    OperatorDescriptor {
        symbol,
        arity: 2,
        infix: true,
        class: OperatorClass::Filter(func),
        attribute,
        args: BINARY_ARGS,
    }
}

const fn arithmetic(symbol: &'static str, func: Func) -> OperatorDescriptor {
    OperatorDescriptor {
        symbol,
        arity: 2,
        infix: true,
        class: OperatorClass::Arithmetic(func),
        attribute: None,
        args: BINARY_ARGS,
    }
}

static OPERATORS: &[(&str, OperatorDescriptor)] = &[
    ("sum", aggregate("sum", AggregateFunc::Sum, 1)),
    ("count", aggregate("count", AggregateFunc::Count, 0)),
    ("average", aggregate("average", AggregateFunc::Average, 1)),
    ("mean", aggregate("average", AggregateFunc::Average, 1)),
    ("top", sort_limit(2, SortDirection::Descending)),
    ("bottom", sort_limit(2, SortDirection::Ascending)),
    ("highest", sort_limit(1, SortDirection::Descending)),
    ("lowest", sort_limit(1, SortDirection::Ascending)),
    (">", filter(">", Func::Gt, None)),
    (">=", filter(">=", Func::Gte, None)),
    ("greater", filter(">", Func::Gt, None)),
    ("bigger", filter(">", Func::Gt, None)),
    ("<", filter("<", Func::Lt, None)),
    ("<=", filter("<=", Func::Lte, None)),
    ("lower", filter("<", Func::Lt, None)),
    ("smaller", filter("<", Func::Lt, None)),
    ("=", filter("=", Func::Eq, None)),
    ("equal", filter("=", Func::Eq, None)),
    (
        "contains",
        OperatorDescriptor {
            args: CONTAINS_ARGS,
            ..filter("contains", Func::Contains, None)
        },
    ),
    ("older", filter(">", Func::Gt, Some("age"))),
    ("younger", filter("<", Func::Lt, Some("age"))),
    ("+", arithmetic("+", Func::Add)),
    ("-", arithmetic("-", Func::Sub)),
    ("/", arithmetic("/", Func::Div)),
    ("*", arithmetic("*", Func::Mul)),
];

static MODIFIERS: &[(&str, Modifier)] = &[
    ("per", Modifier::Group),
    ("each", Modifier::Group),
    ("grouped", Modifier::Group),
    ("without", Modifier::Deselect),
    ("not", Modifier::Deselect),
    ("aren't", Modifier::Deselect),
    ("except", Modifier::Deselect),
    ("don't", Modifier::Deselect),
];

/// Words that name the pseudo collection of all decks.
pub const DECK_WORDS: &[&str] = &["deck", "decks"];

pub fn operator(word: &str) -> Option<&'static OperatorDescriptor> {
    OPERATORS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, desc)| desc)
}

pub fn modifier(word: &str) -> Option<Modifier> {
    MODIFIERS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, m)| *m)
}
