//! Multi-step queries over the store's derived tables.
//!
//! A query is an ordered list of operations applied to a growing set of
//! rows. Each row binds aliases to one record per `select`/`calculate`/
//! `aggregate`, so later operations can join against earlier ones with
//! `Term::Ref`. The builder is write-once: `QueryBuilder::project` seals it
//! into a `Query` that can only be executed or inspected.
//!
//! `deselect` drops rows matching one table pattern; `exclude` drops rows
//! for which a nested op list, run from that row alone, yields anything.
//! Aliases bound inside an `exclude` are not visible after it.
//!
//! Tables:
//! - `deck pages`          `{deck, page}`
//! - `page eavs`           `{page, attribute, value}`
//! - `page links`          `{page, link, type}` (directed)
//! - `directionless links` `{page, link, type}` (both directions)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{KnowledgeStore, PageId, Value};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("alias `{alias}` is used before it is defined")]
    UnknownAlias { alias: String },
    #[error("`{func}` is missing argument `{arg}`")]
    MissingArgument { func: String, arg: String },
}

// ============================================================================
// Vocabulary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    #[serde(rename = "deck pages")]
    DeckPages,
    #[serde(rename = "page eavs")]
    PageEavs,
    #[serde(rename = "page links")]
    PageLinks,
    #[serde(rename = "directionless links")]
    DirectionlessLinks,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::DeckPages => "deck pages",
            Table::PageEavs => "page eavs",
            Table::PageLinks => "page links",
            Table::DirectionlessLinks => "directionless links",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Page,
    Deck,
    Attribute,
    Value,
    Link,
    Type,
    Result,
    Sum,
    Count,
    Average,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Page => "page",
            Field::Deck => "deck",
            Field::Attribute => "attribute",
            Field::Value => "value",
            Field::Link => "link",
            Field::Type => "type",
            Field::Result => "result",
            Field::Sum => "sum",
            Field::Count => "count",
            Field::Average => "average",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(alias, field)`: a column of an earlier step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub alias: String,
    pub field: Field,
}

impl FieldRef {
    pub fn new(alias: impl Into<String>, field: Field) -> Self {
        Self {
            alias: alias.into(),
            field,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.alias, self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Const(Value),
    Ref(FieldRef),
}

impl Term {
    pub fn reference(alias: impl Into<String>, field: Field) -> Self {
        Term::Ref(FieldRef::new(alias, field))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const(Value::Text(s)) => write!(f, "{s:?}"),
            Term::Const(v) => write!(f, "{v}"),
            Term::Ref(r) => write!(f, "{r}"),
        }
    }
}

/// Row-level functions: comparisons filter, arithmetic adds a `result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Func {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl Func {
    pub fn symbol(self) -> &'static str {
        match self {
            Func::Gt => ">",
            Func::Gte => ">=",
            Func::Lt => "<",
            Func::Lte => "<=",
            Func::Eq => "=",
            Func::Contains => "contains",
            Func::Add => "+",
            Func::Sub => "-",
            Func::Mul => "*",
            Func::Div => "/",
        }
    }

    /// Named argument slots, in operand order.
    pub fn arg_names(self) -> &'static [&'static str] {
        match self {
            Func::Contains => &["haystack", "needle"],
            _ => &["a", "b"],
        }
    }

    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            Func::Gt | Func::Gte | Func::Lt | Func::Lte | Func::Eq | Func::Contains
        )
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Sum,
    Count,
    Average,
}

impl AggregateFunc {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunc::Sum => "sum",
            AggregateFunc::Count => "count",
            AggregateFunc::Average => "average",
        }
    }

    /// The field an aggregate writes its result to.
    pub fn field(self) -> Field {
        match self {
            AggregateFunc::Sum => Field::Sum,
            AggregateFunc::Count => Field::Count,
            AggregateFunc::Average => Field::Average,
        }
    }

    pub fn arg_names(self) -> &'static [&'static str] {
        match self {
            AggregateFunc::Count => &[],
            _ => &["value"],
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: FieldRef,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    /// Keep the first N rows, or the first N groups when grouped.
    Results(usize),
    /// Keep the first N rows of every group.
    PerGroup(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryOp {
    Select {
        table: Table,
        pattern: Vec<(Field, Term)>,
        alias: String,
    },
    Deselect {
        table: Table,
        pattern: Vec<(Field, Term)>,
    },
    Exclude {
        ops: Vec<QueryOp>,
    },
    Calculate {
        func: Func,
        args: Vec<(String, Term)>,
        alias: String,
    },
    Aggregate {
        func: AggregateFunc,
        args: Vec<(String, Term)>,
        alias: String,
    },
    Group {
        fields: Vec<FieldRef>,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    Limit {
        limit: Limit,
    },
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    name: String,
    ops: Vec<QueryOp>,
}

impl QueryBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    pub fn select(
        &mut self,
        table: Table,
        pattern: Vec<(Field, Term)>,
        alias: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(QueryOp::Select {
            table,
            pattern,
            alias: alias.into(),
        });
        self
    }

    pub fn deselect(&mut self, table: Table, pattern: Vec<(Field, Term)>) -> &mut Self {
        self.ops.push(QueryOp::Deselect { table, pattern });
        self
    }

    /// Drop every row from which `ops` produce at least one row.
    pub fn exclude(&mut self, ops: Vec<QueryOp>) -> &mut Self {
        self.ops.push(QueryOp::Exclude { ops });
        self
    }

    pub fn calculate(
        &mut self,
        func: Func,
        args: Vec<(String, Term)>,
        alias: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(QueryOp::Calculate {
            func,
            args,
            alias: alias.into(),
        });
        self
    }

    pub fn aggregate(
        &mut self,
        func: AggregateFunc,
        args: Vec<(String, Term)>,
        alias: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(QueryOp::Aggregate {
            func,
            args,
            alias: alias.into(),
        });
        self
    }

    pub fn group(&mut self, fields: Vec<FieldRef>) -> &mut Self {
        self.ops.push(QueryOp::Group { fields });
        self
    }

    pub fn sort(&mut self, keys: Vec<SortKey>) -> &mut Self {
        self.ops.push(QueryOp::Sort { keys });
        self
    }

    pub fn limit(&mut self, limit: Limit) -> &mut Self {
        self.ops.push(QueryOp::Limit { limit });
        self
    }

    /// The ops recorded so far, for nesting under [`QueryBuilder::exclude`].
    pub fn into_ops(self) -> Vec<QueryOp> {
        self.ops
    }

    /// Seal the query with its final `name → term` projection.
    pub fn project(self, projection: Vec<(String, Term)>) -> Query {
        Query {
            name: self.name,
            ops: self.ops,
            projection,
        }
    }
}

/// A sealed query: ordered operations plus the output projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    name: String,
    ops: Vec<QueryOp>,
    projection: Vec<(String, Term)>,
}

impl Query {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    pub fn projection(&self) -> &[(String, Term)] {
        &self.projection
    }

    pub fn exec(&self, store: &KnowledgeStore) -> Result<QueryResult, ExecError> {
        self.check_aliases()?;
        let mut exec = Executor {
            store,
            rows: vec![Row::default()],
            grouped: false,
        };
        for op in &self.ops {
            exec.apply(op)?;
            trace!(rows = exec.rows.len(), "applied query op");
        }
        let result = exec.finish(&self.projection);
        debug!(
            query = %self.name,
            ops = self.ops.len(),
            rows = result.rows.len(),
            "executed query"
        );
        Ok(result)
    }

    /// Every reference must name an alias defined by an earlier op.
    fn check_aliases(&self) -> Result<(), ExecError> {
        let mut defined: HashSet<&str> = HashSet::new();
        check_ops(&self.ops, &mut defined)?;
        for (_, term) in &self.projection {
            check_term(&defined, term)?;
        }
        Ok(())
    }
}

fn check_term(defined: &HashSet<&str>, term: &Term) -> Result<(), ExecError> {
    match term {
        Term::Ref(r) if !defined.contains(r.alias.as_str()) => Err(ExecError::UnknownAlias {
            alias: r.alias.clone(),
        }),
        _ => Ok(()),
    }
}

fn check_ops<'q>(ops: &'q [QueryOp], defined: &mut HashSet<&'q str>) -> Result<(), ExecError> {
    for op in ops {
        match op {
            QueryOp::Select {
                pattern, alias, ..
            } => {
                for (_, term) in pattern {
                    check_term(defined, term)?;
                }
                defined.insert(alias);
            }
            QueryOp::Deselect { pattern, .. } => {
                for (_, term) in pattern {
                    check_term(defined, term)?;
                }
            }
            QueryOp::Exclude { ops } => {
                let mut inner = defined.clone();
                check_ops(ops, &mut inner)?;
            }
            QueryOp::Calculate { args, alias, .. } | QueryOp::Aggregate { args, alias, .. } => {
                for (_, term) in args {
                    check_term(defined, term)?;
                }
                defined.insert(alias);
            }
            QueryOp::Group { fields } => {
                for f in fields {
                    check_term(defined, &Term::Ref(f.clone()))?;
                }
            }
            QueryOp::Sort { keys } => {
                for k in keys {
                    check_term(defined, &Term::Ref(k.field.clone()))?;
                }
            }
            QueryOp::Limit { .. } => {}
        }
    }
    Ok(())
}

// ============================================================================
// Execution
// ============================================================================

pub type Record = BTreeMap<Field, Value>;

/// One intermediate result row: alias → record, plus its group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub records: BTreeMap<String, Record>,
    pub group: Option<usize>,
}

impl Row {
    fn get(&self, r: &FieldRef) -> Option<&Value> {
        self.records.get(&r.alias)?.get(&r.field)
    }

    fn resolve(&self, term: &Term) -> Option<Value> {
        match term {
            Term::Const(v) => Some(v.clone()),
            Term::Ref(r) => self.get(r).cloned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows before projection, in final order.
    pub unprojected: Vec<Row>,
    /// Group index per projected row (`None` when ungrouped).
    pub group_info: Vec<Option<usize>>,
}

struct Executor<'a> {
    store: &'a KnowledgeStore,
    rows: Vec<Row>,
    grouped: bool,
}

impl Executor<'_> {
    fn apply(&mut self, op: &QueryOp) -> Result<(), ExecError> {
        match op {
            QueryOp::Select {
                table,
                pattern,
                alias,
            } => self.select(*table, pattern, alias),
            QueryOp::Deselect { table, pattern } => self.deselect(*table, pattern),
            QueryOp::Exclude { ops } => self.exclude(ops)?,
            QueryOp::Calculate { func, args, alias } => self.calculate(*func, args, alias)?,
            QueryOp::Aggregate { func, args, alias } => self.aggregate(*func, args, alias)?,
            QueryOp::Group { fields } => self.group(fields),
            QueryOp::Sort { keys } => self.sort(keys),
            QueryOp::Limit { limit } => self.limit(*limit),
        }
        Ok(())
    }

    fn bind(row: &Row, pattern: &[(Field, Term)]) -> Option<Vec<(Field, Value)>> {
        pattern
            .iter()
            .map(|(field, term)| row.resolve(term).map(|v| (*field, v)))
            .collect()
    }

    fn select(&mut self, table: Table, pattern: &[(Field, Term)], alias: &str) {
        let mut out = Vec::new();
        for row in &self.rows {
            let Some(bound) = Self::bind(row, pattern) else {
                continue;
            };
            for record in scan(self.store, table, &bound) {
                let mut next = row.clone();
                next.records.insert(alias.to_string(), record);
                out.push(next);
            }
        }
        self.rows = out;
    }

    fn deselect(&mut self, table: Table, pattern: &[(Field, Term)]) {
        let store = self.store;
        self.rows.retain(|row| match Self::bind(row, pattern) {
            Some(bound) => scan(store, table, &bound).is_empty(),
            None => true,
        });
    }

    fn exclude(&mut self, ops: &[QueryOp]) -> Result<(), ExecError> {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in std::mem::take(&mut self.rows) {
            let mut inner = Executor {
                store: self.store,
                rows: vec![row.clone()],
                grouped: false,
            };
            for op in ops {
                inner.apply(op)?;
                if inner.rows.is_empty() {
                    break;
                }
            }
            if inner.rows.is_empty() {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    fn args<'t>(
        func: &str,
        names: &[&str],
        args: &'t [(String, Term)],
    ) -> Result<Vec<&'t Term>, ExecError> {
        names
            .iter()
            .map(|name| {
                args.iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, t)| t)
                    .ok_or_else(|| ExecError::MissingArgument {
                        func: func.to_string(),
                        arg: name.to_string(),
                    })
            })
            .collect()
    }

    fn calculate(
        &mut self,
        func: Func,
        args: &[(String, Term)],
        alias: &str,
    ) -> Result<(), ExecError> {
        let terms = Self::args(func.symbol(), func.arg_names(), args)?;
        let (lhs, rhs) = (terms[0], terms[1]);
        let mut out = Vec::with_capacity(self.rows.len());
        for mut row in std::mem::take(&mut self.rows) {
            let (Some(a), Some(b)) = (row.resolve(lhs), row.resolve(rhs)) else {
                continue;
            };
            let Some(result) = apply_func(func, &a, &b) else {
                trace!(func = %func, a = %a, b = %b, "row dropped by calculate");
                continue;
            };
            let mut record = Record::new();
            record.insert(Field::Result, result);
            row.records.insert(alias.to_string(), record);
            out.push(row);
        }
        self.rows = out;
        Ok(())
    }

    fn aggregate(
        &mut self,
        func: AggregateFunc,
        args: &[(String, Term)],
        alias: &str,
    ) -> Result<(), ExecError> {
        let terms = Self::args(func.as_str(), func.arg_names(), args)?;
        let mut totals: HashMap<Option<usize>, (f64, usize, usize)> = HashMap::new();
        for row in &self.rows {
            let entry = totals.entry(row.group).or_insert((0.0, 0, 0));
            entry.1 += 1;
            if let Some(term) = terms.first() {
                if let Some(n) = row.resolve(term).and_then(|v| v.as_number()) {
                    entry.0 += n;
                    entry.2 += 1;
                }
            }
        }
        for row in &mut self.rows {
            let (sum, rows, numeric) = totals.get(&row.group).copied().unwrap_or_default();
            let value = match func {
                AggregateFunc::Sum => Value::Number(sum),
                AggregateFunc::Count => Value::Number(rows as f64),
                AggregateFunc::Average if numeric > 0 => Value::Number(sum / numeric as f64),
                AggregateFunc::Average => Value::Number(0.0),
            };
            let mut record = Record::new();
            record.insert(func.field(), value);
            row.records.insert(alias.to_string(), record);
        }
        Ok(())
    }

    fn group(&mut self, fields: &[FieldRef]) {
        let mut seen: HashMap<Vec<Option<Value>>, usize> = HashMap::new();
        for row in &mut self.rows {
            let key: Vec<Option<Value>> = fields.iter().map(|f| row.get(f).cloned()).collect();
            let next = seen.len();
            let ix = *seen.entry(key).or_insert(next);
            row.group = Some(ix);
        }
        self.rows.sort_by_key(|row| row.group);
        self.grouped = true;
    }

    fn sort(&mut self, keys: &[SortKey]) {
        self.rows.sort_by(|x, y| {
            x.group.cmp(&y.group).then_with(|| {
                for key in keys {
                    let ord = match (x.get(&key.field), y.get(&key.field)) {
                        (Some(a), Some(b)) => {
                            let ord = compare_values(a, b);
                            match key.direction {
                                SortDirection::Ascending => ord,
                                SortDirection::Descending => ord.reverse(),
                            }
                        }
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            })
        });
    }

    fn limit(&mut self, limit: Limit) {
        match limit {
            Limit::Results(n) if self.grouped => self.rows.retain(|row| row.group.unwrap_or(0) < n),
            Limit::Results(n) => self.rows.truncate(n),
            Limit::PerGroup(n) => {
                let mut counts: HashMap<Option<usize>, usize> = HashMap::new();
                self.rows.retain(|row| {
                    let seen = counts.entry(row.group).or_insert(0);
                    *seen += 1;
                    *seen <= n
                });
            }
        }
    }

    fn finish(self, projection: &[(String, Term)]) -> QueryResult {
        let mut result = QueryResult {
            columns: projection.iter().map(|(name, _)| name.clone()).collect(),
            ..QueryResult::default()
        };
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        for row in self.rows {
            let values: Option<Vec<Value>> =
                projection.iter().map(|(_, term)| row.resolve(term)).collect();
            let Some(values) = values else {
                continue;
            };
            if seen.insert(values.clone()) {
                result.rows.push(values);
                result.group_info.push(row.group);
            }
            result.unprojected.push(row);
        }
        result
    }
}

/// Loose comparison: numeric when both sides read as numbers, otherwise
/// case-insensitive text.
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => a.to_string().to_lowercase().cmp(&b.to_string().to_lowercase()),
    }
}

fn apply_func(func: Func, a: &Value, b: &Value) -> Option<Value> {
    use std::cmp::Ordering::*;
    let keep = |ok: bool| ok.then_some(Value::Bool(true));
    match func {
        Func::Gt => keep(compare_values(a, b) == Greater),
        Func::Gte => keep(compare_values(a, b) != Less),
        Func::Lt => keep(compare_values(a, b) == Less),
        Func::Lte => keep(compare_values(a, b) != Greater),
        Func::Eq => keep(compare_values(a, b) == Equal),
        Func::Contains => keep(
            a.to_string()
                .to_lowercase()
                .contains(&b.to_string().to_lowercase()),
        ),
        Func::Add | Func::Sub | Func::Mul | Func::Div => {
            let (x, y) = (a.as_number()?, b.as_number()?);
            let n = match func {
                Func::Add => x + y,
                Func::Sub => x - y,
                Func::Mul => x * y,
                _ if y == 0.0 => return None,
                _ => x / y,
            };
            Some(Value::Number(n))
        }
    }
}

// ============================================================================
// Table scans
// ============================================================================

fn page_value(store: &KnowledgeStore, page: PageId) -> Value {
    Value::text(store.page_name(page))
}

fn bound_page(store: &KnowledgeStore, bound: &[(Field, Value)], field: Field) -> Option<Option<PageId>> {
    bound
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, v)| store.page_id(&v.to_string()))
}

/// Records of `table` matching every bound field, using the store's
/// indexes when a page or deck is bound.
pub(crate) fn scan(store: &KnowledgeStore, table: Table, bound: &[(Field, Value)]) -> Vec<Record> {
    let mut records: Vec<Record> = Vec::new();
    let page = bound_page(store, bound, Field::Page);
    if let Some(None) = page {
        // Bound to a page the store does not know.
        return records;
    }
    let page = page.flatten();

    match table {
        Table::DeckPages => {
            let deck = bound
                .iter()
                .find(|(f, _)| *f == Field::Deck)
                .map(|(_, v)| store.deck_id(&v.to_string()));
            match (deck, page) {
                (Some(None), _) => {}
                (Some(Some(deck)), _) => {
                    if let Some(members) = store.pages_in_deck(deck) {
                        for p in members.iter() {
                            records.push(deck_page(store.deck_name(deck), store.page_name(PageId(p))));
                        }
                    }
                }
                (None, Some(page)) => {
                    for deck in store.decks_of_page(page) {
                        records.push(deck_page(deck, store.page_name(page)));
                    }
                }
                (None, None) => {
                    for deck in store.deck_ids() {
                        if let Some(members) = store.pages_in_deck(deck) {
                            for p in members.iter() {
                                records.push(deck_page(store.deck_name(deck), store.page_name(PageId(p))));
                            }
                        }
                    }
                }
            }
        }
        Table::PageEavs => {
            let eavs: Box<dyn Iterator<Item = &crate::Eav> + '_> = match page {
                Some(page) => Box::new(store.eavs_of(page)),
                None => Box::new(store.eavs().iter()),
            };
            for eav in eavs {
                let mut r = Record::new();
                r.insert(Field::Page, page_value(store, eav.page));
                r.insert(Field::Attribute, Value::text(store.name(eav.attribute)));
                r.insert(Field::Value, eav.value.clone());
                records.push(r);
            }
        }
        Table::PageLinks => {
            let links: Box<dyn Iterator<Item = &crate::Link> + '_> = match page {
                Some(page) => Box::new(store.outgoing_links(page)),
                None => Box::new(store.links().iter()),
            };
            for link in links {
                records.push(link_record(store, link.page, link.target, link.link_type));
            }
        }
        Table::DirectionlessLinks => {
            let pages: Vec<PageId> = match page {
                Some(page) => vec![page],
                None => store.page_ids().collect(),
            };
            for p in pages {
                for n in store.directionless_links(p) {
                    records.push(link_record(store, n.page, n.link, n.link_type));
                }
            }
        }
    }

    records.retain(|r| bound.iter().all(|(f, v)| r.get(f) == Some(v)));
    records
}

fn deck_page(deck: &str, page: &str) -> Record {
    let mut r = Record::new();
    r.insert(Field::Deck, Value::text(deck));
    r.insert(Field::Page, Value::text(page));
    r
}

fn link_record(store: &KnowledgeStore, page: PageId, link: PageId, link_type: crate::StrId) -> Record {
    let mut r = Record::new();
    r.insert(Field::Page, page_value(store, page));
    r.insert(Field::Link, page_value(store, link));
    r.insert(Field::Type, Value::text(store.name(link_type)));
    r
}
