//! Query emission: plan steps → store query builder calls.
//!
//! Each step that selects rows gets the alias `s{id}`; gathers related to
//! another step first walk a directionless link under `s{id} | link`. The
//! per-step [`StepLayout`] records how many columns the step materializes
//! (`size`) and the projection name it was given, for result decoding.
//!
//! Deselected steps are removals. A chain of them (bridging gathers and the
//! step they lead to) is emitted in its inclusive form into a nested op list
//! and negated as a whole with `exclude`; a chain of one plain select
//! collapses to `deselect`. Removals add no columns, and steps hanging off
//! a removal relate to whatever the removal was related to.

use std::collections::BTreeSet;

use cardwiki_store::{Field, FieldRef, Func, Query, QueryBuilder, QueryOp, SortKey, Table, Term, Value};
use serde::Serialize;
use tracing::debug;

use crate::plan::{Operand, PlanStep, StepId, StepKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepLayout {
    pub step: StepId,
    /// 0, 1, or 2 when an intermediate link row is also materialized.
    pub size: u8,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compiled {
    pub query: Query,
    pub layout: Vec<StepLayout>,
}

pub fn alias(step: StepId) -> String {
    step.to_string()
}

fn link_alias(step: StepId) -> String {
    format!("{step} | link")
}

/// `name`, or `name 1`, `name 2`, ... if already projected.
pub fn safe_projection_name(name: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    (1..)
        .map(|ix| format!("{name} {ix}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// An open chain of deselected steps.
struct Removal {
    builder: QueryBuilder,
    steps: BTreeSet<StepId>,
}

struct Emitter<'p> {
    steps: &'p [PlanStep],
    builder: QueryBuilder,
    removal: Option<Removal>,
    projection: Vec<(String, Term)>,
    taken: BTreeSet<String>,
    layout: Vec<StepLayout>,
}

pub fn emit(steps: &[PlanStep]) -> Compiled {
    let mut emitter = Emitter {
        steps,
        builder: QueryBuilder::new("search"),
        removal: None,
        projection: Vec::new(),
        taken: BTreeSet::new(),
        layout: Vec::with_capacity(steps.len()),
    };
    for step in steps {
        emitter.step(step);
    }
    emitter.close_removal();
    debug!(
        steps = steps.len(),
        columns = emitter.projection.len(),
        "emitted query"
    );
    Compiled {
        query: emitter.builder.project(emitter.projection),
        layout: emitter.layout,
    }
}

impl Emitter<'_> {
    fn project(&mut self, base: &str, term: Term) -> String {
        let name = safe_projection_name(base, &self.taken);
        self.taken.insert(name.clone());
        self.projection.push((name.clone(), term));
        name
    }

    /// The page a step stands for: a literal for `Find`, the step's own
    /// page column when it selected rows, else whatever it was related to.
    /// Removals are only visible from inside their own chain.
    fn page_term(&self, step: Option<StepId>) -> Option<Term> {
        let mut current = step;
        while let Some(id) = current {
            let step = &self.steps[id.0];
            if step.deselect && !self.in_removal(id) {
                current = step.related_to;
                continue;
            }
            match &step.kind {
                StepKind::Find { entity } => return Some(Term::Const(Value::text(entity.clone()))),
                StepKind::FilterByEntity { member: true, .. } => current = step.related_to,
                StepKind::Gather { .. }
                | StepKind::Lookup { .. }
                | StepKind::Intersect { .. }
                | StepKind::FilterByEntity { .. } => {
                    return Some(Term::reference(alias(id), Field::Page))
                }
                _ => current = step.related_to,
            }
        }
        None
    }

    fn in_removal(&self, id: StepId) -> bool {
        self.removal.as_ref().is_some_and(|r| r.steps.contains(&id))
    }

    /// Where the current step's ops go.
    fn target(&mut self) -> &mut QueryBuilder {
        match &mut self.removal {
            Some(removal) => &mut removal.builder,
            None => &mut self.builder,
        }
    }

    /// Open, extend or close the removal chain for `step`.
    fn track_removal(&mut self, step: &PlanStep) {
        if !step.deselect {
            self.close_removal();
            return;
        }
        let extends = step.related_to.is_some_and(|rel| self.in_removal(rel));
        if !extends {
            self.close_removal();
            if self.page_term(step.related_to).is_none() {
                debug!(step = %step.id, "nothing to remove from; selecting");
                return;
            }
            self.removal = Some(Removal {
                builder: QueryBuilder::new("removal"),
                steps: BTreeSet::new(),
            });
        }
        if let Some(removal) = &mut self.removal {
            removal.steps.insert(step.id);
        }
    }

    fn close_removal(&mut self) {
        let Some(removal) = self.removal.take() else {
            return;
        };
        let ops = removal.builder.into_ops();
        if let [QueryOp::Select { table, pattern, .. }] = ops.as_slice() {
            self.builder.deselect(*table, pattern.clone());
        } else if !ops.is_empty() {
            self.builder.exclude(ops);
        }
    }

    fn term(&self, operand: &Operand) -> Term {
        match operand {
            Operand::Column { step, field } => Term::reference(alias(*step), *field),
            Operand::Const(v) => Term::Const(v.clone()),
        }
    }

    fn terms(&self, args: &[(String, Operand)]) -> Vec<(String, Term)> {
        args.iter()
            .map(|(name, operand)| (name.clone(), self.term(operand)))
            .collect()
    }

    fn step(&mut self, step: &PlanStep) {
        let id = step.id;
        self.track_removal(step);
        let removing = self.removal.is_some();
        let (size, name) = match &step.kind {
            StepKind::Find { entity } => {
                let name = self.project(entity, Term::Const(Value::text(entity.clone())));
                (0, Some(name))
            }
            StepKind::Gather { collection } => {
                let mut pattern = Vec::new();
                if let Some(c) = collection {
                    pattern.push((Field::Deck, Term::Const(Value::text(c.clone()))));
                }
                let size = match self.page_term(step.related_to) {
                    Some(page) => {
                        let link = link_alias(id);
                        self.target()
                            .select(Table::DirectionlessLinks, vec![(Field::Page, page)], link.clone());
                        pattern.push((Field::Page, Term::reference(link, Field::Link)));
                        2
                    }
                    None => 1,
                };
                self.target().select(Table::DeckPages, pattern, alias(id));
                if removing {
                    (0, None)
                } else {
                    let base = collection.as_deref().unwrap_or("pages");
                    let name = self.project(base, Term::reference(alias(id), Field::Page));
                    (size, Some(name))
                }
            }
            StepKind::Lookup { attribute } => {
                let mut pattern = vec![(Field::Attribute, Term::Const(Value::text(attribute.clone())))];
                if let Some(page) = self.page_term(step.related_to) {
                    pattern.push((Field::Page, page));
                }
                self.target().select(Table::PageEavs, pattern, alias(id));
                if removing {
                    (0, None)
                } else {
                    let name = self.project(attribute, Term::reference(alias(id), Field::Value));
                    (1, Some(name))
                }
            }
            StepKind::Intersect { collection } => {
                let mut pattern = vec![(Field::Deck, Term::Const(Value::text(collection.clone())))];
                if let Some(page) = self.page_term(step.related_to) {
                    pattern.push((Field::Page, page));
                }
                self.target().select(Table::DeckPages, pattern, alias(id));
                (0, None)
            }
            StepKind::FilterByEntity { entity, member } => {
                let target = Term::Const(Value::text(entity.clone()));
                match (self.page_term(step.related_to), *member) {
                    (Some(page), true) => {
                        let args = vec![("a".to_string(), page), ("b".to_string(), target)];
                        self.target().calculate(Func::Eq, args, alias(id));
                        (0, None)
                    }
                    (page, _) => {
                        let mut pattern = Vec::new();
                        if let Some(page) = page {
                            pattern.push((Field::Page, page));
                        }
                        pattern.push((Field::Link, target));
                        self.target().select(Table::DirectionlessLinks, pattern, alias(id));
                        (if removing { 0 } else { 1 }, None)
                    }
                }
            }
            StepKind::Filter { func, args } => {
                let args = self.terms(args);
                self.target().calculate(*func, args, alias(id));
                (0, None)
            }
            StepKind::Calculate { func, args } => {
                let args = self.terms(args);
                self.target().calculate(*func, args, alias(id));
                let name = self.project(func.symbol(), Term::reference(alias(id), Field::Result));
                (1, Some(name))
            }
            StepKind::Aggregate { func, args } => {
                let args = self.terms(args);
                self.target().aggregate(*func, args, alias(id));
                let name = self.project(func.as_str(), Term::reference(alias(id), func.field()));
                (1, Some(name))
            }
            StepKind::Group { fields } => {
                let fields = fields
                    .iter()
                    .map(|(step, field)| FieldRef::new(alias(*step), *field))
                    .collect();
                self.target().group(fields);
                (0, None)
            }
            StepKind::Sort { fields } => {
                let keys = fields
                    .iter()
                    .map(|(step, field, direction)| SortKey {
                        field: FieldRef::new(alias(*step), *field),
                        direction: *direction,
                    })
                    .collect();
                self.target().sort(keys);
                (0, None)
            }
            StepKind::Limit { limit } => {
                let limit = *limit;
                self.target().limit(limit);
                (0, None)
            }
        };
        self.layout.push(StepLayout { step: id, size, name });
    }
}
