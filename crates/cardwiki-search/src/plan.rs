//! Plan linearization: forest → ordered steps.
//!
//! Roots are walked depth-first; each node becomes zero or more steps
//! chosen from the relationship recorded when it was attached, and its
//! children then hang off the last of those steps. Group markers collapse
//! into one `Group` step, and operators are appended last.

use std::collections::HashMap;
use std::fmt;

use cardwiki_store::{AggregateFunc, Field, Func, Limit, SortDirection, Value};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::relationship::{Hop, RelationshipKind};
use crate::tree::{NodeId, NodeKind, PlanForest};
use crate::vocabulary::OperatorClass;
use crate::SearchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StepId(pub usize);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An operator argument: a column of an earlier step or a literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Column { step: StepId, field: Field },
    Const(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Find { entity: String },
    /// `None` gathers pages of any collection.
    Gather { collection: Option<String> },
    Lookup { attribute: String },
    Intersect { collection: String },
    /// `member`: the entity is itself one of the related step's pages, so
    /// the filter compares pages instead of following links.
    FilterByEntity { entity: String, member: bool },
    Filter { func: Func, args: Vec<(String, Operand)> },
    Calculate { func: Func, args: Vec<(String, Operand)> },
    Aggregate { func: AggregateFunc, args: Vec<(String, Operand)> },
    Group { fields: Vec<(StepId, Field)> },
    Sort { fields: Vec<(StepId, Field, SortDirection)> },
    Limit { limit: Limit },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub id: StepId,
    pub related_to: Option<StepId>,
    pub deselect: bool,
    pub kind: StepKind,
}

impl PlanStep {
    /// The column this step contributes for later operands, if any.
    /// Removals contribute nothing.
    pub fn output_field(&self) -> Option<Field> {
        if self.deselect {
            return None;
        }
        match &self.kind {
            StepKind::Gather { .. } => Some(Field::Page),
            StepKind::Lookup { .. } => Some(Field::Value),
            StepKind::Intersect { .. } | StepKind::FilterByEntity { member: false, .. } => {
                Some(Field::Page)
            }
            StepKind::Calculate { .. } => Some(Field::Result),
            StepKind::Aggregate { func, .. } => Some(func.field()),
            _ => None,
        }
    }

    /// Human name of the step's subject.
    pub fn subject(&self) -> String {
        match &self.kind {
            StepKind::Find { entity } | StepKind::FilterByEntity { entity, .. } => entity.clone(),
            StepKind::Gather { collection } => collection.clone().unwrap_or_else(|| "anything".into()),
            StepKind::Lookup { attribute } => attribute.clone(),
            StepKind::Intersect { collection } => collection.clone(),
            StepKind::Filter { func, .. } | StepKind::Calculate { func, .. } => func.symbol().to_string(),
            StepKind::Aggregate { func, .. } => func.as_str().to_string(),
            StepKind::Group { .. } => "group".into(),
            StepKind::Sort { .. } => "sort".into(),
            StepKind::Limit { .. } => "limit".into(),
        }
    }
}

struct Linearizer<'a> {
    forest: &'a PlanForest,
    hidden: &'a [String],
    steps: Vec<PlanStep>,
    /// node → the last step produced for it
    node_steps: HashMap<NodeId, StepId>,
}

pub fn linearize(forest: &PlanForest, config: &SearchConfig) -> Result<Vec<PlanStep>, CompileError> {
    let mut lin = Linearizer {
        forest,
        hidden: &config.hidden_collections,
        steps: Vec::new(),
        node_steps: HashMap::new(),
    };
    for root in &forest.roots {
        lin.visit(*root, None, None);
    }
    lin.groups()?;
    for op in &forest.operations {
        lin.operation(*op)?;
    }
    debug!(steps = lin.steps.len(), "linearized plan");
    Ok(lin.steps)
}

impl Linearizer<'_> {
    fn push(&mut self, related_to: Option<StepId>, deselect: bool, kind: StepKind) -> StepId {
        let id = StepId(self.steps.len());
        self.steps.push(PlanStep {
            id,
            related_to,
            deselect,
            kind,
        });
        id
    }

    fn visit(&mut self, id: NodeId, parent: Option<NodeId>, parent_step: Option<StepId>) {
        let own = self.node_steps_for(id, parent, parent_step);
        if let Some(step) = own {
            self.node_steps.insert(id, step);
        }
        let next = own.or(parent_step);
        let forest = self.forest;
        for child in &forest.node(id).children {
            self.visit(*child, Some(id), next);
        }
    }

    /// Append the steps for one node; returns its last step.
    fn node_steps_for(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        parent_step: Option<StepId>,
    ) -> Option<StepId> {
        let forest = self.forest;
        let node = forest.node(id);
        let deselect = node.is_deselect;
        if parent.is_none() {
            let kind = match &node.kind {
                NodeKind::Collection(c) => StepKind::Gather {
                    collection: Some(c.clone()),
                },
                NodeKind::Entity(e) => StepKind::Find { entity: e.clone() },
                NodeKind::Attribute(a) => StepKind::Lookup { attribute: a.clone() },
                _ => return None,
            };
            return Some(self.push(None, deselect, kind));
        }

        let Some(rel) = node.relationship.as_ref() else {
            trace!(node = %node.kind.name(), "unrelated child has no steps");
            return None;
        };
        let name = node.kind.name();
        match rel.kind {
            RelationshipKind::CollToEav | RelationshipKind::EntToEav => {
                let related = self.bridge(&rel.hops, parent_step, deselect);
                Some(self.push(related, deselect, StepKind::Lookup { attribute: name }))
            }
            RelationshipKind::CollToEnt => {
                let related = self.bridge(&rel.hops, parent_step, deselect);
                let kind = StepKind::FilterByEntity {
                    entity: name,
                    member: rel.distance == 0,
                };
                Some(self.push(related, deselect, kind))
            }
            RelationshipKind::CollToColl if rel.distance == 0 => Some(self.push(
                parent_step,
                deselect,
                StepKind::Intersect { collection: name },
            )),
            RelationshipKind::CollToColl => Some(self.push(
                parent_step,
                deselect,
                StepKind::Gather {
                    collection: Some(name),
                },
            )),
            RelationshipKind::EntToDeck => None,
        }
    }

    /// One `Gather` per hop, each related to the previous one.
    fn bridge(&mut self, hops: &[Hop], parent_step: Option<StepId>, deselect: bool) -> Option<StepId> {
        let mut related = parent_step;
        for hop in hops {
            let collection = hop
                .candidates
                .iter()
                .find(|c| !self.hidden.contains(c))
                .cloned();
            related = Some(self.push(related, deselect, StepKind::Gather { collection }));
        }
        related
    }

    fn step_of(&self, id: NodeId) -> Result<&PlanStep, CompileError> {
        self.node_steps
            .get(&id)
            .map(|s| &self.steps[s.0])
            .ok_or_else(|| CompileError::UnplannedNode {
                node: self.forest.node(id).kind.name(),
            })
    }

    fn groups(&mut self) -> Result<(), CompileError> {
        if self.forest.groups.is_empty() {
            return Ok(());
        }
        let forest = self.forest;
        let mut fields = Vec::new();
        for id in &forest.groups {
            let node = forest.node(*id);
            let field = match node.kind {
                NodeKind::Collection(_) => Field::Page,
                NodeKind::Attribute(_) => Field::Value,
                _ => {
                    return Err(CompileError::InvalidGroupTarget {
                        node: node.kind.name(),
                    })
                }
            };
            let step = self.step_of(*id)?;
            if step.output_field().is_none() {
                return Err(CompileError::InvalidGroupTarget {
                    node: node.kind.name(),
                });
            }
            fields.push((step.id, field));
        }
        self.push(None, false, StepKind::Group { fields });
        Ok(())
    }

    fn operand(&self, id: NodeId) -> Result<Operand, CompileError> {
        let node = self.forest.node(id);
        if let NodeKind::Value(v) = &node.kind {
            return Ok(Operand::Const(v.clone()));
        }
        let step = self.step_of(id)?;
        match &step.kind {
            StepKind::Find { entity } => return Ok(Operand::Const(Value::text(entity.clone()))),
            StepKind::FilterByEntity {
                entity,
                member: true,
            } if !step.deselect => return Ok(Operand::Const(Value::text(entity.clone()))),
            _ => {}
        }
        match step.output_field() {
            Some(field) => Ok(Operand::Column { step: step.id, field }),
            None => Err(CompileError::UnplannedNode {
                node: node.kind.name(),
            }),
        }
    }

    fn operation(&mut self, id: NodeId) -> Result<(), CompileError> {
        let forest = self.forest;
        let node = forest.node(id);
        let NodeKind::Operation(desc) = node.kind else {
            return Ok(());
        };
        let mut args = Vec::new();
        for (slot, arg) in desc.args.iter().zip(&node.arguments) {
            args.push((slot.to_string(), self.operand(*arg)?));
        }

        match desc.class {
            OperatorClass::Aggregate(func) => {
                self.push(None, false, StepKind::Aggregate { func, args });
            }
            OperatorClass::Filter(func) => {
                self.push(None, false, StepKind::Filter { func, args });
            }
            OperatorClass::Arithmetic(func) => {
                self.push(None, false, StepKind::Calculate { func, args });
            }
            OperatorClass::SortLimit(direction) => {
                let mut sort = None;
                let mut limit = None;
                let mut grouped = false;
                for arg in &node.arguments {
                    let arg_node = forest.node(*arg);
                    match &arg_node.kind {
                        NodeKind::Value(v) => limit = Some(limit_count(desc.symbol, v)?),
                        _ => {
                            if let Operand::Column { step, field } = self.operand(*arg)? {
                                sort = Some((step, field, direction));
                            }
                            grouped = arg_node.is_group_target;
                        }
                    }
                }
                if let Some(key) = sort {
                    self.push(None, false, StepKind::Sort { fields: vec![key] });
                }
                if let Some(n) = limit {
                    let limit = if grouped || forest.groups.is_empty() {
                        Limit::Results(n)
                    } else {
                        Limit::PerGroup(n)
                    };
                    self.push(None, false, StepKind::Limit { limit });
                }
            }
        }
        Ok(())
    }
}

fn limit_count(operator: &str, value: &Value) -> Result<usize, CompileError> {
    match value.as_number() {
        Some(n) if n >= 1.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(CompileError::InvalidOperationArgument {
            operator: operator.to_string(),
            argument: value.to_string(),
        }),
    }
}
