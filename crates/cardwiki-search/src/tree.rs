//! Plan tree construction.
//!
//! One left-to-right pass over the tokens with an explicit [`BuildState`]:
//!
//! - The **root** is the first collection, else the first entity, else the
//!   first attribute.
//! - The **cursor** is the most recent subject (collection/entity) or
//!   operator; a new token nests under the cursor or the root, whichever
//!   the store says is more closely related.
//! - An **operation** token starts consuming the tokens that follow as its
//!   operands. Operators nest through a stack of [`Frame`]s; an operator
//!   is finalized once it is full and another operand arrives, or at the
//!   end of the input.
//!
//! Subjects handed to an infix operator become independent roots ("people
//! older than chris" has roots `people` and `chris`). Operator nodes refer
//! to their operands by id in `arguments`; tree `children` stay exclusive to
//! a single parent.

use cardwiki_store::{KnowledgeStore, Value};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::matcher::{Token, TokenKind};
use crate::relationship::{relate, Relationship};
use crate::vocabulary::{Modifier, OperatorDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum NodeKind {
    Entity(String),
    Collection(String),
    Attribute(String),
    Value(Value),
    Operation(&'static OperatorDescriptor),
}

impl NodeKind {
    pub fn is_subject(&self) -> bool {
        matches!(self, NodeKind::Entity(_) | NodeKind::Collection(_))
    }

    /// Display name: the phrase, literal or operator symbol.
    pub fn name(&self) -> String {
        match self {
            NodeKind::Entity(s) | NodeKind::Collection(s) | NodeKind::Attribute(s) => s.clone(),
            NodeKind::Value(v) => v.to_string(),
            NodeKind::Operation(op) => op.symbol.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    /// Operands of an operation node, in slot order.
    pub arguments: Vec<NodeId>,
    pub is_group_target: bool,
    pub is_deselect: bool,
    /// How this node relates to its tree parent, probed when attached.
    pub relationship: Option<Relationship>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanForest {
    nodes: Vec<PlanNode>,
    pub roots: Vec<NodeId>,
    /// Finalized operation nodes, innermost first.
    pub operations: Vec<NodeId>,
    pub groups: Vec<NodeId>,
}

impl PlanForest {
    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    fn node_mut(&mut self, id: NodeId) -> &mut PlanNode {
        &mut self.nodes[id.0]
    }

    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PlanNode {
            id,
            kind,
            children: Vec::new(),
            arguments: Vec::new(),
            is_group_target: false,
            is_deselect: false,
            relationship: None,
        });
        id
    }

    /// Deepest last descendant of `id`.
    pub fn tip(&self, id: NodeId) -> NodeId {
        let mut tip = id;
        while let Some(last) = self.node(tip).children.last() {
            tip = *last;
        }
        tip
    }

    /// Indented outline of every root, for logs and the CLI.
    pub fn outline(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for root in &self.roots {
            self.outline_node(*root, 0, &mut lines);
        }
        for op in &self.operations {
            let node = self.node(*op);
            let args: Vec<String> = node
                .arguments
                .iter()
                .map(|a| self.node(*a).kind.name())
                .collect();
            lines.push(format!("{}({})", node.kind.name(), args.join(", ")));
        }
        lines
    }

    fn outline_node(&self, id: NodeId, depth: usize, lines: &mut Vec<String>) {
        let node = self.node(id);
        let mut line = format!("{}{}", "  ".repeat(depth), node.kind.name());
        if node.is_group_target {
            line.push_str(" [group]");
        }
        if node.is_deselect {
            line.push_str(" [without]");
        }
        lines.push(line);
        for child in &node.children {
            self.outline_node(*child, depth + 1, lines);
        }
    }
}

// ============================================================================
// Build state
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ActiveOperator {
    node: NodeId,
    desc: &'static OperatorDescriptor,
    /// Left operand captured from a value typed before an infix operator.
    left: Option<NodeId>,
}

/// What was active when an operator started.
#[derive(Debug, Clone, Copy)]
struct Frame {
    cursor: Option<NodeId>,
    operator: Option<ActiveOperator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Cursor(NodeId),
    /// The active operator's operands, or the root when not consuming.
    Active,
}

struct BuildState<'s> {
    store: &'s KnowledgeStore,
    forest: PlanForest,
    root: Option<NodeId>,
    root_token: Option<usize>,
    cursor: Option<NodeId>,
    active: Option<ActiveOperator>,
    stack: Vec<Frame>,
    group: bool,
    deselect: bool,
    pending_value: Option<NodeId>,
}

pub fn build(store: &KnowledgeStore, tokens: &[Token]) -> Result<PlanForest, CompileError> {
    let mut state = BuildState::new(store, tokens);
    for (ix, token) in tokens.iter().enumerate() {
        state.push(ix, token)?;
    }
    while state.active.is_some() {
        state.finalize()?;
    }
    let forest = state.forest;
    debug!(
        roots = forest.roots.len(),
        nodes = forest.nodes.len(),
        operations = forest.operations.len(),
        groups = forest.groups.len(),
        "built plan tree"
    );
    Ok(forest)
}

fn subject_kind(kind: &TokenKind) -> Option<NodeKind> {
    match kind {
        TokenKind::Entity(s) => Some(NodeKind::Entity(s.clone())),
        TokenKind::Collection(s) => Some(NodeKind::Collection(s.clone())),
        TokenKind::Attribute(s) => Some(NodeKind::Attribute(s.clone())),
        _ => None,
    }
}

fn find_root(tokens: &[Token]) -> Option<usize> {
    let first = |pred: fn(&TokenKind) -> bool| tokens.iter().position(|t| pred(&t.kind));
    first(|k| matches!(k, TokenKind::Collection(_)))
        .or_else(|| first(|k| matches!(k, TokenKind::Entity(_))))
        .or_else(|| first(|k| matches!(k, TokenKind::Attribute(_))))
}

impl<'s> BuildState<'s> {
    fn new(store: &'s KnowledgeStore, tokens: &[Token]) -> Self {
        let mut forest = PlanForest::default();
        let root_token = find_root(tokens);
        let root = root_token
            .and_then(|ix| subject_kind(&tokens[ix].kind))
            .map(|kind| forest.add(kind));
        if let Some(root) = root {
            forest.roots.push(root);
            debug!(root = %forest.node(root).kind.name(), "chose search root");
        }
        Self {
            store,
            forest,
            root,
            root_token,
            cursor: None,
            active: None,
            stack: Vec::new(),
            group: false,
            deselect: false,
            pending_value: None,
        }
    }

    fn push(&mut self, ix: usize, token: &Token) -> Result<(), CompileError> {
        let kind = match &token.kind {
            TokenKind::Modifier(Modifier::Group) => {
                self.group = true;
                return Ok(());
            }
            TokenKind::Modifier(Modifier::Deselect) => {
                self.deselect = true;
                return Ok(());
            }
            TokenKind::Operation(desc) => {
                self.start_operator(*desc);
                return Ok(());
            }
            TokenKind::Value(v) => {
                let node = self.forest.add(NodeKind::Value(v.clone()));
                if self.active.is_none() {
                    if let Some(dropped) = self.pending_value.replace(node) {
                        trace!(node = ?dropped, "pending value replaced");
                    }
                    return Ok(());
                }
                return self.place(node);
            }
            other => match subject_kind(other) {
                Some(kind) => kind,
                None => return Ok(()),
            },
        };

        let is_root = Some(ix) == self.root_token;
        let node = match (is_root, self.root) {
            (true, Some(root)) => root,
            _ => self.forest.add(kind),
        };

        if self.group && matches!(self.forest.node(node).kind, NodeKind::Collection(_) | NodeKind::Attribute(_)) {
            self.forest.node_mut(node).is_group_target = true;
            self.forest.groups.push(node);
            self.group = false;
        }

        if is_root {
            // An attribute root typed after an operator is also its operand:
            // "top 5 salaries".
            let is_attribute = matches!(self.forest.node(node).kind, NodeKind::Attribute(_));
            if is_attribute && self.active.is_some() && !self.operator_full() {
                if let Some(active) = self.active {
                    self.forest.node_mut(active.node).arguments.push(node);
                }
            }
            return Ok(());
        }

        let subject = self.forest.node(node).kind.is_subject();
        if self.deselect && subject {
            self.forest.node_mut(node).is_deselect = true;
            self.deselect = false;
        }

        self.place(node)?;
        if subject {
            self.cursor = Some(node);
        }
        Ok(())
    }

    fn start_operator(&mut self, desc: &'static OperatorDescriptor) {
        let node = self.forest.add(NodeKind::Operation(desc));
        self.stack.push(Frame {
            cursor: self.cursor,
            operator: self.active.take(),
        });
        let mut active = ActiveOperator {
            node,
            desc,
            left: None,
        };
        if let Some(value) = self.pending_value.take() {
            if desc.infix {
                active.left = Some(value);
            } else if desc.arity > 0 {
                self.forest.node_mut(node).arguments.push(value);
            } else {
                trace!(operator = desc.symbol, "value before nullary operator dropped");
            }
        }
        self.active = Some(active);
        self.cursor = Some(node);
        debug!(operator = desc.symbol, depth = self.stack.len(), "consuming operands");
    }

    fn operator_full(&self) -> bool {
        self.active.is_some_and(|a| {
            self.forest.node(a.node).arguments.len() >= a.desc.trailing_operands()
        })
    }

    fn placement(&self, node: NodeId) -> Placement {
        let Some(cursor) = self.cursor else {
            return Placement::Active;
        };
        let kind = &self.forest.node(node).kind;
        let cursor_kind = &self.forest.node(cursor).kind;
        match (cursor_kind, kind) {
            (_, NodeKind::Value(_)) => Placement::Active,
            (NodeKind::Entity(_), k) if !matches!(k, NodeKind::Attribute(_)) => Placement::Active,
            (NodeKind::Entity(_) | NodeKind::Collection(_), _) => {
                let mut cursor_rel = relate(self.store, cursor_kind, kind);
                let mut root_rel = self
                    .root
                    .and_then(|root| relate(self.store, &self.forest.node(root).kind, kind));
                // A direct entity relationship narrows to exactly one item,
                // which reads better as a root-level filter.
                if matches!(kind, NodeKind::Entity(_)) {
                    cursor_rel = cursor_rel.filter(|r| r.distance > 0);
                    root_rel = root_rel.filter(|r| r.distance > 0);
                }
                match (cursor_rel, root_rel) {
                    (None, _) => Placement::Active,
                    (Some(_), None) => Placement::Cursor(cursor),
                    (Some(c), Some(r)) if c.distance <= r.distance => Placement::Cursor(cursor),
                    _ => Placement::Active,
                }
            }
            _ => Placement::Active,
        }
    }

    fn place(&mut self, node: NodeId) -> Result<(), CompileError> {
        loop {
            let placement = self.placement(node);
            if placement == Placement::Active && self.operator_full() {
                self.finalize()?;
                continue;
            }
            match placement {
                Placement::Cursor(cursor) => self.attach(cursor, node),
                Placement::Active => match (self.active, self.root) {
                    (Some(active), _) => self.forest.node_mut(active.node).arguments.push(node),
                    (None, Some(root)) => self.attach(root, node),
                    (None, None) => {
                        trace!(node = %self.forest.node(node).kind.name(), "nothing to attach to");
                    }
                },
            }
            return Ok(());
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        let relationship = relate(
            self.store,
            &self.forest.node(parent).kind,
            &self.forest.node(child).kind,
        );
        debug!(
            parent = %self.forest.node(parent).kind.name(),
            child = %self.forest.node(child).kind.name(),
            distance = relationship.as_ref().map(|r| r.distance),
            "attached node"
        );
        self.forest.node_mut(child).relationship = relationship;
        self.forest.node_mut(parent).children.push(child);
    }

    /// Close the active operator: rebalance its operands into the tree,
    /// supply the infix left operand, then resume the enclosing operator.
    fn finalize(&mut self) -> Result<(), CompileError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let frame = self.stack.pop().unwrap_or(Frame {
            cursor: None,
            operator: None,
        });
        let desc = active.desc;
        let anchor = frame
            .cursor
            .filter(|c| !matches!(self.forest.node(*c).kind, NodeKind::Operation(_)))
            .or(self.root);
        let left_tip = anchor.map(|a| self.forest.tip(a));

        let mut arguments = std::mem::take(&mut self.forest.node_mut(active.node).arguments);
        for ix in 0..arguments.len() {
            let arg = arguments[ix];
            let kind = &self.forest.node(arg).kind;
            let is_attribute = matches!(kind, NodeKind::Attribute(_));
            let is_subject = kind.is_subject();
            if is_attribute && Some(arg) != self.root {
                match anchor {
                    Some(anchor) => self.attach(anchor, arg),
                    None => self.forest.roots.push(arg),
                }
            } else if is_subject {
                if !desc.infix {
                    return Err(self.arity_error(active.node, &arguments));
                }
                let mut tip = self.forest.tip(arg);
                if let Some(attribute) = desc.attribute {
                    let bound = self.forest.add(NodeKind::Attribute(attribute.to_string()));
                    self.attach(tip, bound);
                    tip = bound;
                }
                self.forest.roots.push(arg);
                arguments[ix] = tip;
            }
        }

        if desc.infix {
            let left = match desc.attribute {
                Some(attribute) => {
                    let anchor = anchor.ok_or_else(|| missing(desc, arguments.len()))?;
                    let bound = self.forest.add(NodeKind::Attribute(attribute.to_string()));
                    self.attach(anchor, bound);
                    bound
                }
                None => active
                    .left
                    .or(left_tip)
                    .ok_or_else(|| missing(desc, arguments.len()))?,
            };
            arguments.insert(0, left);
        }

        if !desc.args.is_empty() && arguments.len() != desc.args.len() {
            return Err(missing(desc, arguments.len()));
        }

        self.forest.node_mut(active.node).arguments = arguments;
        self.forest.operations.push(active.node);
        debug!(operator = desc.symbol, "finalized operator");

        self.cursor = frame.cursor;
        self.active = frame.operator;
        if self.active.is_none() {
            self.pending_value = None;
        }
        Ok(())
    }

    fn arity_error(&self, operator: NodeId, arguments: &[NodeId]) -> CompileError {
        CompileError::InvalidOperatorArity {
            operator: self.forest.node(operator).kind.name(),
            children: arguments
                .iter()
                .map(|a| self.forest.node(*a).kind.name())
                .collect(),
        }
    }
}

fn missing(desc: &OperatorDescriptor, found: usize) -> CompileError {
    CompileError::MissingOperand {
        operator: desc.symbol.to_string(),
        expected: desc.arity,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_tokens;
    use crate::relationship::RelationshipKind;

    fn store() -> KnowledgeStore {
        let mut store = KnowledgeStore::new();
        let pixar = store.add_page("pixar");
        store.add_eav(pixar, "founded", 1986i64).unwrap();
        let up = store.add_page("up");
        let toy = store.add_page("toy story");
        store.add_to_deck(up, "movies").unwrap();
        store.add_to_deck(toy, "movies").unwrap();
        store.add_link(pixar, up, Some("studio")).unwrap();
        for (name, salary, age) in [("chris", 120i64, 30i64), ("jamie", 90, 41)] {
            let p = store.add_page(name);
            store.add_to_deck(p, "people").unwrap();
            store.add_eav(p, "salary", salary).unwrap();
            store.add_eav(p, "age", age).unwrap();
        }
        store
    }

    fn tree(text: &str) -> Result<PlanForest, CompileError> {
        let store = store();
        let tokens = match_tokens(&store, text);
        build(&store, &tokens)
    }

    fn names(forest: &PlanForest, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| forest.node(*id).kind.name()).collect()
    }

    #[test]
    fn entity_root_with_direct_attribute() {
        let forest = tree("pixar's founded").unwrap();
        assert_eq!(names(&forest, &forest.roots), vec!["pixar"]);
        let root = forest.node(forest.roots[0]);
        assert_eq!(names(&forest, &root.children), vec!["founded"]);
        let rel = forest.node(root.children[0]).relationship.clone().unwrap();
        assert_eq!((rel.distance, rel.kind), (0, RelationshipKind::EntToEav));
    }

    #[test]
    fn deselected_entity_hangs_off_the_collection() {
        let forest = tree("movies without up").unwrap();
        let root = forest.node(forest.roots[0]);
        assert_eq!(root.kind, NodeKind::Collection("movies".into()));
        let up = forest.node(root.children[0]);
        assert_eq!(up.kind, NodeKind::Entity("up".into()));
        assert!(up.is_deselect);
    }

    #[test]
    fn infix_comparison_takes_root_as_left_operand() {
        let forest = tree("salaries > 50000").unwrap();
        assert_eq!(names(&forest, &forest.roots), vec!["salary"]);
        let op = forest.node(forest.operations[0]);
        assert_eq!(names(&forest, &op.arguments), vec!["salary", "50000"]);
        assert_eq!(op.arguments[0], forest.roots[0]);
    }

    #[test]
    fn bound_attribute_splits_roots() {
        let forest = tree("people older than chris").unwrap();
        assert_eq!(names(&forest, &forest.roots), vec!["people", "chris"]);
        let op = forest.node(forest.operations[0]);
        assert_eq!(names(&forest, &op.arguments), vec!["age", "age"]);
        let people = forest.node(forest.roots[0]);
        assert_eq!(people.children, vec![op.arguments[0]]);
        let chris = forest.node(forest.roots[1]);
        assert_eq!(chris.children, vec![op.arguments[1]]);
    }

    #[test]
    fn group_modifier_marks_the_next_collection() {
        let forest = tree("salary per people").unwrap();
        assert_eq!(names(&forest, &forest.groups), vec!["people"]);
        assert!(forest.node(forest.roots[0]).is_group_target);
    }

    #[test]
    fn sort_limit_collects_value_and_attribute() {
        let forest = tree("people top 1 salary").unwrap();
        let op = forest.node(forest.operations[0]);
        assert_eq!(names(&forest, &op.arguments), vec!["1", "salary"]);
        let people = forest.node(forest.roots[0]);
        assert_eq!(names(&forest, &people.children), vec!["salary"]);
    }

    #[test]
    fn non_infix_operator_rejects_subjects() {
        let err = tree("people sum chris").unwrap_err();
        assert!(matches!(err, CompileError::InvalidOperatorArity { operator, .. } if operator == "sum"));
    }

    #[test]
    fn missing_operand_is_reported() {
        let err = tree("salaries >").unwrap_err();
        assert!(matches!(err, CompileError::MissingOperand { expected: 2, found: 1, .. }));
    }

    #[test]
    fn value_before_infix_operator_is_left_operand() {
        let forest = tree("5 + 3").unwrap();
        assert!(forest.roots.is_empty());
        let op = forest.node(forest.operations[0]);
        assert_eq!(names(&forest, &op.arguments), vec!["5", "3"]);
    }
}
