//! Free-text search compiler for cardwiki stores.
//!
//! A search string goes through five stages, each a plain function over the
//! previous stage's output:
//!
//! - [`matcher`]: phrases → typed [`Token`]s, using the store's dictionaries
//! - [`relationship`]: how two subjects relate in the store (distance, hops)
//! - [`tree`]: tokens → a [`PlanForest`] of subjects and operators
//! - [`plan`]: forest → ordered [`PlanStep`]s
//! - [`emit`]: steps → a store [`Query`]
//!
//! Compilation only reads the store. The returned query is executed by the
//! caller with [`Query::exec`].

pub mod describe;
pub mod emit;
pub mod error;
pub mod inflect;
pub mod matcher;
pub mod plan;
pub mod relationship;
pub mod tree;
pub mod vocabulary;

use cardwiki_store::{KnowledgeStore, Query, COLLECTION_LINK_TYPE, UNTYPED_LINK_DECK};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use describe::describe;
pub use emit::{Compiled, StepLayout};
pub use error::CompileError;
pub use matcher::{Token, TokenKind};
pub use plan::{Operand, PlanStep, StepId, StepKind};
pub use tree::{NodeId, NodeKind, PlanForest};

/// Collections never used to name a bridging hop.
pub const DEFAULT_HIDDEN_COLLECTIONS: &[&str] = &[UNTYPED_LINK_DECK, "history", COLLECTION_LINK_TYPE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub hidden_collections: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hidden_collections: DEFAULT_HIDDEN_COLLECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Every intermediate product of one compile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Search {
    pub text: String,
    pub tokens: Vec<Token>,
    pub forest: PlanForest,
    pub plan: Vec<PlanStep>,
    pub compiled: Compiled,
}

impl Search {
    pub fn query(&self) -> &Query {
        &self.compiled.query
    }

    pub fn describe(&self) -> Vec<String> {
        describe(&self.plan)
    }
}

pub fn compile(store: &KnowledgeStore, text: &str, config: &SearchConfig) -> Result<Search, CompileError> {
    let tokens = matcher::match_tokens(store, text);
    debug!(tokens = tokens.len(), "matched search text");
    let forest = tree::build(store, &tokens)?;
    let plan = plan::linearize(&forest, config)?;
    let compiled = emit::emit(&plan);
    debug!(
        steps = plan.len(),
        columns = compiled.query.projection().len(),
        "compiled search"
    );
    Ok(Search {
        text: text.to_string(),
        tokens,
        forest,
        plan,
        compiled,
    })
}
