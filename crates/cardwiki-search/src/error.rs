use thiserror::Error;

/// Fatal problems found while building the plan tree or its steps.
///
/// Unmatched words and unrelated tokens are not errors: the matcher drops
/// them and the tree builder falls back to the root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("`{operator}` cannot take {children:?} as operands")]
    InvalidOperatorArity {
        operator: String,
        children: Vec<String>,
    },

    #[error("`{operator}` expects {expected} operand(s), found {found}")]
    MissingOperand {
        operator: String,
        expected: usize,
        found: usize,
    },

    #[error("`{operator}` cannot use `{argument}` as an argument")]
    InvalidOperationArgument { operator: String, argument: String },

    #[error("`{node}` is used by the search but has no plan step")]
    UnplannedNode { node: String },

    #[error("cannot group on `{node}`")]
    InvalidGroupTarget { node: String },
}

impl CompileError {
    /// What a search box shows instead of results.
    pub fn user_message(&self) -> &'static str {
        "could not understand that search"
    }
}
