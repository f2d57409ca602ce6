// error.rs — Error taxonomy for tree conversion
//
// Every error here is fatal and deterministic in the input graph and
// configuration: retrying a failed conversion without changing its input is
// pointless, so no error carries retry semantics. A conversion either returns
// complete DSL text or one of these; partial output is never produced.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use thiserror::Error;

/// Umbrella error returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A feature value failed its declared cast. Signals malformed input from the
/// external graph builder; carries the feature and offending value for the
/// caller's diagnostics.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("feature `{feature}`: cannot cast `{value}` to {wanted}")]
pub struct ValidationError {
    pub feature: String,
    pub value: String,
    pub wanted: &'static str,
}

/// The graph shape violates a tree invariant, before or during surgery.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StructuralError {
    #[error("tree has no root node")]
    NoRoot,

    #[error("tree has {0} parentless nodes; expected exactly one root")]
    MultipleRoots(usize),

    #[error("node {0} already has a parent")]
    DuplicateParent(u32),

    #[error("edge references unknown node {0}")]
    UnknownNode(u32),

    #[error("decision node {0} has no default branch")]
    MissingDefault(u32),

    #[error("decision node {0} has no split entry for child {1}")]
    MissingSplitEntry(u32, u32),

    #[error(
        "slicing `{feature}`: no branch of node {node} tests the retained value \
         and no default branch exists to substitute"
    )]
    NoDefaultFallback { feature: String, node: u32 },

    #[error(
        "slicing `{feature}`: {count} sibling branches of node {node} test the \
         retained value; branches must be mutually exclusive"
    )]
    AmbiguousRetainedMatch {
        feature: String,
        node: u32,
        count: usize,
    },
}

/// The configuration asks for an unrepresentable combination.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("range test on `{feature}` has neither a lower nor an upper bound")]
    UnboundedRange { feature: String },

    #[error(
        "range test on `{feature}` cannot appear under an `any` quantifier; \
         a bounded range is a conjunction of its two bounds"
    )]
    RangeUnderAnyJoin { feature: String },
}

/// Building a tree from an external document failed.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed tree document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("node {node}: {reason}")]
    BadNode { node: u32, reason: String },

    #[error("edge {src} -> {target}: {reason}")]
    BadEdge {
        src: u32,
        target: u32,
        reason: String,
    },
}
