//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::node::NodeId;

/// Reasons a store operation is refused.
///
/// Public mutations never surface these: they log and leave the tree as it
/// was. The `check_*` helpers and `verify` return them for callers that need
/// to know why.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("root node cannot be removed or moved")]
    RootImmutable,

    #[error("cannot move {node} under its own subtree at {target}")]
    CycleDetected { node: NodeId, target: NodeId },

    #[error("empty payload for {0}")]
    EmptyPayload(NodeId),

    #[error("tree inconsistent: {0}")]
    Inconsistent(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
