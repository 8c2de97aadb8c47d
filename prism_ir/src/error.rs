//! Error types for IR construction, transformation and lowering.
//!
//! Every violation detected by this crate is an internal-consistency failure
//! of the compiler, never a user error. They are returned rather than
//! panicking so a driver can abandon the one compilation unit that hit the
//! problem and keep compiling the others.

use crate::ir::node::{GraphId, NodeId};
use crate::ir::types::Kind;
use thiserror::Error;

/// Result alias used throughout the IR.
pub type IrResult<T> = Result<T, IrError>;

/// Which of a node's two edge arrays an access targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Input,
    Successor,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Input => f.write_str("input"),
            EdgeKind::Successor => f.write_str("successor"),
        }
    }
}

/// Coarse classification of an [`IrError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Slot access outside a node's schema.
    StructuralArity,
    /// A virtual object survived to lowering.
    UnresolvedVirtual,
    /// An edge would cross graph boundaries.
    CrossGraph,
    /// A required input was unset when it was needed.
    NullRequiredInput,
    /// The caller misused the graph API.
    Usage,
    /// Compilation of a unit panicked.
    Panic,
}

/// IR invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// Slot index at or beyond the node's declared arity.
    #[error("{kind}: {edge} slot {index} out of range (arity {arity})")]
    Arity {
        kind: &'static str,
        edge: EdgeKind,
        index: usize,
        arity: usize,
    },

    /// Named slot that the node's schema does not declare.
    #[error("{kind} has no {edge} slot named `{role}`")]
    MissingSlot {
        kind: &'static str,
        edge: EdgeKind,
        role: &'static str,
    },

    /// Virtual object still live where only real nodes are allowed.
    #[error("virtual object {node} ({type_name}) is still live at lowering")]
    UnresolvedVirtual { node: NodeId, type_name: String },

    /// Edge between nodes owned by different graphs.
    #[error("edge from {from} to {to} crosses into another graph ({owner} owns the source)")]
    CrossGraph {
        from: NodeId,
        to: NodeId,
        owner: GraphId,
    },

    /// Required input left unset.
    #[error("{kind} {node}: required input `{role}` is unset")]
    NullRequiredInput {
        node: NodeId,
        kind: &'static str,
        role: &'static str,
    },

    /// Id does not name a live node of this graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Operation applied to a node of the wrong kind.
    #[error("{node} is {actual}, expected {expected}")]
    WrongKind {
        node: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    /// A non-value node used where a value is required.
    #[error("{node} ({kind}) does not produce a value")]
    NotAValue { node: NodeId, kind: &'static str },

    /// Mutation of a graph that is no longer under construction.
    #[error("graph {0} is finalized")]
    GraphFinalized(GraphId),

    /// Input whose result kind does not fit the slot.
    #[error("{node} produces {actual}, expected {expected}")]
    KindMismatch {
        node: NodeId,
        expected: Kind,
        actual: Kind,
    },

    /// Successor target already linked after a different node.
    #[error("{node} already follows {predecessor}")]
    AlreadyLinked { node: NodeId, predecessor: NodeId },

    /// Usage or predecessor bookkeeping disagrees with the edges.
    #[error("edge bookkeeping between {node} and {user} is inconsistent")]
    InconsistentEdges { node: NodeId, user: NodeId },

    /// Removal of a node that other nodes still consume.
    #[error("{node} still has {count} usage(s)")]
    HasUsages { node: NodeId, count: usize },

    /// A unit's compilation panicked; the payload message is kept.
    #[error("compilation of graph {graph} panicked: {message}")]
    UnitPanicked { graph: GraphId, message: String },
}

impl IrError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            IrError::Arity { .. } | IrError::MissingSlot { .. } => ErrorCategory::StructuralArity,
            IrError::UnresolvedVirtual { .. } => ErrorCategory::UnresolvedVirtual,
            IrError::CrossGraph { .. } => ErrorCategory::CrossGraph,
            IrError::NullRequiredInput { .. } => ErrorCategory::NullRequiredInput,
            IrError::UnknownNode(_)
            | IrError::WrongKind { .. }
            | IrError::NotAValue { .. }
            | IrError::KindMismatch { .. }
            | IrError::AlreadyLinked { .. }
            | IrError::InconsistentEdges { .. }
            | IrError::GraphFinalized(_)
            | IrError::HasUsages { .. } => ErrorCategory::Usage,
            IrError::UnitPanicked { .. } => ErrorCategory::Panic,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
