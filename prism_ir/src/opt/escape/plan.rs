//! Virtualization plans.
//!
//! A plan is everything escape analysis learned about one allocation,
//! computed without touching the graph. Committing it is the only step that
//! mutates, so an allocation that cannot be fully resolved never gets a
//! virtual object in the first place.

use crate::error::{IrError, IrResult};
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::types::{Constant, FieldList, TypeRef};

/// What a planned access does to the tracked fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    /// Read of tracked field `slot`.
    Load { slot: usize },
    /// Write of tracked field `slot`; the value is read at commit time.
    Store { slot: usize },
    /// Array length query, answered by the allocation's length input.
    Length,
}

/// One use of the allocation, in control order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAccess {
    /// The load, store or length node.
    pub node: NodeId,
    /// Position on the control chain.
    pub position: usize,
    pub op: AccessOp,
}

/// Scalar replacement plan for one allocation.
#[derive(Debug, Clone)]
pub struct VirtualizationPlan {
    /// The allocation to remove.
    pub allocation: NodeId,
    /// Type of the virtual object.
    pub ty: TypeRef,
    /// Tracked fields; shared with the host type for instances.
    pub fields: FieldList,
    /// Value each field holds before its first store.
    pub defaults: Vec<Constant>,
    /// Length input for arrays.
    pub length: Option<NodeId>,
    /// Uses sorted by control position.
    pub accesses: Vec<PlannedAccess>,
}

impl VirtualizationPlan {
    /// Number of tracked fields.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Check that every node the plan names is still live in `graph`.
    pub fn check_current(&self, graph: &Graph) -> IrResult<()> {
        graph.ensure_building()?;
        let nodes = std::iter::once(self.allocation)
            .chain(self.length)
            .chain(self.accesses.iter().map(|a| a.node));
        for id in nodes {
            if !graph.contains(id) {
                return Err(IrError::UnknownNode(id));
            }
        }
        Ok(())
    }
}
