//! Committing virtualization plans.
//!
//! Committing walks a plan's accesses in control order with one tracked value
//! per field. Stores update the tracked value and disappear, loads are
//! replaced by it (or by the field's zero value when nothing was stored yet),
//! and length queries are replaced by the allocation's length input. The
//! allocation itself is removed last and a [`NodeKind::VirtualObject`] anchor
//! takes its place in [`VirtualState`].
//!
//! [`NodeKind::VirtualObject`]: crate::ir::node::NodeKind::VirtualObject

use super::plan::{AccessOp, VirtualizationPlan};
use crate::error::{IrError, IrResult};
use crate::ir::graph::Graph;
use crate::ir::node::{NodeFlags, NodeId};
use crate::ir::schema::InputRole;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

// =============================================================================
// Virtual State
// =============================================================================

/// Field values of every virtual object created by escape analysis.
///
/// Virtual objects are anchors for this side table; they have no users in the
/// graph. [`release`](Self::release) removes them once nothing needs the
/// state any more, which must happen before lowering.
#[derive(Debug, Default)]
pub struct VirtualState {
    /// Virtual object -> tracked value per field.
    objects: FxHashMap<NodeId, Vec<Option<NodeId>>>,
    /// Anchors in creation order.
    anchors: Vec<NodeId>,
}

impl VirtualState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked virtual objects.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Virtual objects in creation order.
    pub fn anchors(&self) -> &[NodeId] {
        &self.anchors
    }

    /// Last known value of every field of `vobj`.
    ///
    /// A field the program only read holds the zero constant the read was
    /// replaced with; a field never touched is `None`.
    pub fn field_values(&self, vobj: NodeId) -> Option<&[Option<NodeId>]> {
        self.objects.get(&vobj).map(Vec::as_slice)
    }

    /// Last known value of field `slot` of `vobj`.
    pub fn field_value(&self, vobj: NodeId, slot: usize) -> Option<NodeId> {
        self.objects.get(&vobj)?.get(slot).copied().flatten()
    }

    fn track(&mut self, vobj: NodeId, values: Vec<Option<NodeId>>) {
        self.objects.insert(vobj, values);
        self.anchors.push(vobj);
    }

    /// Point tracked values at `new` wherever they named `old`.
    fn redirect(&mut self, old: NodeId, new: NodeId) {
        for values in self.objects.values_mut() {
            for value in values.iter_mut().filter(|v| **v == Some(old)) {
                *value = Some(new);
            }
        }
    }

    /// Drop the state and remove every anchor from `graph`.
    ///
    /// Returns the number of virtual objects removed.
    pub fn release(self, graph: &mut Graph) -> IrResult<usize> {
        let mut removed = 0;
        for vobj in self.anchors {
            graph.remove(vobj)?;
            removed += 1;
        }
        debug!(graph = %graph.id(), removed, "released virtual objects");
        Ok(removed)
    }
}

// =============================================================================
// Commit
// =============================================================================

/// Apply `plan` to `graph`, recording the result in `state`.
///
/// Returns the new virtual object. The plan is checked against the graph
/// before anything changes.
pub fn commit(graph: &mut Graph, plan: &VirtualizationPlan, state: &mut VirtualState) -> IrResult<NodeId> {
    plan.check_current(graph)?;

    let vobj = graph.virtual_object(plan.ty.clone(), plan.fields.clone())?;
    let mut values: Vec<Option<NodeId>> = vec![None; plan.field_count()];

    for access in &plan.accesses {
        match access.op {
            AccessOp::Store { slot } => {
                // Read now: an earlier commit may have rewritten the input.
                let value = graph.require_input(access.node, InputRole::Value)?;
                values[slot] = Some(value);
                graph.remove_fixed(access.node)?;
                trace!(store = %access.node, slot, value = %value, "folded store");
            }
            AccessOp::Load { slot } => {
                let value = match values[slot] {
                    Some(value) => value,
                    None => {
                        let zero = graph.constant(plan.defaults[slot])?;
                        graph.add_flags(zero, NodeFlags::FIELD_DEFAULT)?;
                        values[slot] = Some(zero);
                        zero
                    }
                };
                replace_fixed(graph, state, access.node, value)?;
                trace!(load = %access.node, slot, value = %value, "folded load");
            }
            AccessOp::Length => {
                let length = plan.length.ok_or(IrError::NullRequiredInput {
                    node: plan.allocation,
                    kind: "NewArray",
                    role: InputRole::Length.name(),
                })?;
                replace_fixed(graph, state, access.node, length)?;
            }
        }
    }

    graph.remove_fixed(plan.allocation)?;
    state.track(vobj, values);
    debug!(
        allocation = %plan.allocation,
        virtual_object = %vobj,
        ty = plan.ty.name(),
        "virtualized allocation"
    );
    Ok(vobj)
}

fn replace_fixed(graph: &mut Graph, state: &mut VirtualState, old: NodeId, new: NodeId) -> IrResult<()> {
    graph.replace_at_usages(old, new)?;
    state.redirect(old, new);
    graph.remove_fixed(old)?;
    Ok(())
}
