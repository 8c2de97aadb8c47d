//! Copying nodes between graphs.
//!
//! Two granularities are provided:
//!
//! - [`Graph::clone_node`]: copy one node. The copy has the same kind and
//!   attributes and the same arity, with every slot unset; rewiring is the
//!   caller's job.
//! - [`GraphCloner`]: copy a whole graph (or a subset) the way inlining does.
//!
//! # Algorithm
//!
//! The cloner works in three phases:
//!
//! 1. **Collection Phase**: pick the nodes to copy; substituted parameters map
//!    straight to their arguments in the target graph
//! 2. **Clone Phase**: copy every picked node with empty slots
//! 3. **Fixup Phase**: rewrite input and successor edges through the id map
//!
//! Edges to nodes that were neither cloned nor substituted are left unset and
//! counted, since writing them would cross graphs.

use super::graph::Graph;
use super::node::{Node, NodeFlags, NodeId, NodeKind};
use super::schema;
use crate::error::{IrError, IrResult};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

// =============================================================================
// Single-node Cloning
// =============================================================================

impl Graph {
    /// Copy node `id` into `into`.
    ///
    /// The copy shares any type and field descriptors with the original by
    /// reference, gets a fresh identity owned by `into`, and starts with all
    /// of its slots unset. Fails if `into` is finalized.
    pub fn clone_node(&self, id: NodeId, into: &mut Graph) -> IrResult<NodeId> {
        into.ensure_building()?;
        let source = self.node(id)?;

        let mut copy = Node::new(source.kind().clone());
        copy.flags = source.flags | NodeFlags::CLONED;
        let new_id = into.insert(copy);

        trace!(from = %id, to = %new_id, kind = source.name(), "cloned node");
        Ok(new_id)
    }

    /// Copy a virtual object into `into`.
    ///
    /// Same as [`clone_node`](Self::clone_node) but rejects other kinds.
    pub fn copy_virtual_object(&self, id: NodeId, into: &mut Graph) -> IrResult<NodeId> {
        self.virtual_object_of(id)?;
        self.clone_node(id, into)
    }
}

// =============================================================================
// Clone Result
// =============================================================================

/// Result of cloning a graph into another.
#[derive(Debug, Default)]
pub struct CloneResult {
    /// Mapping from source NodeIds to target NodeIds.
    pub id_map: FxHashMap<NodeId, NodeId>,
    /// Clone of the first fixed instruction after the source start.
    pub entry: Option<NodeId>,
    /// Cloned return nodes.
    pub returns: Vec<NodeId>,
    /// Number of nodes cloned.
    pub nodes_cloned: usize,
    /// Edges left unset because their target was not copied.
    pub unresolved_edges: usize,
}

impl CloneResult {
    /// Map a source NodeId to its copy.
    pub fn map_id(&self, old: NodeId) -> Option<NodeId> {
        self.id_map.get(&old).copied()
    }

    /// Map a list of source NodeIds, dropping unmapped ones.
    pub fn map_ids(&self, old_ids: &[NodeId]) -> Vec<NodeId> {
        old_ids.iter().filter_map(|id| self.map_id(*id)).collect()
    }
}

// =============================================================================
// Graph Cloner
// =============================================================================

/// Clones a source graph into a target graph with ID remapping.
#[derive(Debug)]
pub struct GraphCloner<'a> {
    /// Source graph to clone from.
    source: &'a Graph,
    /// Restrict cloning to these nodes; everything but start when `None`.
    subset: Option<Vec<NodeId>>,
    /// Argument substitutions: parameter index -> node in the target graph.
    argument_map: FxHashMap<u16, NodeId>,
}

impl<'a> GraphCloner<'a> {
    /// Create a new graph cloner for the given source graph.
    pub fn new(source: &'a Graph) -> Self {
        Self {
            source,
            subset: None,
            argument_map: FxHashMap::default(),
        }
    }

    /// Only clone the given nodes.
    pub fn with_nodes(mut self, nodes: &[NodeId]) -> Self {
        self.subset = Some(nodes.to_vec());
        self
    }

    /// Replace parameter `index` with `arg`, which lives in the target graph.
    pub fn with_argument(mut self, index: u16, arg: NodeId) -> Self {
        self.argument_map.insert(index, arg);
        self
    }

    /// Set all arguments at once.
    pub fn with_arguments(mut self, args: &[NodeId]) -> Self {
        for (i, &node) in args.iter().enumerate() {
            self.argument_map.insert(i as u16, node);
        }
        self
    }

    /// Clone into `target`.
    ///
    /// On error the target may hold a partial copy and should be discarded
    /// together with its compilation unit.
    pub fn clone_into(self, target: &mut Graph) -> IrResult<CloneResult> {
        target.ensure_building()?;
        let mut result = CloneResult::default();

        // Phase 1: collect.
        let mut picked: Vec<NodeId> = Vec::new();
        let candidates: Vec<NodeId> = match &self.subset {
            Some(nodes) => nodes.clone(),
            None => self.source.ids().collect(),
        };
        for id in candidates {
            let node = self.source.node(id)?;
            if id == self.source.start() {
                continue;
            }
            if let NodeKind::Parameter { index, .. } = node.kind() {
                if let Some(&arg) = self.argument_map.get(index) {
                    if arg.graph() != target.id() {
                        return Err(IrError::CrossGraph {
                            from: id,
                            to: arg,
                            owner: target.id(),
                        });
                    }
                    result.id_map.insert(id, arg);
                    continue;
                }
            }
            picked.push(id);
        }

        // Phase 2: clone with empty slots.
        for &old in &picked {
            let new = self.source.clone_node(old, target)?;
            if matches!(target.node(new)?.kind(), NodeKind::Return) {
                result.returns.push(new);
            }
            result.id_map.insert(old, new);
        }
        result.nodes_cloned = picked.len();

        // Phase 3: rewire.
        for &old in &picked {
            let new = result.id_map[&old];
            let node = self.source.node(old)?;

            for (index, input) in node.inputs().iter().enumerate() {
                let Some(input) = input else { continue };
                match result.id_map.get(input) {
                    Some(&mapped) => {
                        target.set_input(new, index, Some(mapped))?;
                    }
                    None => result.unresolved_edges += 1,
                }
            }
            for (index, successor) in node.successors().iter().enumerate() {
                let Some(successor) = successor else { continue };
                match result.id_map.get(successor) {
                    Some(&mapped) => {
                        target.set_successor(new, index, Some(mapped))?;
                    }
                    None => result.unresolved_edges += 1,
                }
            }
        }

        result.entry = self
            .source
            .successor(self.source.start(), schema::INSTRUCTION_NEXT)?
            .and_then(|first| result.map_id(first));

        debug!(
            source = %self.source.id(),
            target = %target.id(),
            cloned = result.nodes_cloned,
            unresolved = result.unresolved_edges,
            "cloned graph"
        );
        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================
