//! Sea-of-Nodes graph structure.
//!
//! The graph provides:
//! - **Arena-based storage**: nodes live in one arena and are named by [`NodeId`]
//! - **Use lists**: every input edge is mirrored in its target's usage list
//! - **Control chain**: fixed instructions hang off [`Graph::start`] through `next`
//! - **Checked edges**: every edge write is validated against the slot schema,
//!   the owning graph and the target's result kind
//!
//! A graph is built, transformed, and then finalized. Once finalized it is
//! read-only: any mutation, and cloning nodes into it, fails with
//! [`IrError::GraphFinalized`].

use super::arena::{Arena, BitSet, SecondaryMap};
use super::node::{GraphId, Node, NodeFlags, NodeId, NodeKind, VirtualObject};
use super::schema::{self, InputRole, SuccessorRole};
use super::types::{Constant, FieldDescriptor, FieldList, Kind, TypeRef};
use crate::config::{ConfigError, GraphConfig};
use crate::error::{IrError, IrResult};
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Nodes consuming a value, one entry per input edge.
pub type UsageList = SmallVec<[NodeId; 4]>;

/// Lifecycle of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Nodes may be added, rewired and removed.
    Building,
    /// Read-only; ready for lowering.
    Finalized,
}

// =============================================================================
// Graph Structure
// =============================================================================

/// A Sea-of-Nodes graph for one compilation unit.
///
/// The graph is the sole owner of its nodes. It is deliberately not `Clone`:
/// a copy would carry the same [`GraphId`] and make cross-graph edges
/// undetectable. Use [`Graph::clone_node`] or
/// [`GraphCloner`](super::clone::GraphCloner) to copy nodes between graphs.
pub struct Graph {
    id: GraphId,
    name: String,
    state: GraphState,
    config: GraphConfig,

    /// Arena for node storage.
    nodes: Arena<Node>,

    /// For each node, the nodes that use it as an input.
    usages: SecondaryMap<Node, UsageList>,

    /// For each fixed node, the node whose successor slot points at it.
    predecessors: SecondaryMap<Node, Option<NodeId>>,

    /// The start node (control entry).
    start: NodeId,
}

impl Graph {
    /// Create a new empty graph holding only its start node.
    pub fn new() -> Self {
        Self::build(String::new(), GraphConfig::default())
    }

    /// Create a new graph for the named compilation unit.
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(name.into(), GraphConfig::default())
    }

    /// Create a graph with explicit configuration.
    pub fn with_config(name: impl Into<String>, config: GraphConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(name.into(), config))
    }

    fn build(name: String, config: GraphConfig) -> Self {
        let id = GraphId::fresh();
        let mut nodes = Arena::with_capacity(config.initial_capacity);
        let start = NodeId::new(id, nodes.alloc(Node::new(NodeKind::Start)));
        debug!(graph = %id, name = %name, "created graph");

        Graph {
            id,
            name,
            state: GraphState::Building,
            usages: SecondaryMap::with_capacity(config.initial_capacity),
            predecessors: SecondaryMap::with_capacity(config.initial_capacity),
            config,
            nodes,
            start,
        }
    }

    /// Identity of this graph.
    #[inline]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Compilation unit name (may be empty).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Check if the graph no longer accepts mutation.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.state == GraphState::Finalized
    }

    /// The control entry node.
    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Configuration the graph was built with.
    #[inline]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    /// Get a live node of this graph.
    pub fn node(&self, id: NodeId) -> IrResult<&Node> {
        if id.graph() != self.id {
            return Err(IrError::UnknownNode(id));
        }
        self.nodes.get(id.slot()).ok_or(IrError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> IrResult<&mut Node> {
        if id.graph() != self.id {
            return Err(IrError::UnknownNode(id));
        }
        self.nodes.get_mut(id.slot()).ok_or(IrError::UnknownNode(id))
    }

    /// Get a node by ID (optional).
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.node(id).ok()
    }

    /// Check whether `id` names a live node of this graph.
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, start included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph holds only its start node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Add a node with every slot unset.
    pub fn add(&mut self, kind: NodeKind) -> IrResult<NodeId> {
        self.ensure_building()?;
        Ok(self.insert(Node::new(kind)))
    }

    /// Store an already-built node, bypassing the lifecycle check.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.id, self.nodes.alloc(node));
        trace!(node = %id, kind = self.nodes[id.slot()].name(), "added node");
        id
    }

    /// Add a node and wire the given `(slot, input)` pairs.
    ///
    /// Nothing is left behind if any input is rejected.
    fn add_with_inputs(&mut self, kind: NodeKind, inputs: &[(usize, NodeId)]) -> IrResult<NodeId> {
        let id = self.add(kind)?;
        for &(index, input) in inputs {
            if let Err(err) = self.set_input(id, index, Some(input)) {
                self.discard(id);
                return Err(err);
            }
        }
        Ok(id)
    }

    fn discard(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(id.slot()) {
            for input in node.input_ids() {
                self.remove_usage(input, id);
            }
        }
    }

    /// Create a constant.
    pub fn constant(&mut self, value: Constant) -> IrResult<NodeId> {
        self.add(NodeKind::Constant(value))
    }

    /// Create an `int` constant.
    pub fn int(&mut self, value: i32) -> IrResult<NodeId> {
        self.constant(Constant::Int(value))
    }

    /// Create a parameter.
    pub fn parameter(&mut self, index: u16, kind: Kind) -> IrResult<NodeId> {
        self.add(NodeKind::Parameter { index, kind })
    }

    /// Create an instance allocation.
    pub fn new_instance(&mut self, ty: TypeRef) -> IrResult<NodeId> {
        self.add(NodeKind::NewInstance { ty })
    }

    /// Create a primitive array allocation with the given length.
    pub fn new_type_array(&mut self, element: Kind, length: NodeId) -> IrResult<NodeId> {
        self.add_with_inputs(
            NodeKind::NewTypeArray { element },
            &[(schema::NEW_ARRAY_LENGTH, length)],
        )
    }

    /// Create a reference array allocation with the given length.
    pub fn new_object_array(&mut self, element: TypeRef, length: NodeId) -> IrResult<NodeId> {
        self.add_with_inputs(
            NodeKind::NewObjectArray { element },
            &[(schema::NEW_ARRAY_LENGTH, length)],
        )
    }

    /// Create a field read.
    pub fn load_field(&mut self, field: FieldDescriptor, object: NodeId) -> IrResult<NodeId> {
        self.expect_kind(object, Kind::Object)?;
        self.add_with_inputs(
            NodeKind::LoadField { field },
            &[(schema::ACCESS_FIELD_OBJECT, object)],
        )
    }

    /// Create a field write.
    pub fn store_field(
        &mut self,
        field: FieldDescriptor,
        object: NodeId,
        value: NodeId,
    ) -> IrResult<NodeId> {
        self.expect_kind(object, Kind::Object)?;
        self.add_with_inputs(
            NodeKind::StoreField { field },
            &[
                (schema::ACCESS_FIELD_OBJECT, object),
                (schema::STORE_FIELD_VALUE, value),
            ],
        )
    }

    /// Create an array element read.
    pub fn load_indexed(&mut self, element: Kind, array: NodeId, index: NodeId) -> IrResult<NodeId> {
        self.expect_kind(array, Kind::Object)?;
        self.add_with_inputs(
            NodeKind::LoadIndexed { element },
            &[
                (schema::ACCESS_INDEXED_ARRAY, array),
                (schema::ACCESS_INDEXED_INDEX, index),
            ],
        )
    }

    /// Create an array element write.
    pub fn store_indexed(
        &mut self,
        element: Kind,
        array: NodeId,
        index: NodeId,
        value: NodeId,
    ) -> IrResult<NodeId> {
        self.expect_kind(array, Kind::Object)?;
        self.add_with_inputs(
            NodeKind::StoreIndexed { element },
            &[
                (schema::ACCESS_INDEXED_ARRAY, array),
                (schema::ACCESS_INDEXED_INDEX, index),
                (schema::STORE_INDEXED_VALUE, value),
            ],
        )
    }

    /// Create an array length query.
    pub fn array_length(&mut self, array: NodeId) -> IrResult<NodeId> {
        self.expect_kind(array, Kind::Object)?;
        self.add_with_inputs(NodeKind::ArrayLength, &[(schema::ARRAY_LENGTH_ARRAY, array)])
    }

    /// Create a return, optionally carrying a value.
    pub fn return_value(&mut self, result: Option<NodeId>) -> IrResult<NodeId> {
        match result {
            Some(value) => self.add_with_inputs(NodeKind::Return, &[(schema::RETURN_RESULT, value)]),
            None => self.add(NodeKind::Return),
        }
    }

    /// Create a virtual object for the given type and fields.
    pub fn virtual_object(&mut self, ty: TypeRef, fields: FieldList) -> IrResult<NodeId> {
        self.add(NodeKind::VirtualObject(VirtualObject::new(ty, fields)))
    }

    // =========================================================================
    // Edge Slots
    // =========================================================================

    /// Read an input slot.
    pub fn input(&self, id: NodeId, index: usize) -> IrResult<Option<NodeId>> {
        self.node(id)?.input(index)
    }

    /// Read a successor slot.
    pub fn successor(&self, id: NodeId, index: usize) -> IrResult<Option<NodeId>> {
        self.node(id)?.successor(index)
    }

    /// Write an input slot and keep usage lists in step.
    ///
    /// The new input must belong to this graph and produce a value. Returns
    /// the value written.
    pub fn set_input(
        &mut self,
        id: NodeId,
        index: usize,
        value: Option<NodeId>,
    ) -> IrResult<Option<NodeId>> {
        self.ensure_building()?;
        self.node(id)?.input(index)?;
        if let Some(value) = value {
            let target = self.edge_target(id, value)?;
            if !target.is_value() {
                return Err(IrError::NotAValue {
                    node: value,
                    kind: target.name(),
                });
            }
            if let Some(declared) = self.node(id)?.kind().stored_kind(index) {
                self.expect_value_kind(value, declared)?;
            }
        }

        let old = self.node_mut(id)?.replace_input(index, value)?;
        if let Some(old) = old {
            self.remove_usage(old, id);
        }
        if let Some(value) = value {
            self.add_usage(value, id);
        }
        trace!(node = %id, index, input = ?value, "set input");
        Ok(value)
    }

    /// Write a successor slot and keep predecessor links in step.
    ///
    /// The target must be a fixed instruction or a return, and may have only
    /// one predecessor. Returns the value written.
    pub fn set_successor(
        &mut self,
        id: NodeId,
        index: usize,
        value: Option<NodeId>,
    ) -> IrResult<Option<NodeId>> {
        self.ensure_building()?;
        self.node(id)?.successor(index)?;
        if let Some(value) = value {
            let target = self.edge_target(id, value)?;
            let linkable = match target.kind() {
                NodeKind::Start => false,
                NodeKind::Return => true,
                kind => kind.is_fixed(),
            };
            if !linkable {
                return Err(IrError::WrongKind {
                    node: value,
                    expected: schema::INSTRUCTION.name,
                    actual: target.name(),
                });
            }
            if let Some(pred) = self.predecessor(value)? {
                if pred != id {
                    return Err(IrError::AlreadyLinked {
                        node: value,
                        predecessor: pred,
                    });
                }
            }
        }

        let old = self.node_mut(id)?.replace_successor(index, value)?;
        if let Some(old) = old {
            *self.predecessors.entry(old.slot()) = None;
        }
        if let Some(value) = value {
            *self.predecessors.entry(value.slot()) = Some(id);
        }
        trace!(node = %id, index, successor = ?value, "set successor");
        Ok(value)
    }

    /// Read the input slot named `role`.
    pub fn input_by_role(&self, id: NodeId, role: InputRole) -> IrResult<Option<NodeId>> {
        self.node(id)?.input_by_role(role)
    }

    /// Write the input slot named `role`.
    pub fn set_input_by_role(
        &mut self,
        id: NodeId,
        role: InputRole,
        value: Option<NodeId>,
    ) -> IrResult<Option<NodeId>> {
        let index = self.node(id)?.input_position(role)?;
        self.set_input(id, index, value)
    }

    /// Read the successor slot named `role`.
    pub fn successor_by_role(&self, id: NodeId, role: SuccessorRole) -> IrResult<Option<NodeId>> {
        let node = self.node(id)?;
        node.successor(node.successor_position(role)?)
    }

    /// Write the successor slot named `role`.
    pub fn set_successor_by_role(
        &mut self,
        id: NodeId,
        role: SuccessorRole,
        value: Option<NodeId>,
    ) -> IrResult<Option<NodeId>> {
        let index = self.node(id)?.successor_position(role)?;
        self.set_successor(id, index, value)
    }

    // =========================================================================
    // Named Accessors
    // =========================================================================

    /// Length input of an array allocation; `None` while under construction.
    pub fn length(&self, id: NodeId) -> IrResult<Option<NodeId>> {
        self.expect_new_array(id)?.input(schema::NEW_ARRAY_LENGTH)
    }

    /// Replace the length input of an array allocation.
    ///
    /// Returns `length` for chaining.
    pub fn set_length(&mut self, id: NodeId, length: NodeId) -> IrResult<NodeId> {
        self.expect_new_array(id)?;
        self.set_input(id, schema::NEW_ARRAY_LENGTH, Some(length))?;
        Ok(length)
    }

    /// Length input of an array allocation, which must be set.
    pub fn require_length(&self, id: NodeId) -> IrResult<NodeId> {
        self.expect_new_array(id)?;
        self.require_input(id, InputRole::Length)
    }

    /// Input slot named `role`, which must be set.
    pub fn require_input(&self, id: NodeId, role: InputRole) -> IrResult<NodeId> {
        let node = self.node(id)?;
        node.input_by_role(role)?
            .ok_or(IrError::NullRequiredInput {
                node: id,
                kind: node.name(),
                role: role.name(),
            })
    }

    /// Next fixed instruction after `id`.
    pub fn next(&self, id: NodeId) -> IrResult<Option<NodeId>> {
        self.successor_by_role(id, SuccessorRole::Next)
    }

    /// Link `next` after `id`. Returns `next` for chaining.
    pub fn set_next(&mut self, id: NodeId, next: NodeId) -> IrResult<NodeId> {
        self.set_successor_by_role(id, SuccessorRole::Next, Some(next))?;
        Ok(next)
    }

    /// Payload of a virtual object node.
    pub fn virtual_object_of(&self, id: NodeId) -> IrResult<&VirtualObject> {
        let node = self.node(id)?;
        node.as_virtual_object().ok_or(IrError::WrongKind {
            node: id,
            expected: schema::VIRTUAL_OBJECT.name,
            actual: node.name(),
        })
    }

    fn expect_new_array(&self, id: NodeId) -> IrResult<&Node> {
        let node = self.node(id)?;
        if !node.kind().is_new_array() {
            return Err(IrError::WrongKind {
                node: id,
                expected: schema::NEW_ARRAY.name,
                actual: node.name(),
            });
        }
        Ok(node)
    }

    fn expect_kind(&self, id: NodeId, expected: Kind) -> IrResult<()> {
        // Foreign ids are reported as cross-graph by the edge write itself.
        if id.graph() != self.id {
            return Ok(());
        }
        let actual = self.node(id)?.result_kind();
        if actual != expected {
            return Err(IrError::KindMismatch {
                node: id,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check a stored value against the declared field or element kind,
    /// comparing both after sub-int widening.
    fn expect_value_kind(&self, value: NodeId, declared: Kind) -> IrResult<()> {
        if value.graph() != self.id {
            return Ok(());
        }
        let expected = declared.stack_kind();
        let actual = self.node(value)?.result_kind().stack_kind();
        if actual != expected {
            return Err(IrError::KindMismatch {
                node: value,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Resolve the target of an edge written on `from`.
    fn edge_target(&self, from: NodeId, to: NodeId) -> IrResult<&Node> {
        if to.graph() != self.id {
            return Err(IrError::CrossGraph {
                from,
                to,
                owner: self.id,
            });
        }
        self.node(to)
    }

    // =========================================================================
    // Use-Def Chains
    // =========================================================================

    /// Nodes that consume `id`, one entry per input edge.
    pub fn usages(&self, id: NodeId) -> IrResult<&[NodeId]> {
        self.node(id)?;
        Ok(self.usages.get(id.slot()).map_or(&[], |u| u.as_slice()))
    }

    /// Number of input edges pointing at `id`.
    pub fn use_count(&self, id: NodeId) -> usize {
        self.usages(id).map_or(0, <[NodeId]>::len)
    }

    /// Node whose successor slot points at `id`.
    pub fn predecessor(&self, id: NodeId) -> IrResult<Option<NodeId>> {
        self.node(id)?;
        Ok(self.predecessors.get(id.slot()).copied().flatten())
    }

    fn add_usage(&mut self, def: NodeId, user: NodeId) {
        self.usages.entry(def.slot()).push(user);
    }

    fn remove_usage(&mut self, def: NodeId, user: NodeId) {
        let list = self.usages.entry(def.slot());
        if let Some(pos) = list.iter().position(|&u| u == user) {
            list.swap_remove(pos);
        }
    }

    // =========================================================================
    // Node Modification
    // =========================================================================

    /// Redirect every input edge pointing at `old` to `new`.
    ///
    /// Returns the number of edges rewritten.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) -> IrResult<usize> {
        self.ensure_building()?;
        self.node(old)?;
        let target = self.edge_target(old, new)?;
        if !target.is_value() {
            return Err(IrError::NotAValue {
                node: new,
                kind: target.name(),
            });
        }
        if old == new {
            return Ok(0);
        }

        let users = std::mem::take(self.usages.entry(old.slot()));
        let mut rewritten = 0;
        for user in users {
            let node = self.node_mut(user)?;
            let Some(index) = node.inputs().iter().position(|s| *s == Some(old)) else {
                continue;
            };
            node.replace_input(index, Some(new))?;
            self.add_usage(new, user);
            rewritten += 1;
        }
        trace!(old = %old, new = %new, rewritten, "replaced usages");
        Ok(rewritten)
    }

    /// Unset every input of `id`.
    pub fn clear_inputs(&mut self, id: NodeId) -> IrResult<()> {
        let count = self.node(id)?.input_count();
        for index in 0..count {
            self.set_input(id, index, None)?;
        }
        Ok(())
    }

    /// Remove a node nothing refers to any more.
    ///
    /// The node's own outgoing edges are dropped with it.
    pub fn remove(&mut self, id: NodeId) -> IrResult<Node> {
        self.ensure_building()?;
        let node = self.node(id)?;
        if id == self.start {
            return Err(IrError::WrongKind {
                node: id,
                expected: "removable node",
                actual: node.name(),
            });
        }
        let count = self.use_count(id) + usize::from(self.predecessor(id)?.is_some());
        if count > 0 {
            return Err(IrError::HasUsages { node: id, count });
        }

        let inputs: SmallVec<[NodeId; 4]> = node.input_ids().collect();
        let successors: SmallVec<[NodeId; 1]> = node.successor_ids().collect();
        for input in inputs {
            self.remove_usage(input, id);
        }
        for successor in successors {
            *self.predecessors.entry(successor.slot()) = None;
        }
        self.usages.reset(id.slot());
        self.predecessors.reset(id.slot());

        let removed = self.nodes.remove(id.slot()).ok_or(IrError::UnknownNode(id))?;
        trace!(node = %id, kind = removed.name(), "removed node");
        Ok(removed)
    }

    /// Unlink a fixed instruction from the control chain and remove it.
    ///
    /// Its predecessor is relinked to its successor.
    pub fn remove_fixed(&mut self, id: NodeId) -> IrResult<Node> {
        self.ensure_building()?;
        let next = self.next(id)?;
        let pred = self.predecessor(id)?;

        if next.is_some() {
            self.set_successor_by_role(id, SuccessorRole::Next, None)?;
        }
        if let Some(pred) = pred {
            let index = self
                .node(pred)?
                .successors()
                .iter()
                .position(|s| *s == Some(id))
                .ok_or(IrError::UnknownNode(id))?;
            self.set_successor(pred, index, next)?;
        }
        self.remove(id)
    }

    /// Mark a node with additional flags.
    pub(crate) fn add_flags(&mut self, id: NodeId, flags: NodeFlags) -> IrResult<()> {
        self.node_mut(id)?.flags |= flags;
        Ok(())
    }

    /// Freeze the graph.
    ///
    /// Runs [`verify`](Self::verify) first when the graph's configuration
    /// asks for it.
    pub fn finalize(&mut self) -> IrResult<()> {
        self.ensure_building()?;
        if self.config.verify_on_finalize {
            self.verify()?;
        }
        self.state = GraphState::Finalized;
        debug!(graph = %self.id, name = %self.name, nodes = self.len(), "finalized graph");
        Ok(())
    }

    pub(crate) fn ensure_building(&self) -> IrResult<()> {
        match self.state {
            GraphState::Building => Ok(()),
            GraphState::Finalized => Err(IrError::GraphFinalized(self.id)),
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterate over all live nodes with their IDs.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        let graph = self.id;
        self.nodes
            .iter()
            .map(move |(slot, node)| (NodeId::new(graph, slot), node))
    }

    /// Iterate over all live node IDs.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// The control chain from start, following `next`.
    pub fn fixed_chain(&self) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut visited = BitSet::with_capacity(self.nodes.capacity_used());
        let mut current = Some(self.start);
        while let Some(id) = current {
            if !visited.insert(id.slot().as_usize()) {
                break;
            }
            chain.push(id);
            current = self.next(id).ok().flatten();
        }
        chain
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check structural consistency.
    ///
    /// Every edge must point at a live node of this graph, usage lists must
    /// mirror input edges, and predecessor links must mirror successor edges.
    pub fn verify(&self) -> IrResult<()> {
        for (id, node) in self.iter() {
            for &target in node.inputs().iter().chain(node.successors()).flatten() {
                if target.graph() != self.id {
                    return Err(IrError::CrossGraph {
                        from: id,
                        to: target,
                        owner: self.id,
                    });
                }
                if !self.contains(target) {
                    return Err(IrError::UnknownNode(target));
                }
            }

            for input in node.input_ids() {
                let edges = node.input_ids().filter(|&i| i == input).count();
                let recorded = self.usages(input)?.iter().filter(|&&u| u == id).count();
                if edges != recorded {
                    return Err(IrError::InconsistentEdges { node: input, user: id });
                }
            }

            for successor in node.successor_ids() {
                if self.predecessor(successor)? != Some(id) {
                    return Err(IrError::InconsistentEdges {
                        node: successor,
                        user: id,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph {} ({} nodes):", self.id, self.nodes.len())?;
        for (id, node) in self.iter() {
            writeln!(f, "  {:?}: {:?}", id, node)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
