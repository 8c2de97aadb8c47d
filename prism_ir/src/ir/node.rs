//! IR node definitions.
//!
//! A node is one vertex of the graph: a [`NodeKind`] saying what it computes,
//! a result [`Kind`], and two fixed-size edge arrays.
//!
//! - **Inputs**: data dependencies ("is consumed by" edges), each optional.
//! - **Successors**: control edges to the next fixed instruction.
//!
//! Both arrays are sized once, from the kind's [`Layer`] chain, and never
//! grow or shrink. Edges carry no ownership; nodes are owned by their graph
//! and referenced by [`NodeId`], which also records the owning graph so an
//! edge into a different graph is caught when it is written.

use super::arena::Id;
use super::schema::{self, InputRole, Layer, SuccessorRole};
use super::types::{Constant, FieldDescriptor, FieldList, Kind, TypeRef};
use crate::error::{EdgeKind, IrError, IrResult};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// =============================================================================
// Identities
// =============================================================================

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u32);

impl GraphId {
    /// Allocate a fresh graph identity.
    pub(crate) fn fresh() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Unique identifier for a node: the owning graph plus its arena slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    graph: GraphId,
    slot: Id<Node>,
}

impl NodeId {
    #[inline]
    pub(crate) const fn new(graph: GraphId, slot: Id<Node>) -> Self {
        NodeId { graph, slot }
    }

    /// Graph that owns this node.
    #[inline]
    pub const fn graph(self) -> GraphId {
        self.graph
    }

    /// Arena slot within the owning graph.
    #[inline]
    pub const fn slot(self) -> Id<Node> {
        self.slot
    }

    /// Slot index, stable for the lifetime of the graph.
    #[inline]
    pub const fn index(self) -> u32 {
        self.slot.index()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.graph, self.slot)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Virtual Object
// =============================================================================

/// Payload of a virtual object node.
///
/// Stands for an allocation escape analysis removed. The type and field list
/// are shared by reference with the allocation's host type and with every
/// copy of the node; they are never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualObject {
    ty: TypeRef,
    fields: FieldList,
}

impl VirtualObject {
    /// Create a virtual object payload.
    pub fn new(ty: TypeRef, fields: FieldList) -> Self {
        Self { ty, fields }
    }

    /// Declared type of the modelled object.
    #[inline]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Field descriptors, in tracking order.
    #[inline]
    pub fn fields(&self) -> &FieldList {
        &self.fields
    }

    /// Check whether two payloads share the same field list allocation.
    pub fn shares_fields_with(&self, other: &VirtualObject) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

// =============================================================================
// Node Kind
// =============================================================================

/// The closed set of node kinds.
///
/// Every pass matches on this exhaustively, so adding a kind is a compile
/// error everywhere it has to be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Control entry.
    Start,
    /// Method exit, optionally returning a value.
    Return,
    /// Literal value.
    Constant(Constant),
    /// Incoming argument.
    Parameter { index: u16, kind: Kind },
    /// Allocation of an instance.
    NewInstance { ty: TypeRef },
    /// Allocation of a primitive array.
    NewTypeArray { element: Kind },
    /// Allocation of a reference array.
    NewObjectArray { element: TypeRef },
    /// Read of an instance field.
    LoadField { field: FieldDescriptor },
    /// Write of an instance field.
    StoreField { field: FieldDescriptor },
    /// Read of an array element.
    LoadIndexed { element: Kind },
    /// Write of an array element.
    StoreIndexed { element: Kind },
    /// Length of an array.
    ArrayLength,
    /// Scalar-replaced allocation.
    VirtualObject(VirtualObject),
}

impl NodeKind {
    /// The schema layer describing this kind's slots.
    pub fn layer(&self) -> &'static Layer {
        match self {
            NodeKind::Start => &schema::START,
            NodeKind::Return => &schema::RETURN,
            NodeKind::Constant(_) => &schema::CONSTANT,
            NodeKind::Parameter { .. } => &schema::PARAMETER,
            NodeKind::NewInstance { .. } => &schema::NEW_INSTANCE,
            NodeKind::NewTypeArray { .. } => &schema::NEW_TYPE_ARRAY,
            NodeKind::NewObjectArray { .. } => &schema::NEW_OBJECT_ARRAY,
            NodeKind::LoadField { .. } => &schema::LOAD_FIELD,
            NodeKind::StoreField { .. } => &schema::STORE_FIELD,
            NodeKind::LoadIndexed { .. } => &schema::LOAD_INDEXED,
            NodeKind::StoreIndexed { .. } => &schema::STORE_INDEXED,
            NodeKind::ArrayLength => &schema::ARRAY_LENGTH,
            NodeKind::VirtualObject(_) => &schema::VIRTUAL_OBJECT,
        }
    }

    /// Kind name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.layer().name
    }

    /// Result kind a node of this kind produces.
    pub fn result_kind(&self) -> Kind {
        match self {
            NodeKind::Start | NodeKind::Return => Kind::Void,
            NodeKind::StoreField { .. } | NodeKind::StoreIndexed { .. } => Kind::Void,
            NodeKind::Constant(c) => c.kind(),
            NodeKind::Parameter { kind, .. } => *kind,
            NodeKind::NewInstance { .. }
            | NodeKind::NewTypeArray { .. }
            | NodeKind::NewObjectArray { .. }
            | NodeKind::VirtualObject(_) => Kind::Object,
            NodeKind::LoadField { field } => field.kind,
            NodeKind::LoadIndexed { element } => *element,
            NodeKind::ArrayLength => Kind::Int,
        }
    }

    /// Check if this kind is one of the array allocations.
    #[inline]
    pub const fn is_new_array(&self) -> bool {
        matches!(
            self,
            NodeKind::NewTypeArray { .. } | NodeKind::NewObjectArray { .. }
        )
    }

    /// Check if this kind allocates heap memory.
    #[inline]
    pub const fn is_allocation(&self) -> bool {
        matches!(self, NodeKind::NewInstance { .. }) || self.is_new_array()
    }

    /// Declared kind of the value written through input `index`, if that
    /// slot is the value of a store.
    pub fn stored_kind(&self, index: usize) -> Option<Kind> {
        match self {
            NodeKind::StoreField { field } if index == schema::STORE_FIELD_VALUE => {
                Some(field.kind)
            }
            NodeKind::StoreIndexed { element } if index == schema::STORE_INDEXED_VALUE => {
                Some(*element)
            }
            _ => None,
        }
    }

    /// Check if nodes of this kind sit on the `next` control chain.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.layer().successor_position(SuccessorRole::Next).is_some()
    }
}

// =============================================================================
// Node Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for node properties.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Node was produced by cloning from another graph.
        const CLONED = 0b0000_0001;
        /// Constant materialised for a field escape analysis never saw written.
        const FIELD_DEFAULT = 0b0000_0010;
    }
}

// =============================================================================
// Node
// =============================================================================

/// A node in the IR graph.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    result: Kind,
    inputs: Box<[Option<NodeId>]>,
    successors: Box<[Option<NodeId>]>,
    /// Flags for node properties.
    pub flags: NodeFlags,
}

impl Node {
    /// Create a node with every slot unset, sized from the kind's schema.
    pub fn new(kind: NodeKind) -> Self {
        let layer = kind.layer();
        Node {
            result: kind.result_kind(),
            inputs: vec![None; layer.input_count()].into_boxed_slice(),
            successors: vec![None; layer.successor_count()].into_boxed_slice(),
            kind,
            flags: NodeFlags::empty(),
        }
    }

    /// What this node computes.
    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Result kind, fixed at construction.
    #[inline]
    pub fn result_kind(&self) -> Kind {
        self.result
    }

    /// Check if this node produces a value.
    #[inline]
    pub fn is_value(&self) -> bool {
        self.result.is_value()
    }

    /// Kind name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// All input slots.
    #[inline]
    pub fn inputs(&self) -> &[Option<NodeId>] {
        &self.inputs
    }

    /// All successor slots.
    #[inline]
    pub fn successors(&self) -> &[Option<NodeId>] {
        &self.successors
    }

    /// Number of input slots.
    #[inline]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of successor slots.
    #[inline]
    pub fn successor_count(&self) -> usize {
        self.successors.len()
    }

    /// Read the input slot at `index`.
    pub fn input(&self, index: usize) -> IrResult<Option<NodeId>> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| self.arity_error(EdgeKind::Input, index))
    }

    /// Read the successor slot at `index`.
    pub fn successor(&self, index: usize) -> IrResult<Option<NodeId>> {
        self.successors
            .get(index)
            .copied()
            .ok_or_else(|| self.arity_error(EdgeKind::Successor, index))
    }

    /// Position of the input slot named `role`.
    pub fn input_position(&self, role: InputRole) -> IrResult<usize> {
        self.kind
            .layer()
            .input_position(role)
            .ok_or(IrError::MissingSlot {
                kind: self.name(),
                edge: EdgeKind::Input,
                role: role.name(),
            })
    }

    /// Position of the successor slot named `role`.
    pub fn successor_position(&self, role: SuccessorRole) -> IrResult<usize> {
        self.kind
            .layer()
            .successor_position(role)
            .ok_or(IrError::MissingSlot {
                kind: self.name(),
                edge: EdgeKind::Successor,
                role: role.name(),
            })
    }

    /// Read the input slot named `role`.
    pub fn input_by_role(&self, role: InputRole) -> IrResult<Option<NodeId>> {
        self.input(self.input_position(role)?)
    }

    /// Iterate over set inputs.
    pub fn input_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().flatten().copied()
    }

    /// Iterate over set successors.
    pub fn successor_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.successors.iter().flatten().copied()
    }

    /// Overwrite an input slot, returning the previous edge.
    pub(crate) fn replace_input(
        &mut self,
        index: usize,
        value: Option<NodeId>,
    ) -> IrResult<Option<NodeId>> {
        let error = self.arity_error(EdgeKind::Input, index);
        let slot = self.inputs.get_mut(index).ok_or(error)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Overwrite a successor slot, returning the previous edge.
    pub(crate) fn replace_successor(
        &mut self,
        index: usize,
        value: Option<NodeId>,
    ) -> IrResult<Option<NodeId>> {
        let error = self.arity_error(EdgeKind::Successor, index);
        let slot = self.successors.get_mut(index).ok_or(error)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Payload if this node is a virtual object.
    pub fn as_virtual_object(&self) -> Option<&VirtualObject> {
        match &self.kind {
            NodeKind::VirtualObject(vobj) => Some(vobj),
            _ => None,
        }
    }

    /// Literal if this node is a constant.
    pub fn as_constant(&self) -> Option<Constant> {
        match self.kind {
            NodeKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    fn arity_error(&self, edge: EdgeKind, index: usize) -> IrError {
        IrError::Arity {
            kind: self.name(),
            edge,
            index,
            arity: match edge {
                EdgeKind::Input => self.inputs.len(),
                EdgeKind::Successor => self.successors.len(),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
