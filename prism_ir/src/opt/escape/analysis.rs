//! Allocation escape classification.
//!
//! Only straight-line code is modelled: the allocation and every use of it
//! must sit on the `next` chain from start, with the uses after the
//! allocation. Within that, an allocation can be scalar-replaced when each
//! use is a field or constant-index element access through it, or an array
//! length query. Storing the reference anywhere, returning it, or any use the
//! analysis does not understand makes it escape.

use super::plan::{AccessOp, PlannedAccess, VirtualizationPlan};
use crate::config::EscapeConfig;
use crate::error::IrResult;
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId, NodeKind};
use crate::ir::schema;
use crate::ir::types::{Constant, ElementType, FieldDescriptor, FieldList, HostType, Kind, TypeRef};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Escape State
// =============================================================================

/// The escape state of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EscapeState {
    /// Object does not escape the compilation unit.
    #[default]
    NoEscape,
    /// Object is observable outside the compilation unit.
    GlobalEscape,
}

impl EscapeState {
    /// Merge two escape states (takes the more conservative one).
    #[inline]
    pub fn merge(self, other: EscapeState) -> EscapeState {
        std::cmp::max(self, other)
    }
}

// =============================================================================
// Rejections
// =============================================================================

/// Why an allocation stays materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Allocation is not reachable along `next` from start.
    NotOnControlChain,
    /// Instance has more fields than the configured limit.
    TooManyFields { count: usize, limit: usize },
    /// Field kind with no zero value to start from.
    UnsupportedFieldKind(Kind),
    /// Array length is not a constant.
    NonConstantLength,
    /// Array length constant is negative.
    NegativeLength(i64),
    /// Array longer than the configured limit.
    ArrayTooLong { length: i64, limit: u32 },
    /// A use is not on the control chain.
    UsedOffChain { user: NodeId },
    /// A use precedes the allocation in control order.
    UsedBeforeAllocation { user: NodeId },
    /// Field access with an offset the type does not declare.
    UnknownField { user: NodeId, offset: u32 },
    /// Access whose declared kind differs from the slot it resolves to.
    AccessKindMismatch {
        user: NodeId,
        declared: Kind,
        accessed: Kind,
    },
    /// Element access whose index is not a constant.
    NonConstantIndex { user: NodeId },
    /// Constant element index outside the array.
    IndexOutOfRange { user: NodeId, index: i64, length: usize },
    /// Reference written into memory.
    StoredAsValue { user: NodeId },
    /// Reference returned to the caller.
    Returned { user: NodeId },
    /// Any other use.
    UnsupportedUse { user: NodeId, kind: &'static str },
}

impl Rejection {
    /// Escape state implied by this rejection alone.
    ///
    /// Shape rejections imply nothing; the allocation's users decide.
    pub fn escape_state(&self) -> EscapeState {
        match self {
            Rejection::StoredAsValue { .. }
            | Rejection::Returned { .. }
            | Rejection::UnsupportedUse { .. }
            | Rejection::UsedOffChain { .. } => EscapeState::GlobalEscape,
            _ => EscapeState::NoEscape,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotOnControlChain => write!(f, "allocation is not on the control chain"),
            Rejection::TooManyFields { count, limit } => {
                write!(f, "{} fields exceed the limit of {}", count, limit)
            }
            Rejection::UnsupportedFieldKind(kind) => write!(f, "cannot track {} fields", kind),
            Rejection::NonConstantLength => write!(f, "array length is not constant"),
            Rejection::NegativeLength(len) => write!(f, "negative array length {}", len),
            Rejection::ArrayTooLong { length, limit } => {
                write!(f, "array length {} exceeds the limit of {}", length, limit)
            }
            Rejection::UsedOffChain { user } => write!(f, "{} is not on the control chain", user),
            Rejection::UsedBeforeAllocation { user } => {
                write!(f, "{} runs before the allocation", user)
            }
            Rejection::UnknownField { user, offset } => {
                write!(f, "{} accesses unknown field offset {}", user, offset)
            }
            Rejection::AccessKindMismatch {
                user,
                declared,
                accessed,
            } => write!(f, "{} accesses a {} slot as {}", user, declared, accessed),
            Rejection::NonConstantIndex { user } => write!(f, "{} has a non-constant index", user),
            Rejection::IndexOutOfRange {
                user,
                index,
                length,
            } => write!(f, "{} index {} outside length {}", user, index, length),
            Rejection::StoredAsValue { user } => write!(f, "stored to memory by {}", user),
            Rejection::Returned { user } => write!(f, "returned by {}", user),
            Rejection::UnsupportedUse { user, kind } => write!(f, "used by {} ({})", user, kind),
        }
    }
}

// =============================================================================
// Allocation Info
// =============================================================================

/// Information about an allocation site.
#[derive(Debug, Clone)]
pub struct AllocationInfo {
    /// Node ID of the allocation.
    pub node: NodeId,
    /// Computed escape state, from the users whether or not the allocation
    /// can be replaced.
    pub escape_state: EscapeState,
    /// Why the allocation cannot be scalar-replaced, if it cannot.
    pub rejection: Option<Rejection>,
}

impl AllocationInfo {
    /// Check if the allocation can be scalar-replaced.
    #[inline]
    pub fn can_scalar_replace(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Shape of the object an allocation creates.
struct Shape {
    ty: TypeRef,
    fields: FieldList,
    length: Option<NodeId>,
}

// =============================================================================
// Escape Analysis
// =============================================================================

/// Escape analysis result.
#[derive(Debug, Default)]
pub struct EscapeAnalysis {
    /// Detailed info per allocation, in id order.
    allocations: Vec<AllocationInfo>,
    /// Plans for every scalar-replaceable allocation.
    plans: Vec<VirtualizationPlan>,
}

impl EscapeAnalysis {
    /// Analyze every allocation in `graph`. Does not mutate.
    ///
    /// Fails only on malformed IR, such as an array allocation with no
    /// length input.
    pub fn compute(graph: &Graph, config: &EscapeConfig) -> IrResult<Self> {
        let mut analysis = Self::default();

        let positions: FxHashMap<NodeId, usize> = graph
            .fixed_chain()
            .into_iter()
            .enumerate()
            .map(|(pos, id)| (id, pos))
            .collect();

        let alloc_sites: Vec<NodeId> = graph
            .iter()
            .filter(|(_, node)| node.kind().is_allocation())
            .map(|(id, _)| id)
            .collect();

        for alloc in alloc_sites {
            let state = Self::escape_state_of(graph, alloc)?;
            match Self::plan_allocation(graph, config, &positions, alloc)? {
                Ok(plan) => {
                    debug!(
                        allocation = %alloc,
                        fields = plan.field_count(),
                        accesses = plan.accesses.len(),
                        "allocation can be virtualized"
                    );
                    analysis.allocations.push(AllocationInfo {
                        node: alloc,
                        escape_state: state,
                        rejection: None,
                    });
                    analysis.plans.push(plan);
                }
                Err(rejection) => {
                    debug!(
                        allocation = %alloc,
                        state = ?state,
                        reason = %rejection,
                        "allocation stays materialized"
                    );
                    analysis.allocations.push(AllocationInfo {
                        node: alloc,
                        escape_state: state.merge(rejection.escape_state()),
                        rejection: Some(rejection),
                    });
                }
            }
        }

        Ok(analysis)
    }

    /// Escape state from what the users do with the reference.
    ///
    /// Field and element accesses through the reference and length queries
    /// keep it local. Returning it, storing it as a value, or any other use
    /// lets it escape.
    fn escape_state_of(graph: &Graph, alloc: NodeId) -> IrResult<EscapeState> {
        let mut state = EscapeState::NoEscape;
        for &user in graph.usages(alloc)? {
            let node = graph.node(user)?;
            let through = match node.kind() {
                NodeKind::LoadField { .. } => {
                    node.input(schema::ACCESS_FIELD_OBJECT)? == Some(alloc)
                }
                NodeKind::StoreField { .. } => {
                    node.input(schema::ACCESS_FIELD_OBJECT)? == Some(alloc)
                        && node.input(schema::STORE_FIELD_VALUE)? != Some(alloc)
                }
                NodeKind::LoadIndexed { .. } => {
                    node.input(schema::ACCESS_INDEXED_ARRAY)? == Some(alloc)
                        && node.input(schema::ACCESS_INDEXED_INDEX)? != Some(alloc)
                }
                NodeKind::StoreIndexed { .. } => {
                    node.input(schema::ACCESS_INDEXED_ARRAY)? == Some(alloc)
                        && node.input(schema::ACCESS_INDEXED_INDEX)? != Some(alloc)
                        && node.input(schema::STORE_INDEXED_VALUE)? != Some(alloc)
                }
                NodeKind::ArrayLength => true,
                _ => false,
            };
            if !through {
                state = EscapeState::GlobalEscape;
                break;
            }
        }
        Ok(state)
    }

    /// Build the plan for one allocation, or say why there is none.
    fn plan_allocation(
        graph: &Graph,
        config: &EscapeConfig,
        positions: &FxHashMap<NodeId, usize>,
        alloc: NodeId,
    ) -> IrResult<Result<VirtualizationPlan, Rejection>> {
        let Some(&alloc_pos) = positions.get(&alloc) else {
            return Ok(Err(Rejection::NotOnControlChain));
        };

        let node = graph.node(alloc)?;
        let shape = match node.kind() {
            NodeKind::NewInstance { ty } => {
                let count = ty.fields().len();
                if count > config.max_fields {
                    return Ok(Err(Rejection::TooManyFields {
                        count,
                        limit: config.max_fields,
                    }));
                }
                Shape {
                    ty: ty.clone(),
                    fields: ty.fields().clone(),
                    length: None,
                }
            }
            NodeKind::NewTypeArray { element } => {
                match Self::array_shape(graph, config, alloc, ElementType::Primitive(*element))? {
                    Ok(shape) => shape,
                    Err(rejection) => return Ok(Err(rejection)),
                }
            }
            NodeKind::NewObjectArray { element } => {
                let element = ElementType::Reference(element.clone());
                match Self::array_shape(graph, config, alloc, element)? {
                    Ok(shape) => shape,
                    Err(rejection) => return Ok(Err(rejection)),
                }
            }
            _ => {
                return Ok(Err(Rejection::UnsupportedUse {
                    user: alloc,
                    kind: node.name(),
                }))
            }
        };

        let mut defaults = Vec::with_capacity(shape.fields.len());
        for field in shape.fields.iter() {
            match field.kind.default_constant() {
                Some(value) => defaults.push(value),
                None => return Ok(Err(Rejection::UnsupportedFieldKind(field.kind))),
            }
        }

        let mut users: SmallVec<[NodeId; 8]> = graph.usages(alloc)?.iter().copied().collect();
        users.sort_unstable();
        users.dedup();

        let mut accesses = Vec::with_capacity(users.len());
        for user in users {
            let user_node = graph.node(user)?;
            if matches!(user_node.kind(), NodeKind::Return) {
                return Ok(Err(Rejection::Returned { user }));
            }
            let Some(&position) = positions.get(&user) else {
                return Ok(Err(Rejection::UsedOffChain { user }));
            };
            if position <= alloc_pos {
                return Ok(Err(Rejection::UsedBeforeAllocation { user }));
            }
            match Self::classify_use(graph, &shape, alloc, user, user_node)? {
                Ok(op) => accesses.push(PlannedAccess {
                    node: user,
                    position,
                    op,
                }),
                Err(rejection) => return Ok(Err(rejection)),
            }
        }
        accesses.sort_by_key(|access| access.position);

        Ok(Ok(VirtualizationPlan {
            allocation: alloc,
            ty: shape.ty,
            fields: shape.fields,
            defaults,
            length: shape.length,
            accesses,
        }))
    }

    /// Synthesize one tracked slot per element of a constant-length array.
    fn array_shape(
        graph: &Graph,
        config: &EscapeConfig,
        alloc: NodeId,
        element: ElementType,
    ) -> IrResult<Result<Shape, Rejection>> {
        let length = graph.require_length(alloc)?;
        let Some(value) = graph.node(length)?.as_constant().and_then(Constant::as_int) else {
            return Ok(Err(Rejection::NonConstantLength));
        };
        if value < 0 {
            return Ok(Err(Rejection::NegativeLength(value)));
        }
        if value > i64::from(config.max_array_length) {
            return Ok(Err(Rejection::ArrayTooLong {
                length: value,
                limit: config.max_array_length,
            }));
        }

        let kind = element.kind();
        let fields: Vec<FieldDescriptor> = (0..value as u32)
            .map(|i| FieldDescriptor::new(format!("[{}]", i), i, kind))
            .collect();
        Ok(Ok(Shape {
            ty: Arc::new(HostType::array(element)),
            fields: fields.into(),
            length: Some(length),
        }))
    }

    /// Decide what a single user does with the allocation.
    fn classify_use(
        graph: &Graph,
        shape: &Shape,
        alloc: NodeId,
        user: NodeId,
        node: &Node,
    ) -> IrResult<Result<AccessOp, Rejection>> {
        let is_array = shape.length.is_some();
        let unsupported = Rejection::UnsupportedUse {
            user,
            kind: node.name(),
        };

        let op = match node.kind() {
            NodeKind::LoadField { field } | NodeKind::StoreField { field } if !is_array => {
                if node.input(schema::ACCESS_FIELD_OBJECT)? != Some(alloc) {
                    return Ok(Err(Rejection::StoredAsValue { user }));
                }
                let Some(slot) = shape.fields.iter().position(|f| f.offset == field.offset) else {
                    return Ok(Err(Rejection::UnknownField {
                        user,
                        offset: field.offset,
                    }));
                };
                let declared = shape.fields[slot].kind;
                if field.kind != declared {
                    return Ok(Err(Rejection::AccessKindMismatch {
                        user,
                        declared,
                        accessed: field.kind,
                    }));
                }
                match node.kind() {
                    NodeKind::StoreField { .. } => AccessOp::Store { slot },
                    _ => AccessOp::Load { slot },
                }
            }
            NodeKind::LoadIndexed { element } | NodeKind::StoreIndexed { element } if is_array => {
                if node.input(schema::ACCESS_INDEXED_ARRAY)? != Some(alloc) {
                    return Ok(Err(Rejection::StoredAsValue { user }));
                }
                let Some(index) = node.input(schema::ACCESS_INDEXED_INDEX)? else {
                    return Ok(Err(Rejection::NonConstantIndex { user }));
                };
                let Some(index) = graph.node(index)?.as_constant().and_then(Constant::as_int) else {
                    return Ok(Err(Rejection::NonConstantIndex { user }));
                };
                let length = shape.fields.len();
                if index < 0 || index as usize >= length {
                    return Ok(Err(Rejection::IndexOutOfRange {
                        user,
                        index,
                        length,
                    }));
                }
                let slot = index as usize;
                let declared = shape.fields[slot].kind;
                if *element != declared {
                    return Ok(Err(Rejection::AccessKindMismatch {
                        user,
                        declared,
                        accessed: *element,
                    }));
                }
                match node.kind() {
                    NodeKind::StoreIndexed { .. } => AccessOp::Store { slot },
                    _ => AccessOp::Load { slot },
                }
            }
            NodeKind::ArrayLength if is_array => AccessOp::Length,
            _ => return Ok(Err(unsupported)),
        };

        // A store must not also write the reference itself.
        if matches!(op, AccessOp::Store { .. }) {
            let value_slot = match node.kind() {
                NodeKind::StoreField { .. } => schema::STORE_FIELD_VALUE,
                _ => schema::STORE_INDEXED_VALUE,
            };
            if node.input(value_slot)? == Some(alloc) {
                return Ok(Err(Rejection::StoredAsValue { user }));
            }
        }
        Ok(Ok(op))
    }

    // =========================================================================
    // Query API
    // =========================================================================

    /// Get escape state for an allocation.
    pub fn escape_state(&self, node: NodeId) -> Option<EscapeState> {
        self.info(node).map(|info| info.escape_state)
    }

    /// Get detailed info for an allocation.
    pub fn info(&self, node: NodeId) -> Option<&AllocationInfo> {
        self.allocations.iter().find(|info| info.node == node)
    }

    /// Check if an allocation can be scalar-replaced.
    pub fn can_scalar_replace(&self, node: NodeId) -> bool {
        self.info(node).is_some_and(AllocationInfo::can_scalar_replace)
    }

    /// Get detailed allocation info.
    pub fn allocations(&self) -> &[AllocationInfo] {
        &self.allocations
    }

    /// Plans for every scalar-replaceable allocation.
    pub fn plans(&self) -> &[VirtualizationPlan] {
        &self.plans
    }

    /// Consume the analysis, keeping only the plans.
    pub fn into_plans(self) -> Vec<VirtualizationPlan> {
        self.plans
    }

    /// Number of allocations that do not escape.
    pub fn non_escaping_count(&self) -> usize {
        self.allocations
            .iter()
            .filter(|info| info.escape_state == EscapeState::NoEscape)
            .count()
    }

    /// Number of allocations that escape.
    pub fn global_escaping_count(&self) -> usize {
        self.allocations.len() - self.non_escaping_count()
    }
}
