//! Escape Analysis and Scalar Replacement.
//!
//! Finds allocations that never leave the compilation unit and replaces them
//! with their fields. Each replaced allocation is represented by a
//! [`VirtualObject`](crate::ir::node::NodeKind::VirtualObject) anchor whose
//! field values live in a [`VirtualState`].
//!
//! # Phases
//!
//! 1. [`EscapeAnalysis::compute`] classifies every allocation and builds a
//!    [`VirtualizationPlan`] for the replaceable ones. The graph is not
//!    touched.
//! 2. [`commit`] applies each plan: loads and stores fold away, the
//!    allocation is removed, and an anchor is created.
//! 3. [`VirtualState::release`] removes the anchors once lowering is next.
//!
//! An allocation that fails any check in phase 1 is left exactly as it was.

mod analysis;
mod plan;
mod virtualize;

pub use analysis::{AllocationInfo, EscapeAnalysis, EscapeState, Rejection};
pub use plan::{AccessOp, PlannedAccess, VirtualizationPlan};
pub use virtualize::{commit, VirtualState};

use super::OptimizationPass;
use crate::config::{ConfigError, EscapeConfig};
use crate::error::IrResult;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use tracing::{debug, info_span};

// =============================================================================
// Summary
// =============================================================================

/// Outcome of one escape run over one graph.
#[derive(Debug, Default)]
pub struct EscapeSummary {
    /// Number of allocations examined.
    pub allocations: usize,
    /// Virtual objects created, in commit order.
    pub virtualized: Vec<NodeId>,
    /// Allocations left in place, with the reason.
    pub rejected: Vec<(NodeId, Rejection)>,
    /// Field values of the virtual objects.
    pub state: VirtualState,
}

impl EscapeSummary {
    /// True if any allocation was replaced.
    pub fn changed(&self) -> bool {
        !self.virtualized.is_empty()
    }

    /// Reason allocation `node` was left in place.
    pub fn rejection(&self, node: NodeId) -> Option<&Rejection> {
        self.rejected
            .iter()
            .find_map(|(id, reason)| (*id == node).then_some(reason))
    }
}

// =============================================================================
// Escape Pass
// =============================================================================

/// Escape analysis and scalar replacement pass.
#[derive(Debug, Default)]
pub struct Escape {
    config: EscapeConfig,
    /// Summary of the most recent run through [`OptimizationPass::run`].
    last: Option<EscapeSummary>,
}

impl Escape {
    /// Create a pass with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pass with explicit limits, validating them first.
    pub fn with_config(config: EscapeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Create a pass from limits the caller has already validated.
    pub(crate) fn from_validated(config: EscapeConfig) -> Self {
        Self { config, last: None }
    }

    /// Limits in use.
    pub fn config(&self) -> &EscapeConfig {
        &self.config
    }

    /// Analyze `graph` and commit every plan.
    ///
    /// Returns the summary, including the [`VirtualState`] the caller must
    /// eventually release.
    pub fn virtualize(&self, graph: &mut Graph) -> IrResult<EscapeSummary> {
        let _span = info_span!("escape", graph = %graph.id()).entered();
        let mut summary = EscapeSummary::default();
        if !self.config.enabled {
            debug!("escape analysis disabled");
            return Ok(summary);
        }

        let analysis = EscapeAnalysis::compute(graph, &self.config)?;
        summary.allocations = analysis.allocations().len();
        summary.rejected = analysis
            .allocations()
            .iter()
            .filter_map(|info| info.rejection.clone().map(|r| (info.node, r)))
            .collect();

        for plan in analysis.plans() {
            let vobj = commit(graph, plan, &mut summary.state)?;
            summary.virtualized.push(vobj);
        }

        debug!(
            allocations = summary.allocations,
            virtualized = summary.virtualized.len(),
            rejected = summary.rejected.len(),
            "escape analysis complete"
        );
        Ok(summary)
    }

    /// Summary of the last [`run`](OptimizationPass::run).
    pub fn last_summary(&self) -> Option<&EscapeSummary> {
        self.last.as_ref()
    }

    /// Take the summary of the last run, leaving none.
    pub fn take_summary(&mut self) -> Option<EscapeSummary> {
        self.last.take()
    }
}

impl OptimizationPass for Escape {
    fn name(&self) -> &'static str {
        "escape"
    }

    fn run(&mut self, graph: &mut Graph) -> IrResult<bool> {
        let summary = self.virtualize(graph)?;
        let changed = summary.changed();
        self.last = Some(summary);
        Ok(changed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IrError;
    use crate::ir::node::{NodeFlags, NodeKind};
    use crate::ir::schema;
    use crate::ir::types::{Constant, FieldDescriptor, HostType, Kind, TypeRef};
    use std::sync::Arc;

    fn point() -> TypeRef {
        Arc::new(HostType::instance(
            "Point",
            vec![
                FieldDescriptor::new("x", 12, Kind::Int),
                FieldDescriptor::new("y", 16, Kind::Int),
            ],
        ))
    }

    /// Link `nodes` after start in order.
    fn chain(g: &mut Graph, nodes: &[NodeId]) {
        let mut prev = g.start();
        for &node in nodes {
            prev = g.set_next(prev, node).unwrap();
        }
    }

    fn returned(g: &Graph, ret: NodeId) -> Option<NodeId> {
        g.input(ret, schema::RETURN_RESULT).unwrap()
    }

    #[test]
    fn test_escape_state_merge() {
        assert_eq!(EscapeState::NoEscape.merge(EscapeState::NoEscape), EscapeState::NoEscape);
        assert_eq!(
            EscapeState::NoEscape.merge(EscapeState::GlobalEscape),
            EscapeState::GlobalEscape
        );
    }

    #[test]
    fn test_store_then_load_folds() {
        let ty = point();
        let mut g = Graph::new();
        let five = g.int(5).unwrap();
        let obj = g.new_instance(ty.clone()).unwrap();
        let store = g.store_field(ty.fields()[0].clone(), obj, five).unwrap();
        let load = g.load_field(ty.fields()[0].clone(), obj).unwrap();
        let ret = g.return_value(Some(load)).unwrap();
        chain(&mut g, &[obj, store, load, ret]);

        let mut pass = Escape::new();
        assert_eq!(pass.run(&mut g), Ok(true));
        let summary = pass.take_summary().unwrap();

        assert_eq!(summary.virtualized.len(), 1);
        let vobj = summary.virtualized[0];
        assert_eq!(returned(&g, ret), Some(five));
        assert!(!g.contains(obj) && !g.contains(store) && !g.contains(load));
        assert_eq!(g.next(g.start()), Ok(Some(ret)));
        assert_eq!(summary.state.field_value(vobj, 0), Some(five));
        assert_eq!(summary.state.field_value(vobj, 1), None);

        let node = g.virtual_object_of(vobj).unwrap();
        assert!(Arc::ptr_eq(node.fields(), ty.fields()));

        assert!(matches!(
            g.verify_for_lowering(),
            Err(IrError::UnresolvedVirtual { .. })
        ));
        assert_eq!(summary.state.release(&mut g), Ok(1));
        assert!(g.verify_for_lowering().is_ok());
    }

    #[test]
    fn test_load_before_store_reads_default() {
        let ty = point();
        let mut g = Graph::new();
        let obj = g.new_instance(ty.clone()).unwrap();
        let load = g.load_field(ty.fields()[1].clone(), obj).unwrap();
        let ret = g.return_value(Some(load)).unwrap();
        chain(&mut g, &[obj, load, ret]);

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert!(summary.changed());

        let zero = returned(&g, ret).unwrap();
        let node = g.node(zero).unwrap();
        assert_eq!(node.as_constant(), Some(Constant::Int(0)));
        assert!(node.flags.contains(NodeFlags::FIELD_DEFAULT));
    }

    #[test]
    fn test_returned_allocation_is_untouched() {
        let ty = point();
        let mut g = Graph::new();
        let obj = g.new_instance(ty).unwrap();
        let ret = g.return_value(Some(obj)).unwrap();
        chain(&mut g, &[obj, ret]);
        let before = g.len();

        let analysis = EscapeAnalysis::compute(&g, &EscapeConfig::default()).unwrap();
        assert_eq!(analysis.escape_state(obj), Some(EscapeState::GlobalEscape));
        assert!(!analysis.can_scalar_replace(obj));

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert!(!summary.changed());
        assert_eq!(summary.rejection(obj), Some(&Rejection::Returned { user: ret }));
        assert_eq!(g.len(), before);
        assert_eq!(returned(&g, ret), Some(obj));
    }

    #[test]
    fn test_stored_reference_escapes() {
        let ty = point();
        let holder = Arc::new(HostType::instance(
            "Holder",
            vec![FieldDescriptor::new("p", 8, Kind::Object)],
        ));
        let mut g = Graph::new();
        let outer = g.new_instance(holder.clone()).unwrap();
        let inner = g.new_instance(ty).unwrap();
        let store = g.store_field(holder.fields()[0].clone(), outer, inner).unwrap();
        chain(&mut g, &[outer, inner, store]);

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert_eq!(
            summary.rejection(inner),
            Some(&Rejection::StoredAsValue { user: store })
        );
        // The holder itself never escapes.
        assert_eq!(summary.virtualized.len(), 1);
        assert_eq!(summary.state.field_value(summary.virtualized[0], 0), Some(inner));
        assert!(g.contains(inner));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_constant_array_virtualized() {
        let mut g = Graph::new();
        let three = g.int(3).unwrap();
        let zero = g.int(0).unwrap();
        let arr = g.new_type_array(Kind::Int, three).unwrap();
        let len = g.array_length(arr).unwrap();
        let store = g.store_indexed(Kind::Int, arr, zero, len).unwrap();
        let load = g.load_indexed(Kind::Int, arr, zero).unwrap();
        let ret = g.return_value(Some(load)).unwrap();
        chain(&mut g, &[arr, len, store, load, ret]);

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert_eq!(summary.virtualized.len(), 1);
        assert_eq!(returned(&g, ret), Some(three));

        let vobj = g.virtual_object_of(summary.virtualized[0]).unwrap();
        assert!(vobj.ty().is_array());
        assert_eq!(vobj.fields().len(), 3);
        assert_eq!(&*vobj.fields()[2].name, "[2]");
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_array_rejections() {
        let mut g = Graph::new();
        let n = g.parameter(0, Kind::Int).unwrap();
        let dynamic = g.new_type_array(Kind::Int, n).unwrap();
        let big = g.int(100).unwrap();
        let large = g.new_type_array(Kind::Int, big).unwrap();
        let two = g.int(2).unwrap();
        let five = g.int(5).unwrap();
        let small = g.new_type_array(Kind::Long, two).unwrap();
        let oob = g.load_indexed(Kind::Long, small, five).unwrap();
        chain(&mut g, &[dynamic, large, small, oob]);

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert!(!summary.changed());
        assert_eq!(summary.rejection(dynamic), Some(&Rejection::NonConstantLength));
        assert_eq!(
            summary.rejection(large),
            Some(&Rejection::ArrayTooLong {
                length: 100,
                limit: 16
            })
        );
        assert_eq!(
            summary.rejection(small),
            Some(&Rejection::IndexOutOfRange {
                user: oob,
                index: 5,
                length: 2
            })
        );
    }

    #[test]
    fn test_access_kind_must_match_slot() {
        let ty = point();
        let mut g = Graph::new();
        let obj = g.new_instance(ty).unwrap();
        // Same offset as `x`, read as a long.
        let wide = FieldDescriptor::new("x", 12, Kind::Long);
        let load = g.load_field(wide, obj).unwrap();
        let two = g.int(2).unwrap();
        let zero = g.int(0).unwrap();
        let arr = g.new_type_array(Kind::Int, two).unwrap();
        let element = g.load_indexed(Kind::Double, arr, zero).unwrap();
        chain(&mut g, &[obj, load, arr, element]);

        let analysis = EscapeAnalysis::compute(&g, &EscapeConfig::default()).unwrap();
        assert_eq!(
            analysis.info(obj).and_then(|info| info.rejection.clone()),
            Some(Rejection::AccessKindMismatch {
                user: load,
                declared: Kind::Int,
                accessed: Kind::Long,
            })
        );
        assert_eq!(
            analysis.info(arr).and_then(|info| info.rejection.clone()),
            Some(Rejection::AccessKindMismatch {
                user: element,
                declared: Kind::Int,
                accessed: Kind::Double,
            })
        );
        assert_eq!(analysis.escape_state(obj), Some(EscapeState::NoEscape));

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert!(!summary.changed());
        assert!(g.contains(obj) && g.contains(load));
        assert!(g.contains(arr) && g.contains(element));
    }

    #[test]
    fn test_returned_allocation_escapes_despite_shape_rejection() {
        let mut g = Graph::new();
        let n = g.parameter(0, Kind::Int).unwrap();
        let arr = g.new_type_array(Kind::Int, n).unwrap();
        let ret = g.return_value(Some(arr)).unwrap();
        chain(&mut g, &[arr, ret]);

        let analysis = EscapeAnalysis::compute(&g, &EscapeConfig::default()).unwrap();
        let info = analysis.info(arr).unwrap();
        assert_eq!(info.escape_state, EscapeState::GlobalEscape);
        assert_eq!(info.rejection, Some(Rejection::NonConstantLength));
        assert_eq!(analysis.global_escaping_count(), 1);

        let mut config = EscapeConfig::default();
        config.max_fields = 1;
        let mut g = Graph::new();
        let obj = g.new_instance(point()).unwrap();
        let ret = g.return_value(Some(obj)).unwrap();
        chain(&mut g, &[obj, ret]);

        let analysis = EscapeAnalysis::compute(&g, &config).unwrap();
        let info = analysis.info(obj).unwrap();
        assert_eq!(info.escape_state, EscapeState::GlobalEscape);
        assert_eq!(
            info.rejection,
            Some(Rejection::TooManyFields { count: 2, limit: 1 })
        );
    }

    #[test]
    fn test_local_dynamic_array_does_not_escape() {
        let mut g = Graph::new();
        let n = g.parameter(0, Kind::Int).unwrap();
        let arr = g.new_type_array(Kind::Int, n).unwrap();
        let len = g.array_length(arr).unwrap();
        let ret = g.return_value(Some(len)).unwrap();
        chain(&mut g, &[arr, len, ret]);

        let analysis = EscapeAnalysis::compute(&g, &EscapeConfig::default()).unwrap();
        assert_eq!(analysis.escape_state(arr), Some(EscapeState::NoEscape));
        assert!(!analysis.can_scalar_replace(arr));
        assert_eq!(analysis.non_escaping_count(), 1);
    }

    #[test]
    fn test_unset_length_is_an_error() {
        let mut g = Graph::new();
        let arr = g.add(NodeKind::NewTypeArray { element: Kind::Int }).unwrap();
        chain(&mut g, &[arr]);

        let err = Escape::new().virtualize(&mut g).unwrap_err();
        assert!(matches!(err, IrError::NullRequiredInput { node, .. } if node == arr));
        assert!(g.contains(arr));
    }

    #[test]
    fn test_allocation_off_chain_rejected() {
        let mut g = Graph::new();
        let obj = g.new_instance(point()).unwrap();

        let summary = Escape::new().virtualize(&mut g).unwrap();
        assert_eq!(summary.rejection(obj), Some(&Rejection::NotOnControlChain));
    }

    #[test]
    fn test_disabled_pass_does_nothing() {
        let mut g = Graph::new();
        let obj = g.new_instance(point()).unwrap();
        chain(&mut g, &[obj]);

        let mut pass = Escape::with_config(EscapeConfig::disabled()).unwrap();
        assert_eq!(pass.run(&mut g), Ok(false));
        assert_eq!(pass.last_summary().map(|s| s.allocations), Some(0));
        assert!(g.contains(obj));
    }

    #[test]
    fn test_field_limit() {
        let mut config = EscapeConfig::default();
        config.max_fields = 1;
        let mut g = Graph::new();
        let obj = g.new_instance(point()).unwrap();
        chain(&mut g, &[obj]);

        let summary = Escape::with_config(config).unwrap().virtualize(&mut g).unwrap();
        assert_eq!(
            summary.rejection(obj),
            Some(&Rejection::TooManyFields { count: 2, limit: 1 })
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EscapeConfig {
            max_fields: 0,
            ..EscapeConfig::default()
        };
        assert_eq!(
            Escape::with_config(config).unwrap_err(),
            ConfigError::ZeroFieldLimit
        );
        // A disabled pass never reads its limits.
        let config = EscapeConfig {
            max_fields: 0,
            ..EscapeConfig::disabled()
        };
        assert!(Escape::with_config(config).is_ok());
    }
}
