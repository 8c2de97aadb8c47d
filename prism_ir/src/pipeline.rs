//! Per-unit compilation pipeline.
//!
//! Takes a built graph to the point where it can be lowered:
//!
//! 1. **Verify**: structural checks (optional)
//! 2. **Escape**: scalar replacement of non-escaping allocations
//! 3. **Release**: drop virtual object anchors
//! 4. **Lowering check**: every node must have a lowering
//! 5. **Finalize**: freeze the graph
//!
//! A failure stops the unit it happened in and nothing else.
//! [`Pipeline::run_units`] compiles independent units on separate threads,
//! turning a panic in one of them into an error for that unit.

use crate::config::{ConfigError, PipelineConfig};
use crate::error::{IrError, IrResult};
use crate::ir::graph::Graph;
use crate::ir::node::GraphId;
use crate::opt::Escape;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

// =============================================================================
// Statistics
// =============================================================================

/// Statistics for a single pipeline step.
#[derive(Debug, Clone)]
pub struct PassStat {
    /// Step name.
    pub name: &'static str,
    /// Whether the step changed the graph.
    pub changed: bool,
    /// Time spent in the step.
    pub time: Duration,
}

/// What the pipeline did to one graph.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Graph identity.
    pub graph: GraphId,
    /// Graph name.
    pub name: String,
    /// Live nodes before.
    pub nodes_before: usize,
    /// Live nodes after.
    pub nodes_after: usize,
    /// Allocations escape analysis looked at.
    pub allocations: usize,
    /// Allocations replaced by virtual objects.
    pub virtualized: usize,
    /// Allocations left in place.
    pub rejected: usize,
    /// Per-step statistics in execution order.
    pub passes: Vec<PassStat>,
    /// Total time.
    pub total_time: Duration,
}

impl PipelineReport {
    /// Node count reduction as a percentage.
    pub fn size_reduction(&self) -> f64 {
        if self.nodes_before == 0 {
            return 0.0;
        }
        let removed = self.nodes_before.saturating_sub(self.nodes_after);
        removed as f64 / self.nodes_before as f64 * 100.0
    }
}

/// One unit's graph together with how its compilation went.
#[derive(Debug)]
pub struct UnitOutcome {
    pub graph: Graph,
    pub result: IrResult<PipelineReport>,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs the fixed per-unit step sequence.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create an empty graph with this pipeline's graph settings.
    pub fn new_graph(&self, name: impl Into<String>) -> Result<Graph, ConfigError> {
        Graph::with_config(name, self.config.graph.clone())
    }

    /// Run every step on `graph`.
    ///
    /// On error the graph is left wherever the failing step stopped and
    /// should be discarded with its unit.
    pub fn run(&self, graph: &mut Graph) -> IrResult<PipelineReport> {
        let _span = info_span!("pipeline", graph = %graph.id(), name = %graph.name()).entered();
        let start = Instant::now();
        let mut report = PipelineReport {
            graph: graph.id(),
            name: graph.name().to_owned(),
            nodes_before: graph.len(),
            nodes_after: 0,
            allocations: 0,
            virtualized: 0,
            rejected: 0,
            passes: Vec::new(),
            total_time: Duration::ZERO,
        };

        if self.config.verify_before_escape {
            timed(&mut report, "verify", || graph.verify().map(|()| (false, ())))?;
        }

        let escape = Escape::from_validated(self.config.escape.clone());
        let summary = timed(&mut report, "escape", || {
            let summary = escape.virtualize(graph)?;
            Ok((summary.changed(), summary))
        })?;
        report.allocations = summary.allocations;
        report.virtualized = summary.virtualized.len();
        report.rejected = summary.rejected.len();

        let state = summary.state;
        timed(&mut report, "release", || {
            state.release(graph).map(|removed| (removed > 0, ()))
        })?;
        timed(&mut report, "lowering-check", || {
            graph.verify_for_lowering().map(|()| (false, ()))
        })?;
        timed(&mut report, "finalize", || graph.finalize().map(|()| (false, ())))?;

        report.nodes_after = graph.len();
        report.total_time = start.elapsed();
        info!(
            nodes_before = report.nodes_before,
            nodes_after = report.nodes_after,
            virtualized = report.virtualized,
            "compiled unit"
        );
        Ok(report)
    }

    /// Compile independent units in parallel, one thread each.
    ///
    /// Outcomes come back in input order, one per unit. A failing unit does
    /// not affect the others, and a unit that panics reports
    /// [`IrError::UnitPanicked`] alongside its graph.
    pub fn run_units(&self, units: Vec<Graph>) -> Vec<UnitOutcome> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = units
                .into_iter()
                .map(|graph| scope.spawn(move || isolate(graph, |graph| self.run(graph))))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        })
    }
}

/// Run `step` on one unit, catching a panic as that unit's error.
fn isolate(
    mut graph: Graph,
    step: impl FnOnce(&mut Graph) -> IrResult<PipelineReport>,
) -> UnitOutcome {
    let id = graph.id();
    let result = panic::catch_unwind(AssertUnwindSafe(|| step(&mut graph))).unwrap_or_else(
        |payload| {
            Err(IrError::UnitPanicked {
                graph: id,
                message: panic_message(payload.as_ref()),
            })
        },
    );
    if let Err(err) = &result {
        warn!(graph = %id, error = %err, "unit failed");
    }
    UnitOutcome { graph, result }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Run one step, recording its time and whether it changed anything.
fn timed<T>(
    report: &mut PipelineReport,
    name: &'static str,
    step: impl FnOnce() -> IrResult<(bool, T)>,
) -> IrResult<T> {
    let start = Instant::now();
    let result = step();
    let time = start.elapsed();
    match result {
        Ok((changed, value)) => {
            report.passes.push(PassStat {
                name,
                changed,
                time,
            });
            debug!(step = name, ?time, changed, "step done");
            Ok(value)
        }
        Err(err) => {
            debug!(step = name, error = %err, "step failed");
            Err(err)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EscapeConfig;
    use crate::error::{ErrorCategory, IrError};
    use crate::ir::node::{NodeId, NodeKind};
    use crate::ir::schema;
    use crate::ir::types::{FieldDescriptor, HostType, Kind};
    use std::sync::Arc;

    /// `p = new Point; p.x = 7; return p.x`
    fn point_unit(pipeline: &Pipeline) -> (Graph, NodeId) {
        let ty = Arc::new(HostType::instance(
            "Point",
            vec![
                FieldDescriptor::new("x", 12, Kind::Int),
                FieldDescriptor::new("y", 16, Kind::Int),
            ],
        ));
        let mut g = pipeline.new_graph("point").unwrap();
        let seven = g.int(7).unwrap();
        let obj = g.new_instance(ty.clone()).unwrap();
        let store = g.store_field(ty.fields()[0].clone(), obj, seven).unwrap();
        let load = g.load_field(ty.fields()[0].clone(), obj).unwrap();
        let ret = g.return_value(Some(load)).unwrap();
        let start = g.start();
        g.set_next(start, obj).unwrap();
        g.set_next(obj, store).unwrap();
        g.set_next(store, load).unwrap();
        g.set_next(load, ret).unwrap();
        (g, ret)
    }

    #[test]
    fn test_pipeline_virtualizes_and_finalizes() {
        let pipeline = Pipeline::default();
        let (mut g, ret) = point_unit(&pipeline);

        let report = pipeline.run(&mut g).unwrap();
        assert!(g.is_finalized());
        assert_eq!(report.allocations, 1);
        assert_eq!(report.virtualized, 1);
        assert_eq!(report.nodes_before, 6);
        assert_eq!(report.nodes_after, 3);
        assert!(report.size_reduction() > 0.0);

        let names: Vec<_> = report.passes.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            ["verify", "escape", "release", "lowering-check", "finalize"]
        );

        let result = g.input(ret, schema::RETURN_RESULT).unwrap().unwrap();
        assert_eq!(g.node(result).unwrap().as_constant().and_then(|c| c.as_int()), Some(7));
        assert!(g.iter().all(|(_, n)| n.as_virtual_object().is_none()));
    }

    #[test]
    fn test_pipeline_without_escape_keeps_allocation() {
        let pipeline = Pipeline::new(PipelineConfig::without_escape()).unwrap();
        let (mut g, _) = point_unit(&pipeline);

        let report = pipeline.run(&mut g).unwrap();
        assert_eq!(report.virtualized, 0);
        assert_eq!(report.nodes_after, report.nodes_before);
        assert!(g.iter().any(|(_, n)| n.kind().is_allocation()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.escape = EscapeConfig {
            max_fields: 0,
            ..EscapeConfig::default()
        };
        assert_eq!(Pipeline::new(config).unwrap_err(), ConfigError::ZeroFieldLimit);
    }

    #[test]
    fn test_failing_unit_is_isolated() {
        let pipeline = Pipeline::default();
        let (good, _) = point_unit(&pipeline);

        let mut bad = pipeline.new_graph("bad").unwrap();
        let arr = bad.add(NodeKind::NewTypeArray { element: Kind::Int }).unwrap();
        let start = bad.start();
        bad.set_next(start, arr).unwrap();

        let outcomes = pipeline.run_units(vec![good, bad]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[0].graph.is_finalized());

        let err = outcomes[1].result.as_ref().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NullRequiredInput);
        assert!(matches!(err, IrError::NullRequiredInput { role: "length", .. }));
        assert!(!outcomes[1].graph.is_finalized());
    }

    #[test]
    fn test_panicking_unit_keeps_its_slot() {
        let pipeline = Pipeline::default();
        let (graph, _) = point_unit(&pipeline);
        let id = graph.id();

        let outcome = isolate(graph, |_| panic!("lowering table missing"));
        assert_eq!(outcome.graph.id(), id);
        let err = outcome.result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Panic);
        assert_eq!(
            err,
            IrError::UnitPanicked {
                graph: id,
                message: "lowering table missing".to_owned(),
            }
        );

        let (graph, _) = point_unit(&pipeline);
        let outcome = isolate(graph, |g| pipeline.run(g));
        assert!(outcome.result.is_ok());
    }
}
