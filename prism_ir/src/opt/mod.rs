//! Optimization passes over the IR.
//!
//! Every pass implements [`OptimizationPass`] and works on one graph at a
//! time. Passes hold no state shared between graphs, so independent
//! compilation units can be optimized on separate threads.

pub mod escape;

pub use escape::{Escape, EscapeAnalysis, EscapeState, EscapeSummary, Rejection, VirtualState};

use crate::error::IrResult;
use crate::ir::graph::Graph;

/// A transformation over a single graph.
pub trait OptimizationPass {
    /// Short name used in logs and statistics.
    fn name(&self) -> &'static str;

    /// Run the pass. Returns `true` if the graph changed.
    fn run(&mut self, graph: &mut Graph) -> IrResult<bool>;
}
