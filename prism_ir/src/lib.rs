//! Graph IR for the Prism JIT.
//!
//! Sea-of-Nodes graphs with:
//! - Fixed-arity input and successor slots per node kind
//! - Usage tracking and a `next` control chain
//! - Escape analysis with virtual objects
//! - A per-unit pipeline that leaves graphs ready for lowering
//!
//! Graphs are independent. Each compilation unit owns one and may be
//! processed on its own thread; only [`TypeRegistry`](ir::TypeRegistry)
//! descriptors are shared between units.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod ir;
pub mod opt;
pub mod pipeline;

pub use config::{ConfigError, EscapeConfig, GraphConfig, PipelineConfig};
pub use error::{EdgeKind, ErrorCategory, IrError, IrResult};
pub use ir::{Graph, Node, NodeId, NodeKind};
pub use pipeline::{Pipeline, PipelineReport};
