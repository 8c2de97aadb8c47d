//! Sea-of-Nodes Intermediate Representation.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): tombstoned node storage and side tables
//! - **Types** (`types.rs`): value kinds, constants and host type descriptors
//! - **Schema** (`schema.rs`): per-kind input and successor slot layouts
//! - **Node** (`node.rs`): node identities, kinds and fixed-arity slots
//! - **Graph** (`graph.rs`): ownership, edges, usages and the control chain
//! - **Clone** (`clone.rs`): copying nodes and graphs
//! - **Visit** (`visit.rs`): kind dispatch and lowering readiness
//! - **Debug** (`debug.rs`): typed debug properties and graph dumps
//!
//! # Design Principles
//!
//! - **Arena allocation**: nodes live in their graph; edges are [`NodeId`]s
//! - **Fixed arity**: every kind's slot count comes from its schema layer
//! - **Closed kinds**: adding a kind means touching every `match`
//! - **Graph ownership**: an edge never crosses graphs

pub mod arena;
pub mod clone;
pub mod debug;
pub mod graph;
pub mod node;
pub mod schema;
pub mod types;
pub mod visit;

// Re-export commonly used types
pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use clone::{CloneResult, GraphCloner};
pub use debug::{DebugProperties, DebugRecord, GraphPrinter};
pub use graph::{Graph, GraphState, UsageList};
pub use node::{GraphId, Node, NodeFlags, NodeId, NodeKind, VirtualObject};
pub use schema::{InputRole, Layer, SuccessorRole};
pub use types::{
    Constant, ElementType, FieldDescriptor, FieldList, HostType, Kind, TypeRef, TypeRegistry,
};
pub use visit::NodeVisitor;
