//! Diagnostic views of nodes and graphs.
//!
//! Each node kind has a typed [`DebugProperties`] variant instead of an open
//! string map. [`DebugProperties::entries`] flattens it into stable
//! `(key, value)` pairs for printers that want text. Nothing here can fail
//! once the node has been looked up.

use super::graph::Graph;
use super::node::{Node, NodeId, NodeKind};
use super::types::{Constant, FieldDescriptor, Kind, TypeRef};
use crate::error::IrResult;
use std::fmt::{self, Write as _};

// =============================================================================
// Debug Properties
// =============================================================================

/// Typed diagnostic properties of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugProperties {
    Start,
    Return { has_value: bool },
    Constant { value: Constant },
    Parameter { index: u16, kind: Kind },
    NewInstance { ty: TypeRef },
    NewTypeArray { element: Kind },
    NewObjectArray { element: TypeRef },
    /// Field load or store.
    FieldAccess { field: FieldDescriptor },
    /// Indexed load or store.
    IndexedAccess { element: Kind },
    ArrayLength,
    VirtualObject { ty: TypeRef, field_count: usize },
}

impl DebugProperties {
    /// Properties of a node.
    pub fn of(node: &Node) -> Self {
        match node.kind() {
            NodeKind::Start => DebugProperties::Start,
            NodeKind::Return => DebugProperties::Return {
                has_value: node.inputs().iter().any(Option::is_some),
            },
            NodeKind::Constant(value) => DebugProperties::Constant { value: *value },
            NodeKind::Parameter { index, kind } => DebugProperties::Parameter {
                index: *index,
                kind: *kind,
            },
            NodeKind::NewInstance { ty } => DebugProperties::NewInstance { ty: ty.clone() },
            NodeKind::NewTypeArray { element } => DebugProperties::NewTypeArray { element: *element },
            NodeKind::NewObjectArray { element } => DebugProperties::NewObjectArray {
                element: element.clone(),
            },
            NodeKind::LoadField { field } | NodeKind::StoreField { field } => {
                DebugProperties::FieldAccess {
                    field: field.clone(),
                }
            }
            NodeKind::LoadIndexed { element } | NodeKind::StoreIndexed { element } => {
                DebugProperties::IndexedAccess { element: *element }
            }
            NodeKind::ArrayLength => DebugProperties::ArrayLength,
            NodeKind::VirtualObject(vobj) => DebugProperties::VirtualObject {
                ty: vobj.ty().clone(),
                field_count: vobj.fields().len(),
            },
        }
    }

    /// Flattened `(key, value)` pairs in a fixed order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        match self {
            DebugProperties::Start | DebugProperties::ArrayLength => Vec::new(),
            DebugProperties::Return { has_value } => vec![("hasValue", has_value.to_string())],
            DebugProperties::Constant { value } => vec![
                ("value", value.to_string()),
                ("kind", value.kind().to_string()),
            ],
            DebugProperties::Parameter { index, kind } => {
                vec![("index", index.to_string()), ("kind", kind.to_string())]
            }
            DebugProperties::NewInstance { ty } => vec![("type", ty.name().to_owned())],
            DebugProperties::NewTypeArray { element } => vec![("element", element.to_string())],
            DebugProperties::NewObjectArray { element } => {
                vec![("element", element.name().to_owned())]
            }
            DebugProperties::FieldAccess { field } => vec![
                ("field", field.name.to_string()),
                ("offset", field.offset.to_string()),
                ("kind", field.kind.to_string()),
            ],
            DebugProperties::IndexedAccess { element } => vec![("element", element.to_string())],
            DebugProperties::VirtualObject { ty, field_count } => vec![
                ("type", ty.name().to_owned()),
                ("fields", field_count.to_string()),
            ],
        }
    }
}

/// Label plus typed properties for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugRecord {
    /// Short human-readable label, as [`Node::short_name`].
    pub label: String,
    pub properties: DebugProperties,
}

impl DebugRecord {
    /// Value recorded under `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.properties
            .entries()
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }
}

// =============================================================================
// Node Labels
// =============================================================================

impl Node {
    /// Kind-specific detail appended to the kind name, if any.
    pub fn detail(&self) -> Option<String> {
        match self.kind() {
            NodeKind::Start | NodeKind::Return | NodeKind::ArrayLength => None,
            NodeKind::Constant(value) => Some(value.to_string()),
            NodeKind::Parameter { index, .. } => Some(index.to_string()),
            NodeKind::NewInstance { ty } | NodeKind::NewObjectArray { element: ty } => {
                Some(ty.name().to_owned())
            }
            NodeKind::NewTypeArray { element }
            | NodeKind::LoadIndexed { element }
            | NodeKind::StoreIndexed { element } => Some(element.to_string()),
            NodeKind::LoadField { field } | NodeKind::StoreField { field } => {
                Some(field.name.to_string())
            }
            NodeKind::VirtualObject(vobj) => Some(vobj.ty().name().to_owned()),
        }
    }

    /// Kind name plus detail, e.g. `VirtualObject Point`.
    pub fn short_name(&self) -> String {
        match self.detail() {
            Some(detail) => format!("{} {}", self.name(), detail),
            None => self.name().to_owned(),
        }
    }

    /// Typed diagnostic record for this node.
    pub fn debug_record(&self) -> DebugRecord {
        DebugRecord {
            label: self.short_name(),
            properties: DebugProperties::of(self),
        }
    }
}

/// Print form: lower-case kind name plus detail, e.g. `virtualobject Point`.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_ascii_lowercase())?;
        if let Some(detail) = self.detail() {
            write!(f, " {}", detail)?;
        }
        Ok(())
    }
}

impl Graph {
    /// Debug record of node `id`.
    pub fn debug_record(&self, id: NodeId) -> IrResult<DebugRecord> {
        Ok(self.node(id)?.debug_record())
    }
}

// =============================================================================
// Graph Printer
// =============================================================================

/// Stable text dump of a graph.
///
/// One line per live node in id order:
///
/// ```text
/// graph g3 "unit" (3 nodes, building)
///   #0 Start next=#2
///   #1 Constant 10 : int
///   #2 NewTypeArray int : Object length=#1 next=-
/// ```
pub struct GraphPrinter<'a> {
    graph: &'a Graph,
    show_usages: bool,
}

impl<'a> GraphPrinter<'a> {
    /// Create a printer for `graph`.
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            show_usages: false,
        }
    }

    /// Append each node's usage list.
    pub fn with_usages(mut self) -> Self {
        self.show_usages = true;
        self
    }

    /// Render the dump.
    pub fn print(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GraphPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph;
        let state = if graph.is_finalized() { "finalized" } else { "building" };
        writeln!(
            f,
            "graph {} {:?} ({} nodes, {})",
            graph.id(),
            graph.name(),
            graph.len(),
            state
        )?;

        for (id, node) in graph.iter() {
            let mut line = format!("  {} {}", id.slot(), node.short_name());
            if node.is_value() {
                write!(line, " : {}", node.result_kind())?;
            }
            let layer = node.kind().layer();
            for (pos, slot) in node.inputs().iter().enumerate() {
                let role = layer.input_role(pos).map_or("?", |r| r.name());
                match slot {
                    Some(target) => write!(line, " {}={}", role, target.slot())?,
                    None => write!(line, " {}=-", role)?,
                }
            }
            for (pos, slot) in node.successors().iter().enumerate() {
                let role = layer.successor_role(pos).map_or("?", |r| r.name());
                match slot {
                    Some(target) => write!(line, " {}={}", role, target.slot())?,
                    None => write!(line, " {}=-", role)?,
                }
            }
            if self.show_usages {
                let usages = graph.usages(id).unwrap_or(&[]);
                let list: Vec<String> = usages.iter().map(|u| u.slot().to_string()).collect();
                write!(line, " usages=[{}]", list.join(","))?;
            }
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::HostType;
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

    #[test]
    fn test_virtual_object_labels() {
        let ty = point();
        let mut g = Graph::new();
        let vobj = g.virtual_object(ty.clone(), ty.fields().clone()).unwrap();
        let node = g.node(vobj).unwrap();

        assert_eq!(node.short_name(), "VirtualObject Point");
        assert_eq!(node.to_string(), "virtualobject Point");

        let record = g.debug_record(vobj).unwrap();
        assert_eq!(record.label, "VirtualObject Point");
        assert_eq!(record.get("type").as_deref(), Some("Point"));
        assert_eq!(record.get("fields").as_deref(), Some("2"));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_entries_are_stable() {
        let mut g = Graph::new();
        let c = g.int(7).unwrap();
        let record = g.debug_record(c).unwrap();
        assert_eq!(
            record.properties.entries(),
            vec![("value", "7".to_owned()), ("kind", "int".to_owned())]
        );
        assert_eq!(record.properties.entries(), record.properties.entries());
    }

    #[test]
    fn test_field_access_properties() {
        let ty = point();
        let mut g = Graph::new();
        let obj = g.new_instance(ty.clone()).unwrap();
        let load = g.load_field(ty.fields()[1].clone(), obj).unwrap();

        let record = g.debug_record(load).unwrap();
        assert_eq!(record.label, "LoadField y");
        assert_eq!(record.get("offset").as_deref(), Some("16"));
        assert!(matches!(record.properties, DebugProperties::FieldAccess { .. }));
    }

    #[test]
    fn test_graph_printer() {
        let mut g = Graph::named("unit");
        let ten = g.int(10).unwrap();
        let arr = g.new_type_array(Kind::Int, ten).unwrap();
        let start = g.start();
        g.set_next(start, arr).unwrap();

        let dump = GraphPrinter::new(&g).with_usages().print();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("\"unit\" (3 nodes, building)"));
        assert_eq!(lines[1], "  #0 Start next=#2 usages=[]");
        assert_eq!(lines[2], "  #1 Constant 10 : int usages=[#2]");
        assert_eq!(lines[3], "  #2 NewTypeArray int : Object length=#1 next=- usages=[]");
    }
}
