//! Kind-directed dispatch for lowering.
//!
//! [`Graph::accept`] resolves a node's required inputs and hands the node to
//! the matching [`NodeVisitor`] method. A virtual object has no method: it
//! performs no memory operation, and reaching one here means escape analysis
//! left it live, which is reported as [`IrError::UnresolvedVirtual`].

use super::graph::Graph;
use super::node::{NodeId, NodeKind};
use super::schema::InputRole;
use super::types::{Constant, FieldDescriptor, Kind, TypeRef};
use crate::error::{IrError, IrResult};
use tracing::debug;

/// Per-kind callbacks for code generation and similar consumers.
///
/// Every required input has already been checked when a method runs.
pub trait NodeVisitor {
    type Output;

    fn visit_start(&mut self, graph: &Graph, id: NodeId) -> IrResult<Self::Output>;

    fn visit_return(
        &mut self,
        graph: &Graph,
        id: NodeId,
        result: Option<NodeId>,
    ) -> IrResult<Self::Output>;

    fn visit_constant(
        &mut self,
        graph: &Graph,
        id: NodeId,
        value: Constant,
    ) -> IrResult<Self::Output>;

    fn visit_parameter(
        &mut self,
        graph: &Graph,
        id: NodeId,
        index: u16,
        kind: Kind,
    ) -> IrResult<Self::Output>;

    fn visit_new_instance(
        &mut self,
        graph: &Graph,
        id: NodeId,
        ty: &TypeRef,
    ) -> IrResult<Self::Output>;

    fn visit_new_type_array(
        &mut self,
        graph: &Graph,
        id: NodeId,
        element: Kind,
        length: NodeId,
    ) -> IrResult<Self::Output>;

    fn visit_new_object_array(
        &mut self,
        graph: &Graph,
        id: NodeId,
        element: &TypeRef,
        length: NodeId,
    ) -> IrResult<Self::Output>;

    fn visit_load_field(
        &mut self,
        graph: &Graph,
        id: NodeId,
        field: &FieldDescriptor,
        object: NodeId,
    ) -> IrResult<Self::Output>;

    fn visit_store_field(
        &mut self,
        graph: &Graph,
        id: NodeId,
        field: &FieldDescriptor,
        object: NodeId,
        value: NodeId,
    ) -> IrResult<Self::Output>;

    fn visit_load_indexed(
        &mut self,
        graph: &Graph,
        id: NodeId,
        element: Kind,
        array: NodeId,
        index: NodeId,
    ) -> IrResult<Self::Output>;

    fn visit_store_indexed(
        &mut self,
        graph: &Graph,
        id: NodeId,
        element: Kind,
        array: NodeId,
        index: NodeId,
        value: NodeId,
    ) -> IrResult<Self::Output>;

    fn visit_array_length(
        &mut self,
        graph: &Graph,
        id: NodeId,
        array: NodeId,
    ) -> IrResult<Self::Output>;
}

impl Graph {
    /// Dispatch node `id` to `visitor`.
    pub fn accept<V: NodeVisitor>(&self, id: NodeId, visitor: &mut V) -> IrResult<V::Output> {
        let node = self.node(id)?;
        match node.kind() {
            NodeKind::Start => visitor.visit_start(self, id),
            NodeKind::Return => {
                let result = node.input_by_role(InputRole::Result)?;
                visitor.visit_return(self, id, result)
            }
            NodeKind::Constant(value) => visitor.visit_constant(self, id, *value),
            NodeKind::Parameter { index, kind } => visitor.visit_parameter(self, id, *index, *kind),
            NodeKind::NewInstance { ty } => visitor.visit_new_instance(self, id, ty),
            NodeKind::NewTypeArray { element } => {
                let length = self.require_input(id, InputRole::Length)?;
                visitor.visit_new_type_array(self, id, *element, length)
            }
            NodeKind::NewObjectArray { element } => {
                let length = self.require_input(id, InputRole::Length)?;
                visitor.visit_new_object_array(self, id, element, length)
            }
            NodeKind::LoadField { field } => {
                let object = self.require_input(id, InputRole::Object)?;
                visitor.visit_load_field(self, id, field, object)
            }
            NodeKind::StoreField { field } => {
                let object = self.require_input(id, InputRole::Object)?;
                let value = self.require_input(id, InputRole::Value)?;
                visitor.visit_store_field(self, id, field, object, value)
            }
            NodeKind::LoadIndexed { element } => {
                let array = self.require_input(id, InputRole::Array)?;
                let index = self.require_input(id, InputRole::Index)?;
                visitor.visit_load_indexed(self, id, *element, array, index)
            }
            NodeKind::StoreIndexed { element } => {
                let array = self.require_input(id, InputRole::Array)?;
                let index = self.require_input(id, InputRole::Index)?;
                let value = self.require_input(id, InputRole::Value)?;
                visitor.visit_store_indexed(self, id, *element, array, index, value)
            }
            NodeKind::ArrayLength => {
                let array = self.require_input(id, InputRole::Array)?;
                visitor.visit_array_length(self, id, array)
            }
            NodeKind::VirtualObject(vobj) => Err(IrError::UnresolvedVirtual {
                node: id,
                type_name: vobj.ty().name().to_owned(),
            }),
        }
    }

    /// Check the graph is ready for code generation.
    ///
    /// Structure must verify, no virtual object may be live, and every
    /// required input must be set.
    pub fn verify_for_lowering(&self) -> IrResult<()> {
        self.verify()?;
        let mut readiness = LoweringReadiness;
        for id in self.ids() {
            if let Err(err) = self.accept(id, &mut readiness) {
                debug!(graph = %self.id(), node = %id, error = %err, "graph not ready for lowering");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Visitor that accepts every lowerable node as-is.
///
/// All of the checking happens in [`Graph::accept`].
struct LoweringReadiness;

impl NodeVisitor for LoweringReadiness {
    type Output = ();

    fn visit_start(&mut self, _: &Graph, _: NodeId) -> IrResult<()> {
        Ok(())
    }

    fn visit_return(&mut self, _: &Graph, _: NodeId, _: Option<NodeId>) -> IrResult<()> {
        Ok(())
    }

    fn visit_constant(&mut self, _: &Graph, _: NodeId, _: Constant) -> IrResult<()> {
        Ok(())
    }

    fn visit_parameter(&mut self, _: &Graph, _: NodeId, _: u16, _: Kind) -> IrResult<()> {
        Ok(())
    }

    fn visit_new_instance(&mut self, _: &Graph, _: NodeId, _: &TypeRef) -> IrResult<()> {
        Ok(())
    }

    fn visit_new_type_array(&mut self, _: &Graph, _: NodeId, _: Kind, _: NodeId) -> IrResult<()> {
        Ok(())
    }

    fn visit_new_object_array(
        &mut self,
        _: &Graph,
        _: NodeId,
        _: &TypeRef,
        _: NodeId,
    ) -> IrResult<()> {
        Ok(())
    }

    fn visit_load_field(
        &mut self,
        _: &Graph,
        _: NodeId,
        _: &FieldDescriptor,
        _: NodeId,
    ) -> IrResult<()> {
        Ok(())
    }

    fn visit_store_field(
        &mut self,
        _: &Graph,
        _: NodeId,
        _: &FieldDescriptor,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        Ok(())
    }

    fn visit_load_indexed(
        &mut self,
        _: &Graph,
        _: NodeId,
        _: Kind,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        Ok(())
    }

    fn visit_store_indexed(
        &mut self,
        _: &Graph,
        _: NodeId,
        _: Kind,
        _: NodeId,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        Ok(())
    }

    fn visit_array_length(&mut self, _: &Graph, _: NodeId, _: NodeId) -> IrResult<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::ir::types::HostType;
    use std::sync::Arc;

    /// Records the order in which allocations are lowered.
    #[derive(Default)]
    struct AllocationLog {
        lines: Vec<String>,
    }

    impl NodeVisitor for AllocationLog {
        type Output = bool;

        fn visit_start(&mut self, _: &Graph, _: NodeId) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_return(&mut self, _: &Graph, _: NodeId, _: Option<NodeId>) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_constant(&mut self, _: &Graph, _: NodeId, _: Constant) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_parameter(&mut self, _: &Graph, _: NodeId, _: u16, _: Kind) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_new_instance(&mut self, _: &Graph, _: NodeId, ty: &TypeRef) -> IrResult<bool> {
            self.lines.push(format!("new {}", ty.name()));
            Ok(true)
        }
        fn visit_new_type_array(
            &mut self,
            graph: &Graph,
            _: NodeId,
            element: Kind,
            length: NodeId,
        ) -> IrResult<bool> {
            let len = graph.node(length)?.as_constant();
            self.lines.push(format!("new {}[{:?}]", element, len));
            Ok(true)
        }
        fn visit_new_object_array(
            &mut self,
            _: &Graph,
            _: NodeId,
            element: &TypeRef,
            _: NodeId,
        ) -> IrResult<bool> {
            self.lines.push(format!("new {}[]", element.name()));
            Ok(true)
        }
        fn visit_load_field(
            &mut self,
            _: &Graph,
            _: NodeId,
            _: &FieldDescriptor,
            _: NodeId,
        ) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_store_field(
            &mut self,
            _: &Graph,
            _: NodeId,
            _: &FieldDescriptor,
            _: NodeId,
            _: NodeId,
        ) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_load_indexed(
            &mut self,
            _: &Graph,
            _: NodeId,
            _: Kind,
            _: NodeId,
            _: NodeId,
        ) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_store_indexed(
            &mut self,
            _: &Graph,
            _: NodeId,
            _: Kind,
            _: NodeId,
            _: NodeId,
            _: NodeId,
        ) -> IrResult<bool> {
            Ok(false)
        }
        fn visit_array_length(&mut self, _: &Graph, _: NodeId, _: NodeId) -> IrResult<bool> {
            Ok(false)
        }
    }

    fn point() -> TypeRef {
        Arc::new(HostType::instance(
            "Point",
            vec![FieldDescriptor::new("x", 12, Kind::Int)],
        ))
    }

    #[test]
    fn test_accept_dispatches_by_kind() {
        let mut g = Graph::new();
        let ten = g.int(10).unwrap();
        let arr = g.new_type_array(Kind::Int, ten).unwrap();
        let obj = g.new_instance(point()).unwrap();

        let mut log = AllocationLog::default();
        assert_eq!(g.accept(ten, &mut log), Ok(false));
        assert_eq!(g.accept(arr, &mut log), Ok(true));
        assert_eq!(g.accept(obj, &mut log), Ok(true));
        assert_eq!(log.lines, vec!["new int[Some(Int(10))]", "new Point"]);
    }

    #[test]
    fn test_accept_virtual_object_is_unresolved() {
        let ty = point();
        let mut g = Graph::new();
        let vobj = g.virtual_object(ty.clone(), ty.fields().clone()).unwrap();

        let err = g.accept(vobj, &mut AllocationLog::default()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UnresolvedVirtual);
        assert!(err.to_string().contains("Point"));
        assert_eq!(g.verify_for_lowering(), Err(err));
    }

    #[test]
    fn test_lowering_requires_length() {
        let mut g = Graph::new();
        let arr = g.add(NodeKind::NewObjectArray { element: point() }).unwrap();
        let err = g.verify_for_lowering().unwrap_err();
        assert_eq!(
            err,
            IrError::NullRequiredInput {
                node: arr,
                kind: "NewObjectArray",
                role: "length",
            }
        );

        let four = g.int(4).unwrap();
        g.set_length(arr, four).unwrap();
        assert!(g.verify_for_lowering().is_ok());
    }
}
