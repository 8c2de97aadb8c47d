//! Property tests for slot layouts, edges, cloning and scalar replacement.

use prism_ir::ir::schema;
use prism_ir::ir::{
    Constant, FieldDescriptor, Graph, HostType, Kind, Node, NodeId, NodeKind, TypeRef,
};
use prism_ir::opt::Escape;
use prism_ir::{ErrorCategory, IrError};
use proptest::prelude::*;
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

fn any_kind() -> impl Strategy<Value = NodeKind> {
    let ty = point();
    let field = ty.fields()[0].clone();
    prop_oneof![
        Just(NodeKind::Start),
        Just(NodeKind::Return),
        any::<i32>().prop_map(|v| NodeKind::Constant(Constant::Int(v))),
        (0u16..8).prop_map(|index| NodeKind::Parameter {
            index,
            kind: Kind::Int
        }),
        Just(NodeKind::NewInstance { ty: ty.clone() }),
        Just(NodeKind::NewTypeArray { element: Kind::Byte }),
        Just(NodeKind::NewObjectArray { element: ty.clone() }),
        Just(NodeKind::LoadField {
            field: field.clone()
        }),
        Just(NodeKind::StoreField { field }),
        Just(NodeKind::LoadIndexed { element: Kind::Int }),
        Just(NodeKind::StoreIndexed { element: Kind::Int }),
        Just(NodeKind::ArrayLength),
        Just(NodeKind::VirtualObject(prism_ir::ir::VirtualObject::new(
            ty.clone(),
            ty.fields().clone()
        ))),
    ]
}

/// A field access on the tracked object.
#[derive(Debug, Clone)]
enum Access {
    Store { field: usize, value: i32 },
    Load { field: usize },
}

fn any_access() -> impl Strategy<Value = Access> {
    prop_oneof![
        (0usize..2, any::<i32>()).prop_map(|(field, value)| Access::Store { field, value }),
        (0usize..2).prop_map(|field| Access::Load { field }),
    ]
}

proptest! {
    #[test]
    fn slot_count_matches_layer(kind in any_kind()) {
        let layer = kind.layer();
        let node = Node::new(kind);
        prop_assert_eq!(node.input_count(), layer.input_count());
        prop_assert_eq!(node.successor_count(), layer.successor_count());
        prop_assert!(node.inputs().iter().all(Option::is_none));

        let err = node.input(node.input_count()).unwrap_err();
        prop_assert_eq!(err.category(), ErrorCategory::StructuralArity);
        let err = node.successor(node.successor_count()).unwrap_err();
        prop_assert_eq!(err.category(), ErrorCategory::StructuralArity);
        if node.input_count() > 0 {
            prop_assert_eq!(node.input(node.input_count() - 1), Ok(None));
        }
    }

    #[test]
    fn length_reads_last_write(lengths in prop::collection::vec(0i32..1000, 1..8)) {
        let mut g = Graph::new();
        let first = g.int(0).unwrap();
        let arr = g.new_type_array(Kind::Int, first).unwrap();

        let mut last = first;
        for value in lengths {
            let len = g.int(value).unwrap();
            prop_assert_eq!(g.set_length(arr, len), Ok(len));
            last = len;
        }
        prop_assert_eq!(g.length(arr), Ok(Some(last)));
        prop_assert_eq!(g.usages(last).unwrap(), &[arr][..]);
        prop_assert!(g.verify().is_ok());
    }

    #[test]
    fn virtual_object_copies_are_distinct(targets in 1usize..5) {
        let ty = point();
        let mut source = Graph::new();
        let vobj = source.virtual_object(ty.clone(), ty.fields().clone()).unwrap();

        let mut graphs: Vec<Graph> = (0..targets).map(|_| Graph::new()).collect();
        let mut copies: Vec<NodeId> = Vec::new();
        for graph in &mut graphs {
            let copy = source.copy_virtual_object(vobj, graph).unwrap();
            prop_assert_eq!(copy.graph(), graph.id());
            let cloned = graph.virtual_object_of(copy).unwrap();
            prop_assert!(Arc::ptr_eq(cloned.fields(), ty.fields()));
            prop_assert!(Arc::ptr_eq(cloned.ty(), &ty));
            copies.push(copy);
        }
        for (i, a) in copies.iter().enumerate() {
            prop_assert_ne!(*a, vobj);
            for b in &copies[i + 1..] {
                prop_assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn scalar_replacement_preserves_loads(accesses in prop::collection::vec(any_access(), 0..12)) {
        let ty = point();
        let mut g = Graph::new();
        let obj = g.new_instance(ty.clone()).unwrap();
        let mut prev = g.set_next(g.start(), obj).unwrap();

        // Expected value of every load, tracked the straightforward way.
        let mut fields = [0i64; 2];
        let mut loads: Vec<(NodeId, i64)> = Vec::new();
        let mut sink = Vec::new();
        for access in &accesses {
            let node = match *access {
                Access::Store { field, value } => {
                    let value_node = g.int(value).unwrap();
                    fields[field] = i64::from(value);
                    g.store_field(ty.fields()[field].clone(), obj, value_node).unwrap()
                }
                Access::Load { field } => {
                    let load = g.load_field(ty.fields()[field].clone(), obj).unwrap();
                    loads.push((load, fields[field]));
                    load
                }
            };
            prev = g.set_next(prev, node).unwrap();
        }
        // Keep every load observable through an array store.
        if !loads.is_empty() {
            let len = g.int(loads.len() as i32).unwrap();
            let out = g.new_type_array(Kind::Int, len).unwrap();
            prev = g.set_next(prev, out).unwrap();
            for (i, (load, _)) in loads.iter().enumerate() {
                let index = g.int(i as i32).unwrap();
                let store = g.store_indexed(Kind::Int, out, index, *load).unwrap();
                prev = g.set_next(prev, store).unwrap();
                sink.push(store);
            }
            let ret = g.return_value(Some(out)).unwrap();
            g.set_next(prev, ret).unwrap();
        }

        let summary = Escape::new().virtualize(&mut g).unwrap();
        prop_assert!(!g.contains(obj));
        prop_assert!(summary.virtualized.len() == 1);

        for (store, (_, expected)) in sink.iter().zip(&loads) {
            let value = g.input(*store, schema::STORE_INDEXED_VALUE).unwrap().unwrap();
            let constant = g.node(value).unwrap().as_constant();
            prop_assert_eq!(constant.and_then(Constant::as_int), Some(*expected));
        }

        summary.state.release(&mut g).unwrap();
        prop_assert!(g.verify_for_lowering().is_ok());
    }
}

#[test]
fn foreign_ids_are_unknown() {
    let a = Graph::new();
    let b = Graph::new();
    assert_eq!(b.node(a.start()).unwrap_err(), IrError::UnknownNode(a.start()));
}
