//! Independent compilation units on separate threads.

use prism_ir::ir::{FieldDescriptor, Graph, Kind, TypeRegistry};
use prism_ir::{ErrorCategory, Pipeline, PipelineConfig};
use std::sync::Arc;
use std::thread;

/// `p = new Pair; p.a = i; return p.a`
fn unit(pipeline: &Pipeline, registry: &TypeRegistry, i: i32) -> Graph {
    let ty = registry.register_instance(
        "Pair",
        vec![
            FieldDescriptor::new("a", 8, Kind::Int),
            FieldDescriptor::new("b", 12, Kind::Object),
        ],
    );
    let mut g = pipeline.new_graph(format!("unit-{}", i)).unwrap();
    let value = g.int(i).unwrap();
    let p = g.new_instance(ty.clone()).unwrap();
    let store = g.store_field(ty.fields()[0].clone(), p, value).unwrap();
    let load = g.load_field(ty.fields()[0].clone(), p).unwrap();
    let ret = g.return_value(Some(load)).unwrap();
    let mut prev = g.start();
    for node in [p, store, load, ret] {
        prev = g.set_next(prev, node).unwrap();
    }
    g
}

#[test]
fn units_build_concurrently_against_one_registry() {
    let registry = Arc::new(TypeRegistry::new());
    let pipeline = Arc::new(Pipeline::default());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let mut g = unit(&pipeline, &registry, i);
                let report = pipeline.run(&mut g).unwrap();
                (g.id(), report.virtualized)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let (id, virtualized) = handle.join().unwrap();
        assert_eq!(virtualized, 1);
        ids.push(id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(registry.len(), 1);
}

#[test]
fn run_units_isolates_failures() {
    let registry = TypeRegistry::new();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();

    let mut units: Vec<Graph> = (0..4).map(|i| unit(&pipeline, &registry, i)).collect();
    // Leave a live virtual object in unit 2 so lowering refuses it.
    let ty = registry.lookup("Pair").unwrap();
    units[2].virtual_object(ty.clone(), ty.fields().clone()).unwrap();

    let outcomes = pipeline.run_units(units);
    assert_eq!(outcomes.len(), 4);
    for (i, outcome) in outcomes.iter().enumerate() {
        if i == 2 {
            let err = outcome.result.as_ref().unwrap_err();
            assert_eq!(err.category(), ErrorCategory::UnresolvedVirtual);
            assert!(!outcome.graph.is_finalized());
        } else {
            assert_eq!(outcome.result.as_ref().map(|r| r.virtualized), Ok(1));
            assert!(outcome.graph.is_finalized());
        }
    }
}
