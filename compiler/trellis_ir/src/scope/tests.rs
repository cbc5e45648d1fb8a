use pretty_assertions::assert_eq;

use super::*;
use crate::computable::PrimitiveOp;
use crate::error::IrError;
use crate::test_helpers::EventLog;
use crate::types::LiteralValue;

fn num(graph: &mut Graph, scope: ScopeId, n: f64) -> ComputableId {
    graph.add_literal(scope, LiteralValue::number(n)).unwrap()
}

/// A child scope `child(x: Number) -> { doubled: x + x }`.
fn doubling_scope(graph: &mut Graph) -> (ScopeId, ComputableId, ComputableId) {
    let child = graph.create_scope("double", ScopeRole::Internal);
    let x = graph.add_parameter(child, IrType::Number).unwrap();
    let sum = graph.add_primitive(child, PrimitiveOp::Add, &[x, x]).unwrap();
    graph.add_output(child, sum, "doubled").unwrap();
    (child, x, sum)
}

// Outputs

#[test]
fn output_type_is_a_compound_of_outputs() {
    let mut graph = Graph::new();
    let (child, _, _) = doubling_scope(&mut graph);
    assert_eq!(
        graph.scope_output_type(child).unwrap(),
        IrType::compound([("doubled", IrType::Number)])
    );

    let empty = graph.create_scope("empty", ScopeRole::Internal);
    assert_eq!(graph.scope_output_type(empty).unwrap(), IrType::Void);
}

#[test]
fn output_fields_are_unique() {
    let mut graph = Graph::new();
    let (child, x, sum) = doubling_scope(&mut graph);
    assert_eq!(
        graph.add_output(child, x, "doubled").unwrap_err(),
        IrError::Structural(StructuralError::DuplicateOutput {
            scope: child,
            field: "doubled".to_owned()
        })
    );
    assert_eq!(
        graph.add_output(child, sum, "again").unwrap_err(),
        IrError::Structural(StructuralError::AlreadyAnOutput {
            scope: child,
            computable: sum,
            field: "doubled".to_owned()
        })
    );
}

#[test]
fn outputs_must_belong_to_the_scope() {
    let mut graph = Graph::new();
    let (child, _, _) = doubling_scope(&mut graph);
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let outsider = num(&mut graph, root, 1.0);
    assert_eq!(
        graph.add_output(child, outsider, "other").unwrap_err(),
        IrError::Structural(StructuralError::NotInScope {
            scope: child,
            computable: outsider
        })
    );
}

#[test]
fn replace_output_swaps_the_field_in_place() {
    let mut graph = Graph::new();
    let (child, x, _) = doubling_scope(&mut graph);
    graph.replace_output(child, "doubled", x).unwrap();
    assert_eq!(graph.scope(child).unwrap().output("doubled"), Some(x));

    assert!(matches!(
        graph.replace_output(child, "missing", x).unwrap_err(),
        IrError::Structural(StructuralError::MissingOutput { .. })
    ));
}

#[test]
fn output_changes_retype_instances() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let (child, _, _) = doubling_scope(&mut graph);
    let arg = num(&mut graph, root, 4.0);
    let instance = graph.add_scope_instance(root, child, &[arg]).unwrap();

    let label = graph.add_literal(child, LiteralValue::string("n")).unwrap();
    graph.add_output(child, label, "label").unwrap();
    assert_eq!(
        graph.output_type(instance).unwrap(),
        &IrType::compound([
            ("doubled", IrType::Number),
            ("label", IrType::ExactValue(LiteralValue::string("n"))),
        ])
    );

    graph.remove_output(child, "label").unwrap();
    assert_eq!(
        graph.output_type(instance).unwrap(),
        &IrType::compound([("doubled", IrType::Number)])
    );
}

#[test]
fn incompatible_output_change_is_rejected_atomically() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let (child, _, sum) = doubling_scope(&mut graph);
    let arg = num(&mut graph, root, 4.0);
    let instance = graph.add_scope_instance(root, child, &[arg]).unwrap();
    let doubled = graph.add_projection(instance, "doubled").unwrap();
    graph.add_state(doubled, IrType::Number).unwrap();

    let word = graph.add_literal(child, LiteralValue::string("no")).unwrap();
    let err = graph.replace_output(child, "doubled", word).unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
    assert_eq!(graph.scope(child).unwrap().output("doubled"), Some(sum));
    assert_eq!(graph.output_type(doubled).unwrap(), &IrType::Number);
}

// Parameters and instances

#[test]
fn instantiation_freezes_parameters() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let (child, _, _) = doubling_scope(&mut graph);
    let arg = num(&mut graph, root, 1.0);
    let instance = graph.add_scope_instance(root, child, &[arg]).unwrap();

    assert_eq!(
        graph.add_parameter(child, IrType::Any).unwrap_err(),
        IrError::Structural(StructuralError::ParametersFrozen(child))
    );
    graph.destroy(instance).unwrap();
    assert!(graph.add_parameter(child, IrType::Any).is_ok());
}

#[test]
fn instance_arguments_are_checked_against_parameters() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let (child, _, _) = doubling_scope(&mut graph);
    let word = graph.add_literal(root, LiteralValue::string("x")).unwrap();
    assert!(matches!(
        graph.add_scope_instance(root, child, &[word]).unwrap_err(),
        IrError::Type(_)
    ));
    assert_eq!(
        graph.add_scope_instance(root, child, &[]).unwrap_err(),
        IrError::Structural(StructuralError::ArityMismatch {
            expected: 1,
            found: 0
        })
    );
    assert!(graph.scope(child).unwrap().instances().is_empty());
}

#[test]
fn narrower_arguments_are_checked_against_the_body() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let child = graph.create_scope("pick_b", ScopeRole::Internal);
    let p = graph.add_parameter(child, IrType::Any).unwrap();
    let b = graph.add_projection(p, "b").unwrap();
    graph.add_output(child, b, "out").unwrap();

    let without_b = graph
        .add_literal(root, LiteralValue::record([("a", LiteralValue::number(1.0))]))
        .unwrap();
    let with_b = graph
        .add_literal(root, LiteralValue::record([("b", LiteralValue::number(2.0))]))
        .unwrap();
    let instance = graph.add_scope_instance(root, child, &[without_b]).unwrap();

    assert!(!graph.admits_arguments(child, &[without_b]).unwrap());
    assert!(graph.admits_arguments(child, &[with_b]).unwrap());
    assert_eq!(
        graph.admits_arguments(child, &[]).unwrap_err(),
        IrError::Structural(StructuralError::ArityMismatch {
            expected: 1,
            found: 0
        })
    );
    // Nothing was retyped.
    assert_eq!(graph.output_type(b).unwrap(), &IrType::Any);
    assert_eq!(
        graph.output_type(instance).unwrap(),
        &IrType::compound([("out", IrType::Any)])
    );
}

#[test]
fn a_scope_cannot_instantiate_itself() {
    let mut graph = Graph::new();
    let (child, x, _) = doubling_scope(&mut graph);
    assert_eq!(
        graph.add_scope_instance(child, child, &[x]).unwrap_err(),
        IrError::Structural(StructuralError::SelfInstantiation(child))
    );
}

#[test]
fn instantiation_edges_count_instances() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let (child, _, _) = doubling_scope(&mut graph);
    let arg = num(&mut graph, root, 1.0);
    let first = graph.add_scope_instance(root, child, &[arg]).unwrap();
    let second = graph.add_scope_instance(root, child, &[arg]).unwrap();

    let edges = |g: &Graph| g.scope(root).unwrap().instantiates().collect::<Vec<_>>();
    assert_eq!(edges(&graph), vec![child]);
    graph.destroy(first).unwrap();
    assert_eq!(edges(&graph), vec![child]);
    graph.destroy(second).unwrap();
    assert!(edges(&graph).is_empty());
    assert_eq!(graph.scope(child).unwrap().instantiated_by().count(), 0);
}

// Removal

#[test]
fn remove_scope_requires_no_instances() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let (child, x, sum) = doubling_scope(&mut graph);
    let arg = num(&mut graph, root, 1.0);
    let instance = graph.add_scope_instance(root, child, &[arg]).unwrap();

    assert_eq!(
        graph.remove_scope(child).unwrap_err(),
        IrError::Structural(StructuralError::ScopeStillInstantiated {
            scope: child,
            instances: 1
        })
    );

    graph.destroy(instance).unwrap();
    let log = EventLog::attach(&mut graph);
    graph.remove_scope(child).unwrap();
    assert!(!graph.is_alive(x));
    assert!(!graph.is_alive(sum));
    assert_eq!(log.take().last(), Some(&GraphEvent::ScopeRemoved(child)));
    assert_eq!(
        graph.scope(child).unwrap_err(),
        IrError::Structural(StructuralError::ScopeRemoved(child))
    );
    assert_eq!(graph.live_scopes().collect::<Vec<_>>(), vec![root]);
}

#[test]
fn flush_empties_the_scope() {
    let mut graph = Graph::new();
    let (child, _, _) = doubling_scope(&mut graph);
    graph.flush(child).unwrap();
    let data = graph.scope(child).unwrap();
    assert!(data.computables().is_empty());
    assert!(data.parameters().is_empty());
    assert!(data.outputs().is_empty());
}

// Ordering

#[test]
fn sorted_computables_put_inputs_first() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let a = num(&mut graph, root, 1.0);
    let b = num(&mut graph, root, 2.0);
    let t = graph.add_tuple(root, &[b, a]).unwrap();
    graph.set_input(t, 0, a).unwrap();
    let c = graph.add_tuple(root, &[t]).unwrap();

    let order = graph.sorted_computables(root).unwrap();
    let at = |id| order.iter().position(|&x| x == id).unwrap();
    assert!(at(a) < at(t));
    assert!(at(t) < at(c));
    assert_eq!(order.len(), 4);
}

#[test]
fn sorted_scopes_put_children_first() {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let middle = graph.create_scope("middle", ScopeRole::Internal);
    let leaf = graph.create_scope("leaf", ScopeRole::Internal);
    graph.add_scope_instance(middle, leaf, &[]).unwrap();
    graph.add_scope_instance(root, middle, &[]).unwrap();

    assert_eq!(graph.sorted_scopes().unwrap(), vec![leaf, middle, root]);
}

#[test]
fn instantiation_cycles_are_reported() {
    let mut graph = Graph::new();
    let a = graph.create_scope("a", ScopeRole::Internal);
    let b = graph.create_scope("b", ScopeRole::Internal);
    graph.add_scope_instance(a, b, &[]).unwrap();
    graph.add_scope_instance(b, a, &[]).unwrap();

    let err = graph.sorted_scopes().unwrap_err();
    assert!(matches!(
        err,
        IrError::Structural(StructuralError::ScopeCycle(s)) if s == a || s == b
    ));
}

// Cloning

#[test]
fn clone_scope_is_isomorphic_and_disjoint() {
    let mut graph = Graph::new();
    let (child, x, sum) = doubling_scope(&mut graph);
    let copy = graph.clone_scope(child).unwrap();

    let data = graph.scope(copy).unwrap();
    assert_eq!(data.parameters().len(), 1);
    let new_x = data.parameters()[0];
    let new_sum = data.output("doubled").unwrap();
    assert_ne!(new_x, x);
    assert_ne!(new_sum, sum);
    assert_eq!(graph.inputs(new_sum).unwrap(), &[new_x, new_x]);
    assert_eq!(graph.kind(new_sum).unwrap(), graph.kind(sum).unwrap());
    assert!(graph.dependees(new_sum).unwrap().is_empty());
    assert_eq!(graph.scope_output_type(copy).unwrap(), graph.scope_output_type(child).unwrap());
    assert_eq!(graph.scope(copy).unwrap().computables().len(), 2);
}
