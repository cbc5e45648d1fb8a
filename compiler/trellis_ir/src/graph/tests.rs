use pretty_assertions::assert_eq;

use super::*;
use crate::computable::PrimitiveOp;
use crate::error::{IrError, StructuralError, UsageError};
use crate::scope::ScopeRole;
use crate::test_helpers::EventLog;
use crate::types::LiteralValue;

fn num(graph: &mut Graph, scope: ScopeId, n: f64) -> ComputableId {
    graph.add_literal(scope, LiteralValue::number(n)).unwrap()
}

fn text(graph: &mut Graph, scope: ScopeId, s: &str) -> ComputableId {
    graph.add_literal(scope, LiteralValue::string(s)).unwrap()
}

fn setup() -> (Graph, ScopeId) {
    let mut graph = Graph::new();
    let scope = graph.create_scope("root", ScopeRole::EntryPoint);
    (graph, scope)
}

/// No live node may reference a destroyed one, in either direction.
fn assert_no_dangling(graph: &Graph) {
    for id in graph.live_computables() {
        for &input in graph.inputs(id).unwrap() {
            assert!(graph.is_alive(input), "{id} reads destroyed {input}");
        }
        for dependee in graph.dependees(id).unwrap().keys() {
            assert!(graph.is_alive(*dependee), "{id} lists destroyed {dependee}");
        }
    }
}

// Creation

#[test]
fn literal_output_is_its_exact_value() {
    let (mut graph, root) = setup();
    let lit = num(&mut graph, root, 3.0);
    assert_eq!(
        graph.output_type(lit).unwrap(),
        &IrType::ExactValue(LiteralValue::number(3.0))
    );
    assert_eq!(graph.containing_scope(lit), Some(root));
}

#[test]
fn ids_are_sequential_per_graph() {
    let (mut a, ra) = setup();
    let (mut b, rb) = setup();
    assert_eq!(num(&mut a, ra, 1.0), ComputableId::new(0));
    assert_eq!(num(&mut a, ra, 2.0), ComputableId::new(1));
    assert_eq!(num(&mut b, rb, 1.0), ComputableId::new(0));
}

#[test]
fn parameters_cannot_be_created_directly() {
    let (mut graph, root) = setup();
    let err = graph
        .create_computable(
            root,
            ComputableKind::ScopeParameter {
                position: 0,
                ty: IrType::Any,
            },
            [],
        )
        .unwrap_err();
    assert!(matches!(err, IrError::Usage(UsageError::UnexpectedKind { .. })));
}

#[test]
fn arity_is_checked_and_nothing_is_allocated() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let err = graph.create_computable(root, ComputableKind::Conditional, [a, a]);
    assert_eq!(
        err.unwrap_err(),
        IrError::Structural(StructuralError::ArityMismatch {
            expected: 3,
            found: 2
        })
    );
    assert_eq!(graph.live_computables().count(), 1);
    assert!(graph.dependees(a).unwrap().is_empty());
}

#[test]
fn inputs_must_share_the_consumer_scope() {
    let (mut graph, root) = setup();
    let other = graph.create_scope("other", ScopeRole::Internal);
    let foreign = num(&mut graph, other, 1.0);
    let err = graph.add_tuple(root, &[foreign]).unwrap_err();
    assert_eq!(
        err,
        IrError::Structural(StructuralError::WrongScope {
            input: foreign,
            expected: root,
            found: other,
        })
    );
}

#[test]
fn void_outputs_are_never_accepted_as_inputs() {
    let (mut graph, root) = setup();
    let place = graph.add_virtual_placement(root).unwrap();
    let element = graph.add_view_node(place, "div").unwrap();
    let value = text(&mut graph, root, "x");
    let attr = graph.add_attribute(element, "title", value).unwrap();
    assert!(graph.output_type(attr).unwrap().is_void());

    let err = graph.add_tuple(root, &[attr]).unwrap_err();
    assert_eq!(err, IrError::Structural(StructuralError::VoidInput(attr)));
}

#[test]
fn add_requires_numbers() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let s = text(&mut graph, root, "b");
    let sum = graph.add_primitive(root, PrimitiveOp::Add, &[a, a]).unwrap();
    assert_eq!(graph.output_type(sum).unwrap(), &IrType::Number);

    let err = graph.add_primitive(root, PrimitiveOp::Add, &[a, s]).unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
}

#[test]
fn projection_of_a_missing_field_fails() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let record = graph.add_compound_literal(root, [("x", a)]).unwrap();
    assert!(graph.add_projection(record, "x").is_ok());
    assert!(matches!(
        graph.add_projection(record, "y").unwrap_err(),
        IrError::Type(_)
    ));
}

// set_input

#[test]
fn set_input_moves_the_dependee_entry() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let b = num(&mut graph, root, 2.0);
    let tuple = graph.add_tuple(root, &[a, a]).unwrap();
    assert_eq!(graph.dependees(a).unwrap()[&tuple].as_slice(), &[0, 1]);

    graph.set_input(tuple, 1, b).unwrap();
    assert_eq!(graph.input(tuple, 1).unwrap(), b);
    assert_eq!(graph.dependees(b).unwrap()[&tuple].as_slice(), &[1]);
    // `a` is still referenced at position 0.
    assert_eq!(graph.dependees(a).unwrap()[&tuple].as_slice(), &[0]);

    graph.set_input(tuple, 0, b).unwrap();
    assert!(graph.dependees(a).unwrap().is_empty());
    assert_eq!(graph.dependee_count(b).unwrap(), 1);
}

#[test]
fn set_input_to_the_same_value_is_a_no_op() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let tuple = graph.add_tuple(root, &[a]).unwrap();
    let log = EventLog::attach(&mut graph);
    graph.set_input(tuple, 0, a).unwrap();
    assert!(log.take().is_empty());
}

#[test]
fn set_input_rejects_destroyed_inputs() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let b = num(&mut graph, root, 2.0);
    let tuple = graph.add_tuple(root, &[a]).unwrap();
    graph.destroy(b).unwrap();
    assert_eq!(
        graph.set_input(tuple, 0, b).unwrap_err(),
        IrError::Structural(StructuralError::Destroyed(b))
    );
    assert_eq!(graph.input(tuple, 0).unwrap(), a);
}

#[test]
fn set_input_out_of_range() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let tuple = graph.add_tuple(root, &[a]).unwrap();
    assert_eq!(
        graph.set_input(tuple, 3, a).unwrap_err(),
        IrError::Structural(StructuralError::InputOutOfRange {
            computable: tuple,
            position: 3
        })
    );
}

#[test]
fn retyping_propagates_to_dependees() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let s = text(&mut graph, root, "hello");
    let record = graph.add_compound_literal(root, [("x", a)]).unwrap();
    let field = graph.add_projection(record, "x").unwrap();
    let wrapped = graph.add_tuple(root, &[field]).unwrap();

    graph.set_input(record, 0, s).unwrap();
    let exact = IrType::ExactValue(LiteralValue::string("hello"));
    assert_eq!(graph.output_type(field).unwrap(), &exact);
    assert_eq!(
        graph.output_type(wrapped).unwrap(),
        &IrType::Tuple(vec![exact])
    );
}

#[test]
fn failed_propagation_commits_nothing() {
    let (mut graph, root) = setup();
    let flag = graph.add_literal(root, LiteralValue::Bool(true)).unwrap();
    let one = num(&mut graph, root, 1.0);
    let two = num(&mut graph, root, 2.0);
    let s = text(&mut graph, root, "oops");
    let choice = graph.add_conditional(flag, one, two).unwrap();
    let state = graph.add_state(choice, IrType::Number).unwrap();
    let before = graph.output_type(choice).unwrap().clone();

    let err = graph.set_input(choice, 1, s).unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
    assert_eq!(graph.input(choice, 1).unwrap(), one);
    assert_eq!(graph.output_type(choice).unwrap(), &before);
    assert!(graph.dependees(s).unwrap().is_empty());
    assert_eq!(graph.input(state, 0).unwrap(), choice);
}

#[test]
fn replace_uses_rebinds_every_position() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let b = num(&mut graph, root, 2.0);
    let t1 = graph.add_tuple(root, &[a, a]).unwrap();
    let t2 = graph.add_tuple(root, &[a]).unwrap();

    graph.replace_uses(a, b).unwrap();
    assert!(graph.dependees(a).unwrap().is_empty());
    assert_eq!(graph.inputs(t1).unwrap(), &[b, b]);
    assert_eq!(graph.inputs(t2).unwrap(), &[b]);
}

#[test]
fn set_input_rejects_cycles() {
    let (mut graph, root) = setup();
    let lit = graph.add_literal(root, LiteralValue::Bool(true)).unwrap();
    let c = graph.add_primitive(root, PrimitiveOp::Not, &[lit]).unwrap();
    let d = graph.add_primitive(root, PrimitiveOp::Not, &[c]).unwrap();

    assert_eq!(
        graph.set_input(c, 0, d).unwrap_err(),
        IrError::Structural(StructuralError::ComputableCycle(c))
    );
    assert_eq!(
        graph.set_input(c, 0, c).unwrap_err(),
        IrError::Structural(StructuralError::ComputableCycle(c))
    );
    assert_eq!(graph.input(c, 0).unwrap(), lit);
    assert!(graph.dependees(d).unwrap().is_empty());
    assert_eq!(graph.sorted_computables(root).unwrap(), vec![lit, c, d]);

    graph.destroy(c).unwrap();
    assert!(!graph.is_alive(d));
}

#[test]
fn depends_on_follows_inputs_transitively() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let b = num(&mut graph, root, 2.0);
    let inner = graph.add_tuple(root, &[a]).unwrap();
    let outer = graph.add_tuple(root, &[inner]).unwrap();
    assert!(graph.depends_on(outer, a).unwrap());
    assert!(graph.depends_on(outer, outer).unwrap());
    assert!(!graph.depends_on(outer, b).unwrap());
    assert!(!graph.depends_on(a, outer).unwrap());
}

#[test]
fn replace_uses_is_all_or_nothing() {
    let (mut graph, root) = setup();
    let old = num(&mut graph, root, 1.0);
    let tuple = graph.add_tuple(root, &[old]).unwrap();
    let sum = graph.add_primitive(root, PrimitiveOp::Add, &[old, old]).unwrap();
    let x = text(&mut graph, root, "x");

    let err = graph.replace_uses(old, x).unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
    assert_eq!(graph.inputs(tuple).unwrap(), &[old]);
    assert_eq!(graph.inputs(sum).unwrap(), &[old, old]);
    assert!(graph.dependees(x).unwrap().is_empty());
    assert_eq!(graph.dependee_count(old).unwrap(), 2);
}

#[test]
fn replace_uses_rejects_cycles() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let inner = graph.add_tuple(root, &[a]).unwrap();
    let outer = graph.add_tuple(root, &[inner]).unwrap();

    assert_eq!(
        graph.replace_uses(a, outer).unwrap_err(),
        IrError::Structural(StructuralError::ComputableCycle(inner))
    );
    assert_eq!(graph.inputs(inner).unwrap(), &[a]);
}

// destroy

#[test]
fn destroy_clears_the_scope_reference() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    assert!(graph.containing_scope(a).is_some());
    graph.destroy(a).unwrap();
    assert_eq!(graph.containing_scope(a), None);
    assert!(!graph.scope(root).unwrap().computables().contains(&a));
    assert_eq!(
        graph.destroy(a).unwrap_err(),
        IrError::Structural(StructuralError::Destroyed(a))
    );
}

#[test]
fn destroy_cascades_to_transitive_dependees() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let keep = num(&mut graph, root, 2.0);
    let b = graph.add_tuple(root, &[a, keep]).unwrap();
    let c = graph.add_tuple(root, &[b]).unwrap();
    let d = graph.add_primitive(root, PrimitiveOp::Add, &[a, keep]).unwrap();
    let unrelated = graph.add_tuple(root, &[keep]).unwrap();

    graph.destroy(a).unwrap();
    for dead in [a, b, c, d] {
        assert!(!graph.is_alive(dead));
    }
    assert!(graph.is_alive(keep));
    assert!(graph.is_alive(unrelated));
    assert_eq!(graph.dependee_count(keep).unwrap(), 1);
    assert_no_dangling(&graph);
}

#[test]
fn destroying_an_output_unregisters_it() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    graph.add_output(root, a, "value").unwrap();
    graph.destroy(a).unwrap();
    assert!(graph.scope(root).unwrap().outputs().is_empty());
    assert!(graph.scope_output_type(root).unwrap().is_void());
}

// clone

#[test]
fn clone_rebuilds_the_same_kind_without_dependees() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let b = num(&mut graph, root, 2.0);
    let sum = graph.add_primitive(root, PrimitiveOp::Add, &[a, a]).unwrap();
    graph.add_tuple(root, &[sum]).unwrap();

    let copy = graph.clone_computable(sum, Some(&[a, b]), None).unwrap();
    assert_ne!(copy, sum);
    assert_eq!(graph.kind(copy).unwrap(), graph.kind(sum).unwrap());
    assert_eq!(graph.inputs(copy).unwrap(), &[a, b]);
    assert!(graph.dependees(copy).unwrap().is_empty());
}

#[test]
fn destroyed_nodes_cannot_be_cloned() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    graph.destroy(a).unwrap();
    assert!(graph.clone_computable(a, None, None).is_err());
}

#[test]
fn parameters_clone_in_position_order() {
    let (mut graph, _) = setup();
    let source = graph.create_scope("source", ScopeRole::Internal);
    let p0 = graph.add_parameter(source, IrType::Number).unwrap();
    let p1 = graph.add_parameter(source, IrType::String).unwrap();
    let target = graph.create_scope("target", ScopeRole::Internal);

    let err = graph.clone_computable(p1, None, Some(target)).unwrap_err();
    assert_eq!(
        err,
        IrError::Structural(StructuralError::ParameterOrder {
            scope: target,
            expected: 0,
            found: 1
        })
    );
    let c0 = graph.clone_computable(p0, None, Some(target)).unwrap();
    let c1 = graph.clone_computable(p1, None, Some(target)).unwrap();
    assert_eq!(graph.scope(target).unwrap().parameters(), &[c0, c1]);
    assert_eq!(graph.output_type(c1).unwrap(), &IrType::String);
}

// traits

#[test]
fn invariance_flows_through_pure_nodes() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let sum = graph.add_primitive(root, PrimitiveOp::Add, &[a, a]).unwrap();
    assert!(graph.is_invariant(sum).unwrap());
    assert_eq!(graph.classify_phase(sum).unwrap(), EvaluationPhase::Static);

    let state = graph.add_state(a, IrType::Number).unwrap();
    let derived = graph.add_primitive(root, PrimitiveOp::Add, &[state, a]).unwrap();
    assert!(graph.is_mutable(derived).unwrap());
    assert!(!graph.is_invariant(derived).unwrap());
    assert_eq!(graph.classify_phase(derived).unwrap(), EvaluationPhase::Reactive);
}

#[test]
fn parameters_are_not_invariant() {
    let (mut graph, _) = setup();
    let scope = graph.create_scope("s", ScopeRole::Internal);
    let p = graph.add_parameter(scope, IrType::Number).unwrap();
    let neg = graph.add_primitive(scope, PrimitiveOp::Not, &[p]).unwrap();
    assert!(!graph.is_invariant(neg).unwrap());
    assert_eq!(graph.classify_phase(neg).unwrap(), EvaluationPhase::Mount);
}

#[test]
fn declared_call_traits_are_honored() {
    let (mut graph, root) = setup();
    let fetch = graph
        .add_call(root, "load", &[], IrType::Any, ComputableTraits::ASYNC)
        .unwrap();
    assert!(graph.is_async(fetch).unwrap());
    assert_eq!(graph.classify_phase(fetch).unwrap(), EvaluationPhase::Deferred);
}

#[test]
fn instances_inherit_effects_of_their_scope() {
    let (mut graph, root) = setup();
    let child = graph.create_scope("child", ScopeRole::Internal);
    let place = graph.add_parameter(child, IrType::Placement).unwrap();
    let node = graph.add_view_node(place, "span").unwrap();
    graph.add_output(child, node, "after").unwrap();

    let at = graph.add_virtual_placement(root).unwrap();
    let instance = graph.add_scope_instance(root, child, &[at]).unwrap();
    assert!(graph.is_side_effect_causing(instance).unwrap());
    assert!(!graph.is_side_effect_causing(at).unwrap());
}

#[test]
fn mutually_instantiating_scopes_fail_the_trait_fold() {
    let mut graph = Graph::new();
    let a = graph.create_scope("a", ScopeRole::Internal);
    let b = graph.create_scope("b", ScopeRole::Internal);
    let in_a = graph.add_scope_instance(a, b, &[]).unwrap();
    let in_b = graph.add_scope_instance(b, a, &[]).unwrap();

    assert!(matches!(
        graph.traits(in_a).unwrap_err(),
        IrError::Structural(StructuralError::ScopeCycle(_))
    ));
    assert!(graph.is_side_effect_causing(in_b).is_err());
    assert!(graph.sorted_scopes().is_err());
}

#[test]
fn trait_memo_is_cleared_on_mutation() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let state = graph.add_state(a, IrType::Number).unwrap();
    let sum = graph.add_primitive(root, PrimitiveOp::Add, &[a, a]).unwrap();
    assert!(graph.is_invariant(sum).unwrap());

    graph.set_input(sum, 1, state).unwrap();
    assert!(!graph.is_invariant(sum).unwrap());
}

// observers

#[test]
fn observers_see_committed_mutations_in_order() {
    let (mut graph, root) = setup();
    let log = EventLog::attach(&mut graph);
    let a = num(&mut graph, root, 1.0);
    let t = graph.add_tuple(root, &[a]).unwrap();
    assert_eq!(
        log.take(),
        vec![
            GraphEvent::ComputableAdded {
                computable: a,
                scope: root
            },
            GraphEvent::DependeeAdded {
                input: a,
                dependee: t,
                position: 0
            },
            GraphEvent::ComputableAdded {
                computable: t,
                scope: root
            },
        ]
    );

    graph.destroy(a).unwrap();
    assert_eq!(
        log.take(),
        vec![
            GraphEvent::DependeeRemoved {
                input: a,
                dependee: t,
                position: 0
            },
            GraphEvent::Destroyed {
                computable: t,
                scope: root
            },
            GraphEvent::Destroyed {
                computable: a,
                scope: root
            },
        ]
    );
}

#[test]
fn failed_operations_emit_nothing() {
    let (mut graph, root) = setup();
    let a = num(&mut graph, root, 1.0);
    let log = EventLog::attach(&mut graph);
    assert!(graph
        .create_computable(root, ComputableKind::Conditional, [a])
        .is_err());
    assert!(log.take().is_empty());
}
