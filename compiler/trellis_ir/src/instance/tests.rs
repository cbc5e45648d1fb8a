use pretty_assertions::assert_eq;

use super::*;
use crate::computable::{PrimitiveOp, INTERMEDIATE_FIELD};
use crate::error::IrError;
use crate::scope::ScopeRole;

fn setup() -> (Graph, ScopeId, ComputableId) {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    let flag = graph
        .add_external_ref(root, "flag", IrType::Boolean)
        .unwrap();
    (graph, root, flag)
}

/// A scope with no parameters exposing `label` as a string literal.
fn label_scope(graph: &mut Graph, text: &str) -> ScopeId {
    let scope = graph.create_scope(text, ScopeRole::Internal);
    let lit = graph.add_literal(scope, LiteralValue::string(text)).unwrap();
    graph.add_output(scope, lit, "label").unwrap();
    scope
}

// Polymorphic instances

#[test]
fn truthy_falsy_instance_is_recognised() {
    let (mut graph, root, flag) = setup();
    let yes = label_scope(&mut graph, "yes");
    let no = label_scope(&mut graph, "no");
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    assert!(!graph.is_truthy_falsy(instance).unwrap());

    graph.add_choice(instance, IrType::Truthy, yes, &[]).unwrap();
    graph.add_choice(instance, IrType::Falsy, no, &[]).unwrap();
    assert!(graph.is_truthy_falsy(instance).unwrap());
    assert_eq!(
        graph.output_type(instance).unwrap(),
        &IrType::compound([(
            "label",
            IrType::union([
                IrType::ExactValue(LiteralValue::string("yes")),
                IrType::ExactValue(LiteralValue::string("no")),
            ])
        )])
    );
}

#[test]
fn exact_keys_are_not_truthy_falsy() {
    let (mut graph, root, flag) = setup();
    let yes = label_scope(&mut graph, "yes");
    let no = label_scope(&mut graph, "no");
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    graph
        .add_choice(instance, IrType::exact(LiteralValue::Bool(true)), yes, &[])
        .unwrap();
    graph.add_choice(instance, IrType::Falsy, no, &[]).unwrap();
    assert!(!graph.is_truthy_falsy(instance).unwrap());
}

#[test]
fn active_choice_follows_truthiness() {
    let (mut graph, root, flag) = setup();
    let yes = label_scope(&mut graph, "yes");
    let no = label_scope(&mut graph, "no");
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    graph.add_choice(instance, IrType::Truthy, yes, &[]).unwrap();
    graph.add_choice(instance, IrType::Falsy, no, &[]).unwrap();

    let pick = |g: &Graph, v: LiteralValue| g.active_choice(instance, &v).unwrap().map(|c| c.scope);
    assert_eq!(pick(&graph, LiteralValue::Bool(false)), Some(no));
    assert_eq!(pick(&graph, LiteralValue::string("x")), Some(yes));
    assert_eq!(pick(&graph, LiteralValue::number(0.0)), Some(no));
}

#[test]
fn overlapping_keys_are_rejected() {
    let (mut graph, root, flag) = setup();
    let yes = label_scope(&mut graph, "yes");
    let again = label_scope(&mut graph, "again");
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    graph.add_choice(instance, IrType::Truthy, yes, &[]).unwrap();

    let key = IrType::exact(LiteralValue::Bool(true));
    assert_eq!(
        graph.add_choice(instance, key.clone(), again, &[]).unwrap_err(),
        IrError::Usage(UsageError::OverlappingChoiceKey {
            key,
            existing: IrType::Truthy
        })
    );
    assert!(matches!(
        graph.add_choice(instance, IrType::Truthy, again, &[]).unwrap_err(),
        IrError::Usage(UsageError::OverlappingChoiceKey { .. })
    ));
    assert_eq!(graph.scope(again).unwrap().instances().len(), 0);
}

#[test]
fn keys_must_be_exact_or_truthiness() {
    let (mut graph, root, flag) = setup();
    let yes = label_scope(&mut graph, "yes");
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    assert_eq!(
        graph.add_choice(instance, IrType::Boolean, yes, &[]).unwrap_err(),
        IrError::Usage(UsageError::InvalidChoiceKey(IrType::Boolean))
    );
}

#[test]
fn choices_must_agree_on_output_fields() {
    let (mut graph, root, flag) = setup();
    let yes = label_scope(&mut graph, "yes");
    let other = graph.create_scope("other", ScopeRole::Internal);
    let lit = graph.add_literal(other, LiteralValue::Null).unwrap();
    graph.add_output(other, lit, "title").unwrap();

    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    graph.add_choice(instance, IrType::Truthy, yes, &[]).unwrap();
    let before = graph.output_type(instance).unwrap().clone();

    let err = graph
        .add_choice(instance, IrType::Falsy, other, &[])
        .unwrap_err();
    assert!(matches!(err, IrError::Usage(UsageError::MalformedChoice(_))));
    assert_eq!(graph.kind(instance).unwrap().choices().len(), 1);
    assert_eq!(graph.output_type(instance).unwrap(), &before);
}

#[test]
fn choice_arguments_bind_child_parameters() {
    let (mut graph, root, flag) = setup();
    let child = graph.create_scope("shout", ScopeRole::Internal);
    let text = graph.add_parameter(child, IrType::String).unwrap();
    graph.add_output(child, text, "label").unwrap();
    let quiet = label_scope(&mut graph, "quiet");

    let word = graph.add_literal(root, LiteralValue::string("hi")).unwrap();
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    graph.add_choice(instance, IrType::Truthy, child, &[word]).unwrap();
    graph.add_choice(instance, IrType::Falsy, quiet, &[]).unwrap();

    assert_eq!(graph.choice_args(instance, 0).unwrap(), &[word]);
    assert!(graph.choice_args(instance, 1).unwrap().is_empty());
    assert_eq!(graph.dependees(word).unwrap()[&instance].as_slice(), &[1]);
    assert_eq!(
        graph.scope(root).unwrap().instantiates().collect::<Vec<_>>(),
        vec![child, quiet]
    );

    let number = graph.add_literal(root, LiteralValue::number(1.0)).unwrap();
    let other = label_scope(&mut graph, "other");
    let err = graph
        .add_choice(
            instance,
            IrType::exact(LiteralValue::string("x")),
            other,
            &[number],
        )
        .unwrap_err();
    assert_eq!(
        err,
        IrError::Structural(StructuralError::ArityMismatch {
            expected: 0,
            found: 1
        })
    );
}

#[test]
fn a_choice_cannot_target_its_own_scope() {
    let (mut graph, root, flag) = setup();
    let instance = graph.add_polymorphic_instance(root, flag).unwrap();
    assert_eq!(
        graph.add_choice(instance, IrType::Truthy, root, &[]).unwrap_err(),
        IrError::Structural(StructuralError::SelfInstantiation(root))
    );
}

// Iteration

/// `fold(item, acc: Number, captured: Any...) -> { intermediate: acc + acc }`.
fn fold_scope(graph: &mut Graph, captured: usize) -> ScopeId {
    let scope = graph.create_scope("fold", ScopeRole::Internal);
    graph.add_parameter(scope, IrType::Any).unwrap();
    let acc = graph.add_parameter(scope, IrType::Number).unwrap();
    for _ in 0..captured {
        graph.add_parameter(scope, IrType::Any).unwrap();
    }
    let next = graph.add_primitive(scope, PrimitiveOp::Add, &[acc, acc]).unwrap();
    graph.add_output(scope, next, INTERMEDIATE_FIELD).unwrap();
    scope
}

fn iteration_inputs(graph: &mut Graph, root: ScopeId) -> (ComputableId, ComputableId) {
    let items = graph
        .add_external_ref(root, "items", IrType::Any)
        .unwrap();
    let zero = graph.add_literal(root, LiteralValue::number(0.0)).unwrap();
    (items, zero)
}

#[test]
fn bare_iteration_folds_over_one_choice() {
    let (mut graph, root, _) = setup();
    let fold = fold_scope(&mut graph, 1);
    let (items, zero) = iteration_inputs(&mut graph, root);
    let extra = graph.add_literal(root, LiteralValue::Null).unwrap();

    let node = graph
        .add_iterate_array(
            root,
            IterateSpec {
                source: items,
                initial: zero,
                identity: None,
                map: None,
                choices: vec![ChoiceSpec::new(fold, [extra])],
            },
        )
        .unwrap();

    let ComputableKind::IterateArray(config) = graph.kind(node).unwrap() else {
        panic!("expected an iteration");
    };
    assert!(config.is_bare());
    assert_eq!(config.first_choice_arg(), 2);
    assert!(is_type_contained(
        &IrType::Number,
        graph.output_type(node).unwrap()
    ));
    assert_eq!(graph.scope(fold).unwrap().instances().len(), 1);
}

#[test]
fn mapped_iteration_takes_keyed_choices() {
    let (mut graph, root, _) = setup();
    let even = fold_scope(&mut graph, 0);
    let odd = fold_scope(&mut graph, 0);
    let (items, zero) = iteration_inputs(&mut graph, root);
    let identity = graph
        .add_external_ref(root, "by_id", IrType::Callback)
        .unwrap();
    let map = graph
        .add_external_ref(root, "parity", IrType::Callback)
        .unwrap();

    let spec = IterateSpec {
        source: items,
        initial: zero,
        identity: Some(identity),
        map: Some(map),
        choices: vec![
            ChoiceSpec::new(even, []).keyed(IrType::Truthy),
            ChoiceSpec::new(odd, []).keyed(IrType::Falsy),
        ],
    };
    let node = graph.add_iterate_array(root, spec).unwrap();
    let ComputableKind::IterateArray(config) = graph.kind(node).unwrap() else {
        panic!("expected an iteration");
    };
    assert!(!config.is_bare());
    assert_eq!(config.identity_position(), Some(2));
    assert_eq!(config.map_position(), Some(3));
    assert_eq!(graph.inputs(node).unwrap(), &[items, zero, identity, map]);
}

#[test]
fn several_choices_need_a_map() {
    let (mut graph, root, _) = setup();
    let a = fold_scope(&mut graph, 0);
    let b = fold_scope(&mut graph, 0);
    let (items, zero) = iteration_inputs(&mut graph, root);
    let err = graph
        .add_iterate_array(
            root,
            IterateSpec {
                source: items,
                initial: zero,
                identity: None,
                map: None,
                choices: vec![ChoiceSpec::new(a, []), ChoiceSpec::new(b, [])],
            },
        )
        .unwrap_err();
    assert!(matches!(err, IrError::Usage(UsageError::MalformedIteration(_))));
    assert_eq!(graph.scope(a).unwrap().instances().len(), 0);
}

#[test]
fn callbacks_must_be_callbacks() {
    let (mut graph, root, flag) = setup();
    let fold = fold_scope(&mut graph, 0);
    let (items, zero) = iteration_inputs(&mut graph, root);
    let err = graph
        .add_iterate_array(
            root,
            IterateSpec {
                source: items,
                initial: zero,
                identity: Some(flag),
                map: None,
                choices: vec![ChoiceSpec::new(fold, [])],
            },
        )
        .unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
}

#[test]
fn initial_value_must_fit_the_accumulator() {
    let (mut graph, root, _) = setup();
    let fold = fold_scope(&mut graph, 0);
    let (items, _) = iteration_inputs(&mut graph, root);
    let word = graph.add_literal(root, LiteralValue::string("x")).unwrap();
    let err = graph
        .add_iterate_array(
            root,
            IterateSpec {
                source: items,
                initial: word,
                identity: None,
                map: None,
                choices: vec![ChoiceSpec::new(fold, [])],
            },
        )
        .unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
}

#[test]
fn choice_scopes_must_produce_an_intermediate() {
    let (mut graph, root, _) = setup();
    let scope = graph.create_scope("no_acc", ScopeRole::Internal);
    graph.add_parameter(scope, IrType::Any).unwrap();
    let acc = graph.add_parameter(scope, IrType::Number).unwrap();
    graph.add_output(scope, acc, "result").unwrap();
    let (items, zero) = iteration_inputs(&mut graph, root);

    let err = graph
        .add_iterate_array(
            root,
            IterateSpec {
                source: items,
                initial: zero,
                identity: None,
                map: None,
                choices: vec![ChoiceSpec::new(scope, [])],
            },
        )
        .unwrap_err();
    assert!(matches!(err, IrError::Usage(UsageError::MalformedIteration(_))));
}

#[test]
fn intermediate_output_must_fit_its_own_parameter() {
    let (mut graph, root, _) = setup();
    let scope = graph.create_scope("bad_acc", ScopeRole::Internal);
    graph.add_parameter(scope, IrType::Any).unwrap();
    graph.add_parameter(scope, IrType::Number).unwrap();
    let word = graph.add_literal(scope, LiteralValue::string("x")).unwrap();
    graph.add_output(scope, word, INTERMEDIATE_FIELD).unwrap();
    let (items, zero) = iteration_inputs(&mut graph, root);

    let err = graph
        .add_iterate_array(
            root,
            IterateSpec {
                source: items,
                initial: zero,
                identity: None,
                map: None,
                choices: vec![ChoiceSpec::new(scope, [])],
            },
        )
        .unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
}

// Reconciliation

#[test]
fn reconcile_reuses_matching_keys() {
    let plan = reconcile(&["a", "b", "c"], &["c", "a", "d"]);
    assert_eq!(
        plan.actions,
        vec![
            ElementAction::Reuse(2),
            ElementAction::Reuse(0),
            ElementAction::Create
        ]
    );
    assert_eq!(plan.teardown, vec![1]);
}

#[test]
fn reconcile_matches_each_old_element_once() {
    let plan = reconcile(&[1, 1, 2], &[1, 1, 1]);
    assert_eq!(
        plan.actions,
        vec![
            ElementAction::Reuse(0),
            ElementAction::Reuse(1),
            ElementAction::Create
        ]
    );
    assert_eq!(plan.teardown, vec![2]);
}

#[test]
fn reconcile_from_empty_creates_everything() {
    let plan = reconcile::<u32>(&[], &[4, 5]);
    assert_eq!(plan.actions, vec![ElementAction::Create; 2]);
    assert!(plan.teardown.is_empty());
}
