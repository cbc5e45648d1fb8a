//! The fixed optimizer pipeline.
//!
//! Passes run once each, in [`PassKind::ALL`] order, skipping those the
//! configuration disables. Passes only ever read and produce valid
//! graphs, so an error from one of them is an internal defect: the run
//! stops and reports which pass failed.

use thiserror::Error;
use trellis_ir::{Graph, IrError};

use crate::config::{OptimizerConfig, PassKind};
use crate::dce::eliminate_dead_code;
use crate::element_arg::cleanup_element_arguments;
use crate::inline::{inline_scopes, InlinePolicy};
use crate::pushdown::push_down_computables;

/// A pass failed; the graph must not be used for code generation.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("optimizer pass `{pass}` failed: {source}")]
    PassFailed {
        pass: PassKind,
        #[source]
        source: IrError,
    },
}

/// Changes made by one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassReport {
    pub pass: PassKind,
    pub changes: usize,
}

/// Per-pass outcome of one [`optimize`] run, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub passes: Vec<PassReport>,
}

impl PipelineReport {
    pub fn total_changes(&self) -> usize {
        self.passes.iter().map(|p| p.changes).sum()
    }

    /// Changes made by `pass`; `None` if it did not run.
    pub fn changes_for(&self, pass: PassKind) -> Option<usize> {
        self.passes
            .iter()
            .find(|p| p.pass == pass)
            .map(|p| p.changes)
    }
}

/// Run every enabled pass once over `graph`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn optimize(
    graph: &mut Graph,
    config: &OptimizerConfig,
) -> Result<PipelineReport, OptimizeError> {
    let mut report = PipelineReport::default();
    for pass in config.enabled_passes() {
        let changes = run_pass(graph, pass, config)
            .map_err(|source| OptimizeError::PassFailed { pass, source })?;
        tracing::debug!(%pass, changes, "pass finished");
        report.passes.push(PassReport { pass, changes });
    }
    tracing::debug!(total = report.total_changes(), "optimization finished");
    Ok(report)
}

fn run_pass(graph: &mut Graph, pass: PassKind, config: &OptimizerConfig) -> Result<usize, IrError> {
    let changes = match pass {
        PassKind::DeadCode => eliminate_dead_code(graph)?.changes(),
        PassKind::InlineSingleInstance => {
            inline_scopes(graph, InlinePolicy::SingleInstance)?.changes()
        }
        PassKind::InlineTrivial => inline_scopes(
            graph,
            InlinePolicy::Trivial {
                max_computables: config.trivial_inline_limit(),
            },
        )?
        .changes(),
        PassKind::Pushdown => push_down_computables(graph)?.changes(),
        PassKind::ElementArguments => cleanup_element_arguments(graph)?.changes(),
    };
    Ok(changes)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use trellis_ir::{ComputableTraits, IrType, LiteralValue, PrimitiveOp, ScopeId};

    use super::*;
    use crate::test_helpers::{assert_consistent, graph_with_root, num, scope_with_params};

    /// A component exercising every pass:
    ///
    /// - a dead literal in the root;
    /// - `S(p, q) -> { after: combine(p, q) }`, used once through a projection;
    /// - `counter(label) -> { count: state }`, which cannot be inlined but
    ///   receives a single-use label computed in the root;
    /// - a card element passed through an `ElementArgument`.
    fn component() -> (Graph, ScopeId) {
        let (mut graph, root) = graph_with_root();
        let at = graph.add_parameter(root, IrType::Placement).unwrap();
        num(&mut graph, root, 42.0);

        let (s, params) = scope_with_params(&mut graph, "S", &[IrType::Any, IrType::Any]);
        let combined = graph
            .add_call(s, "combine", &params, IrType::String, ComputableTraits::empty())
            .unwrap();
        graph.add_output(s, combined, "after").unwrap();
        let a = num(&mut graph, root, 1.0);
        let b = num(&mut graph, root, 2.0);
        let instance = graph.add_scope_instance(root, s, &[a, b]).unwrap();
        let after = graph.add_projection(instance, "after").unwrap();
        graph.add_output(root, after, "after").unwrap();

        let (counter, counter_params) =
            scope_with_params(&mut graph, "counter", &[IrType::String, IrType::Placement]);
        let zero = num(&mut graph, counter, 0.0);
        let count = graph.add_state(zero, IrType::Number).unwrap();
        graph.add_output(counter, count, "count").unwrap();
        graph
            .add_text_node(counter_params[1], counter_params[0])
            .unwrap();
        let hello = graph.add_literal(root, LiteralValue::string("hi")).unwrap();
        let label = graph
            .add_primitive(root, PrimitiveOp::Concat, &[hello, hello])
            .unwrap();
        let counter_at = graph.add_virtual_placement(root).unwrap();
        let element = graph
            .add_scope_instance(root, counter, &[label, counter_at])
            .unwrap();
        let count_out = graph.add_projection(element, "count").unwrap();
        graph.add_output(root, count_out, "count").unwrap();
        graph.add_element_argument(at, element).unwrap();

        (graph, root)
    }

    #[test]
    fn every_pass_reports_its_changes() {
        let (mut graph, root) = component();
        let report = optimize(&mut graph, &OptimizerConfig::default()).unwrap();

        let ran: Vec<PassKind> = report.passes.iter().map(|p| p.pass).collect();
        assert_eq!(ran, PassKind::ALL);
        assert_eq!(report.changes_for(PassKind::DeadCode), Some(1));
        assert!(report.changes_for(PassKind::InlineSingleInstance).unwrap() > 0);
        assert_eq!(report.changes_for(PassKind::InlineTrivial), Some(0));
        assert!(report.changes_for(PassKind::Pushdown).unwrap() > 0);
        assert_eq!(report.changes_for(PassKind::ElementArguments), Some(1));

        let after = graph.scope(root).unwrap().output("after").unwrap();
        assert!(matches!(
            graph.kind(after).unwrap(),
            trellis_ir::ComputableKind::Call { .. }
        ));
        assert_consistent(&graph);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let (mut graph, _) = component();
        optimize(&mut graph, &OptimizerConfig::default()).unwrap();
        let again = optimize(&mut graph, &OptimizerConfig::default()).unwrap();
        assert_eq!(again.total_changes(), 0);
    }

    #[test]
    fn disabled_passes_do_not_run() {
        let (mut graph, root) = component();
        let config = OptimizerConfig::new().with_only(&[PassKind::DeadCode]);
        let report = optimize(&mut graph, &config).unwrap();
        assert_eq!(
            report.passes,
            vec![PassReport {
                pass: PassKind::DeadCode,
                changes: 1,
            }]
        );
        assert_eq!(report.changes_for(PassKind::Pushdown), None);
        assert_eq!(graph.live_scopes().count(), 3);
        assert!(graph.scope(root).is_ok());
    }

    #[test]
    fn narrow_arguments_do_not_fail_the_pipeline() {
        let (mut graph, root) = graph_with_root();
        let (child, params) = scope_with_params(&mut graph, "pick_b", &[IrType::Any]);
        let b = graph.add_projection(params[0], "b").unwrap();
        graph.add_output(child, b, "out").unwrap();
        let arg = graph
            .add_literal(root, LiteralValue::record([("a", LiteralValue::number(1.0))]))
            .unwrap();
        let instance = graph.add_scope_instance(root, child, &[arg]).unwrap();
        let out = graph.add_projection(instance, "out").unwrap();
        graph.add_output(root, out, "out").unwrap();

        let report = optimize(&mut graph, &OptimizerConfig::default()).unwrap();

        assert_eq!(report.changes_for(PassKind::InlineSingleInstance), Some(0));
        assert_eq!(report.changes_for(PassKind::Pushdown), Some(0));
        assert!(graph.is_alive(instance));
        assert_consistent(&graph);
    }

    #[test]
    fn pass_failures_name_the_pass() {
        let err = OptimizeError::PassFailed {
            pass: PassKind::Pushdown,
            source: trellis_ir::StructuralError::ScopeCycle(ScopeId::new(0)).into(),
        };
        assert!(err.to_string().starts_with("optimizer pass `pushdown` failed"));
    }

    #[test]
    fn tracing_init_is_repeatable() {
        crate::init_tracing();
        crate::init_tracing();
    }

    /// Root with `literals` numbers and one instance per `(scope, literal,
    /// exported)` entry. Stateful scopes cannot be inlined.
    fn random_component(
        literals: u8,
        stateful: &[bool],
        instances: &[(usize, usize, bool)],
    ) -> (Graph, ScopeId) {
        let (mut graph, root) = graph_with_root();
        let values: Vec<_> = (0..literals)
            .map(|i| num(&mut graph, root, f64::from(i)))
            .collect();
        let scopes: Vec<ScopeId> = stateful
            .iter()
            .enumerate()
            .map(|(i, &has_state)| {
                let (scope, params) =
                    scope_with_params(&mut graph, &format!("s{i}"), &[IrType::Any]);
                let mut inputs = params;
                if has_state {
                    let zero = num(&mut graph, scope, 0.0);
                    inputs.push(graph.add_state(zero, IrType::Number).unwrap());
                }
                let out = graph
                    .add_call(scope, "f", &inputs, IrType::Any, ComputableTraits::empty())
                    .unwrap();
                graph.add_output(scope, out, "out").unwrap();
                scope
            })
            .collect();
        for (i, &(scope, value, exported)) in instances.iter().enumerate() {
            let child = scopes[scope % scopes.len()];
            let arg = values[value % values.len()];
            let instance = graph.add_scope_instance(root, child, &[arg]).unwrap();
            if exported {
                let out = graph.add_projection(instance, "out").unwrap();
                graph.add_output(root, out, format!("o{i}")).unwrap();
            }
        }
        (graph, root)
    }

    proptest! {
        #[test]
        fn optimized_graphs_are_stable(
            literals in 1u8..5,
            stateful in proptest::collection::vec(any::<bool>(), 1..4),
            instances in proptest::collection::vec((0usize..4, 0usize..5, any::<bool>()), 0..6),
        ) {
            let (mut graph, root) = random_component(literals, &stateful, &instances);
            let exported: Vec<String> =
                graph.scope(root).unwrap().outputs().keys().cloned().collect();

            optimize(&mut graph, &OptimizerConfig::default()).unwrap();
            assert_consistent(&graph);
            let kept: Vec<String> = graph.scope(root).unwrap().outputs().keys().cloned().collect();
            prop_assert_eq!(kept, exported);

            let again = optimize(&mut graph, &OptimizerConfig::default()).unwrap();
            prop_assert_eq!(again.total_changes(), 0);
        }
    }
}
