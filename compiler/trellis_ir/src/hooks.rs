//! Extension points for the external code generator.
//!
//! The core owns the walk order and the hook signatures; generators
//! implement the hooks. Hooks a generator does not override fail with
//! [`UsageError::UnimplementedHook`] rather than emitting nothing.

use crate::error::{IrResult, UsageError};
use crate::graph::{EvaluationPhase, Graph};
use crate::ids::ComputableId;

/// Per-Computable callbacks invoked by [`walk_for_codegen`].
pub trait CodegenHooks {
    /// Reserve the name generated code uses to refer to `id`.
    fn allocate_symbol(&mut self, graph: &Graph, id: ComputableId) -> IrResult<String> {
        let _ = graph;
        Err(UsageError::UnimplementedHook {
            hook: "allocate_symbol",
            computable: id,
        }
        .into())
    }

    /// Emit the code that initializes `symbol`.
    fn emit_initialization(
        &mut self,
        graph: &Graph,
        id: ComputableId,
        symbol: &str,
        phase: EvaluationPhase,
    ) -> IrResult<()> {
        let _ = (graph, symbol, phase);
        Err(UsageError::UnimplementedHook {
            hook: "emit_initialization",
            computable: id,
        }
        .into())
    }

    fn classify_phase(&self, graph: &Graph, id: ComputableId) -> IrResult<EvaluationPhase> {
        graph.classify_phase(id)
    }
}

/// Visit every live Computable in emission order and call the hooks.
///
/// Scopes are visited children first; inside a scope, inputs come before
/// their dependees. Returns the number of Computables visited.
pub fn walk_for_codegen(graph: &Graph, hooks: &mut impl CodegenHooks) -> IrResult<usize> {
    let mut visited = 0;
    for scope in graph.sorted_scopes()? {
        for id in graph.sorted_computables(scope)? {
            let phase = hooks.classify_phase(graph, id)?;
            let symbol = hooks.allocate_symbol(graph, id)?;
            hooks.emit_initialization(graph, id, &symbol, phase)?;
            visited += 1;
        }
    }
    tracing::debug!(visited, "codegen walk complete");
    Ok(visited)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::IrError;
    use crate::scope::ScopeRole;
    use crate::types::LiteralValue;

    struct Unimplemented;

    impl CodegenHooks for Unimplemented {}

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl CodegenHooks for Recorder {
        fn allocate_symbol(&mut self, _: &Graph, id: ComputableId) -> IrResult<String> {
            Ok(format!("v{}", id.raw()))
        }

        fn emit_initialization(
            &mut self,
            _: &Graph,
            _: ComputableId,
            symbol: &str,
            phase: EvaluationPhase,
        ) -> IrResult<()> {
            self.lines.push(format!("{symbol}:{phase:?}"));
            Ok(())
        }
    }

    #[test]
    fn default_hooks_report_the_missing_hook() {
        let mut graph = Graph::new();
        let root = graph.create_scope("root", ScopeRole::EntryPoint);
        let lit = graph.add_literal(root, LiteralValue::Bool(true)).unwrap();

        let err = walk_for_codegen(&graph, &mut Unimplemented).unwrap_err();
        assert_eq!(
            err,
            IrError::Usage(UsageError::UnimplementedHook {
                hook: "allocate_symbol",
                computable: lit,
            })
        );
    }

    #[test]
    fn walk_visits_children_before_parents() {
        let mut graph = Graph::new();
        let root = graph.create_scope("root", ScopeRole::EntryPoint);
        let child = graph.create_scope("child", ScopeRole::Internal);
        let inner = graph.add_literal(child, LiteralValue::number(1.0)).unwrap();
        graph.add_output(child, inner, "value").unwrap();
        graph.add_scope_instance(root, child, &[]).unwrap();

        let mut recorder = Recorder::default();
        let visited = walk_for_codegen(&graph, &mut recorder).unwrap();
        assert_eq!(visited, 2);
        assert_eq!(recorder.lines, vec!["v0:Static", "v1:Mount"]);
    }
}
