//! Dead-code elimination.
//!
//! Removes Computables nothing observes: no dependees, not a scope output,
//! not a parameter, and no side effects. Removing one can orphan its
//! inputs, so the sweep repeats until nothing changes. Internal scopes
//! left without instances are removed afterwards, which can orphan the
//! scopes they instantiated in turn.
//!
//! # Pipeline Position
//!
//! First pass. Everything after it assumes unreferenced nodes are gone.

use trellis_ir::{ComputableId, Graph, IrResult, ScopeId};

/// What [`eliminate_dead_code`] removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DceStats {
    pub computables_removed: usize,
    pub scopes_removed: usize,
}

impl DceStats {
    pub fn changes(&self) -> usize {
        self.computables_removed + self.scopes_removed
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn eliminate_dead_code(graph: &mut Graph) -> IrResult<DceStats> {
    let mut stats = DceStats::default();
    loop {
        let dead = dead_computables(graph)?;
        let orphans = orphaned_scopes(graph)?;
        if dead.is_empty() && orphans.is_empty() {
            break;
        }
        for id in dead {
            // An earlier removal may have cascaded here already.
            if graph.is_alive(id) {
                tracing::trace!(computable = id.raw(), "removing dead computable");
                graph.destroy(id)?;
                stats.computables_removed += 1;
            }
        }
        for scope in orphans {
            if graph.scope(scope).is_ok_and(|s| s.instances().is_empty()) {
                let removed = graph.scope(scope)?.computables().len();
                graph.remove_scope(scope)?;
                stats.computables_removed += removed;
                stats.scopes_removed += 1;
            }
        }
    }
    if stats.changes() > 0 {
        tracing::debug!(
            computables = stats.computables_removed,
            scopes = stats.scopes_removed,
            "dead code eliminated"
        );
    }
    Ok(stats)
}

fn dead_computables(graph: &Graph) -> IrResult<Vec<ComputableId>> {
    let mut dead = Vec::new();
    for id in graph.live_computables() {
        let node = graph.computable(id)?;
        if !node.dependees().is_empty() || node.kind().is_parameter() {
            continue;
        }
        let Some(scope) = node.scope() else {
            continue;
        };
        if graph.scope(scope)?.output_field_of(id).is_some() {
            continue;
        }
        if graph.is_side_effect_causing(id)? {
            continue;
        }
        dead.push(id);
    }
    Ok(dead)
}

fn orphaned_scopes(graph: &Graph) -> IrResult<Vec<ScopeId>> {
    let mut orphans = Vec::new();
    for scope in graph.live_scopes() {
        let data = graph.scope(scope)?;
        if !data.role().is_root() && data.instances().is_empty() {
            orphans.push(scope);
        }
    }
    Ok(orphans)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;
    use trellis_ir::{IrType, LiteralValue, PrimitiveOp, ScopeRole};

    use super::*;

    #[test]
    fn unused_pure_chains_are_removed() {
        let mut graph = Graph::new();
        let root = graph.create_scope("root", ScopeRole::EntryPoint);
        let a = graph.add_literal(root, LiteralValue::number(1.0)).unwrap();
        let b = graph.add_primitive(root, PrimitiveOp::Add, &[a, a]).unwrap();
        let c = graph.add_tuple(root, &[b]).unwrap();
        let kept = graph.add_literal(root, LiteralValue::Bool(true)).unwrap();
        graph.add_output(root, kept, "flag").unwrap();

        let stats = eliminate_dead_code(&mut graph).unwrap();
        assert_eq!(stats.computables_removed, 3);
        for id in [a, b, c] {
            assert!(!graph.is_alive(id));
        }
        assert!(graph.is_alive(kept));
    }

    #[test]
    fn side_effects_and_parameters_survive() {
        let mut graph = Graph::new();
        let root = graph.create_scope("root", ScopeRole::EntryPoint);
        let param = graph.add_parameter(root, IrType::Placement).unwrap();
        let view = graph.add_view_node(param, "div").unwrap();

        let stats = eliminate_dead_code(&mut graph).unwrap();
        assert_eq!(stats, DceStats::default());
        assert!(graph.is_alive(param));
        assert!(graph.is_alive(view));
    }

    #[test]
    fn uninstantiated_internal_scopes_are_removed() {
        let mut graph = Graph::new();
        let root = graph.create_scope("root", ScopeRole::EntryPoint);
        let outer = graph.create_scope("outer", ScopeRole::Internal);
        let inner = graph.create_scope("inner", ScopeRole::Internal);
        let place = graph.add_parameter(inner, IrType::Placement).unwrap();
        graph.add_view_node(place, "span").unwrap();
        let at = graph.add_parameter(outer, IrType::Placement).unwrap();
        graph.add_scope_instance(outer, inner, &[at]).unwrap();

        let stats = eliminate_dead_code(&mut graph).unwrap();
        assert_eq!(stats.scopes_removed, 2);
        assert_eq!(graph.live_scopes().collect::<Vec<_>>(), vec![root]);
    }

    #[test]
    fn second_run_finds_nothing() {
        let mut graph = Graph::new();
        let root = graph.create_scope("root", ScopeRole::EntryPoint);
        let a = graph.add_literal(root, LiteralValue::number(1.0)).unwrap();
        graph.add_tuple(root, &[a]).unwrap();
        eliminate_dead_code(&mut graph).unwrap();
        assert_eq!(eliminate_dead_code(&mut graph).unwrap().changes(), 0);
    }
}
