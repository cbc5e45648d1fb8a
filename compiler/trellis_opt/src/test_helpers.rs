//! Shared graph builders for pass tests. Only compiled in test builds.

#![expect(
    clippy::unwrap_used,
    reason = "test fixtures unwrap construction results"
)]

use trellis_ir::{ComputableId, Graph, IrType, LiteralValue, ScopeId, ScopeRole};

/// A fresh graph with one entry scope.
pub(crate) fn graph_with_root() -> (Graph, ScopeId) {
    let mut graph = Graph::new();
    let root = graph.create_scope("root", ScopeRole::EntryPoint);
    (graph, root)
}

/// Literal number in `scope`.
pub(crate) fn num(graph: &mut Graph, scope: ScopeId, n: f64) -> ComputableId {
    graph.add_literal(scope, LiteralValue::number(n)).unwrap()
}

/// An internal scope with one parameter per entry of `params`.
pub(crate) fn scope_with_params(
    graph: &mut Graph,
    name: &str,
    params: &[IrType],
) -> (ScopeId, Vec<ComputableId>) {
    let scope = graph.create_scope(name, ScopeRole::Internal);
    let ids = params
        .iter()
        .map(|ty| graph.add_parameter(scope, ty.clone()).unwrap())
        .collect();
    (scope, ids)
}

/// Live, non-parameter Computables of `scope`.
pub(crate) fn body_len(graph: &Graph, scope: ScopeId) -> usize {
    graph.non_parameter_computables(scope).unwrap().len()
}

/// No live node references a dead one.
pub(crate) fn assert_consistent(graph: &Graph) {
    for id in graph.live_computables() {
        for &input in graph.inputs(id).unwrap() {
            assert!(graph.is_alive(input), "{id} reads dead input {input}");
        }
        for &dependee in graph.dependees(id).unwrap().keys() {
            assert!(graph.is_alive(dependee), "{id} lists dead dependee {dependee}");
        }
    }
    for scope in graph.live_scopes() {
        for &instance in graph.scope(scope).unwrap().instances() {
            assert!(graph.is_alive(instance), "{scope} lists dead instance {instance}");
        }
    }
}
