//! Scope inlining.
//!
//! Replaces a plain [`ScopeInstance`](ComputableKind::ScopeInstance) with a
//! copy of the child scope's body, wired directly to the instance's
//! arguments. Two policies share the algorithm and differ only in which
//! scopes they accept (see [`InlinePolicy`]).
//!
//! # Pipeline Position
//!
//! Runs after dead-code elimination, single-instance policy first, then
//! the trivial policy. Pushdown runs afterwards on whatever instances
//! remain.
//!
//! # Algorithm
//!
//! Scopes are visited children first, so a scope's own body is already
//! final when it is copied into its parent. A scope is eligible when:
//!
//! 1. it is not a root;
//! 2. every non-parameter Computable is relocatable;
//! 3. no parameter is also an output;
//! 4. the policy admits it.
//!
//! An instance is eligible when it is a plain `ScopeInstance` whose every
//! dependee is a projection of a named output, and the body still types
//! with each parameter narrowed to its argument's type. For each one, the body is
//! cloned into the parent in dependency order with arguments substituted
//! for parameters, projection consumers are redirected to the clones, and
//! the instance is destroyed. The child scope is removed once nothing
//! instantiates it.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use trellis_ir::{
    ComputableId, ComputableKind, Graph, IrResult, ScopeId, StructuralError, UsageError,
};

/// Which scopes [`inline_scopes`] accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InlinePolicy {
    /// Scopes instantiated exactly once.
    SingleInstance,
    /// Scopes with fewer than `max_computables` non-parameter Computables,
    /// however often they are instantiated.
    Trivial { max_computables: usize },
}

impl InlinePolicy {
    pub const DEFAULT_TRIVIAL_LIMIT: usize = 3;

    /// The trivial policy at its default limit.
    pub fn trivial() -> Self {
        InlinePolicy::Trivial {
            max_computables: Self::DEFAULT_TRIVIAL_LIMIT,
        }
    }

    fn admits(self, instances: usize, body: usize) -> bool {
        match self {
            InlinePolicy::SingleInstance => instances == 1,
            InlinePolicy::Trivial { max_computables } => body < max_computables,
        }
    }
}

/// What [`inline_scopes`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InlineStats {
    pub instances_inlined: usize,
    pub scopes_removed: usize,
}

impl InlineStats {
    pub fn changes(&self) -> usize {
        self.instances_inlined + self.scopes_removed
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(policy = ?policy))]
pub fn inline_scopes(graph: &mut Graph, policy: InlinePolicy) -> IrResult<InlineStats> {
    let mut stats = InlineStats::default();
    for scope in graph.sorted_scopes()? {
        let Some(body) = eligible_body(graph, scope, policy)? else {
            continue;
        };
        let instances = eligible_instances(graph, scope)?;
        for &instance in &instances {
            inline_instance(graph, scope, instance, &body)?;
            stats.instances_inlined += 1;
        }
        if !instances.is_empty() && graph.scope(scope)?.instances().is_empty() {
            graph.remove_scope(scope)?;
            stats.scopes_removed += 1;
        }
    }
    if stats.changes() > 0 {
        tracing::debug!(
            instances = stats.instances_inlined,
            scopes = stats.scopes_removed,
            "scopes inlined"
        );
    }
    Ok(stats)
}

/// The sorted body of `scope` if the scope itself may be inlined.
fn eligible_body(
    graph: &Graph,
    scope: ScopeId,
    policy: InlinePolicy,
) -> IrResult<Option<Vec<ComputableId>>> {
    let Ok(data) = graph.scope(scope) else {
        return Ok(None);
    };
    if data.role().is_root() {
        return Ok(None);
    }
    if data
        .parameters()
        .iter()
        .any(|&p| data.output_field_of(p).is_some())
    {
        return Ok(None);
    }
    let body: Vec<ComputableId> = graph
        .sorted_computables(scope)?
        .into_iter()
        .filter(|&c| graph.kind(c).is_ok_and(|k| !k.is_parameter()))
        .collect();
    if !policy.admits(data.instances().len(), body.len()) {
        return Ok(None);
    }
    for &id in &body {
        if !graph.is_relocatable(id)? {
            return Ok(None);
        }
    }
    Ok(Some(body))
}

/// Plain instances of `scope` that are only read through projections and
/// whose arguments the body still types against.
fn eligible_instances(graph: &Graph, scope: ScopeId) -> IrResult<Vec<ComputableId>> {
    let mut eligible = Vec::new();
    for &instance in graph.scope(scope)?.instances() {
        if !matches!(graph.kind(instance)?, ComputableKind::ScopeInstance { .. }) {
            continue;
        }
        let mut dependees = graph.dependees(instance)?.keys();
        if !dependees.all(|&d| graph.kind(d).is_ok_and(|k| k.projected_field().is_some())) {
            continue;
        }
        if !graph.admits_arguments(scope, graph.inputs(instance)?)? {
            tracing::trace!(instance = instance.raw(), "body rejects the arguments");
            continue;
        }
        eligible.push(instance);
    }
    Ok(eligible)
}

fn inline_instance(
    graph: &mut Graph,
    child: ScopeId,
    instance: ComputableId,
    body: &[ComputableId],
) -> IrResult<()> {
    let parent = graph
        .containing_scope(instance)
        .ok_or(StructuralError::Destroyed(instance))?;
    let data = graph.scope(child)?;
    let outputs = data.outputs().clone();
    let mut mapping: FxHashMap<ComputableId, ComputableId> = data
        .parameters()
        .iter()
        .copied()
        .zip(graph.inputs(instance)?.iter().copied())
        .collect();

    for &id in body {
        let inputs = graph
            .inputs(id)?
            .iter()
            .map(|input| {
                mapping
                    .get(input)
                    .copied()
                    .ok_or(StructuralError::NotInScope {
                        scope: child,
                        computable: *input,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let clone = graph.clone_computable(id, Some(&inputs), Some(parent))?;
        mapping.insert(id, clone);
    }

    let mut inlined: IndexMap<String, ComputableId> = IndexMap::with_capacity(outputs.len());
    for (field, original) in outputs {
        let clone = mapping
            .get(&original)
            .copied()
            .ok_or(StructuralError::Destroyed(original))?;
        inlined.insert(field, clone);
    }

    let projections: Vec<ComputableId> = graph.dependees(instance)?.keys().copied().collect();
    for projection in projections {
        let field = graph
            .kind(projection)?
            .projected_field()
            .ok_or(UsageError::UnexpectedKind {
                computable: projection,
                reason: "inlined instances are only read through projections",
            })?;
        let target = inlined
            .get(field)
            .copied()
            .ok_or_else(|| StructuralError::MissingOutput {
                scope: child,
                field: field.to_owned(),
            })?;
        graph.replace_uses(projection, target)?;
        redirect_output(graph, parent, projection, Some(target))?;
    }

    if graph.scope(parent)?.output_field_of(instance).is_some() {
        let record = if inlined.is_empty() {
            None
        } else {
            Some(graph.add_compound_literal(parent, inlined)?)
        };
        redirect_output(graph, parent, instance, record)?;
    }

    tracing::trace!(
        instance = instance.raw(),
        child = child.raw(),
        parent = parent.raw(),
        "instance inlined"
    );
    graph.destroy(instance)
}

/// If `old` is an output of `scope`, point the field at `new`, or drop the
/// field when there is nothing to point at.
fn redirect_output(
    graph: &mut Graph,
    scope: ScopeId,
    old: ComputableId,
    new: Option<ComputableId>,
) -> IrResult<()> {
    let Some(field) = graph.scope(scope)?.output_field_of(old).map(str::to_owned) else {
        return Ok(());
    };
    match new {
        Some(new) => graph.replace_output(scope, &field, new),
        None => graph.remove_output(scope, &field).map(|_| ()),
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
