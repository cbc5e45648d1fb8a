//! Computable pushdown.
//!
//! Moves work that only feeds a child scope into that child, so it is
//! computed when the child is materialized instead of unconditionally in
//! the parent. Applies to plain and polymorphic instances. Iterating
//! instances are left alone: moving work into a per-element template
//! would repeat it for every element.
//!
//! # Pipeline Position
//!
//! Runs after both inlining passes, on the instances they left behind.
//!
//! # Algorithm
//!
//! Scopes are visited children first. For each instance `I` in a scope:
//!
//! 1. A choice is eligible when its child scope is not a root, is
//!    instantiated only by `I`, and is not shared with another choice.
//!    Its body must also still type with each parameter narrowed to its
//!    argument, since moved arguments keep their own types.
//! 2. Seed the immovable set with every `Placement`-typed argument and,
//!    for polymorphic instances, the discriminant, arguments every choice
//!    needs, and arguments of ineligible choices.
//! 3. Walk backward from the eligible arguments, collecting candidates:
//!    relocatable, side-effect free, not immovable, not a parent output,
//!    and living in the parent.
//! 4. Shrink the candidates to a fixpoint: a candidate survives only if
//!    each of its dependees is `I` or a surviving candidate, and a
//!    projection survives only with its source.
//! 5. Rebuild each affected child as a fresh scope: remaining arguments
//!    and the parent-side inputs of moved nodes become its parameters,
//!    moved nodes are cloned in dependency order, then the child body.
//! 6. Build the replacement instance, redirect `I`'s consumers to it, and
//!    destroy `I`, the moved originals, and the old child scopes.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use trellis_ir::{
    topological_sort, ComputableId, ComputableKind, Graph, IrResult, IrType, ScopeId,
    StructuralError, UsageError,
};

/// What [`push_down_computables`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushdownStats {
    pub instances_rebuilt: usize,
    pub computables_moved: usize,
    /// Argument slots replaced by Computables moved into the child.
    pub parameters_removed: usize,
}

impl PushdownStats {
    pub fn changes(&self) -> usize {
        self.instances_rebuilt + self.computables_moved
    }
}

type Args = SmallVec<[ComputableId; 4]>;

/// One child scope bound by an instance, with its arguments.
#[derive(Clone, Debug)]
struct Choice {
    key: Option<IrType>,
    scope: ScopeId,
    args: Args,
    eligible: bool,
}

/// A pushdown decided for one instance.
#[derive(Debug)]
struct Plan {
    parent: ScopeId,
    /// `Some` for polymorphic instances.
    discriminant: Option<ComputableId>,
    choices: SmallVec<[Choice; 2]>,
    /// Computables leaving the parent, in discovery order.
    pushed: IndexSet<ComputableId>,
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn push_down_computables(graph: &mut Graph) -> IrResult<PushdownStats> {
    let mut stats = PushdownStats::default();
    for scope in graph.sorted_scopes()? {
        let Ok(data) = graph.scope(scope) else {
            continue;
        };
        let instances: Vec<ComputableId> = data
            .computables()
            .iter()
            .copied()
            .filter(|&c| {
                graph.kind(c).is_ok_and(|k| {
                    matches!(
                        k,
                        ComputableKind::ScopeInstance { .. }
                            | ComputableKind::PolymorphicScopeInstance { .. }
                    )
                })
            })
            .collect();
        for instance in instances {
            if !graph.is_alive(instance) {
                continue;
            }
            if let Some(plan) = plan(graph, instance)? {
                apply(graph, instance, &plan, &mut stats)?;
            }
        }
    }
    if stats.changes() > 0 {
        tracing::debug!(
            instances = stats.instances_rebuilt,
            moved = stats.computables_moved,
            parameters = stats.parameters_removed,
            "computables pushed down"
        );
    }
    Ok(stats)
}

fn plan(graph: &Graph, instance: ComputableId) -> IrResult<Option<Plan>> {
    if !graph.is_relocatable(instance)? {
        return Ok(None);
    }
    let node = graph.computable(instance)?;
    let parent = node.scope().ok_or(StructuralError::Destroyed(instance))?;
    let (discriminant, mut choices): (Option<ComputableId>, SmallVec<[Choice; 2]>) =
        match node.kind() {
            ComputableKind::ScopeInstance { scope } => (
                None,
                smallvec![Choice {
                    key: None,
                    scope: *scope,
                    args: Args::from_slice(node.inputs()),
                    eligible: false,
                }],
            ),
            ComputableKind::PolymorphicScopeInstance { choices } => (
                Some(graph.input(instance, 0)?),
                choices
                    .iter()
                    .map(|c| Choice {
                        key: c.key.clone(),
                        scope: c.scope,
                        args: Args::from_slice(&node.inputs()[c.args.clone()]),
                        eligible: false,
                    })
                    .collect(),
            ),
            _ => return Ok(None),
        };

    let scopes: Vec<ScopeId> = choices.iter().map(|c| c.scope).collect();
    for choice in &mut choices {
        let shared = scopes.iter().filter(|&&s| s == choice.scope).count() > 1;
        let data = graph.scope(choice.scope)?;
        choice.eligible = !shared
            && !data.role().is_root()
            && data.instances().len() == 1
            && graph.admits_arguments(choice.scope, &choice.args)?;
    }
    if !choices.iter().any(|c| c.eligible) {
        return Ok(None);
    }

    let mut immovable: IndexSet<ComputableId> = IndexSet::new();
    immovable.extend(discriminant);
    for choice in &choices {
        for &arg in &choice.args {
            if !choice.eligible || graph.output_type(arg)?.is_placement() {
                immovable.insert(arg);
            }
        }
    }
    if choices.len() > 1 {
        for &arg in &choices[0].args {
            if choices.iter().all(|c| c.args.contains(&arg)) {
                immovable.insert(arg);
            }
        }
    }

    // Candidates reachable backward from eligible arguments.
    let mut pushed: IndexSet<ComputableId> = IndexSet::new();
    let mut stack: Vec<ComputableId> = choices
        .iter()
        .filter(|c| c.eligible)
        .flat_map(|c| c.args.iter().copied())
        .collect();
    stack.reverse();
    while let Some(id) = stack.pop() {
        if pushed.contains(&id) || immovable.contains(&id) {
            continue;
        }
        if movable(graph, parent, id)? {
            pushed.insert(id);
            stack.extend(graph.inputs(id)?.iter().rev().copied());
        }
    }

    // Shrink to the nodes whose every consumer moves with them.
    loop {
        let mut rejected = Vec::new();
        for &id in &pushed {
            let stays_behind = graph
                .dependees(id)?
                .keys()
                .any(|&d| d != instance && !pushed.contains(&d));
            let orphaned_projection = graph.kind(id)?.projected_field().is_some()
                && !pushed.contains(&graph.input(id, 0)?);
            if stays_behind || orphaned_projection {
                rejected.push(id);
            }
        }
        if rejected.is_empty() {
            break;
        }
        for id in rejected {
            pushed.shift_remove(&id);
        }
    }
    if pushed.is_empty() {
        return Ok(None);
    }
    Ok(Some(Plan {
        parent,
        discriminant,
        choices,
        pushed,
    }))
}

/// Local conditions for leaving `parent`; dependees are checked later.
fn movable(graph: &Graph, parent: ScopeId, id: ComputableId) -> IrResult<bool> {
    if graph.containing_scope(id) != Some(parent) || !graph.is_relocatable(id)? {
        return Ok(false);
    }
    if graph.dependees(id)?.is_empty() || graph.is_side_effect_causing(id)? {
        return Ok(false);
    }
    Ok(graph.scope(parent)?.output_field_of(id).is_none())
}

fn apply(
    graph: &mut Graph,
    instance: ComputableId,
    plan: &Plan,
    stats: &mut PushdownStats,
) -> IrResult<()> {
    let mut rebuilt = Vec::with_capacity(plan.choices.len());
    let mut retired = Vec::new();
    for choice in &plan.choices {
        let removed = choice
            .args
            .iter()
            .filter(|a| plan.pushed.contains(*a))
            .count();
        if !choice.eligible || removed == 0 {
            rebuilt.push((choice.key.clone(), choice.scope, choice.args.clone()));
            continue;
        }
        let (scope, args) = rebuild_child(graph, plan, choice)?;
        stats.parameters_removed += removed;
        retired.push(choice.scope);
        rebuilt.push((choice.key.clone(), scope, args));
    }

    let replacement = match plan.discriminant {
        None => {
            let Some((_, scope, args)) = rebuilt.into_iter().next() else {
                return Err(UsageError::NotScopeCreating(instance).into());
            };
            graph.add_scope_instance(plan.parent, scope, &args)?
        }
        Some(discriminant) => {
            let poly = graph.add_polymorphic_instance(plan.parent, discriminant)?;
            for (key, scope, args) in rebuilt {
                let key = key.ok_or_else(|| {
                    UsageError::MalformedChoice(format!("choice for {scope} has no key"))
                })?;
                graph.add_choice(poly, key, scope, &args)?;
            }
            poly
        }
    };

    graph.replace_uses(instance, replacement)?;
    let field = graph
        .scope(plan.parent)?
        .output_field_of(instance)
        .map(str::to_owned);
    if let Some(field) = field {
        graph.replace_output(plan.parent, &field, replacement)?;
    }
    graph.destroy(instance)?;
    for &id in &plan.pushed {
        if graph.is_alive(id) {
            graph.destroy(id)?;
        }
    }
    for scope in retired {
        graph.remove_scope(scope)?;
    }

    tracing::trace!(
        instance = instance.raw(),
        replacement = replacement.raw(),
        moved = plan.pushed.len(),
        "instance rebuilt"
    );
    stats.instances_rebuilt += 1;
    stats.computables_moved += plan.pushed.len();
    Ok(())
}

/// Build the replacement for `choice.scope` with the pushed nodes inside.
///
/// Returns the new scope and the arguments its instance must bind.
fn rebuild_child(
    graph: &mut Graph,
    plan: &Plan,
    choice: &Choice,
) -> IrResult<(ScopeId, Args)> {
    let data = graph.scope(choice.scope)?;
    let name = format!("{}.pushed", data.name());
    let role = data.role();
    let params = data.parameters().to_vec();
    let outputs = data.outputs().clone();
    let body: Vec<ComputableId> = graph
        .sorted_computables(choice.scope)?
        .into_iter()
        .filter(|&c| graph.kind(c).is_ok_and(|k| !k.is_parameter()))
        .collect();
    let moved = moved_for(graph, plan, choice)?;

    let target = graph.create_scope(name, role);
    let mut args = Args::new();
    // Child-side ids and parent-side ids live in separate maps.
    let mut inner: FxHashMap<ComputableId, ComputableId> = FxHashMap::default();
    let mut outer: FxHashMap<ComputableId, ComputableId> = FxHashMap::default();

    for (&param, &arg) in params.iter().zip(&choice.args) {
        if plan.pushed.contains(&arg) {
            continue;
        }
        let ty = graph.output_type(param)?.clone();
        inner.insert(param, graph.add_parameter(target, ty)?);
        args.push(arg);
    }
    for &id in &moved {
        let inputs = graph.inputs(id)?.to_vec();
        for input in inputs {
            if plan.pushed.contains(&input) || outer.contains_key(&input) {
                continue;
            }
            let ty = graph.output_type(input)?.clone();
            outer.insert(input, graph.add_parameter(target, ty)?);
            args.push(input);
        }
    }

    for &id in &moved {
        let inputs = mapped_inputs(graph, id, &outer, plan.parent)?;
        let clone = graph.clone_computable(id, Some(&inputs), Some(target))?;
        outer.insert(id, clone);
    }
    for (&param, arg) in params.iter().zip(&choice.args) {
        if let Some(&clone) = outer.get(arg).filter(|_| plan.pushed.contains(arg)) {
            inner.insert(param, clone);
        }
    }
    for id in body {
        let inputs = mapped_inputs(graph, id, &inner, choice.scope)?;
        let clone = graph.clone_computable(id, Some(&inputs), Some(target))?;
        inner.insert(id, clone);
    }
    for (field, original) in outputs {
        let clone = inner
            .get(&original)
            .copied()
            .ok_or(StructuralError::Destroyed(original))?;
        graph.add_output(target, clone, field)?;
    }
    Ok((target, args))
}

/// Pushed nodes feeding `choice`, inputs first.
fn moved_for(graph: &Graph, plan: &Plan, choice: &Choice) -> IrResult<Vec<ComputableId>> {
    let mut reached: IndexSet<ComputableId> = IndexSet::new();
    let mut stack: Vec<ComputableId> = choice
        .args
        .iter()
        .copied()
        .filter(|a| plan.pushed.contains(a))
        .collect();
    while let Some(id) = stack.pop() {
        if reached.insert(id) {
            stack.extend(
                graph
                    .inputs(id)?
                    .iter()
                    .copied()
                    .filter(|i| plan.pushed.contains(i)),
            );
        }
    }
    topological_sort(reached.iter().copied(), |id| {
        graph.inputs(id).map(<[_]>::to_vec).unwrap_or_default()
    })
    .map_err(|e| StructuralError::ComputableCycle(e.participant).into())
}

fn mapped_inputs(
    graph: &Graph,
    id: ComputableId,
    mapping: &FxHashMap<ComputableId, ComputableId>,
    scope: ScopeId,
) -> IrResult<Vec<ComputableId>> {
    graph
        .inputs(id)?
        .iter()
        .map(|input| {
            mapping.get(input).copied().ok_or_else(|| {
                StructuralError::NotInScope {
                    scope,
                    computable: *input,
                }
                .into()
            })
        })
        .collect()
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
