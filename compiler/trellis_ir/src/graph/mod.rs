//! The graph arena: every Computable and Scope of one compilation unit.
//!
//! [`Graph`] is the identity allocator and the only place nodes are
//! mutated. Each mutating method validates first and commits second:
//! wiring checks, arity checks, and type propagation all run against a
//! read-only [`Overlay`] before anything is written.
//!
//! Destroyed nodes stay in the arena as tombstones (scope cleared, edges
//! dropped) so that stale ids fail loudly instead of aliasing new nodes.

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::computable::typing::{NodeOverride, Overlay};
use crate::computable::{Computable, ComputableKind, ComputableTraits, Positions};
use crate::error::{IrResult, StructuralError, UsageError};
use crate::ids::{ComputableId, ScopeId};
use crate::observer::{GraphEvent, GraphObserver};
use crate::scope::Scope;
use crate::topo::topological_sort;
use crate::types::IrType;

mod build;
mod traits;

pub use traits::EvaluationPhase;

/// Owner of all Computables and Scopes.
#[derive(Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Computable>,
    pub(crate) scopes: Vec<Scope>,
    observers: Vec<Box<dyn GraphObserver>>,
    pub(crate) traits_memo: RefCell<FxHashMap<ComputableId, ComputableTraits>>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("scopes", &self.scopes.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Observers ───────────────────────────────────────────────────

    /// Register an observer; it sees every later committed mutation.
    pub fn add_observer(&mut self, observer: Box<dyn GraphObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    /// Drop memoized trait queries after a structural change.
    pub(crate) fn invalidate(&mut self) {
        self.traits_memo.get_mut().clear();
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// A live Computable.
    pub fn computable(&self, id: ComputableId) -> IrResult<&Computable> {
        match self.nodes.get(id.index()) {
            Some(node) if node.is_alive() => Ok(node),
            _ => Err(StructuralError::Destroyed(id).into()),
        }
    }

    /// The owning scope; `None` once destroyed.
    pub fn containing_scope(&self, id: ComputableId) -> Option<ScopeId> {
        self.nodes.get(id.index()).and_then(|n| n.scope)
    }

    pub fn is_alive(&self, id: ComputableId) -> bool {
        self.containing_scope(id).is_some()
    }

    pub fn kind(&self, id: ComputableId) -> IrResult<&ComputableKind> {
        Ok(&self.computable(id)?.kind)
    }

    pub fn output_type(&self, id: ComputableId) -> IrResult<&IrType> {
        Ok(&self.computable(id)?.ty)
    }

    pub fn inputs(&self, id: ComputableId) -> IrResult<&[ComputableId]> {
        Ok(&self.computable(id)?.inputs)
    }

    pub fn input(&self, id: ComputableId, position: usize) -> IrResult<ComputableId> {
        self.computable(id)?
            .inputs
            .get(position)
            .copied()
            .ok_or_else(|| {
                StructuralError::InputOutOfRange {
                    computable: id,
                    position,
                }
                .into()
            })
    }

    pub fn dependees(&self, id: ComputableId) -> IrResult<&IndexMap<ComputableId, Positions>> {
        Ok(&self.computable(id)?.dependees)
    }

    /// Every live Computable, in creation order.
    pub fn live_computables(&self) -> impl Iterator<Item = ComputableId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_alive())
            .map(|(i, _)| id_at(i))
    }

    /// Whether `target` is `id` itself or one of its transitive inputs.
    pub fn depends_on(&self, id: ComputableId, target: ComputableId) -> IrResult<bool> {
        self.computable(id)?;
        let mut seen: FxHashSet<ComputableId> = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if next == target {
                return Ok(true);
            }
            if seen.insert(next) {
                stack.extend(self.nodes[next.index()].inputs.iter().copied());
            }
        }
        Ok(false)
    }

    /// Pinned nodes are never moved by rewrites.
    pub fn pin(&mut self, id: ComputableId) -> IrResult<()> {
        self.computable(id)?;
        self.nodes[id.index()].pinned = true;
        Ok(())
    }

    pub fn set_label(&mut self, id: ComputableId, label: impl Into<String>) -> IrResult<()> {
        self.computable(id)?;
        self.nodes[id.index()].label = Some(label.into());
        Ok(())
    }

    /// Neither pinned nor of a kind bound to its scope.
    pub fn is_relocatable(&self, id: ComputableId) -> IrResult<bool> {
        let node = self.computable(id)?;
        Ok(!node.pinned && node.kind.is_relocatable())
    }

    // ── Creation ────────────────────────────────────────────────────

    /// Create a Computable of any kind except `ScopeParameter` (use
    /// [`Graph::add_parameter`] for those).
    pub fn create_computable(
        &mut self,
        scope: ScopeId,
        kind: ComputableKind,
        inputs: impl IntoIterator<Item = ComputableId>,
    ) -> IrResult<ComputableId> {
        if kind.is_parameter() {
            return Err(UsageError::UnexpectedKind {
                computable: id_at(self.nodes.len()),
                reason: "parameters are created through add_parameter",
            }
            .into());
        }
        self.insert_node(scope, kind, inputs.into_iter().collect())
    }

    /// Validate and commit a new node.
    ///
    /// The node is pushed provisionally so validation can address it by
    /// id; on failure it is popped again, which restores the arena exactly
    /// because nothing else references it yet.
    pub(crate) fn insert_node(
        &mut self,
        scope: ScopeId,
        kind: ComputableKind,
        inputs: SmallVec<[ComputableId; 4]>,
    ) -> IrResult<ComputableId> {
        self.scope(scope)?;
        for child in kind.child_scopes() {
            self.scope(child)?;
            if child == scope {
                return Err(StructuralError::SelfInstantiation(scope).into());
            }
        }

        let id = id_at(self.nodes.len());
        self.nodes.push(Computable {
            kind,
            scope: Some(scope),
            inputs,
            dependees: IndexMap::new(),
            ty: IrType::Void,
            pinned: false,
            label: None,
        });

        let derived = {
            let overlay = Overlay::new(self);
            let node = &self.nodes[id.index()];
            overlay
                .check_arity(&node.kind, node.inputs.len())
                .and_then(|()| crate::instance::check_scope_creating(&overlay, &node.kind))
                .and_then(|()| overlay.validate_all_inputs(id))
                .and_then(|()| overlay.derive(id))
        };
        let ty = match derived {
            Ok(ty) => ty,
            Err(err) => {
                self.nodes.pop();
                return Err(err);
            }
        };

        self.nodes[id.index()].ty = ty;
        let inputs = self.nodes[id.index()].inputs.clone();
        for (position, &input) in inputs.iter().enumerate() {
            self.link(input, id, position);
        }
        self.scopes[scope.index()].computables.insert(id);
        let children = self.nodes[id.index()].kind.child_scopes();
        for child in children {
            self.register_instance(scope, child, id);
        }
        self.invalidate();
        self.emit(GraphEvent::ComputableAdded {
            computable: id,
            scope,
        });
        tracing::trace!(
            computable = id.raw(),
            kind = self.nodes[id.index()].kind.name(),
            "computable added"
        );
        Ok(id)
    }

    pub(crate) fn link(&mut self, input: ComputableId, dependee: ComputableId, position: usize) {
        self.nodes[input.index()]
            .dependees
            .entry(dependee)
            .or_default()
            .push(position);
        self.emit(GraphEvent::DependeeAdded {
            input,
            dependee,
            position,
        });
    }

    fn unlink(&mut self, input: ComputableId, dependee: ComputableId, position: usize) {
        let dependees = &mut self.nodes[input.index()].dependees;
        if let Some(positions) = dependees.get_mut(&dependee) {
            positions.retain(|p| *p != position);
            if positions.is_empty() {
                dependees.shift_remove(&dependee);
            }
        }
        self.emit(GraphEvent::DependeeRemoved {
            input,
            dependee,
            position,
        });
    }

    pub(crate) fn register_instance(
        &mut self,
        parent: ScopeId,
        child: ScopeId,
        instance: ComputableId,
    ) {
        let child_scope = &mut self.scopes[child.index()];
        child_scope.instances.insert(instance);
        *child_scope.instantiated_by.entry(parent).or_insert(0) += 1;
        *self.scopes[parent.index()]
            .instantiates
            .entry(child)
            .or_insert(0) += 1;
        self.emit(GraphEvent::InstanceAdded {
            scope: child,
            instance,
        });
    }

    fn unregister_instance(&mut self, parent: ScopeId, child: ScopeId, instance: ComputableId) {
        self.scopes[child.index()].instances.shift_remove(&instance);
        decrement(&mut self.scopes[child.index()].instantiated_by, parent);
        decrement(&mut self.scopes[parent.index()].instantiates, child);
        self.emit(GraphEvent::InstanceRemoved {
            scope: child,
            instance,
        });
    }

    // ── Rewiring ────────────────────────────────────────────────────

    /// Bind `input` at `position` of `id`.
    ///
    /// Validates the new binding and the retyping it causes downstream;
    /// on success only slot `position` and the two dependee indices change
    /// (plus any propagated output types). Binding a node to one of its
    /// own dependees is rejected as a cycle.
    pub fn set_input(
        &mut self,
        id: ComputableId,
        position: usize,
        input: ComputableId,
    ) -> IrResult<()> {
        let old = self.input(id, position)?;
        if old == input {
            self.computable(input)?;
            return Ok(());
        }
        if self.depends_on(input, id)? {
            return Err(StructuralError::ComputableCycle(id).into());
        }
        let node = &self.nodes[id.index()];
        let mut inputs = node.inputs.clone();
        inputs[position] = input;
        let types = {
            let mut overlay = Overlay::new(self).with_node(NodeOverride {
                id,
                kind: node.kind.clone(),
                inputs,
            });
            overlay.validate_binding(id, position)?;
            overlay.propagate([id])?;
            overlay.into_types()
        };

        self.nodes[id.index()].inputs[position] = input;
        self.unlink(old, id, position);
        self.link(input, id, position);
        self.apply_types(types);
        self.invalidate();
        Ok(())
    }

    /// Rebind every use of `old` to `new`.
    ///
    /// All rebindings are validated together, with the retyping they cause
    /// downstream, before any of them is committed.
    pub fn replace_uses(&mut self, old: ComputableId, new: ComputableId) -> IrResult<()> {
        let uses: Vec<(ComputableId, Positions)> = self
            .dependees(old)?
            .iter()
            .map(|(&d, p)| (d, p.clone()))
            .collect();
        self.computable(new)?;
        if old == new || uses.is_empty() {
            return Ok(());
        }

        let mut overrides = Vec::with_capacity(uses.len());
        for (dependee, positions) in &uses {
            if self.depends_on(new, *dependee)? {
                return Err(StructuralError::ComputableCycle(*dependee).into());
            }
            let node = &self.nodes[dependee.index()];
            let mut inputs = node.inputs.clone();
            for &position in positions {
                inputs[position] = new;
            }
            overrides.push(NodeOverride {
                id: *dependee,
                kind: node.kind.clone(),
                inputs,
            });
        }
        let types = {
            let mut overlay = Overlay::new(self).with_nodes(overrides);
            for (dependee, positions) in &uses {
                for &position in positions {
                    overlay.validate_binding(*dependee, position)?;
                }
            }
            overlay.propagate(uses.iter().map(|(d, _)| *d))?;
            overlay.into_types()
        };

        for (dependee, positions) in uses {
            for position in positions {
                self.nodes[dependee.index()].inputs[position] = new;
                self.unlink(old, dependee, position);
                self.link(new, dependee, position);
            }
        }
        self.apply_types(types);
        self.invalidate();
        Ok(())
    }

    pub(crate) fn apply_types(&mut self, types: FxHashMap<ComputableId, IrType>) {
        for (id, ty) in types {
            self.nodes[id.index()].ty = ty;
        }
    }

    // ── Destruction ─────────────────────────────────────────────────

    /// Destroy `id` and, first, everything that depends on it.
    pub fn destroy(&mut self, id: ComputableId) -> IrResult<()> {
        self.computable(id)?;
        self.destroy_all([id])
    }

    /// Destroy a set of nodes and their transitive dependees as one
    /// operation.
    ///
    /// Outputs registered on doomed nodes are unregistered; if a scope
    /// that loses outputs still has live instances, their retyping is
    /// validated before anything is destroyed.
    pub(crate) fn destroy_all(
        &mut self,
        roots: impl IntoIterator<Item = ComputableId>,
    ) -> IrResult<()> {
        let mut doomed: FxHashSet<ComputableId> = FxHashSet::default();
        let mut stack: Vec<ComputableId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if self.is_alive(id) && doomed.insert(id) {
                stack.extend(self.nodes[id.index()].dependees.keys().copied());
            }
        }
        if doomed.is_empty() {
            return Ok(());
        }

        // Outputs disappearing from scopes.
        let mut output_changes: FxHashMap<ScopeId, IndexMap<String, ComputableId>> =
            FxHashMap::default();
        let mut touched_scopes: Vec<ScopeId> = Vec::new();
        for &id in &doomed {
            if let Some(scope) = self.nodes[id.index()].scope {
                if !touched_scopes.contains(&scope) {
                    touched_scopes.push(scope);
                }
            }
        }
        for scope in touched_scopes {
            let data = &self.scopes[scope.index()];
            if data.outputs.values().any(|o| doomed.contains(o)) {
                let kept: IndexMap<String, ComputableId> = data
                    .outputs
                    .iter()
                    .filter(|(_, o)| !doomed.contains(o))
                    .map(|(f, &o)| (f.clone(), o))
                    .collect();
                output_changes.insert(scope, kept);
            }
            let surviving_instances = data.instances.iter().any(|i| !doomed.contains(i));
            let loses_parameter = data.parameters.iter().any(|p| doomed.contains(p));
            if loses_parameter && surviving_instances {
                return Err(StructuralError::ParametersFrozen(scope).into());
            }
        }

        let types = if output_changes.is_empty() {
            FxHashMap::default()
        } else {
            let mut overlay = Overlay::new(self).with_doomed(doomed.clone());
            for (scope, outputs) in &output_changes {
                overlay = overlay.with_outputs(*scope, outputs.clone());
            }
            overlay.propagate(std::iter::empty())?;
            overlay.into_types()
        };

        // Dependees before their inputs.
        let order = topological_sort(doomed.iter().copied(), |id| {
            self.nodes[id.index()].inputs.clone()
        })
        .map_err(|e| StructuralError::ComputableCycle(e.participant))?;

        for (scope, outputs) in output_changes {
            self.scopes[scope.index()].outputs = outputs;
        }
        for id in order.into_iter().rev() {
            self.destroy_one(id);
        }
        self.apply_types(types);
        self.invalidate();
        Ok(())
    }

    /// Tear down one node whose dependees are already gone.
    fn destroy_one(&mut self, id: ComputableId) {
        let Some(scope) = self.nodes[id.index()].scope else {
            return;
        };
        debug_assert!(self.nodes[id.index()].dependees.is_empty());

        let inputs = std::mem::take(&mut self.nodes[id.index()].inputs);
        for (position, &input) in inputs.iter().enumerate() {
            self.unlink(input, id, position);
        }
        let children = self.nodes[id.index()].kind.child_scopes();
        for child in children {
            self.unregister_instance(scope, child, id);
        }

        let data = &mut self.scopes[scope.index()];
        data.computables.shift_remove(&id);
        data.outputs.retain(|_, o| *o != id);
        if let Some(at) = data.parameters.iter().position(|p| *p == id) {
            data.parameters.remove(at);
            let shifted: Vec<ComputableId> = data.parameters[at..].to_vec();
            for param in shifted {
                if let ComputableKind::ScopeParameter { position, .. } =
                    &mut self.nodes[param.index()].kind
                {
                    *position -= 1;
                }
            }
        }

        self.nodes[id.index()].scope = None;
        self.emit(GraphEvent::Destroyed {
            computable: id,
            scope,
        });
    }

    // ── Cloning ─────────────────────────────────────────────────────

    /// Rebuild `id` as a fresh node of the same kind.
    ///
    /// `inputs` defaults to the original's inputs and `scope` to its
    /// scope. The clone has no dependees. Cloning a parameter appends a
    /// new formal parameter to the target scope, so parameters must be
    /// cloned in position order.
    pub fn clone_computable(
        &mut self,
        id: ComputableId,
        inputs: Option<&[ComputableId]>,
        scope: Option<ScopeId>,
    ) -> IrResult<ComputableId> {
        let node = self.computable(id)?;
        let target = match scope {
            Some(scope) => scope,
            None => node.scope.ok_or(StructuralError::Destroyed(id))?,
        };
        let kind = node.kind.clone();
        let inputs: SmallVec<[ComputableId; 4]> = match inputs {
            Some(inputs) => inputs.iter().copied().collect(),
            None => node.inputs.clone(),
        };
        let pinned = node.pinned;
        let label = node.label.clone();

        let clone = if let ComputableKind::ScopeParameter { position, ty } = kind {
            let expected = self.scope(target)?.parameters.len();
            if position != expected {
                return Err(StructuralError::ParameterOrder {
                    scope: target,
                    expected,
                    found: position,
                }
                .into());
            }
            self.add_parameter(target, ty)?
        } else {
            self.insert_node(target, kind, inputs)?
        };
        let node = &mut self.nodes[clone.index()];
        node.pinned = pinned;
        node.label = label;
        Ok(clone)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "arena sizes fit in u32"
)]
pub(crate) fn id_at(index: usize) -> ComputableId {
    ComputableId::new(index as u32)
}

fn decrement(edges: &mut IndexMap<ScopeId, usize>, key: ScopeId) {
    if let Some(count) = edges.get_mut(&key) {
        *count -= 1;
        if *count == 0 {
            edges.shift_remove(&key);
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
