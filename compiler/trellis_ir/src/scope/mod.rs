//! Scopes: named subgraphs with ordered parameters and named outputs.
//!
//! Scope data lives in the [`Graph`] arena next to the Computables; the
//! operations here are `Graph` methods so that output edits can retype
//! instances elsewhere in the same validate-then-commit step.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::computable::typing::Overlay;
use crate::computable::ComputableKind;
use crate::error::{IrResult, StructuralError};
use crate::graph::Graph;
use crate::ids::{ComputableId, ScopeId};
use crate::observer::GraphEvent;
use crate::topo::topological_sort;
use crate::types::IrType;

mod data;

pub use data::{Scope, ScopeRole};

impl Graph {
    pub fn create_scope(&mut self, name: impl Into<String>, role: ScopeRole) -> ScopeId {
        let id = scope_at(self.scopes.len());
        self.scopes.push(Scope {
            name: name.into(),
            role,
            ..Scope::default()
        });
        tracing::trace!(scope = id.raw(), "scope created");
        id
    }

    /// A live scope.
    pub fn scope(&self, id: ScopeId) -> IrResult<&Scope> {
        match self.scopes.get(id.index()) {
            Some(scope) if !scope.removed => Ok(scope),
            _ => Err(StructuralError::ScopeRemoved(id).into()),
        }
    }

    /// Every live scope, in creation order.
    pub fn live_scopes(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.removed)
            .map(|(i, _)| scope_at(i))
    }

    /// Append a formal parameter. Fails once the scope is instantiated.
    pub fn add_parameter(&mut self, scope: ScopeId, ty: IrType) -> IrResult<ComputableId> {
        let data = self.scope(scope)?;
        if data.is_frozen() {
            return Err(StructuralError::ParametersFrozen(scope).into());
        }
        let position = data.parameters.len();
        let id = self.insert_node(
            scope,
            ComputableKind::ScopeParameter { position, ty },
            Default::default(),
        )?;
        self.scopes[scope.index()].parameters.push(id);
        Ok(id)
    }

    // ── Outputs ─────────────────────────────────────────────────────

    /// Register `computable` as output `field`.
    pub fn add_output(
        &mut self,
        scope: ScopeId,
        computable: ComputableId,
        field: impl Into<String>,
    ) -> IrResult<()> {
        let field = field.into();
        let data = self.owned_by(scope, computable)?;
        if data.outputs.contains_key(&field) {
            return Err(StructuralError::DuplicateOutput { scope, field }.into());
        }
        if let Some(existing) = data.output_field_of(computable) {
            return Err(StructuralError::AlreadyAnOutput {
                scope,
                computable,
                field: existing.to_owned(),
            }
            .into());
        }
        let mut outputs = data.outputs.clone();
        outputs.insert(field, computable);
        self.commit_outputs(scope, outputs)
    }

    /// Point an existing output field at `computable`.
    pub fn replace_output(
        &mut self,
        scope: ScopeId,
        field: &str,
        computable: ComputableId,
    ) -> IrResult<()> {
        let data = self.owned_by(scope, computable)?;
        let mut outputs = data.outputs.clone();
        let Some(slot) = outputs.get_mut(field) else {
            return Err(StructuralError::MissingOutput {
                scope,
                field: field.to_owned(),
            }
            .into());
        };
        *slot = computable;
        self.commit_outputs(scope, outputs)
    }

    pub fn remove_output(&mut self, scope: ScopeId, field: &str) -> IrResult<ComputableId> {
        let mut outputs = self.scope(scope)?.outputs.clone();
        let Some(removed) = outputs.shift_remove(field) else {
            return Err(StructuralError::MissingOutput {
                scope,
                field: field.to_owned(),
            }
            .into());
        };
        self.commit_outputs(scope, outputs)?;
        Ok(removed)
    }

    /// Compound of the named outputs, or `Void` when there are none.
    pub fn scope_output_type(&self, scope: ScopeId) -> IrResult<IrType> {
        self.scope(scope)?;
        Ok(Overlay::new(self).scope_output_type(scope))
    }

    /// Whether the body of `scope` still types when each parameter takes
    /// the output type of the matching entry of `args` instead of its
    /// declared type. Nothing is written.
    ///
    /// Arguments may be narrower than the parameter they fill, so a body
    /// that is valid against the declared types can still fail when
    /// copied onto the arguments, e.g. a projection of a field the
    /// argument does not have. Instances of `scope` elsewhere are retyped
    /// too, which makes the answer conservative.
    pub fn admits_arguments(&self, scope: ScopeId, args: &[ComputableId]) -> IrResult<bool> {
        let params = self.scope(scope)?.parameters();
        if params.len() != args.len() {
            return Err(StructuralError::ArityMismatch {
                expected: params.len(),
                found: args.len(),
            }
            .into());
        }
        let mut narrowed: FxHashMap<ComputableId, IrType> = FxHashMap::default();
        for (&param, &arg) in params.iter().zip(args) {
            narrowed.insert(param, self.output_type(arg)?.clone());
        }
        let mut bindings: Vec<(ComputableId, usize)> = Vec::new();
        for &param in params {
            for (&dependee, positions) in self.dependees(param)? {
                bindings.extend(positions.iter().map(|&position| (dependee, position)));
            }
        }

        let mut overlay = Overlay::new(self).with_types(narrowed);
        let outcome = bindings
            .iter()
            .try_for_each(|&(dependee, position)| overlay.validate_binding(dependee, position))
            .and_then(|()| overlay.propagate(bindings.iter().map(|&(dependee, _)| dependee)));
        if let Err(err) = &outcome {
            tracing::trace!(scope = scope.raw(), %err, "arguments rejected by scope body");
        }
        Ok(outcome.is_ok())
    }

    fn owned_by(&self, scope: ScopeId, computable: ComputableId) -> IrResult<&Scope> {
        let data = self.scope(scope)?;
        self.computable(computable)?;
        if self.containing_scope(computable) != Some(scope) {
            return Err(StructuralError::NotInScope { scope, computable }.into());
        }
        Ok(data)
    }

    /// Retype instances under the new outputs, then commit.
    fn commit_outputs(
        &mut self,
        scope: ScopeId,
        outputs: IndexMap<String, ComputableId>,
    ) -> IrResult<()> {
        let types = {
            let mut overlay = Overlay::new(self).with_outputs(scope, outputs.clone());
            overlay.propagate(std::iter::empty())?;
            overlay.into_types()
        };
        self.scopes[scope.index()].outputs = outputs;
        self.apply_types(types);
        self.invalidate();
        Ok(())
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Live Computables that are not parameters, in creation order.
    pub fn non_parameter_computables(&self, scope: ScopeId) -> IrResult<Vec<ComputableId>> {
        Ok(self
            .scope(scope)?
            .computables
            .iter()
            .copied()
            .filter(|&c| !self.nodes[c.index()].kind.is_parameter())
            .collect())
    }

    /// The scope's Computables, inputs before dependees.
    pub fn sorted_computables(&self, scope: ScopeId) -> IrResult<Vec<ComputableId>> {
        let members = self.scope(scope)?.computables.iter().copied();
        topological_sort(members, |id| self.nodes[id.index()].inputs.clone())
            .map_err(|e| StructuralError::ComputableCycle(e.participant).into())
    }

    /// Live scopes, each after every scope it instantiates.
    pub fn sorted_scopes(&self) -> IrResult<Vec<ScopeId>> {
        topological_sort(self.live_scopes(), |id| {
            self.scopes[id.index()]
                .instantiates
                .keys()
                .copied()
                .collect::<Vec<_>>()
        })
        .map_err(|e| StructuralError::ScopeCycle(e.participant).into())
    }

    /// Destroy every Computable of `scope`.
    pub fn flush(&mut self, scope: ScopeId) -> IrResult<()> {
        let members: Vec<ComputableId> = self.scope(scope)?.computables.iter().copied().collect();
        self.destroy_all(members)
    }

    /// Flush and tombstone a scope nothing instantiates any more.
    pub fn remove_scope(&mut self, scope: ScopeId) -> IrResult<()> {
        let instances = self.scope(scope)?.instances.len();
        if instances > 0 {
            return Err(StructuralError::ScopeStillInstantiated { scope, instances }.into());
        }
        self.flush(scope)?;
        self.scopes[scope.index()].removed = true;
        self.emit(GraphEvent::ScopeRemoved(scope));
        tracing::trace!(scope = scope.raw(), "scope removed");
        Ok(())
    }

    /// Rebuild `scope` as a fresh, uninstantiated scope.
    ///
    /// Parameters are cloned first, in position order, then the remaining
    /// Computables in dependency order, then outputs are re-registered
    /// under the same field names.
    pub fn clone_scope(&mut self, scope: ScopeId) -> IrResult<ScopeId> {
        let data = self.scope(scope)?;
        let name = format!("{}.clone", data.name);
        let role = data.role;
        let parameters = data.parameters.clone();
        let outputs = data.outputs.clone();
        let body = self.sorted_computables(scope)?;

        let target = self.create_scope(name, role);
        let mut mapping: FxHashMap<ComputableId, ComputableId> = FxHashMap::default();
        for param in parameters {
            let clone = self.clone_computable(param, None, Some(target))?;
            mapping.insert(param, clone);
        }
        for id in body {
            if mapping.contains_key(&id) {
                continue;
            }
            let inputs = self.nodes[id.index()]
                .inputs
                .iter()
                .map(|&i| {
                    mapping
                        .get(&i)
                        .copied()
                        .ok_or(StructuralError::NotInScope { scope, computable: i })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let clone = self.clone_computable(id, Some(&inputs), Some(target))?;
            mapping.insert(id, clone);
        }
        for (field, original) in outputs {
            let clone = mapping
                .get(&original)
                .copied()
                .ok_or(StructuralError::Destroyed(original))?;
            self.add_output(target, clone, field)?;
        }
        Ok(target)
    }
}

#[expect(clippy::cast_possible_truncation, reason = "arena sizes fit in u32")]
pub(crate) fn scope_at(index: usize) -> ScopeId {
    ScopeId::new(index as u32)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
