//! Derived trait queries and evaluation-phase classification.
//!
//! A node's effective traits fold its kind's own flags with those of its
//! inputs and, for scope-creating kinds, with everything inside the
//! scopes it instantiates. Results are memoized until the next mutation.

use rustc_hash::FxHashSet;

use crate::computable::ComputableTraits;
use crate::error::{IrResult, StructuralError};
use crate::ids::{ComputableId, ScopeId};
use crate::stack::ensure_sufficient_stack;

use super::Graph;

/// When generated code evaluates a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvaluationPhase {
    /// Known at compile time; hoisted out of component code.
    Static,
    /// Computed once when the component mounts.
    Mount,
    /// Recomputed whenever a mutable input changes.
    Reactive,
    /// Resolved asynchronously after mount.
    Deferred,
}

impl Graph {
    /// Effective traits of `id`.
    ///
    /// Fails with [`StructuralError::ScopeCycle`] if the fold reaches a
    /// scope that is already being folded.
    pub fn traits(&self, id: ComputableId) -> IrResult<ComputableTraits> {
        self.computable(id)?;
        let mut active: FxHashSet<ScopeId> = FxHashSet::default();
        self.memoized_traits(id, &mut active)
    }

    fn memoized_traits(
        &self,
        id: ComputableId,
        active: &mut FxHashSet<ScopeId>,
    ) -> IrResult<ComputableTraits> {
        if let Some(&cached) = self.traits_memo.borrow().get(&id) {
            return Ok(cached);
        }
        let traits = ensure_sufficient_stack(|| self.compute_traits(id, active))?;
        self.traits_memo.borrow_mut().insert(id, traits);
        Ok(traits)
    }

    fn compute_traits(
        &self,
        id: ComputableId,
        active: &mut FxHashSet<ScopeId>,
    ) -> IrResult<ComputableTraits> {
        const STICKY: ComputableTraits = ComputableTraits::MUTABLE
            .union(ComputableTraits::SIDE_EFFECTS)
            .union(ComputableTraits::ASYNC);

        let node = &self.nodes[id.index()];
        let own = node.kind.own_traits();
        let mut traits = own;
        let mut inputs_invariant = true;
        for &input in &node.inputs {
            let of_input = self.memoized_traits(input, active)?;
            traits |= of_input & STICKY;
            inputs_invariant &= of_input.contains(ComputableTraits::INVARIANT);
        }

        for child in node.kind.child_scopes() {
            if !active.insert(child) {
                return Err(StructuralError::ScopeCycle(child).into());
            }
            for &inner in &self.scopes[child.index()].computables {
                if self.nodes[inner.index()].kind.is_parameter() {
                    continue;
                }
                traits |= self.memoized_traits(inner, active)? & STICKY;
            }
            active.remove(&child);
        }

        if own.contains(ComputableTraits::INVARIANT)
            || (node.kind.is_pure() && inputs_invariant)
        {
            traits |= ComputableTraits::INVARIANT;
        }
        if traits.intersects(ComputableTraits::MUTABLE | ComputableTraits::ASYNC) {
            traits.remove(ComputableTraits::INVARIANT);
        }
        Ok(traits)
    }

    pub fn is_invariant(&self, id: ComputableId) -> IrResult<bool> {
        Ok(self.traits(id)?.contains(ComputableTraits::INVARIANT))
    }

    pub fn is_mutable(&self, id: ComputableId) -> IrResult<bool> {
        Ok(self.traits(id)?.contains(ComputableTraits::MUTABLE))
    }

    pub fn is_side_effect_causing(&self, id: ComputableId) -> IrResult<bool> {
        Ok(self.traits(id)?.contains(ComputableTraits::SIDE_EFFECTS))
    }

    pub fn is_async(&self, id: ComputableId) -> IrResult<bool> {
        Ok(self.traits(id)?.contains(ComputableTraits::ASYNC))
    }

    /// Default phase classification, derived from traits alone.
    pub fn classify_phase(&self, id: ComputableId) -> IrResult<EvaluationPhase> {
        let traits = self.traits(id)?;
        Ok(if traits.contains(ComputableTraits::ASYNC) {
            EvaluationPhase::Deferred
        } else if traits.contains(ComputableTraits::MUTABLE) {
            EvaluationPhase::Reactive
        } else if traits.contains(ComputableTraits::INVARIANT) {
            EvaluationPhase::Static
        } else {
            EvaluationPhase::Mount
        })
    }

    /// Number of distinct dependees of `id`.
    pub fn dependee_count(&self, id: ComputableId) -> IrResult<usize> {
        Ok(self.computable(id)?.dependees.len())
    }
}
