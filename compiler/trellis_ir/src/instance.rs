//! Scope-creating Computables: plain, polymorphic and iterating instances.
//!
//! All three bind runs of their inputs to the formal parameters of child
//! scopes and register themselves in the coarse instantiation graph.
//! Choice keys and iteration layouts are checked here; the per-argument
//! type checks are the ordinary input validation in
//! [`typing`](crate::computable::typing).

use std::collections::VecDeque;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::computable::typing::{NodeOverride, Overlay};
use crate::computable::{ComputableKind, IterateConfig, ScopeChoice};
use crate::error::{IrResult, StructuralError, TypeMismatch, UsageError};
use crate::graph::Graph;
use crate::ids::{ComputableId, ScopeId};
use crate::types::{is_type_contained, IrType, LiteralValue};

/// Inputs of a new [`ComputableKind::IterateArray`].
#[derive(Clone, Debug)]
pub struct IterateSpec {
    pub source: ComputableId,
    pub initial: ComputableId,
    /// Callback deciding which old and new elements correspond.
    pub identity: Option<ComputableId>,
    /// Callback picking a choice per element.
    pub map: Option<ComputableId>,
    pub choices: Vec<ChoiceSpec>,
}

/// One candidate child scope and the captured arguments bound to it.
#[derive(Clone, Debug)]
pub struct ChoiceSpec {
    pub key: Option<IrType>,
    pub scope: ScopeId,
    pub args: Vec<ComputableId>,
}

impl ChoiceSpec {
    pub fn new(scope: ScopeId, args: impl IntoIterator<Item = ComputableId>) -> Self {
        Self {
            key: None,
            scope,
            args: args.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn keyed(mut self, key: IrType) -> Self {
        self.key = Some(key);
        self
    }
}

impl Graph {
    /// Instantiate `child` once inside `parent`.
    pub fn add_scope_instance(
        &mut self,
        parent: ScopeId,
        child: ScopeId,
        args: &[ComputableId],
    ) -> IrResult<ComputableId> {
        self.create_computable(
            parent,
            ComputableKind::ScopeInstance { scope: child },
            args.iter().copied(),
        )
    }

    /// A polymorphic instance with no choices yet; see [`Graph::add_choice`].
    pub fn add_polymorphic_instance(
        &mut self,
        parent: ScopeId,
        discriminant: ComputableId,
    ) -> IrResult<ComputableId> {
        self.create_computable(
            parent,
            ComputableKind::PolymorphicScopeInstance {
                choices: Vec::new(),
            },
            [discriminant],
        )
    }

    /// Append a choice to a polymorphic instance.
    ///
    /// The instance's output type is re-derived and the change propagated
    /// atomically; on error neither the instance nor anything downstream
    /// has changed.
    pub fn add_choice(
        &mut self,
        instance: ComputableId,
        key: IrType,
        scope: ScopeId,
        args: &[ComputableId],
    ) -> IrResult<()> {
        let node = self.computable(instance)?;
        let ComputableKind::PolymorphicScopeInstance { choices } = &node.kind else {
            return Err(UsageError::UnexpectedKind {
                computable: instance,
                reason: "choices can only be added to a polymorphic instance",
            }
            .into());
        };
        let parent = node.scope.ok_or(StructuralError::Destroyed(instance))?;
        self.scope(scope)?;
        if scope == parent {
            return Err(StructuralError::SelfInstantiation(parent).into());
        }

        let start = node.inputs.len();
        let mut choices = choices.clone();
        choices.push(ScopeChoice {
            key: Some(key),
            scope,
            args: start..start + args.len(),
        });
        let kind = ComputableKind::PolymorphicScopeInstance { choices };
        let mut inputs = node.inputs.clone();
        inputs.extend(args.iter().copied());

        let types = {
            let mut overlay = Overlay::new(self).with_node(NodeOverride {
                id: instance,
                kind: kind.clone(),
                inputs: inputs.clone(),
            });
            overlay.check_arity(&kind, inputs.len())?;
            check_scope_creating(&overlay, &kind)?;
            for position in start..inputs.len() {
                overlay.validate_binding(instance, position)?;
            }
            overlay.propagate([instance])?;
            overlay.into_types()
        };

        self.nodes[instance.index()].kind = kind;
        self.nodes[instance.index()].inputs = inputs;
        for (offset, &arg) in args.iter().enumerate() {
            self.link(arg, instance, start + offset);
        }
        self.register_instance(parent, scope, instance);
        self.apply_types(types);
        self.invalidate();
        Ok(())
    }

    /// Fold `spec.choices` over the elements of `spec.source`.
    pub fn add_iterate_array(
        &mut self,
        parent: ScopeId,
        spec: IterateSpec,
    ) -> IrResult<ComputableId> {
        let mut inputs: SmallVec<[ComputableId; 4]> =
            smallvec::smallvec![spec.source, spec.initial];
        inputs.extend(spec.identity);
        inputs.extend(spec.map);
        let mut choices = Vec::with_capacity(spec.choices.len());
        for choice in spec.choices {
            let start = inputs.len();
            inputs.extend(choice.args);
            choices.push(ScopeChoice {
                key: choice.key,
                scope: choice.scope,
                args: start..inputs.len(),
            });
        }
        let config = IterateConfig {
            choices,
            has_identity: spec.identity.is_some(),
            has_map: spec.map.is_some(),
        };
        self.create_computable(parent, ComputableKind::IterateArray(config), inputs)
    }

    /// Exactly one `Truthy` and one `Falsy` choice, and nothing else.
    pub fn is_truthy_falsy(&self, instance: ComputableId) -> IrResult<bool> {
        let choices = self.polymorphic_choices(instance)?;
        let keyed = |want: &IrType| choices.iter().filter(|c| c.key.as_ref() == Some(want)).count();
        Ok(choices.len() == 2 && keyed(&IrType::Truthy) == 1 && keyed(&IrType::Falsy) == 1)
    }

    /// The choice a discriminant equal to `value` selects.
    pub fn active_choice(
        &self,
        instance: ComputableId,
        value: &LiteralValue,
    ) -> IrResult<Option<&ScopeChoice>> {
        let value = IrType::ExactValue(value.clone());
        Ok(self
            .polymorphic_choices(instance)?
            .iter()
            .find(|c| c.key.as_ref().is_some_and(|k| is_type_contained(k, &value))))
    }

    /// The arguments bound to choice `index` of a polymorphic or
    /// iterating instance.
    pub fn choice_args(&self, instance: ComputableId, index: usize) -> IrResult<&[ComputableId]> {
        let node = self.computable(instance)?;
        if !node.kind.is_scope_creating() {
            return Err(UsageError::NotScopeCreating(instance).into());
        }
        let choice = node.kind.choices().get(index).ok_or_else(|| {
            UsageError::MalformedChoice(format!("{instance} has no choice {index}"))
        })?;
        Ok(&node.inputs[choice.args.clone()])
    }

    fn polymorphic_choices(&self, instance: ComputableId) -> IrResult<&[ScopeChoice]> {
        match &self.computable(instance)?.kind {
            ComputableKind::PolymorphicScopeInstance { choices } => Ok(choices),
            _ => Err(UsageError::UnexpectedKind {
                computable: instance,
                reason: "not a polymorphic instance",
            }
            .into()),
        }
    }
}

/// Kind-level rules of scope-creating nodes that need the graph.
pub(crate) fn check_scope_creating(overlay: &Overlay<'_>, kind: &ComputableKind) -> IrResult<()> {
    match kind {
        ComputableKind::PolymorphicScopeInstance { choices } => {
            for (i, choice) in choices.iter().enumerate() {
                let Some(key) = &choice.key else {
                    return Err(UsageError::MalformedChoice(format!(
                        "choice for {} has no key",
                        choice.scope
                    ))
                    .into());
                };
                check_key(key, &choices[..i])?;
            }
            Ok(())
        }
        ComputableKind::IterateArray(config) => check_iteration(overlay, config),
        _ => Ok(()),
    }
}

fn check_key(key: &IrType, earlier: &[ScopeChoice]) -> IrResult<()> {
    if !key.is_choice_key() {
        return Err(UsageError::InvalidChoiceKey(key.clone()).into());
    }
    for existing in earlier.iter().filter_map(|c| c.key.as_ref()) {
        if is_type_contained(existing, key) || is_type_contained(key, existing) {
            return Err(UsageError::OverlappingChoiceKey {
                key: key.clone(),
                existing: existing.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn check_iteration(overlay: &Overlay<'_>, config: &IterateConfig) -> IrResult<()> {
    if config.choices.is_empty() {
        return Err(UsageError::MalformedIteration("no choice scope".to_owned()).into());
    }
    if config.has_map {
        for (i, choice) in config.choices.iter().enumerate() {
            let Some(key) = &choice.key else {
                return Err(UsageError::MalformedIteration(format!(
                    "choice for {} needs a key when a map is given",
                    choice.scope
                ))
                .into());
            };
            check_key(key, &config.choices[..i])?;
        }
    } else if config.choices.len() > 1 {
        return Err(UsageError::MalformedIteration(
            "several choices need a map to select between them".to_owned(),
        )
        .into());
    } else if config.choices.iter().any(|c| c.key.is_some()) {
        return Err(UsageError::MalformedIteration(
            "a mapless iteration takes no choice key".to_owned(),
        )
        .into());
    }

    for choice in &config.choices {
        let produced = overlay.intermediate_type(choice.scope)?;
        let slot = overlay.parameter_type(choice.scope, 1).ok_or_else(|| {
            UsageError::MalformedIteration(format!(
                "{} has no intermediate parameter",
                choice.scope
            ))
        })?;
        if !is_type_contained(&slot, &produced) {
            return Err(TypeMismatch {
                expected: slot,
                actual: produced,
                context: format!("intermediate output of {}", choice.scope),
            }
            .into());
        }
    }
    Ok(())
}

/// What to do with one element of the new sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementAction {
    /// Keep the child instance built for this old element.
    Reuse(usize),
    Create,
}

/// Outcome of matching an updated sequence against the previous one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// One action per new element, in order.
    pub actions: Vec<ElementAction>,
    /// Old elements with no counterpart, ascending.
    pub teardown: Vec<usize>,
}

/// Match elements of `new` to elements of `old` by identity key.
///
/// Each old element is reused at most once; duplicate keys pair up in
/// order of appearance.
pub fn reconcile<K: Eq + Hash>(old: &[K], new: &[K]) -> Reconciliation {
    let mut available: FxHashMap<&K, VecDeque<usize>> = FxHashMap::default();
    for (index, key) in old.iter().enumerate() {
        available.entry(key).or_default().push_back(index);
    }
    let mut reused = vec![false; old.len()];
    let actions = new
        .iter()
        .map(|key| match available.get_mut(key).and_then(VecDeque::pop_front) {
            Some(index) => {
                reused[index] = true;
                ElementAction::Reuse(index)
            }
            None => ElementAction::Create,
        })
        .collect();
    let teardown = reused
        .iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(index, _)| index)
        .collect();
    Reconciliation { actions, teardown }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
