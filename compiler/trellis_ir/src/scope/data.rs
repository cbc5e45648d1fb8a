//! Per-scope bookkeeping.

use indexmap::{IndexMap, IndexSet};

use crate::ids::{ComputableId, ScopeId};

/// How a scope participates in rewrites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ScopeRole {
    /// An ordinary scope; eligible for inlining and pushdown.
    #[default]
    Internal,
    /// A component entry point handed to the runtime.
    EntryPoint,
    /// Root of an independently loaded shard.
    ShardRoot,
}

impl ScopeRole {
    /// Roots are never inlined or rebuilt.
    pub fn is_root(self) -> bool {
        !matches!(self, ScopeRole::Internal)
    }
}

/// A named, boundaried subgraph with formal inputs and named outputs.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub(crate) name: String,
    pub(crate) role: ScopeRole,
    pub(crate) parameters: Vec<ComputableId>,
    pub(crate) outputs: IndexMap<String, ComputableId>,
    pub(crate) computables: IndexSet<ComputableId>,
    /// Instance nodes (anywhere) that instantiate this scope.
    pub(crate) instances: IndexSet<ComputableId>,
    /// Multiset edges of the coarse instantiation graph.
    pub(crate) instantiates: IndexMap<ScopeId, usize>,
    pub(crate) instantiated_by: IndexMap<ScopeId, usize>,
    pub(crate) removed: bool,
}

impl Scope {
    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ScopeRole {
        self.role
    }

    /// Formal inputs in position order.
    pub fn parameters(&self) -> &[ComputableId] {
        &self.parameters
    }

    /// Named outputs in registration order.
    pub fn outputs(&self) -> &IndexMap<String, ComputableId> {
        &self.outputs
    }

    pub fn output(&self, field: &str) -> Option<ComputableId> {
        self.outputs.get(field).copied()
    }

    /// The field `computable` is registered under, if any.
    pub fn output_field_of(&self, computable: ComputableId) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(_, &c)| c == computable)
            .map(|(field, _)| field.as_str())
    }

    /// Every live Computable of the scope, in creation order.
    pub fn computables(&self) -> &IndexSet<ComputableId> {
        &self.computables
    }

    pub fn instances(&self) -> &IndexSet<ComputableId> {
        &self.instances
    }

    /// Scopes instantiated from inside this one.
    pub fn instantiates(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.instantiates.keys().copied()
    }

    /// Scopes containing an instance of this one.
    pub fn instantiated_by(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.instantiated_by.keys().copied()
    }

    /// The parameter list is fixed while any instance exists.
    pub fn is_frozen(&self) -> bool {
        !self.instances.is_empty()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}
