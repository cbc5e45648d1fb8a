//! Synchronous lifecycle notifications.
//!
//! Observers registered on a [`Graph`](crate::Graph) see every committed
//! mutation, in order, before the mutating call returns. Nothing is
//! queued: a failed operation emits nothing.

use crate::ids::{ComputableId, ScopeId};

/// A committed change to the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    ComputableAdded {
        computable: ComputableId,
        scope: ScopeId,
    },
    /// `dependee` now reads `input` at `position`.
    DependeeAdded {
        input: ComputableId,
        dependee: ComputableId,
        position: usize,
    },
    /// `dependee` no longer reads `input` at `position`.
    DependeeRemoved {
        input: ComputableId,
        dependee: ComputableId,
        position: usize,
    },
    /// `instance` now instantiates `scope`.
    InstanceAdded {
        scope: ScopeId,
        instance: ComputableId,
    },
    InstanceRemoved {
        scope: ScopeId,
        instance: ComputableId,
    },
    Destroyed {
        computable: ComputableId,
        scope: ScopeId,
    },
    ScopeRemoved(ScopeId),
}

/// Receives [`GraphEvent`]s.
pub trait GraphObserver {
    fn on_event(&mut self, event: &GraphEvent);
}
