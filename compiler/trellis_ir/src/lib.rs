//! Trellis IR - the Scope/Computable graph
//!
//! This crate contains the core data structures of the Trellis UI compiler:
//! - The type lattice (`IrType`) and its containment rules
//! - Computables: typed dataflow nodes with positional inputs
//! - Scopes: named subgraphs with formal parameters and named outputs
//! - Scope-creating nodes (plain, polymorphic and iterating instances)
//! - A generic cycle-detecting topological sort
//! - Lifecycle observers and code-generation hooks
//!
//! # Design Philosophy
//!
//! - **One arena per compilation unit**: `Graph` allocates every id, so
//!   two graphs never share identities.
//! - **Validate, then commit**: every mutation either succeeds completely
//!   or leaves the graph untouched.
//! - **Closed kinds**: `ComputableKind` is an exhaustive enum; per-kind
//!   behavior is a `match`, never a lookup by name.
//!
//! Literal numbers are stored as u64 bits so types stay `Eq + Hash`.

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-allocated types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

pub mod computable;
mod element;
pub mod error;
mod graph;
mod hooks;
mod ids;
pub mod instance;
pub mod observer;
pub mod scope;
mod stack;
pub mod topo;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use computable::{
    Computable, ComputableKind, ComputableTraits, IterateConfig, Positions, PrimitiveOp,
    ScopeChoice, INTERMEDIATE_FIELD,
};
pub use error::{IrError, IrResult, StructuralError, TypeMismatch, UsageError};
pub use graph::{EvaluationPhase, Graph};
pub use hooks::{walk_for_codegen, CodegenHooks};
pub use ids::{ComputableId, ScopeId};
pub use instance::{reconcile, ChoiceSpec, ElementAction, IterateSpec, Reconciliation};
pub use observer::{GraphEvent, GraphObserver};
pub use scope::{Scope, ScopeRole};
pub use stack::ensure_sufficient_stack;
pub use topo::{topological_sort, CycleError};
pub use types::{is_type_contained, CompoundType, IrType, LiteralValue};

static_assert_size!(ComputableId, 4);
static_assert_size!(ScopeId, 4);
