//! Computables: typed nodes of the per-scope dataflow graph.
//!
//! A [`Computable`] has one owning scope, an ordered input list (the same
//! input may occupy several positions), a reverse index of dependees that
//! records *which* positions reference it, and a current output type.
//!
//! Nodes are stored in the [`Graph`](crate::Graph) arena and manipulated
//! through its methods; this module only holds the per-node data and the
//! kind catalogue.

use bitflags::bitflags;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::ids::{ComputableId, ScopeId};
use crate::types::IrType;

mod kind;
pub(crate) mod typing;

pub use kind::{ComputableKind, IterateConfig, PrimitiveOp, ScopeChoice, INTERMEDIATE_FIELD};

bitflags! {
    /// Evaluation traits of a Computable.
    ///
    /// Kinds declare their own traits; the graph derives the effective
    /// set by folding in inputs (and child scopes for scope-creating
    /// kinds).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ComputableTraits: u8 {
        /// Output is fixed once created.
        const INVARIANT = 1;
        /// Output may change after creation.
        const MUTABLE = 1 << 1;
        /// Evaluating the node affects the rendered output or runtime.
        const SIDE_EFFECTS = 1 << 2;
        /// Output resolves asynchronously.
        const ASYNC = 1 << 3;
    }
}

/// Positions at which a dependee reads a given input.
pub type Positions = SmallVec<[usize; 2]>;

/// One node of the graph.
#[derive(Clone, Debug)]
pub struct Computable {
    pub(crate) kind: ComputableKind,
    /// `None` once destroyed.
    pub(crate) scope: Option<ScopeId>,
    pub(crate) inputs: SmallVec<[ComputableId; 4]>,
    pub(crate) dependees: IndexMap<ComputableId, Positions>,
    pub(crate) ty: IrType,
    pub(crate) pinned: bool,
    pub(crate) label: Option<String>,
}

impl Computable {
    pub fn kind(&self) -> &ComputableKind {
        &self.kind
    }

    /// The owning scope, or `None` once destroyed.
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    pub fn inputs(&self) -> &[ComputableId] {
        &self.inputs
    }

    /// Dependees and the input positions at which each reads this node.
    pub fn dependees(&self) -> &IndexMap<ComputableId, Positions> {
        &self.dependees
    }

    pub fn output_type(&self) -> &IrType {
        &self.ty
    }

    /// Pinned nodes are never moved by rewrites.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Diagnostic name (e.g. the local reference it was generated from).
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_alive(&self) -> bool {
        self.scope.is_some()
    }
}
