//! The closed set of Computable kinds.
//!
//! Each kind supplies its own static facts here (name, own traits,
//! relocatability, child scopes). Typing rules that need to look at the
//! graph live in [`typing`](super::typing).

use std::ops::Range;

use smallvec::SmallVec;

use super::ComputableTraits;
use crate::ids::ScopeId;
use crate::types::{IrType, LiteralValue};

/// Name of the child-scope output that carries an iteration's accumulator.
pub const INTERMEDIATE_FIELD: &str = "intermediate";

/// Primitive operators evaluated inline by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveOp {
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    Add,
    Concat,
    Coalesce,
}

impl PrimitiveOp {
    /// `(min, max)` number of operands.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            PrimitiveOp::Not => (1, Some(1)),
            PrimitiveOp::And
            | PrimitiveOp::Or
            | PrimitiveOp::Equal
            | PrimitiveOp::NotEqual
            | PrimitiveOp::Add
            | PrimitiveOp::Coalesce => (2, Some(2)),
            PrimitiveOp::Concat => (1, None),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveOp::Not => "not",
            PrimitiveOp::And => "and",
            PrimitiveOp::Or => "or",
            PrimitiveOp::Equal => "eq",
            PrimitiveOp::NotEqual => "ne",
            PrimitiveOp::Add => "add",
            PrimitiveOp::Concat => "concat",
            PrimitiveOp::Coalesce => "coalesce",
        }
    }
}

/// One candidate child scope of a polymorphic or iterating instance.
///
/// `args` is the run of the owning node's inputs bound to the child's
/// formal parameters (for iterations: to the captured parameters that
/// follow `item` and `intermediate`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeChoice {
    /// Selector for this choice. Always present for polymorphic instances;
    /// present on iterations only when a map function picks the choice.
    pub key: Option<IrType>,
    pub scope: ScopeId,
    pub args: Range<usize>,
}

/// Layout of an `IterateArray` node.
///
/// Inputs are `source, initial, [identity], [map], choice args...`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IterateConfig {
    pub choices: Vec<ScopeChoice>,
    pub has_identity: bool,
    pub has_map: bool,
}

impl IterateConfig {
    pub const SOURCE: usize = 0;
    pub const INITIAL: usize = 1;
    /// Child parameters preceding the captured ones: `item`, `intermediate`.
    pub const LEADING_PARAMETERS: usize = 2;

    pub fn identity_position(&self) -> Option<usize> {
        self.has_identity.then_some(2)
    }

    pub fn map_position(&self) -> Option<usize> {
        self.has_map.then_some(2 + usize::from(self.has_identity))
    }

    /// First input position holding a choice argument.
    pub fn first_choice_arg(&self) -> usize {
        2 + usize::from(self.has_identity) + usize::from(self.has_map)
    }

    /// A single mapless choice: the runtime's fast path.
    pub fn is_bare(&self) -> bool {
        !self.has_map && self.choices.len() == 1
    }
}

/// What a Computable is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComputableKind {
    /// Formal input `position` of the containing scope.
    ScopeParameter { position: usize, ty: IrType },
    Literal(LiteralValue),
    /// A symbol provided by the runtime (imported helper, global).
    ExternalRef { symbol: String, ty: IrType },
    /// Field `field` of input 0.
    Projection { field: String },
    Primitive(PrimitiveOp),
    /// Opaque runtime call; `traits` declares its effects.
    Call {
        function: String,
        ty: IrType,
        traits: ComputableTraits,
    },
    /// `cond ? then : else`.
    Conditional,
    CompoundLiteral { fields: Vec<String> },
    TupleLiteral,
    /// Mutable reactive cell seeded by input 0.
    State { ty: IrType },
    /// Creates a view element at the placement in input 0.
    ViewNode { tag: String },
    /// Creates a text node at input 0 showing input 1.
    TextNode,
    /// Binds attribute `name` of element 0 to input 1.
    Attribute { name: String },
    /// Subscribes callback 1 to `event` on element 0.
    EventListener { event: String },
    /// Stand-in placement for an element built before its position is known.
    VirtualPlacement,
    /// Places element 1 (built elsewhere) at placement 0.
    ElementArgument,
    /// Places the same-scope element instance 1 at placement 0.
    ElementPassthrough,
    ScopeInstance { scope: ScopeId },
    /// Input 0 is the discriminant; each choice binds a run of inputs.
    PolymorphicScopeInstance { choices: Vec<ScopeChoice> },
    IterateArray(IterateConfig),
}

impl ComputableKind {
    /// Stable name for diagnostics and dumps.
    pub fn name(&self) -> &'static str {
        match self {
            ComputableKind::ScopeParameter { .. } => "scope_parameter",
            ComputableKind::Literal(_) => "literal",
            ComputableKind::ExternalRef { .. } => "external_ref",
            ComputableKind::Projection { .. } => "projection",
            ComputableKind::Primitive(_) => "primitive",
            ComputableKind::Call { .. } => "call",
            ComputableKind::Conditional => "conditional",
            ComputableKind::CompoundLiteral { .. } => "compound_literal",
            ComputableKind::TupleLiteral => "tuple_literal",
            ComputableKind::State { .. } => "state",
            ComputableKind::ViewNode { .. } => "view_node",
            ComputableKind::TextNode => "text_node",
            ComputableKind::Attribute { .. } => "attribute",
            ComputableKind::EventListener { .. } => "event_listener",
            ComputableKind::VirtualPlacement => "virtual_placement",
            ComputableKind::ElementArgument => "element_argument",
            ComputableKind::ElementPassthrough => "element_passthrough",
            ComputableKind::ScopeInstance { .. } => "scope_instance",
            ComputableKind::PolymorphicScopeInstance { .. } => "polymorphic_scope_instance",
            ComputableKind::IterateArray(_) => "iterate_array",
        }
    }

    /// Traits the node has regardless of its inputs.
    pub fn own_traits(&self) -> ComputableTraits {
        match self {
            ComputableKind::Literal(_) | ComputableKind::ExternalRef { .. } => {
                ComputableTraits::INVARIANT
            }
            ComputableKind::Call { traits, .. } => *traits,
            ComputableKind::State { .. } => ComputableTraits::MUTABLE,
            ComputableKind::ViewNode { .. }
            | ComputableKind::TextNode
            | ComputableKind::Attribute { .. }
            | ComputableKind::EventListener { .. }
            | ComputableKind::ElementArgument
            | ComputableKind::ElementPassthrough => ComputableTraits::SIDE_EFFECTS,
            ComputableKind::ScopeParameter { .. }
            | ComputableKind::Projection { .. }
            | ComputableKind::Primitive(_)
            | ComputableKind::Conditional
            | ComputableKind::CompoundLiteral { .. }
            | ComputableKind::TupleLiteral
            | ComputableKind::VirtualPlacement
            | ComputableKind::ScopeInstance { .. }
            | ComputableKind::PolymorphicScopeInstance { .. }
            | ComputableKind::IterateArray(_) => ComputableTraits::empty(),
        }
    }

    /// Output is a function of the inputs alone, so invariant inputs make
    /// an invariant output.
    pub fn is_pure(&self) -> bool {
        match self {
            ComputableKind::Projection { .. }
            | ComputableKind::Primitive(_)
            | ComputableKind::Conditional
            | ComputableKind::CompoundLiteral { .. }
            | ComputableKind::TupleLiteral => true,
            ComputableKind::Call { traits, .. } => !traits.intersects(
                ComputableTraits::SIDE_EFFECTS
                    | ComputableTraits::MUTABLE
                    | ComputableTraits::ASYNC,
            ),
            _ => false,
        }
    }

    /// Whether rewrites may move the node to another scope.
    pub fn is_relocatable(&self) -> bool {
        !matches!(
            self,
            ComputableKind::ScopeParameter { .. }
                | ComputableKind::State { .. }
                | ComputableKind::EventListener { .. }
        )
    }

    pub fn is_scope_creating(&self) -> bool {
        matches!(
            self,
            ComputableKind::ScopeInstance { .. }
                | ComputableKind::PolymorphicScopeInstance { .. }
                | ComputableKind::IterateArray(_)
        )
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, ComputableKind::ScopeParameter { .. })
    }

    /// The field a projection reads.
    pub fn projected_field(&self) -> Option<&str> {
        match self {
            ComputableKind::Projection { field } => Some(field),
            _ => None,
        }
    }

    /// Choices of a polymorphic or iterating instance (empty otherwise).
    pub fn choices(&self) -> &[ScopeChoice] {
        match self {
            ComputableKind::PolymorphicScopeInstance { choices } => choices,
            ComputableKind::IterateArray(config) => &config.choices,
            _ => &[],
        }
    }

    /// Every scope this node instantiates, in choice order.
    pub fn child_scopes(&self) -> SmallVec<[ScopeId; 2]> {
        match self {
            ComputableKind::ScopeInstance { scope } => smallvec::smallvec![*scope],
            _ => self.choices().iter().map(|c| c.scope).collect(),
        }
    }
}
