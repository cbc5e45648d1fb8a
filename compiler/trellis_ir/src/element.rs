//! Elements passed as arguments before their placement is known.
//!
//! The element is built as a scope instance whose placement argument is a
//! [`VirtualPlacement`](ComputableKind::VirtualPlacement) stand-in; an
//! `ElementArgument` node later supplies the real placement. Once both
//! sit in the same scope the indirection can be collapsed.

use crate::computable::ComputableKind;
use crate::error::IrResult;
use crate::graph::Graph;
use crate::ids::{ComputableId, ScopeId};

impl Graph {
    pub fn add_virtual_placement(&mut self, scope: ScopeId) -> IrResult<ComputableId> {
        self.create_computable(scope, ComputableKind::VirtualPlacement, [])
    }

    /// Place `element` at `placement`.
    pub fn add_element_argument(
        &mut self,
        placement: ComputableId,
        element: ComputableId,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(placement)?;
        self.create_computable(scope, ComputableKind::ElementArgument, [placement, element])
    }

    /// Place the already-built element `instance` at `placement`.
    pub fn add_element_passthrough(
        &mut self,
        placement: ComputableId,
        instance: ComputableId,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(placement)?;
        self.create_computable(
            scope,
            ComputableKind::ElementPassthrough,
            [placement, instance],
        )
    }

    /// Input position of `instance` bound to a virtual placement, if any.
    pub fn virtual_placement_slot(&self, instance: ComputableId) -> IrResult<Option<usize>> {
        let node = self.computable(instance)?;
        Ok(node.inputs.iter().position(|&input| {
            matches!(
                self.nodes[input.index()].kind,
                ComputableKind::VirtualPlacement
            )
        }))
    }
}
