//! Typed convenience constructors, one per leaf and side-effecting kind.
//!
//! Each is a thin wrapper over [`Graph::create_computable`]; scope-creating
//! kinds have their own constructors in [`instance`](crate::instance).

use crate::computable::{ComputableKind, ComputableTraits, PrimitiveOp};
use crate::error::{IrResult, StructuralError};
use crate::ids::{ComputableId, ScopeId};
use crate::types::{IrType, LiteralValue};

use super::Graph;

impl Graph {
    pub fn add_literal(&mut self, scope: ScopeId, value: LiteralValue) -> IrResult<ComputableId> {
        self.create_computable(scope, ComputableKind::Literal(value), [])
    }

    pub fn add_external_ref(
        &mut self,
        scope: ScopeId,
        symbol: impl Into<String>,
        ty: IrType,
    ) -> IrResult<ComputableId> {
        self.create_computable(
            scope,
            ComputableKind::ExternalRef {
                symbol: symbol.into(),
                ty,
            },
            [],
        )
    }

    /// Field `field` of `source`.
    pub fn add_projection(
        &mut self,
        source: ComputableId,
        field: impl Into<String>,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(source)?;
        self.create_computable(
            scope,
            ComputableKind::Projection {
                field: field.into(),
            },
            [source],
        )
    }

    pub fn add_primitive(
        &mut self,
        scope: ScopeId,
        op: PrimitiveOp,
        operands: &[ComputableId],
    ) -> IrResult<ComputableId> {
        self.create_computable(scope, ComputableKind::Primitive(op), operands.iter().copied())
    }

    pub fn add_call(
        &mut self,
        scope: ScopeId,
        function: impl Into<String>,
        args: &[ComputableId],
        ty: IrType,
        traits: ComputableTraits,
    ) -> IrResult<ComputableId> {
        self.create_computable(
            scope,
            ComputableKind::Call {
                function: function.into(),
                ty,
                traits,
            },
            args.iter().copied(),
        )
    }

    pub fn add_conditional(
        &mut self,
        condition: ComputableId,
        then: ComputableId,
        otherwise: ComputableId,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(condition)?;
        self.create_computable(scope, ComputableKind::Conditional, [condition, then, otherwise])
    }

    /// A record built from named values, in field order.
    pub fn add_compound_literal<K: Into<String>>(
        &mut self,
        scope: ScopeId,
        fields: impl IntoIterator<Item = (K, ComputableId)>,
    ) -> IrResult<ComputableId> {
        let (names, values): (Vec<String>, Vec<ComputableId>) =
            fields.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        self.create_computable(scope, ComputableKind::CompoundLiteral { fields: names }, values)
    }

    pub fn add_tuple(&mut self, scope: ScopeId, items: &[ComputableId]) -> IrResult<ComputableId> {
        self.create_computable(scope, ComputableKind::TupleLiteral, items.iter().copied())
    }

    pub fn add_state(&mut self, initial: ComputableId, ty: IrType) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(initial)?;
        self.create_computable(scope, ComputableKind::State { ty }, [initial])
    }

    pub fn add_view_node(
        &mut self,
        placement: ComputableId,
        tag: impl Into<String>,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(placement)?;
        self.create_computable(scope, ComputableKind::ViewNode { tag: tag.into() }, [placement])
    }

    pub fn add_text_node(
        &mut self,
        placement: ComputableId,
        text: ComputableId,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(placement)?;
        self.create_computable(scope, ComputableKind::TextNode, [placement, text])
    }

    pub fn add_attribute(
        &mut self,
        element: ComputableId,
        name: impl Into<String>,
        value: ComputableId,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(element)?;
        self.create_computable(
            scope,
            ComputableKind::Attribute { name: name.into() },
            [element, value],
        )
    }

    pub fn add_event_listener(
        &mut self,
        element: ComputableId,
        event: impl Into<String>,
        callback: ComputableId,
    ) -> IrResult<ComputableId> {
        let scope = self.scope_of_live(element)?;
        self.create_computable(
            scope,
            ComputableKind::EventListener {
                event: event.into(),
            },
            [element, callback],
        )
    }

    pub(crate) fn scope_of_live(&self, id: ComputableId) -> IrResult<ScopeId> {
        Ok(self
            .computable(id)?
            .scope
            .ok_or(StructuralError::Destroyed(id))?)
    }
}
