//! Output-type derivation, input validation and atomic type propagation.
//!
//! Every check runs against an [`Overlay`]: a read-only view of the graph
//! with a pending edit layered on top (a replaced input list, a new kind,
//! replaced scope outputs, nodes about to be destroyed). Propagation
//! computes the new output types of everything downstream of the edit and
//! validates every affected binding before anything is written, so a
//! failing edit never leaves a partially retyped graph behind.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::{ComputableKind, IterateConfig, PrimitiveOp, ScopeChoice, INTERMEDIATE_FIELD};
use crate::error::{IrError, IrResult, StructuralError, TypeMismatch, UsageError};
use crate::graph::Graph;
use crate::ids::{ComputableId, ScopeId};
use crate::types::{is_type_contained, CompoundType, IrType};

/// A pending replacement of one node's kind and inputs.
pub(crate) struct NodeOverride {
    pub id: ComputableId,
    pub kind: ComputableKind,
    pub inputs: SmallVec<[ComputableId; 4]>,
}

/// What an input position demands of the value bound there.
enum Requirement {
    Type(IrType),
    /// Every listed type must contain the input.
    AllOf(Vec<IrType>),
    /// The input must expose this field.
    Field(String),
    /// The input must be a plain scope instance.
    Instance,
}

pub(crate) struct Overlay<'g> {
    graph: &'g Graph,
    nodes: FxHashMap<ComputableId, NodeOverride>,
    outputs: FxHashMap<ScopeId, IndexMap<String, ComputableId>>,
    doomed: FxHashSet<ComputableId>,
    types: FxHashMap<ComputableId, IrType>,
}

impl<'g> Overlay<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            nodes: FxHashMap::default(),
            outputs: FxHashMap::default(),
            doomed: FxHashSet::default(),
            types: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: NodeOverride) -> Self {
        self.nodes.insert(node.id, node);
        self
    }

    /// Several pending replacements, validated as one edit.
    #[must_use]
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeOverride>) -> Self {
        self.nodes.extend(nodes.into_iter().map(|node| (node.id, node)));
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, scope: ScopeId, outputs: IndexMap<String, ComputableId>) -> Self {
        self.outputs.insert(scope, outputs);
        self
    }

    #[must_use]
    pub fn with_doomed(mut self, doomed: FxHashSet<ComputableId>) -> Self {
        self.doomed = doomed;
        self
    }

    /// Nodes whose type is fixed for the rest of the check.
    #[must_use]
    pub fn with_types(mut self, types: FxHashMap<ComputableId, IrType>) -> Self {
        self.types.extend(types);
        self
    }

    /// The retyped nodes, ready to be committed.
    pub fn into_types(self) -> FxHashMap<ComputableId, IrType> {
        self.types
    }

    // ── Views ───────────────────────────────────────────────────────

    pub fn kind(&self, id: ComputableId) -> &ComputableKind {
        match self.nodes.get(&id) {
            Some(ov) => &ov.kind,
            None => &self.graph.nodes[id.index()].kind,
        }
    }

    fn inputs(&self, id: ComputableId) -> &[ComputableId] {
        match self.nodes.get(&id) {
            Some(ov) => &ov.inputs,
            None => &self.graph.nodes[id.index()].inputs,
        }
    }

    pub fn type_of(&self, id: ComputableId) -> &IrType {
        self.types
            .get(&id)
            .unwrap_or(&self.graph.nodes[id.index()].ty)
    }

    fn outputs_of(&self, scope: ScopeId) -> &IndexMap<String, ComputableId> {
        self.outputs
            .get(&scope)
            .unwrap_or(&self.graph.scopes[scope.index()].outputs)
    }

    fn is_live(&self, id: ComputableId) -> bool {
        self.graph
            .nodes
            .get(id.index())
            .is_some_and(|n| n.scope.is_some())
            && !self.doomed.contains(&id)
    }

    /// Compound of the scope's named outputs, or `Void` when it has none.
    pub fn scope_output_type(&self, scope: ScopeId) -> IrType {
        let outputs = self.outputs_of(scope);
        if outputs.is_empty() {
            return IrType::Void;
        }
        let mut compound = CompoundType::new();
        for (field, &id) in outputs {
            compound.insert(field.clone(), self.type_of(id).clone());
        }
        IrType::Compound(compound)
    }

    pub fn parameter_type(&self, scope: ScopeId, position: usize) -> Option<IrType> {
        let param = *self.graph.scopes[scope.index()].parameters.get(position)?;
        match self.kind(param) {
            ComputableKind::ScopeParameter { ty, .. } => Some(ty.clone()),
            _ => None,
        }
    }

    fn parameter_count(&self, scope: ScopeId) -> usize {
        self.graph.scopes[scope.index()].parameters.len()
    }

    // ── Arity ───────────────────────────────────────────────────────

    /// Check the input count (and choice layout) of a kind.
    pub fn check_arity(&self, kind: &ComputableKind, found: usize) -> IrResult<()> {
        let exact = |expected: usize| -> IrResult<()> {
            if expected == found {
                Ok(())
            } else {
                Err(StructuralError::ArityMismatch { expected, found }.into())
            }
        };
        match kind {
            ComputableKind::ScopeParameter { .. }
            | ComputableKind::Literal(_)
            | ComputableKind::ExternalRef { .. }
            | ComputableKind::VirtualPlacement => exact(0),
            ComputableKind::Projection { .. }
            | ComputableKind::State { .. }
            | ComputableKind::ViewNode { .. } => exact(1),
            ComputableKind::TextNode
            | ComputableKind::Attribute { .. }
            | ComputableKind::EventListener { .. }
            | ComputableKind::ElementArgument
            | ComputableKind::ElementPassthrough => exact(2),
            ComputableKind::Conditional => exact(3),
            ComputableKind::CompoundLiteral { fields } => exact(fields.len()),
            ComputableKind::Call { .. } | ComputableKind::TupleLiteral => Ok(()),
            ComputableKind::Primitive(op) => {
                let (min, max) = op.arity();
                if found < min {
                    return Err(StructuralError::ArityMismatch {
                        expected: min,
                        found,
                    }
                    .into());
                }
                match max {
                    Some(max) if found > max => Err(StructuralError::ArityMismatch {
                        expected: max,
                        found,
                    }
                    .into()),
                    _ => Ok(()),
                }
            }
            ComputableKind::ScopeInstance { scope } => exact(self.parameter_count(*scope)),
            ComputableKind::PolymorphicScopeInstance { choices } => {
                self.check_choice_layout(choices, 1, 0)?;
                exact(choices.last().map_or(1, |c| c.args.end))
            }
            ComputableKind::IterateArray(config) => {
                self.check_choice_layout(
                    &config.choices,
                    config.first_choice_arg(),
                    IterateConfig::LEADING_PARAMETERS,
                )?;
                exact(
                    config
                        .choices
                        .last()
                        .map_or(config.first_choice_arg(), |c| c.args.end),
                )
            }
        }
    }

    /// Choice argument runs must be contiguous, start at `first`, and
    /// cover the child's parameters after `leading` fixed ones.
    fn check_choice_layout(
        &self,
        choices: &[ScopeChoice],
        first: usize,
        leading: usize,
    ) -> IrResult<()> {
        let mut next = first;
        for choice in choices {
            if choice.args.start != next {
                return Err(UsageError::MalformedChoice(format!(
                    "arguments of choice for {} start at {}, expected {next}",
                    choice.scope, choice.args.start
                ))
                .into());
            }
            let params = self.parameter_count(choice.scope);
            let expected = params.checked_sub(leading).ok_or_else(|| {
                UsageError::MalformedIteration(format!(
                    "{} declares {params} parameter(s), needs at least {leading}",
                    choice.scope
                ))
            })?;
            if choice.args.len() != expected {
                return Err(StructuralError::ArityMismatch {
                    expected,
                    found: choice.args.len(),
                }
                .into());
            }
            next = choice.args.end;
        }
        Ok(())
    }

    // ── Derivation ──────────────────────────────────────────────────

    /// The output type `id` would have under this overlay.
    pub fn derive(&self, id: ComputableId) -> IrResult<IrType> {
        let kind = self.kind(id);
        let inputs = self.inputs(id);
        let input_ty = |i: usize| self.type_of(inputs[i]).clone();
        let ty = match kind {
            ComputableKind::ScopeParameter { ty, .. }
            | ComputableKind::ExternalRef { ty, .. }
            | ComputableKind::Call { ty, .. }
            | ComputableKind::State { ty } => ty.clone(),
            ComputableKind::Literal(value) => IrType::ExactValue(value.clone()),
            ComputableKind::Projection { field } => {
                let source = self.type_of(inputs[0]);
                source
                    .field_type(field)
                    .ok_or_else(|| missing_field(field, source, id))?
            }
            ComputableKind::Primitive(op) => match op {
                PrimitiveOp::Not
                | PrimitiveOp::And
                | PrimitiveOp::Or
                | PrimitiveOp::Equal
                | PrimitiveOp::NotEqual => IrType::Boolean,
                PrimitiveOp::Add => IrType::Number,
                PrimitiveOp::Concat => IrType::String,
                PrimitiveOp::Coalesce => IrType::union([input_ty(0), input_ty(1)]),
            },
            ComputableKind::Conditional => IrType::union([input_ty(1), input_ty(2)]),
            ComputableKind::CompoundLiteral { fields } => IrType::compound(
                fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| (field.clone(), input_ty(i))),
            ),
            ComputableKind::TupleLiteral => {
                IrType::Tuple((0..inputs.len()).map(&input_ty).collect())
            }
            ComputableKind::ViewNode { .. }
            | ComputableKind::TextNode
            | ComputableKind::VirtualPlacement
            | ComputableKind::ElementArgument
            | ComputableKind::ElementPassthrough => IrType::Placement,
            ComputableKind::Attribute { .. } | ComputableKind::EventListener { .. } => {
                IrType::Void
            }
            ComputableKind::ScopeInstance { scope } => self.scope_output_type(*scope),
            ComputableKind::PolymorphicScopeInstance { choices } => self.merge_choices(choices)?,
            ComputableKind::IterateArray(config) => {
                let mut members = vec![input_ty(IterateConfig::INITIAL)];
                for choice in &config.choices {
                    members.push(self.intermediate_type(choice.scope)?);
                }
                IrType::union(members)
            }
        };
        Ok(ty)
    }

    /// Output type of a choice scope's accumulator.
    pub fn intermediate_type(&self, scope: ScopeId) -> IrResult<IrType> {
        self.scope_output_type(scope)
            .field_type(INTERMEDIATE_FIELD)
            .ok_or_else(|| {
                UsageError::MalformedIteration(format!(
                    "{scope} has no `{INTERMEDIATE_FIELD}` output"
                ))
                .into()
            })
    }

    /// All choices must expose the same field names; field types union.
    fn merge_choices(&self, choices: &[ScopeChoice]) -> IrResult<IrType> {
        let mut shapes = choices.iter().map(|c| (c.scope, self.scope_output_type(c.scope)));
        let Some((first_scope, first)) = shapes.next() else {
            return Ok(IrType::Void);
        };
        let IrType::Compound(first) = first else {
            // `first` is Void: every other choice must be too.
            for (scope, shape) in shapes {
                if !shape.is_void() {
                    return Err(shape_mismatch(first_scope, scope));
                }
            }
            return Ok(IrType::Void);
        };
        let mut fields: IndexMap<String, Vec<IrType>> = first
            .fields()
            .map(|(name, ty)| (name.to_owned(), vec![ty.clone()]))
            .collect();
        for (scope, shape) in shapes {
            let IrType::Compound(shape) = shape else {
                return Err(shape_mismatch(first_scope, scope));
            };
            if shape.len() != fields.len() {
                return Err(shape_mismatch(first_scope, scope));
            }
            for (name, ty) in shape.fields() {
                let Some(types) = fields.get_mut(name) else {
                    return Err(shape_mismatch(first_scope, scope));
                };
                types.push(ty.clone());
            }
        }
        Ok(IrType::compound(
            fields
                .into_iter()
                .map(|(name, types)| (name, IrType::union(types))),
        ))
    }

    // ── Validation ──────────────────────────────────────────────────

    fn requirement(&self, consumer: ComputableId, position: usize) -> Requirement {
        let param = |scope: ScopeId, pos: usize| {
            Requirement::Type(self.parameter_type(scope, pos).unwrap_or(IrType::Any))
        };
        match self.kind(consumer) {
            ComputableKind::Projection { field } => Requirement::Field(field.clone()),
            ComputableKind::Primitive(PrimitiveOp::Add) => Requirement::Type(IrType::Number),
            ComputableKind::State { ty } => Requirement::Type(ty.clone()),
            ComputableKind::ViewNode { .. }
            | ComputableKind::TextNode
            | ComputableKind::Attribute { .. }
            | ComputableKind::EventListener { .. }
            | ComputableKind::ElementArgument
            | ComputableKind::ElementPassthrough
                if position == 0 =>
            {
                Requirement::Type(IrType::Placement)
            }
            ComputableKind::EventListener { .. } => Requirement::Type(IrType::Callback),
            ComputableKind::ElementPassthrough => Requirement::Instance,
            ComputableKind::ScopeInstance { scope } => param(*scope, position),
            ComputableKind::PolymorphicScopeInstance { choices } => choices
                .iter()
                .find(|c| c.args.contains(&position))
                .map_or(Requirement::Type(IrType::Any), |c| {
                    param(c.scope, position - c.args.start)
                }),
            ComputableKind::IterateArray(config) => {
                if position == IterateConfig::INITIAL {
                    Requirement::AllOf(
                        config
                            .choices
                            .iter()
                            .filter_map(|c| self.parameter_type(c.scope, 1))
                            .collect(),
                    )
                } else if Some(position) == config.identity_position()
                    || Some(position) == config.map_position()
                {
                    Requirement::Type(IrType::Callback)
                } else {
                    config
                        .choices
                        .iter()
                        .find(|c| c.args.contains(&position))
                        .map_or(Requirement::Type(IrType::Any), |c| {
                            param(
                                c.scope,
                                IterateConfig::LEADING_PARAMETERS + position - c.args.start,
                            )
                        })
                }
            }
            _ => Requirement::Type(IrType::Any),
        }
    }

    /// Validate the value bound at `consumer[position]`.
    pub fn validate_binding(&self, consumer: ComputableId, position: usize) -> IrResult<()> {
        let inputs = self.inputs(consumer);
        let Some(&input) = inputs.get(position) else {
            return Err(StructuralError::InputOutOfRange {
                computable: consumer,
                position,
            }
            .into());
        };
        self.validate_candidate(consumer, position, input)
    }

    /// Validate `input` as a candidate for `consumer[position]`.
    pub fn validate_candidate(
        &self,
        consumer: ComputableId,
        position: usize,
        input: ComputableId,
    ) -> IrResult<()> {
        if !self.is_live(input) {
            return Err(StructuralError::Destroyed(input).into());
        }
        let consumer_scope = self.graph.nodes[consumer.index()]
            .scope
            .ok_or(StructuralError::Destroyed(consumer))?;
        let input_scope = self.graph.nodes[input.index()]
            .scope
            .ok_or(StructuralError::Destroyed(input))?;
        if consumer_scope != input_scope {
            return Err(StructuralError::WrongScope {
                input,
                expected: consumer_scope,
                found: input_scope,
            }
            .into());
        }
        let actual = self.type_of(input);
        if actual.is_void() {
            return Err(StructuralError::VoidInput(input).into());
        }
        let context = || format!("input {position} of {consumer}");
        match self.requirement(consumer, position) {
            Requirement::Type(expected) => {
                if !is_type_contained(&expected, actual) {
                    return Err(TypeMismatch {
                        expected,
                        actual: actual.clone(),
                        context: context(),
                    }
                    .into());
                }
            }
            Requirement::AllOf(expected) => {
                for slot in expected {
                    if !is_type_contained(&slot, actual) {
                        return Err(TypeMismatch {
                            expected: slot,
                            actual: actual.clone(),
                            context: context(),
                        }
                        .into());
                    }
                }
            }
            Requirement::Field(field) => {
                if actual.field_type(&field).is_none() {
                    return Err(missing_field(&field, actual, consumer));
                }
            }
            Requirement::Instance => {
                if !matches!(self.kind(input), ComputableKind::ScopeInstance { .. }) {
                    return Err(UsageError::UnexpectedKind {
                        computable: input,
                        reason: "a passthrough must bind a plain scope instance",
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Validate every input of `id`.
    pub fn validate_all_inputs(&self, id: ComputableId) -> IrResult<()> {
        for position in 0..self.inputs(id).len() {
            self.validate_binding(id, position)?;
        }
        Ok(())
    }

    // ── Propagation ─────────────────────────────────────────────────

    /// Re-derive `roots` and everything downstream, then validate every
    /// binding whose input changed type.
    pub fn propagate(&mut self, roots: impl IntoIterator<Item = ComputableId>) -> IrResult<()> {
        let mut worklist: Vec<ComputableId> = roots.into_iter().collect();
        // Scopes whose outputs are overridden retype all their instances.
        for scope in self.outputs.keys() {
            worklist.extend(self.graph.scopes[scope.index()].instances.iter().copied());
        }
        let mut changed: Vec<ComputableId> = Vec::new();
        let mut budget = self.graph.nodes.len() * 4 + 16;

        while let Some(id) = worklist.pop() {
            if !self.is_live(id) {
                continue;
            }
            if budget == 0 {
                let scope = self.graph.nodes[id.index()]
                    .scope
                    .ok_or(StructuralError::Destroyed(id))?;
                return Err(StructuralError::ScopeCycle(scope).into());
            }
            budget -= 1;

            let new_ty = self.derive(id)?;
            if new_ty == *self.type_of(id) {
                continue;
            }
            self.types.insert(id, new_ty);
            changed.push(id);
            worklist.extend(self.graph.nodes[id.index()].dependees.keys().copied());
            if let Some(scope) = self.graph.nodes[id.index()].scope {
                if self.outputs_of(scope).values().any(|&o| o == id) {
                    worklist.extend(self.graph.scopes[scope.index()].instances.iter().copied());
                }
            }
        }

        for id in changed {
            for (&dependee, positions) in &self.graph.nodes[id.index()].dependees {
                if !self.is_live(dependee) {
                    continue;
                }
                for &position in positions {
                    // The override may have moved this input elsewhere.
                    if self.inputs(dependee).get(position) == Some(&id) {
                        self.validate_binding(dependee, position)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn missing_field(field: &str, source: &IrType, consumer: ComputableId) -> IrError {
    TypeMismatch {
        expected: IrType::Compound(
            CompoundType::permitting_unknown().with_field(field, IrType::Any),
        ),
        actual: source.clone(),
        context: format!("projection {consumer}"),
    }
    .into()
}

fn shape_mismatch(first: ScopeId, other: ScopeId) -> IrError {
    UsageError::MalformedChoice(format!(
        "choices {first} and {other} disagree on their output fields"
    ))
    .into()
}
