//! Element-as-argument cleanup.
//!
//! IR generation builds an element passed as an argument before its
//! final position is known: the element instance gets a
//! `VirtualPlacement` stand-in and an `ElementArgument(placement,
//! element)` node supplies the real placement later. When the element is
//! a same-scope instance, the indirection can go:
//!
//! - with a virtual slot, the real placement is bound straight into the
//!   instance and the stand-in is dropped once unused;
//! - without one, the node becomes an `ElementPassthrough`.
//!
//! Consumers of the removed node read the element's placement output
//! instead.
//!
//! # Pipeline Position
//!
//! Last pass; inlining and pushdown may have moved element instances next
//! to their `ElementArgument` nodes.

use trellis_ir::{ComputableId, ComputableKind, Graph, IrResult};

/// What [`cleanup_element_arguments`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElementArgStats {
    pub arguments_removed: usize,
    /// Virtual placements replaced by the real one.
    pub placements_substituted: usize,
    pub passthroughs_created: usize,
}

impl ElementArgStats {
    pub fn changes(&self) -> usize {
        self.arguments_removed
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn cleanup_element_arguments(graph: &mut Graph) -> IrResult<ElementArgStats> {
    let mut stats = ElementArgStats::default();
    let arguments: Vec<ComputableId> = graph
        .live_computables()
        .filter(|&c| matches!(graph.kind(c), Ok(ComputableKind::ElementArgument)))
        .collect();

    for argument in arguments {
        if !graph.is_alive(argument) {
            continue;
        }
        let placement = graph.input(argument, 0)?;
        let element = graph.input(argument, 1)?;
        if !matches!(graph.kind(element)?, ComputableKind::ScopeInstance { .. })
            || graph.containing_scope(element) != graph.containing_scope(argument)
        {
            continue;
        }
        let has_consumers = !graph.dependees(argument)?.is_empty();
        let exposed = placement_output(graph, element)?;

        let replacement = match graph.virtual_placement_slot(element)? {
            Some(slot) => {
                // A placement derived from the element cannot feed it.
                if (has_consumers && exposed.is_none()) || graph.depends_on(placement, element)? {
                    continue;
                }
                let stand_in = graph.input(element, slot)?;
                graph.set_input(element, slot, placement)?;
                drop_if_unused(graph, stand_in)?;
                stats.placements_substituted += 1;
                None
            }
            None => {
                let passthrough = graph.add_element_passthrough(placement, element)?;
                stats.passthroughs_created += 1;
                Some(passthrough)
            }
        };

        if has_consumers {
            let target = match exposed {
                Some(field) => projection_of(graph, element, &field)?,
                None => match replacement {
                    Some(passthrough) => passthrough,
                    None => continue,
                },
            };
            graph.replace_uses(argument, target)?;
        }
        tracing::trace!(
            argument = argument.raw(),
            element = element.raw(),
            "element argument removed"
        );
        graph.destroy(argument)?;
        stats.arguments_removed += 1;
    }

    if stats.changes() > 0 {
        tracing::debug!(
            removed = stats.arguments_removed,
            substituted = stats.placements_substituted,
            passthroughs = stats.passthroughs_created,
            "element arguments cleaned up"
        );
    }
    Ok(stats)
}

/// First `Placement`-typed output field of `element`.
fn placement_output(graph: &Graph, element: ComputableId) -> IrResult<Option<String>> {
    let ComputableKind::ScopeInstance { scope } = graph.kind(element)? else {
        return Ok(None);
    };
    let data = graph.scope(*scope)?;
    for (field, &output) in data.outputs() {
        if graph.output_type(output)?.is_placement() {
            return Ok(Some(field.clone()));
        }
    }
    Ok(None)
}

/// An existing projection of `field` from `element`, or a new one.
fn projection_of(graph: &mut Graph, element: ComputableId, field: &str) -> IrResult<ComputableId> {
    let existing = graph
        .dependees(element)?
        .keys()
        .copied()
        .find(|&d| graph.kind(d).is_ok_and(|k| k.projected_field() == Some(field)));
    match existing {
        Some(projection) => Ok(projection),
        None => graph.add_projection(element, field),
    }
}

fn drop_if_unused(graph: &mut Graph, stand_in: ComputableId) -> IrResult<()> {
    let unused = graph.dependees(stand_in)?.is_empty();
    let exported = graph
        .containing_scope(stand_in)
        .and_then(|scope| graph.scope(scope).ok())
        .is_some_and(|data| data.output_field_of(stand_in).is_some());
    if unused && !exported {
        graph.destroy(stand_in)?;
    }
    Ok(())
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
