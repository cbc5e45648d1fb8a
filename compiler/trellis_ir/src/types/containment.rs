//! The containment rule table.
//!
//! `is_type_contained(slot, input)` decides whether a value typed `input`
//! may be supplied where `slot` is required. Rules are matched by the kind
//! of each side, first match wins:
//!
//! 1. loose-union slot, union input: every non-`Any` member is contained.
//! 2. loose-union slot, `Any` input: always.
//! 3. non-union slot, union input: every member is contained.
//! 4. union slot, union input: every member is contained by the slot.
//! 5. union slot, plain input: some member contains it (never `Void` or
//!    `Any`), with the truthy/falsy fallback for booleans and strings.
//! 6. otherwise the slot's structural [`allows`] rule.

use super::{CompoundType, IrType, LiteralValue};

/// Whether a value of type `input` may flow into a slot of type `slot`.
pub fn is_type_contained(slot: &IrType, input: &IrType) -> bool {
    match (slot, input) {
        // Rule 1
        (
            IrType::AnyPermittingUnion(_),
            IrType::Union(members) | IrType::AnyPermittingUnion(members),
        ) => members
            .iter()
            .filter(|m| !m.is_any())
            .all(|m| is_type_contained(slot, m)),
        // Rule 2
        (IrType::AnyPermittingUnion(_), IrType::Any) => true,
        // Rules 3 and 4: the slot is tested against each member as a whole.
        (_, IrType::Union(members) | IrType::AnyPermittingUnion(members)) => {
            members.iter().all(|m| is_type_contained(slot, m))
        }
        // Rule 5
        (IrType::Union(slot_members) | IrType::AnyPermittingUnion(slot_members), _) => {
            if input.is_void() || input.is_any() {
                return false;
            }
            slot_members.iter().any(|m| is_type_contained(m, input))
                || (is_truthy_falsy_pair(slot_members)
                    && matches!(input, IrType::Boolean | IrType::String))
        }
        // Rule 6
        _ => allows(slot, input),
    }
}

/// Exactly one `Truthy` and one `Falsy` member.
fn is_truthy_falsy_pair(members: &[IrType]) -> bool {
    members.len() == 2
        && members.iter().any(|m| matches!(m, IrType::Truthy))
        && members.iter().any(|m| matches!(m, IrType::Falsy))
}

/// Structural acceptance for non-union slots.
fn allows(slot: &IrType, input: &IrType) -> bool {
    match slot {
        IrType::Any => true,
        IrType::Void => input.is_void(),
        IrType::Boolean => matches!(
            input,
            IrType::Boolean | IrType::ExactValue(LiteralValue::Bool(_))
        ),
        IrType::Number => matches!(
            input,
            IrType::Number | IrType::ExactValue(LiteralValue::Number(_))
        ),
        IrType::String => matches!(
            input,
            IrType::String | IrType::ExactValue(LiteralValue::String(_))
        ),
        IrType::Truthy => match input {
            IrType::Truthy => true,
            IrType::ExactValue(value) => value.is_truthy(),
            _ => false,
        },
        IrType::Falsy => match input {
            IrType::Falsy => true,
            IrType::ExactValue(value) => !value.is_truthy(),
            _ => false,
        },
        IrType::ExactValue(expected) => match input {
            IrType::ExactValue(actual) => expected == actual,
            IrType::Compound(compound) => record_contains_compound(expected, compound),
            _ => false,
        },
        IrType::Compound(compound) => match input {
            IrType::Compound(candidate) => compound_allows(compound, candidate),
            IrType::ExactValue(LiteralValue::Record(fields)) => {
                if !compound.permits_unknown() && compound.len() != fields.len() {
                    return false;
                }
                compound.fields().all(|(name, required)| {
                    fields.get(name).is_some_and(|value| {
                        is_type_contained(required, &IrType::ExactValue(value.clone()))
                    })
                })
            }
            _ => false,
        },
        IrType::Tuple(elements) => match input {
            IrType::Tuple(candidates) => {
                elements.len() == candidates.len()
                    && elements
                        .iter()
                        .zip(candidates)
                        .all(|(e, c)| is_type_contained(e, c))
            }
            IrType::ExactValue(LiteralValue::List(items)) => {
                elements.len() == items.len()
                    && elements
                        .iter()
                        .zip(items)
                        .all(|(e, item)| is_type_contained(e, &IrType::ExactValue(item.clone())))
            }
            _ => false,
        },
        IrType::Placement => input.is_placement(),
        IrType::Callback => matches!(input, IrType::Callback),
        // Union kinds never reach here: rules 1-5 cover every union slot.
        IrType::Union(_) | IrType::AnyPermittingUnion(_) => false,
    }
}

/// Field-count rule plus per-field containment.
fn compound_allows(slot: &CompoundType, candidate: &CompoundType) -> bool {
    if !slot.permits_unknown() && slot.len() != candidate.len() {
        return false;
    }
    slot.fields().all(|(name, required)| {
        candidate
            .field(name)
            .is_some_and(|actual| is_type_contained(required, actual))
    })
}

/// An exact record slot accepts a compound whose every field is pinned to
/// the corresponding literal sub-value.
fn record_contains_compound(expected: &LiteralValue, candidate: &CompoundType) -> bool {
    let LiteralValue::Record(fields) = expected else {
        return false;
    };
    fields.len() == candidate.len()
        && fields.iter().all(|(name, value)| {
            candidate.field(name).is_some_and(|actual| {
                is_type_contained(&IrType::ExactValue(value.clone()), actual)
            })
        })
}
