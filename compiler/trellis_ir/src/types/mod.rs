//! Output types of Computables.
//!
//! An [`IrType`] describes what flows out of a Computable. Types are
//! immutable values; a Computable whose output evolves gets a fresh
//! `IrType` through the graph's propagation machinery rather than having
//! its type mutated in place.
//!
//! Containment ("a slot of type A accepts a value of type B") is not
//! structural equality. It lives in [`containment`] as a short ordered
//! rule table.

use std::fmt;

use indexmap::IndexMap;

mod containment;

pub use containment::is_type_contained;

// ── Literal values ──────────────────────────────────────────────────

/// A compile-time constant, as carried by [`IrType::ExactValue`] and by
/// `Literal` Computables.
///
/// Numbers are stored as IEEE-754 bits so the value is `Eq`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Number(u64),
    String(String),
    List(Vec<LiteralValue>),
    Record(IndexMap<String, LiteralValue>),
}

impl LiteralValue {
    /// Build a numeric literal.
    pub fn number(value: f64) -> Self {
        Self::Number(value.to_bits())
    }

    /// Build a string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Build a record literal from `(field, value)` pairs, keeping order.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, LiteralValue)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// Runtime truthiness of the value.
    ///
    /// `null`, `false`, `0`, `NaN` and the empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(bits) => {
                let n = f64::from_bits(*bits);
                n != 0.0 && !n.is_nan()
            }
            Self::String(s) => !s.is_empty(),
            Self::List(_) | Self::Record(_) => true,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ── Compound (record) types ─────────────────────────────────────────

/// A named-field record type.
///
/// Field order is preserved for emission but does not take part in
/// equality: two compounds are equal when they agree on
/// `permits_unknown` and on the field → type mapping in both directions.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompoundType {
    fields: IndexMap<String, IrType>,
    permits_unknown: bool,
}

impl CompoundType {
    /// An empty compound that rejects unlisted fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty compound that tolerates unlisted fields.
    pub fn permitting_unknown() -> Self {
        Self {
            fields: IndexMap::new(),
            permits_unknown: true,
        }
    }

    /// Builder: add a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, ty: IrType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    /// Add or overwrite a field.
    pub fn insert(&mut self, name: impl Into<String>, ty: IrType) {
        self.fields.insert(name.into(), ty);
    }

    /// The declared type of `name`.
    pub fn field(&self, name: &str) -> Option<&IrType> {
        self.fields.get(name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &IrType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether values may carry fields not listed here.
    pub fn permits_unknown(&self) -> bool {
        self.permits_unknown
    }
}

impl PartialEq for CompoundType {
    fn eq(&self, other: &Self) -> bool {
        self.permits_unknown == other.permits_unknown
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, ty)| other.fields.get(name) == Some(ty))
    }
}

impl Eq for CompoundType {}

// ── IrType ──────────────────────────────────────────────────────────

/// The type of a Computable's output.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IrType {
    /// Nothing flows out; used by pure side-effect nodes.
    Void,
    /// Unconstrained.
    Any,
    /// Closed alternative set.
    Union(Vec<IrType>),
    /// A union one of whose members may be `Any`; loosens containment.
    AnyPermittingUnion(Vec<IrType>),
    /// Named-field record.
    Compound(CompoundType),
    /// Singleton literal.
    ExactValue(LiteralValue),
    /// Any value that is truthy at runtime.
    Truthy,
    /// Any value that is falsy at runtime.
    Falsy,
    Boolean,
    Number,
    String,
    Tuple(Vec<IrType>),
    /// Opaque marker for a position in the rendered output.
    Placement,
    Callback,
}

impl IrType {
    /// Build a normalized union.
    ///
    /// Nested plain unions are flattened and duplicates dropped. A single
    /// member collapses to itself and an empty set is `Void`.
    pub fn union(members: impl IntoIterator<Item = IrType>) -> Self {
        let flat = flatten_members(members);
        match flat.len() {
            0 => IrType::Void,
            1 => flat.into_iter().next().unwrap_or(IrType::Void),
            _ => IrType::Union(flat),
        }
    }

    /// Build a union that may contain `Any` without absorbing it.
    pub fn any_permitting_union(members: impl IntoIterator<Item = IrType>) -> Self {
        IrType::AnyPermittingUnion(flatten_members(members))
    }

    /// Build a closed compound from `(field, type)` pairs.
    pub fn compound<K: Into<String>>(fields: impl IntoIterator<Item = (K, IrType)>) -> Self {
        let mut compound = CompoundType::new();
        for (name, ty) in fields {
            compound.insert(name, ty);
        }
        IrType::Compound(compound)
    }

    /// Build an exact-value type.
    pub fn exact(value: LiteralValue) -> Self {
        IrType::ExactValue(value)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, IrType::Any)
    }

    pub fn is_placement(&self) -> bool {
        matches!(self, IrType::Placement)
    }

    /// Members of a union-kind type (`Union` or `AnyPermittingUnion`).
    pub fn union_members(&self) -> Option<&[IrType]> {
        match self {
            IrType::Union(members) | IrType::AnyPermittingUnion(members) => Some(members),
            _ => None,
        }
    }

    /// Whether this is a key usable to select a polymorphic choice.
    pub fn is_choice_key(&self) -> bool {
        matches!(self, IrType::ExactValue(_) | IrType::Truthy | IrType::Falsy)
    }

    /// The type of field `name` when projecting out of a value of this type.
    ///
    /// Returns `None` when the field provably does not exist.
    pub fn field_type(&self, name: &str) -> Option<IrType> {
        match self {
            IrType::Any => Some(IrType::Any),
            IrType::Compound(compound) => match compound.field(name) {
                Some(ty) => Some(ty.clone()),
                None if compound.permits_unknown() => Some(IrType::Any),
                None => None,
            },
            IrType::ExactValue(LiteralValue::Record(fields)) => {
                fields.get(name).cloned().map(IrType::ExactValue)
            }
            IrType::Union(members) | IrType::AnyPermittingUnion(members) => {
                let mut found = Vec::with_capacity(members.len());
                for member in members {
                    found.push(member.field_type(name)?);
                }
                Some(IrType::union(found))
            }
            _ => None,
        }
    }
}

fn flatten_members(members: impl IntoIterator<Item = IrType>) -> Vec<IrType> {
    let mut flat: Vec<IrType> = Vec::new();
    for member in members {
        match member {
            IrType::Union(inner) => {
                for m in inner {
                    if !flat.contains(&m) {
                        flat.push(m);
                    }
                }
            }
            other => {
                if !flat.contains(&other) {
                    flat.push(other);
                }
            }
        }
    }
    flat
}

fn same_members(a: &[IrType], b: &[IrType]) -> bool {
    a.len() == b.len() && a.iter().all(|m| b.contains(m)) && b.iter().all(|m| a.contains(m))
}

impl PartialEq for IrType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IrType::Union(a), IrType::Union(b))
            | (IrType::AnyPermittingUnion(a), IrType::AnyPermittingUnion(b)) => same_members(a, b),
            (IrType::Compound(a), IrType::Compound(b)) => a == b,
            (IrType::ExactValue(a), IrType::ExactValue(b)) => a == b,
            (IrType::Tuple(a), IrType::Tuple(b)) => a == b,
            (IrType::Void, IrType::Void)
            | (IrType::Any, IrType::Any)
            | (IrType::Truthy, IrType::Truthy)
            | (IrType::Falsy, IrType::Falsy)
            | (IrType::Boolean, IrType::Boolean)
            | (IrType::Number, IrType::Number)
            | (IrType::String, IrType::String)
            | (IrType::Placement, IrType::Placement)
            | (IrType::Callback, IrType::Callback) => true,
            _ => false,
        }
    }
}

impl Eq for IrType {}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Any => write!(f, "any"),
            IrType::Union(members) => write_members(f, members, " | "),
            IrType::AnyPermittingUnion(members) => {
                write!(f, "loose(")?;
                write_members(f, members, " | ")?;
                write!(f, ")")
            }
            IrType::Compound(compound) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in compound.fields().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                if compound.permits_unknown() {
                    if !compound.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "..")?;
                }
                write!(f, "}}")
            }
            IrType::ExactValue(value) => write!(f, "={value}"),
            IrType::Truthy => write!(f, "truthy"),
            IrType::Falsy => write!(f, "falsy"),
            IrType::Boolean => write!(f, "bool"),
            IrType::Number => write!(f, "number"),
            IrType::String => write!(f, "string"),
            IrType::Tuple(items) => {
                write!(f, "(")?;
                write_members(f, items, ", ")?;
                write!(f, ")")
            }
            IrType::Placement => write!(f, "placement"),
            IrType::Callback => write!(f, "callback"),
        }
    }
}

fn write_members(f: &mut fmt::Formatter<'_>, members: &[IrType], sep: &str) -> fmt::Result {
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{member}")?;
    }
    Ok(())
}
