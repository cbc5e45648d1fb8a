//! Errors raised by graph construction and rewriting.
//!
//! Every fallible operation validates before it commits, so an `Err`
//! always means the graph is exactly as it was before the call.
//!
//! Three families mirror who is at fault:
//!
//! - [`StructuralError`]: the shape of the graph would be violated
//!   (wrong scope, dead node, duplicate output, cycle, ...).
//! - [`TypeMismatch`]: a containment check failed.
//! - [`UsageError`]: the API was called with malformed arguments or an
//!   extension hook was not implemented.

use thiserror::Error;

use crate::ids::{ComputableId, ScopeId};
use crate::types::IrType;

/// Convenience alias used throughout the crate.
pub type IrResult<T> = Result<T, IrError>;

/// Any error raised by the IR core.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IrError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Type(#[from] TypeMismatch),
    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// A violation of graph shape invariants.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("{input} lives in {found}, but its consumer lives in {expected}")]
    WrongScope {
        input: ComputableId,
        expected: ScopeId,
        found: ScopeId,
    },
    #[error("{0} has been destroyed")]
    Destroyed(ComputableId),
    #[error("{0} has been removed")]
    ScopeRemoved(ScopeId),
    #[error("{0} produces no value and cannot be used as an input")]
    VoidInput(ComputableId),
    #[error("{scope} already has an output named `{field}`")]
    DuplicateOutput { scope: ScopeId, field: String },
    #[error("{scope} has no output named `{field}`")]
    MissingOutput { scope: ScopeId, field: String },
    #[error("{computable} is already registered as output `{field}` of {scope}")]
    AlreadyAnOutput {
        scope: ScopeId,
        computable: ComputableId,
        field: String,
    },
    #[error("{computable} does not belong to {scope}")]
    NotInScope {
        scope: ScopeId,
        computable: ComputableId,
    },
    #[error("{0} is already instantiated; its parameter list is frozen")]
    ParametersFrozen(ScopeId),
    #[error("{scope} still has {instances} instance(s)")]
    ScopeStillInstantiated { scope: ScopeId, instances: usize },
    #[error("expected {expected} input(s), found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("{0} cannot instantiate the scope it lives in")]
    SelfInstantiation(ScopeId),
    #[error("{computable} has no input position {position}")]
    InputOutOfRange {
        computable: ComputableId,
        position: usize,
    },
    #[error("cycle detected between computables, involving {0}")]
    ComputableCycle(ComputableId),
    #[error("cycle detected in scope instantiation, involving {0}")]
    ScopeCycle(ScopeId),
    #[error("parameters of {scope} must be cloned in order: expected position {expected}, found {found}")]
    ParameterOrder {
        scope: ScopeId,
        expected: usize,
        found: usize,
    },
}

/// A failed containment check.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("type mismatch in {context}: expected `{expected}`, found `{actual}`")]
pub struct TypeMismatch {
    pub expected: IrType,
    pub actual: IrType,
    /// What was being validated (e.g. "input 2 of %14").
    pub context: String,
}

/// Malformed API usage.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("extension hook `{hook}` is not implemented for {computable}")]
    UnimplementedHook {
        hook: &'static str,
        computable: ComputableId,
    },
    #[error("malformed choice: {0}")]
    MalformedChoice(String),
    #[error("malformed iteration: {0}")]
    MalformedIteration(String),
    #[error("`{0}` is not a valid choice key (expected an exact value, truthy or falsy)")]
    InvalidChoiceKey(IrType),
    #[error("choice key `{key}` overlaps existing key `{existing}`")]
    OverlappingChoiceKey { key: IrType, existing: IrType },
    #[error("{0} is not a scope-creating computable")]
    NotScopeCreating(ComputableId),
    #[error("{computable} cannot be used here: {reason}")]
    UnexpectedKind {
        computable: ComputableId,
        reason: &'static str,
    },
}
