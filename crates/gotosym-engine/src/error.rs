//! Engine error types.
//!
//! Only genuine engine failures become `Err` values: invariant violations,
//! malformed inputs at the interpreter boundary, and validation failures.
//! Modeling failures (bad dereference, missing function body) and bound
//! breaches stay inside the equation as assertions or assumptions -- they
//! are results, not errors.

use thiserror::Error;

use gotosym_ir::{Ident, Pc};

/// Fatal errors raised by the symbolic execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A renaming or guard invariant was broken. Aborts the analysis.
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// A nil expression reached the interpreter boundary.
    #[error("nil expression at {pc}")]
    NilExpression { pc: Pc },

    /// An expression form the interpreter cannot execute.
    #[error("unsupported expression at {pc}: {what}")]
    Unsupported { pc: Pc, what: String },

    /// The entry point (or a function being stepped into) does not exist.
    #[error("function not found: '{function}'")]
    FunctionNotFound { function: Ident },

    /// A call whose target expression is not a symbol reference.
    #[error("call target is not a symbol at {pc}")]
    BadCallTarget { pc: Pc },

    /// An operation that needs a call frame found an empty stack.
    #[error("no active frame at {pc}")]
    NoActiveFrame { pc: Pc },

    /// The emitted equation failed validation.
    #[error("equation validation failed: {reason}")]
    ValidationFailed { reason: String },
}
