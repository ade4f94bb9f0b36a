//! Error types for the IR crate.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! malformed programs and symbol-table misuse.

use thiserror::Error;

use crate::id::Ident;

/// Errors produced while building or validating the IR.
#[derive(Debug, Error)]
pub enum IrError {
    /// A goto/spawn/handler target points outside the function body.
    #[error("invalid target in function '{function}': instruction {index} targets {target}, body has {len} instructions")]
    InvalidTarget {
        function: Ident,
        index: usize,
        target: usize,
        len: usize,
    },

    /// A function body does not end with `EndFunction`.
    #[error("function '{function}' does not end with EndFunction")]
    MissingEndFunction { function: Ident },

    /// A function was registered twice.
    #[error("duplicate function: '{function}'")]
    DuplicateFunction { function: Ident },

    /// The configured entry point is not in the program.
    #[error("entry point '{function}' not found")]
    EntryPointNotFound { function: Ident },

    /// A symbol was inserted twice into the same symbol table.
    #[error("duplicate symbol: '{name}'")]
    DuplicateSymbol { name: Ident },
}
