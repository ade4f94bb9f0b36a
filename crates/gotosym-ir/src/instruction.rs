//! Instructions of the control-flow representation.
//!
//! A function body is a flat vector of [`Instruction`]s; control flow is
//! explicit via `Goto` targets that index into the same vector. A goto whose
//! target does not lie ahead of it in program order is a loop back-edge.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::expr::Expr;
use crate::id::Ident;
use crate::source::SourceLocation;

/// One instruction, with its source location and any labels attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub source: SourceLocation,
    /// Labels naming this location. Purely informational.
    pub labels: SmallVec<[Ident; 2]>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Instruction {
            kind,
            source: SourceLocation::none(),
            labels: SmallVec::new(),
        }
    }

    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = source;
        self
    }

    pub fn with_label(mut self, label: impl Into<Ident>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Returns `true` if control cannot fall through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        match &self.kind {
            InstructionKind::Goto { cond, .. } => cond.is_true(),
            InstructionKind::Return { .. }
            | InstructionKind::EndFunction
            | InstructionKind::EndThread
            | InstructionKind::Throw { .. } => true,
            _ => false,
        }
    }

    /// Static successor indices within the same function body.
    pub fn targets(&self) -> SmallVec<[usize; 2]> {
        match &self.kind {
            InstructionKind::Goto { target, .. } => SmallVec::from_slice(&[*target]),
            InstructionKind::StartThread { target } => SmallVec::from_slice(&[*target]),
            InstructionKind::CatchPush { handlers } => {
                handlers.iter().map(|(_, t)| *t).collect()
            }
            _ => SmallVec::new(),
        }
    }
}

/// The instruction variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// `lhs := rhs`.
    Assign { lhs: Expr, rhs: Expr },

    /// Introduce a local variable (a symbol expression).
    Decl { symbol: Expr },

    /// End the lifetime of a local variable.
    Dead { symbol: Expr },

    /// Constrain the path: execution continues only where `cond` holds.
    Assume { cond: Expr },

    /// Verification condition: `cond` must hold here.
    Assert {
        cond: Expr,
        msg: String,
        property: Ident,
    },

    /// Conditional jump. `cond` of `true` makes it unconditional. A target
    /// at or before the goto itself is a loop back-edge.
    Goto { cond: Expr, target: usize },

    /// Call `function` with `args`, assigning the return value to `lhs`.
    FunctionCall {
        lhs: Option<Expr>,
        function: Expr,
        args: Vec<Expr>,
    },

    /// Return from the current function.
    Return { value: Option<Expr> },

    /// Final instruction of every function body.
    EndFunction,

    /// Spawn a new thread starting at `target` in the same function.
    StartThread { target: usize },

    /// Terminate the current thread.
    EndThread,

    /// Enter an atomic section (interleaving markers suppressed inside).
    AtomicBegin,

    /// Leave an atomic section.
    AtomicEnd,

    /// No effect. Carries labels and locations.
    Skip,

    /// Push exception handlers: `(tag, landing pad target)` pairs.
    CatchPush { handlers: Vec<(Ident, usize)> },

    /// Pop the innermost handler set.
    CatchPop,

    /// First instruction of a landing pad; receives the exception value.
    Landingpad { lhs: Expr },

    /// Throw an exception with the given tag.
    Throw { exception: Expr, tag: Ident },

    /// The remaining statement family.
    Other(OtherStatement),
}

/// Statements without dedicated control-flow behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OtherStatement {
    /// Record a program input in the equation.
    Input { args: Vec<Expr> },

    /// Record a program output in the equation.
    Output { args: Vec<Expr> },

    /// Formatted output; no semantic effect, logged as a trace step.
    Printf { args: Vec<Expr> },

    /// Named trace event for debugging front ends.
    Trace { event: String, args: Vec<Expr> },

    /// Heap allocation: `lhs` receives a pointer to a fresh object of `size`
    /// bytes.
    Allocate { lhs: Expr, size: Expr },

    /// Variadic-argument bookkeeping; `lhs` receives the va-list handle.
    VaStart { lhs: Expr },

    /// Associate a pointer with an array object in the pointer store.
    ArrayAssociate { pointer: Expr, array: Expr },

    /// Named intrinsic pseudo-call (string builtins and similar).
    Intrinsic {
        name: Ident,
        lhs: Option<Expr>,
        args: Vec<Expr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::types::Type;

    fn assign(name: &str, value: i128) -> Instruction {
        Instruction::new(InstructionKind::Assign {
            lhs: Expr::plain_symbol(name, Type::signed(32)),
            rhs: Expr::int(value, Type::signed(32)),
        })
    }

    #[test]
    fn unconditional_goto_is_terminator() {
        let g = Instruction::new(InstructionKind::Goto {
            cond: Expr::bool_true(),
            target: 3,
        });
        assert!(g.is_terminator());
        assert_eq!(g.targets().as_slice(), &[3]);
    }

    #[test]
    fn conditional_goto_falls_through() {
        let g = Instruction::new(InstructionKind::Goto {
            cond: Expr::plain_symbol("c", Type::Bool),
            target: 7,
        });
        assert!(!g.is_terminator());
        assert_eq!(g.targets().as_slice(), &[7]);
    }

    #[test]
    fn return_and_end_function_terminate() {
        assert!(Instruction::new(InstructionKind::Return { value: None }).is_terminator());
        assert!(Instruction::new(InstructionKind::EndFunction).is_terminator());
        assert!(!assign("x", 1).is_terminator());
    }

    #[test]
    fn catch_push_exposes_handler_targets() {
        let c = Instruction::new(InstructionKind::CatchPush {
            handlers: vec![("io_error".into(), 10), ("any".into(), 12)],
        });
        assert_eq!(c.targets().as_slice(), &[10, 12]);
        assert!(!c.is_terminator());
    }

    #[test]
    fn labels_accumulate() {
        let i = assign("x", 0).with_label("entry").with_label("retry");
        assert_eq!(i.labels.len(), 2);
        assert_eq!(i.labels[0], Ident::new("entry"));
    }

    #[test]
    fn serde_roundtrip_instruction() {
        let i = Instruction::new(InstructionKind::Assert {
            cond: Expr::bool_true(),
            msg: "always holds".into(),
            property: "main.assertion.1".into(),
        })
        .with_source(SourceLocation::in_function("main"));
        let json = serde_json::to_string(&i).unwrap();
        let back: Instruction = serde_json::from_str(&json).unwrap();
        assert_eq!(i, back);
    }
}
