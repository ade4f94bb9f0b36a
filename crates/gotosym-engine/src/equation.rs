//! The target equation: an append-only log of SSA steps.
//!
//! Every step records the path guard in force when it was emitted and only
//! level-2-renamed symbols. Steps are never retracted; a partially filled
//! equation is still well-formed. The equation is the engine's only output.

use std::fmt;

use serde::{Deserialize, Serialize};

use gotosym_ir::{Expr, Ident, SourceLocation, ThreadId};

use crate::error::EngineError;

/// What produced an assignment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentKind {
    /// A program assignment.
    State,
    /// An engine-internal assignment (lifted lets, materialized constants).
    Hidden,
    /// Binding of an actual argument to a formal parameter.
    Parameter,
    /// A merge-point phi selection.
    Phi,
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignmentKind::State => "state",
            AssignmentKind::Hidden => "hidden",
            AssignmentKind::Parameter => "parameter",
            AssignmentKind::Phi => "phi",
        };
        write!(f, "{s}")
    }
}

/// One step of the equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SsaStep {
    Assignment {
        guard: Expr,
        lhs: Expr,
        rhs: Expr,
        kind: AssignmentKind,
        source: SourceLocation,
    },
    Assume {
        guard: Expr,
        cond: Expr,
        source: SourceLocation,
    },
    Assert {
        guard: Expr,
        cond: Expr,
        msg: String,
        property: Ident,
        source: SourceLocation,
    },
    /// A branch decision, recorded for trace reconstruction.
    Goto {
        guard: Expr,
        cond: Expr,
        source: SourceLocation,
    },
    /// Entry into a called function.
    FunctionCall {
        guard: Expr,
        function: Ident,
        source: SourceLocation,
    },
    /// Return from a called function.
    FunctionReturn {
        guard: Expr,
        function: Ident,
        source: SourceLocation,
    },
    ThreadSpawn {
        guard: Expr,
        thread: ThreadId,
        source: SourceLocation,
    },
    Input {
        guard: Expr,
        args: Vec<Expr>,
        source: SourceLocation,
    },
    Output {
        guard: Expr,
        args: Vec<Expr>,
        source: SourceLocation,
    },
    /// Interleaving marker: a read of a shared variable.
    SharedRead {
        guard: Expr,
        symbol: Expr,
        source: SourceLocation,
    },
    /// Interleaving marker: a write of a shared variable.
    SharedWrite {
        guard: Expr,
        symbol: Expr,
        source: SourceLocation,
    },
    AtomicBegin {
        guard: Expr,
        source: SourceLocation,
    },
    AtomicEnd {
        guard: Expr,
        source: SourceLocation,
    },
}

impl SsaStep {
    /// The path guard the step was emitted under.
    pub fn guard(&self) -> &Expr {
        match self {
            SsaStep::Assignment { guard, .. }
            | SsaStep::Assume { guard, .. }
            | SsaStep::Assert { guard, .. }
            | SsaStep::Goto { guard, .. }
            | SsaStep::FunctionCall { guard, .. }
            | SsaStep::FunctionReturn { guard, .. }
            | SsaStep::ThreadSpawn { guard, .. }
            | SsaStep::Input { guard, .. }
            | SsaStep::Output { guard, .. }
            | SsaStep::SharedRead { guard, .. }
            | SsaStep::SharedWrite { guard, .. }
            | SsaStep::AtomicBegin { guard, .. }
            | SsaStep::AtomicEnd { guard, .. } => guard,
        }
    }

    pub fn is_assert(&self) -> bool {
        matches!(self, SsaStep::Assert { .. })
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self, SsaStep::Assignment { .. })
    }

    /// Every expression carried by the step, for validation.
    fn exprs(&self) -> Vec<&Expr> {
        match self {
            SsaStep::Assignment {
                guard, lhs, rhs, ..
            } => vec![guard, lhs, rhs],
            SsaStep::Assume { guard, cond, .. }
            | SsaStep::Assert { guard, cond, .. }
            | SsaStep::Goto { guard, cond, .. } => vec![guard, cond],
            SsaStep::Input { guard, args, .. } | SsaStep::Output { guard, args, .. } => {
                let mut v = vec![guard];
                v.extend(args.iter());
                v
            }
            SsaStep::SharedRead { guard, symbol, .. }
            | SsaStep::SharedWrite { guard, symbol, .. } => vec![guard, symbol],
            SsaStep::FunctionCall { guard, .. }
            | SsaStep::FunctionReturn { guard, .. }
            | SsaStep::ThreadSpawn { guard, .. }
            | SsaStep::AtomicBegin { guard, .. }
            | SsaStep::AtomicEnd { guard, .. } => vec![guard],
        }
    }
}

impl fmt::Display for SsaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaStep::Assignment {
                guard,
                lhs,
                rhs,
                kind,
                ..
            } => write!(f, "ASSIGN({kind}) {lhs} := {rhs} [guard: {guard}]"),
            SsaStep::Assume { guard, cond, .. } => write!(f, "ASSUME {cond} [guard: {guard}]"),
            SsaStep::Assert {
                guard, cond, msg, ..
            } => write!(f, "ASSERT {cond} \"{msg}\" [guard: {guard}]"),
            SsaStep::Goto { guard, cond, .. } => write!(f, "GOTO {cond} [guard: {guard}]"),
            SsaStep::FunctionCall {
                guard, function, ..
            } => write!(f, "CALL {function} [guard: {guard}]"),
            SsaStep::FunctionReturn {
                guard, function, ..
            } => write!(f, "RETURN {function} [guard: {guard}]"),
            SsaStep::ThreadSpawn { guard, thread, .. } => {
                write!(f, "SPAWN thread {thread} [guard: {guard}]")
            }
            SsaStep::Input { guard, args, .. } => {
                write!(f, "INPUT ")?;
                write_args(f, args)?;
                write!(f, " [guard: {guard}]")
            }
            SsaStep::Output { guard, args, .. } => {
                write!(f, "OUTPUT ")?;
                write_args(f, args)?;
                write!(f, " [guard: {guard}]")
            }
            SsaStep::SharedRead { guard, symbol, .. } => {
                write!(f, "SHARED-READ {symbol} [guard: {guard}]")
            }
            SsaStep::SharedWrite { guard, symbol, .. } => {
                write!(f, "SHARED-WRITE {symbol} [guard: {guard}]")
            }
            SsaStep::AtomicBegin { guard, .. } => write!(f, "ATOMIC-BEGIN [guard: {guard}]"),
            SsaStep::AtomicEnd { guard, .. } => write!(f, "ATOMIC-END [guard: {guard}]"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

/// The append-only equation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Equation {
    steps: Vec<SsaStep>,
}

impl Equation {
    pub fn new() -> Self {
        Equation::default()
    }

    pub fn append(&mut self, step: SsaStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[SsaStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total number of verification conditions emitted.
    pub fn total_vccs(&self) -> usize {
        self.steps.iter().filter(|s| s.is_assert()).count()
    }

    /// Verification conditions that are not already discharged by
    /// construction (condition simplified to `true` or guard to `false`).
    pub fn remaining_vccs(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| match s {
                SsaStep::Assert { guard, cond, .. } => !cond.is_true() && !guard.is_false(),
                _ => false,
            })
            .count()
    }

    /// Checks the global well-formedness invariants: every symbol in every
    /// step is level-2 renamed.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (index, step) in self.steps.iter().enumerate() {
            for expr in step.exprs() {
                let mut bad = None;
                expr.for_each_symbol(&mut |name| {
                    if !name.is_l2_renamed() && bad.is_none() {
                        bad = Some(name.clone());
                    }
                });
                if let Some(name) = bad {
                    return Err(EngineError::ValidationFailed {
                        reason: format!("step {index}: symbol '{name}' is not level-2 renamed"),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{{{i}}} {step}")?;
        }
        Ok(())
    }
}
