//! Forward symbolic execution for GOTO programs.
//!
//! The engine traces every reachable control-flow path of a program in a
//! logical domain, accumulating one SSA [`Equation`] of assignments,
//! assumptions, and verification conditions for a downstream decision
//! procedure.
//!
//! # Architecture
//!
//! - [`Executor`] interprets instructions and controls path exploration.
//! - [`ExecState`] is the per-path mutable state: program counter, guard,
//!   renaming maps, pointer store, call stack, threads.
//! - [`Guard`] accumulates the path condition as a conjunct list.
//! - [`Equation`] is the append-only log of SSA steps, the only artifact
//!   the engine exports.
//! - [`ValueSet`] tracks candidate pointer targets for dereferencing.
//! - [`SymexConfig`] carries bounds, modes, and diagnostics switches.
//!
//! # Usage
//!
//! ```ignore
//! let mut executor = Executor::new(&program, &symbols, SymexConfig::default());
//! let equation = executor.symex_from_entry_point(&program.entry_point)?;
//! for step in equation.steps() { /* hand to the solver */ }
//! ```

mod clean;
mod merge;

pub mod config;
pub mod equation;
pub mod error;
pub mod executor;
pub mod guard;
pub mod path;
pub mod prop;
pub mod renaming;
pub mod state;
pub mod value_set;

pub use config::SymexConfig;
pub use equation::{AssignmentKind, Equation, SsaStep};
pub use error::EngineError;
pub use executor::{Executor, FunctionSource, RunOutcome, StepResult};
pub use guard::Guard;
pub use path::{PathStack, PathStorage, SavedPath};
pub use renaming::{Level2Map, PropagationMap};
pub use state::{ExecState, Frame, LoopKey, ThreadSlot};
pub use value_set::{PointerTarget, ValueSet};
