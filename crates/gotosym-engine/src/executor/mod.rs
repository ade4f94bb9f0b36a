//! The instruction interpreter and path-exploration controller.
//!
//! [`Executor`] drives symbolic execution: it fetches the instruction at the
//! state's program counter, dispatches on its kind, and repeats until the
//! path completes or -- in path-exploration mode -- pauses at a branch.
//!
//! Forward branches fork the state; in the default merging mode the taken
//! successor is parked in a per-target bucket and folded back in when
//! execution arrives at the join point. States whose guard has become false
//! keep executing structurally (back-edges are never taken, calls are
//! skipped) so that every parked contributor is reached and merged.
//!
//! Spawned program threads run after the spawning thread finishes, each
//! picking up the shared renaming state; interleaving markers in the
//! equation let the downstream solver reorder shared accesses.

mod assign;
mod builtins;
mod call;
mod catch;
mod goto;
mod thread;

use indexmap::{IndexMap, IndexSet};

use gotosym_ir::{
    GotoFunction, GotoProgram, Ident, Instruction, InstructionKind, Pc, SourceLocation,
    SymbolTable,
};

use crate::clean::clean_read;
use crate::config::SymexConfig;
use crate::equation::{AssignmentKind, Equation, SsaStep};
use crate::error::EngineError;
use crate::merge::merge_into;
use crate::path::{PathStack, PathStorage, SavedPath};
use crate::state::{ExecState, Frame};

/// Lazy provider of function bodies. Returning `None` makes the call a
/// havoc of its left-hand side.
pub trait FunctionSource {
    fn get_function(&self, name: &Ident) -> Option<&GotoFunction>;
}

impl FunctionSource for GotoProgram {
    fn get_function(&self, name: &Ident) -> Option<&GotoFunction> {
        self.get(name)
    }
}

/// Result of interpreting one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// The state advanced; keep stepping.
    Continue,
    /// The active thread ran off its entry frame or ended explicitly.
    EndOfThread,
}

/// Result of driving one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The path and all threads it spawned finished.
    Complete,
    /// Path exploration paused at a branch; one successor was stored, the
    /// continuation is handed back through [`Executor::resume`]'s caller.
    Paused,
}

/// The symbolic execution engine.
pub struct Executor<'a, S: FunctionSource> {
    pub(crate) source: &'a S,
    pub(crate) outer_symbols: &'a SymbolTable,
    pub(crate) config: SymexConfig,
    pub(crate) equation: Equation,
    /// Parked branch successors awaiting their join point.
    pub(crate) pending_merges: IndexMap<Pc, Vec<ExecState>>,
    path_storage: Box<dyn PathStorage>,
    /// Set when path exploration parked a state and yielded.
    pub should_pause_symex: bool,
    /// Functions reported missing, so each is logged once.
    pub(crate) missing_bodies: IndexSet<Ident>,
    total_vccs: usize,
    remaining_vccs: usize,
}

impl<'a, S: FunctionSource> Executor<'a, S> {
    pub fn new(source: &'a S, outer_symbols: &'a SymbolTable, config: SymexConfig) -> Self {
        Executor {
            source,
            outer_symbols,
            config,
            equation: Equation::new(),
            pending_merges: IndexMap::new(),
            path_storage: Box::new(PathStack::new()),
            should_pause_symex: false,
            missing_bodies: IndexSet::new(),
            total_vccs: 0,
            remaining_vccs: 0,
        }
    }

    /// Replaces the default LIFO path storage.
    pub fn with_path_storage(mut self, storage: Box<dyn PathStorage>) -> Self {
        self.path_storage = storage;
        self
    }

    pub fn config(&self) -> &SymexConfig {
        &self.config
    }

    pub fn equation(&self) -> &Equation {
        &self.equation
    }

    /// Assertions emitted by the finished analysis.
    pub fn get_total_vccs(&self) -> usize {
        self.total_vccs
    }

    /// Assertions not already discharged by construction.
    pub fn get_remaining_vccs(&self) -> usize {
        self.remaining_vccs
    }

    /// Number of stored paths awaiting exploration.
    pub fn stored_paths(&self) -> usize {
        self.path_storage.len()
    }

    /// Takes one stored path, if any.
    pub fn pop_path(&mut self) -> Option<SavedPath> {
        self.path_storage.pop()
    }

    pub(crate) fn push_saved_path(&mut self, path: SavedPath) {
        self.path_storage.push(path);
    }

    /// Builds the initial state: entry frame pushed, globals with
    /// initializers assigned.
    pub fn initialize_from_entry_point(
        &mut self,
        entry: &Ident,
    ) -> Result<ExecState, EngineError> {
        let source = self.source;
        let Some(function) = source.get_function(entry) else {
            return Err(EngineError::FunctionNotFound {
                function: entry.clone(),
            });
        };

        if self.config.run_validation_checks {
            let cfg = gotosym_ir::Cfg::new(function);
            for index in cfg.unreachable_instructions() {
                tracing::warn!(function = %entry, index, "unreachable instruction");
            }
        }

        let shared: IndexSet<Ident> = self
            .outer_symbols
            .iter()
            .filter(|s| s.is_shared())
            .map(|s| s.name.clone())
            .collect();

        let mut state = ExecState::new(Pc::new(entry.clone(), 0), shared);
        let mut frame = Frame::new(entry.clone());
        frame.return_pc = None;
        state.call_stack.push(frame);
        state.recursion_depth.insert(entry.clone(), 1);
        state.source = SourceLocation::in_function(entry.clone());

        // Static initializers run before the entry point.
        let initialized: Vec<_> = self
            .outer_symbols
            .iter()
            .filter(|s| s.is_static_lifetime && s.value.is_some())
            .map(|s| (s.name.clone(), s.ty.clone(), s.value.clone().unwrap()))
            .collect();
        for (name, ty, value) in initialized {
            let lhs = gotosym_ir::Expr::plain_symbol(name, ty);
            assign::symex_assign(self, &mut state, &lhs, &value, AssignmentKind::Hidden)?;
        }

        Ok(state)
    }

    /// Executes the whole program from `entry`, returning the finished
    /// equation. In path-exploration mode every stored path is drained in
    /// storage order.
    pub fn symex_from_entry_point(&mut self, entry: &Ident) -> Result<&Equation, EngineError> {
        let state = self.initialize_from_entry_point(entry)?;
        self.path_storage.push(SavedPath::new(state));

        while let Some(path) = self.path_storage.pop() {
            let mut state = path.state;
            if let RunOutcome::Paused = self.run_path(&mut state)? {
                // The continuation keeps exploring later, after the path
                // parked by the branch.
                self.path_storage.push(SavedPath::new(state));
            }
        }

        self.finish()?;
        Ok(&self.equation)
    }

    /// Continues a stored path. On another pause the continuation is
    /// pushed back to storage.
    pub fn resume(&mut self, path: SavedPath) -> Result<RunOutcome, EngineError> {
        let mut state = path.state;
        let outcome = self.run_path(&mut state)?;
        match outcome {
            RunOutcome::Paused => self.path_storage.push(SavedPath::new(state)),
            RunOutcome::Complete => {
                if self.path_storage.is_empty() {
                    self.finish()?;
                }
            }
        }
        Ok(outcome)
    }

    fn finish(&mut self) -> Result<(), EngineError> {
        self.total_vccs = self.equation.total_vccs();
        self.remaining_vccs = self.equation.remaining_vccs();
        if self.config.run_validation_checks {
            self.equation.validate()?;
        }
        Ok(())
    }

    /// Drives one path until completion or a path-exploration pause.
    pub fn run_path(&mut self, state: &mut ExecState) -> Result<RunOutcome, EngineError> {
        self.should_pause_symex = false;
        loop {
            self.merge_pending(state)?;
            match self.step(state)? {
                StepResult::Continue => {
                    if self.should_pause_symex {
                        return Ok(RunOutcome::Paused);
                    }
                }
                StepResult::EndOfThread => match state.next_pending_thread() {
                    Some(slot) => {
                        tracing::debug!(slot, "switching to spawned thread");
                        state.switch_thread(slot);
                    }
                    None => return Ok(RunOutcome::Complete),
                },
            }
        }
    }

    /// Folds every parked contributor for the current program counter into
    /// the state.
    fn merge_pending(&mut self, state: &mut ExecState) -> Result<(), EngineError> {
        if let Some(bucket) = self.pending_merges.shift_remove(&state.pc) {
            for contributor in bucket {
                merge_into(state, contributor, &mut self.equation, &self.config)?;
            }
        }
        Ok(())
    }

    /// Parks a forked successor to be merged when execution reaches `at`.
    pub(crate) fn park_for_merge(&mut self, at: Pc, successor: ExecState) {
        self.pending_merges.entry(at).or_default().push(successor);
    }

    /// Interprets the instruction at the state's program counter.
    pub fn step(&mut self, state: &mut ExecState) -> Result<StepResult, EngineError> {
        let source = self.source;
        let function =
            source
                .get_function(&state.pc.function)
                .ok_or_else(|| EngineError::FunctionNotFound {
                    function: state.pc.function.clone(),
                })?;
        if state.pc.index >= function.body.len() {
            return Err(EngineError::InvariantViolation {
                reason: format!("program counter {} outside function body", state.pc),
            });
        }
        let instruction = function.body[state.pc.index].clone();
        state.source = if instruction.source.is_none() {
            SourceLocation::in_function(state.pc.function.clone())
        } else {
            instruction.source.clone()
        };

        state.depth += 1;
        if self.config.max_depth > 0 && state.depth > self.config.max_depth && state.reachable {
            tracing::debug!(pc = %state.pc, depth = state.depth, "max depth reached, truncating path");
            self.equation.append(SsaStep::Assume {
                guard: state.guard.as_expr(),
                cond: gotosym_ir::Expr::bool_false(),
                source: state.source.clone(),
            });
            state.guard.add(gotosym_ir::Expr::bool_false());
            state.reachable = false;
            state.pc = state.pc.next();
            return Ok(StepResult::Continue);
        }

        if self.config.show_symex_steps {
            tracing::debug!(pc = %state.pc, guard_conjuncts = state.guard.len(), "step");
        }
        if self.config.debug_level >= 2 {
            tracing::trace!(pc = %state.pc, depth = state.depth, "instruction: {:?}", instruction.kind);
        }

        self.dispatch(state, &instruction)
    }

    fn dispatch(
        &mut self,
        state: &mut ExecState,
        instruction: &Instruction,
    ) -> Result<StepResult, EngineError> {
        match &instruction.kind {
            InstructionKind::Assign { lhs, rhs } => {
                assign::symex_assign(self, state, lhs, rhs, AssignmentKind::State)?;
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Decl { symbol } => {
                let name = symbol.as_symbol().ok_or_else(|| EngineError::Unsupported {
                    pc: state.pc.clone(),
                    what: "declaration of a non-symbol".into(),
                })?;
                // No step is emitted: the fresh version is unconstrained
                // until first written, which is nondet downstream.
                state.declare_local(&name.base.clone(), &symbol.ty().clone());
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Dead { symbol } => {
                let name = symbol.as_symbol().ok_or_else(|| EngineError::Unsupported {
                    pc: state.pc.clone(),
                    what: "dead of a non-symbol".into(),
                })?;
                state.kill_local(&name.base.clone());
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Assume { cond } => {
                if state.guard.is_false() {
                    state.pc = state.pc.next();
                    return Ok(StepResult::Continue);
                }
                let cleaned = clean_read(state, &mut self.equation, &self.config, cond)?;
                if cleaned.expr.is_false() {
                    state.guard.add(gotosym_ir::Expr::bool_false());
                    state.reachable = false;
                } else if !cleaned.expr.is_true() {
                    self.equation.append(SsaStep::Assume {
                        guard: state.guard.as_expr(),
                        cond: cleaned.expr.clone(),
                        source: state.source.clone(),
                    });
                    state.guard.add(cleaned.expr);
                }
                state.kill_instruction_locals(&cleaned.instruction_locals);
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Assert {
                cond,
                msg,
                property,
            } => {
                if state.guard.is_false() {
                    state.pc = state.pc.next();
                    return Ok(StepResult::Continue);
                }
                let cleaned = clean_read(state, &mut self.equation, &self.config, cond)?;
                self.equation.append(SsaStep::Assert {
                    guard: state.guard.as_expr(),
                    cond: cleaned.expr,
                    msg: msg.clone(),
                    property: property.clone(),
                    source: state.source.clone(),
                });
                state.kill_instruction_locals(&cleaned.instruction_locals);
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Goto { cond, target } => {
                goto::symex_goto(self, state, cond, *target)?;
                Ok(StepResult::Continue)
            }

            InstructionKind::FunctionCall {
                lhs,
                function,
                args,
            } => {
                call::symex_function_call(self, state, lhs.as_ref(), function, args)?;
                Ok(StepResult::Continue)
            }

            InstructionKind::Return { value } => {
                call::symex_return(self, state, value.as_ref())?;
                Ok(StepResult::Continue)
            }

            InstructionKind::EndFunction => call::symex_end_function(self, state),

            InstructionKind::StartThread { target } => {
                thread::symex_start_thread(self, state, *target)?;
                Ok(StepResult::Continue)
            }

            InstructionKind::EndThread => thread::symex_end_thread(self, state),

            InstructionKind::AtomicBegin => {
                thread::symex_atomic_begin(self, state)?;
                Ok(StepResult::Continue)
            }

            InstructionKind::AtomicEnd => {
                thread::symex_atomic_end(self, state)?;
                Ok(StepResult::Continue)
            }

            InstructionKind::Skip => {
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::CatchPush { handlers } => {
                catch::symex_catch_push(state, handlers)?;
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::CatchPop => {
                catch::symex_catch_pop(state)?;
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Landingpad { lhs } => {
                catch::symex_landingpad(self, state, lhs)?;
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }

            InstructionKind::Throw { exception, tag } => {
                catch::symex_throw(self, state, exception, tag)?;
                Ok(StepResult::Continue)
            }

            InstructionKind::Other(other) => {
                builtins::symex_other(self, state, other)?;
                state.pc = state.pc.next();
                Ok(StepResult::Continue)
            }
        }
    }

    /// The end of the current function body, used by `Return` and `Throw`.
    pub(crate) fn end_index_of(&self, function: &Ident) -> Result<usize, EngineError> {
        let source = self.source;
        source
            .get_function(function)
            .map(|f| f.end_index())
            .ok_or_else(|| EngineError::FunctionNotFound {
                function: function.clone(),
            })
    }
}
