//! Per-path execution state.
//!
//! [`ExecState`] carries everything one symbolic path mutates: program
//! counter, guard, the three renaming levels, the pointer store, the call
//! stack, loop counters, and thread bookkeeping. Forking a path is a deep
//! copy; merging is in `merge.rs`.
//!
//! The renaming discipline lives here as methods:
//!
//! - [`ExecState::rename_l1`] decorates symbols with thread and frame
//!   (levels 0 and 1). Shared globals get neither; locals get both.
//! - [`ExecState::rename_l2`] attaches the current SSA version to reads,
//!   substituting known constants when propagation is enabled. Operands of
//!   address-of stay version-free: an address names the object, not its
//!   current value.
//! - [`ExecState::assignment_lhs`] bumps the version for a write.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use gotosym_ir::{
    Designator, Expr, ExprKind, Ident, Pc, SourceLocation, SsaName, SymbolTable, ThreadId, Type,
};

use crate::config::SymexConfig;
use crate::guard::Guard;
use crate::renaming::{Level2Map, PropagationMap};
use crate::value_set::ValueSet;

/// One activation record on the call stack.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: Ident,
    /// Level-1 renamed assignment target for the return value, if any.
    pub return_target: Option<Expr>,
    /// Where to continue in the caller. `None` for the entry frame and
    /// thread entry frames.
    pub return_pc: Option<Pc>,
    /// Level-1 names introduced by this frame, killed on exit.
    pub locals: IndexSet<Ident>,
    /// Base name -> level-1 frame number before this frame shadowed it
    /// (`None` = the name was not live). Restored on exit.
    pub saved_level1: IndexMap<Ident, Option<u64>>,
    /// Exception handler sets pushed by `CatchPush`, innermost last.
    pub catch_stack: Vec<Vec<(Ident, usize)>>,
}

impl Frame {
    pub fn new(function: Ident) -> Self {
        Frame {
            function,
            return_target: None,
            return_pc: None,
            locals: IndexSet::new(),
            saved_level1: IndexMap::new(),
            catch_stack: Vec::new(),
        }
    }
}

/// Saved context of a spawned (not yet running) or suspended program thread.
#[derive(Debug, Clone)]
pub struct ThreadSlot {
    pub id: ThreadId,
    pub pc: Pc,
    pub call_stack: Vec<Frame>,
    pub level1: IndexMap<Ident, u64>,
    /// Path guard at the spawn point; the thread starts under it.
    pub guard: Guard,
    pub started: bool,
    pub terminated: bool,
}

/// Identity of a loop instance: back-edge target in a function, under a
/// specific call-stack context (so the same loop in recursive activations
/// unwinds independently).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopKey {
    pub function: Ident,
    pub target: usize,
    pub context: u64,
}

/// The complete mutable state of one symbolic path.
#[derive(Debug, Clone)]
pub struct ExecState {
    pub pc: Pc,
    /// Location of the instruction being interpreted, stamped onto steps.
    pub source: SourceLocation,
    pub guard: Guard,
    /// Cleared when the guard becomes false by construction.
    pub reachable: bool,
    pub active_thread: ThreadId,
    /// Interpreted steps on this path, for `max_depth`.
    pub depth: u64,
    /// Nesting level of atomic sections; interleaving markers are
    /// suppressed while positive.
    pub atomic_section: u32,
    /// Set once the program spawns its first thread.
    pub saw_threads: bool,
    /// Base name -> current frame number, for the active thread.
    pub level1: IndexMap<Ident, u64>,
    pub level2: Level2Map,
    pub propagation: PropagationMap,
    pub value_set: ValueSet,
    pub call_stack: Vec<Frame>,
    pub threads: Vec<ThreadSlot>,
    next_thread: u32,
    pub loop_iterations: IndexMap<LoopKey, u64>,
    /// Active call count per function, for the recursion bound.
    pub recursion_depth: IndexMap<Ident, u64>,
    /// Monotone frame counters per base name; never reset, so every
    /// activation gets a fresh level-1 name.
    frame_counters: IndexMap<Ident, u64>,
    /// Shared across forks so generated names never collide between
    /// branches.
    fresh_counter: Rc<Cell<u64>>,
    /// Level-1 name -> (version-free name, type), for phi construction.
    pub l1_info: IndexMap<Ident, (SsaName, Type)>,
    /// Base names visible to all threads (static, not thread-local).
    shared_symbols: IndexSet<Ident>,
    /// Symbols generated during execution (aux lets, heap objects, failed
    /// objects, materialized strings).
    pub inner_symbols: SymbolTable,
}

impl ExecState {
    pub fn new(pc: Pc, shared_symbols: IndexSet<Ident>) -> Self {
        ExecState {
            pc,
            source: SourceLocation::none(),
            guard: Guard::always_true(),
            reachable: true,
            active_thread: ThreadId(0),
            depth: 0,
            atomic_section: 0,
            saw_threads: false,
            level1: IndexMap::new(),
            level2: Level2Map::new(),
            propagation: PropagationMap::new(),
            value_set: ValueSet::new(),
            call_stack: Vec::new(),
            threads: Vec::new(),
            next_thread: 1,
            loop_iterations: IndexMap::new(),
            recursion_depth: IndexMap::new(),
            frame_counters: IndexMap::new(),
            fresh_counter: Rc::new(Cell::new(0)),
            l1_info: IndexMap::new(),
            shared_symbols,
            inner_symbols: SymbolTable::new(),
        }
    }

    /// Deep copy for path exploration and branch forking.
    pub fn fork(&self) -> ExecState {
        self.clone()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.call_stack.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.call_stack.last_mut()
    }

    /// A fresh generated name, unique within this analysis (the counter is
    /// shared across forks).
    pub fn fresh_name(&mut self, prefix: &str) -> Ident {
        let n = self.fresh_counter.get();
        self.fresh_counter.set(n + 1);
        Ident::from(format!("{prefix}${n}"))
    }

    /// Hash of the call-stack shape, distinguishing loop instances across
    /// recursive activations.
    pub fn call_stack_context(&self) -> u64 {
        let mut h = DefaultHasher::new();
        for frame in &self.call_stack {
            frame.function.as_str().hash(&mut h);
        }
        h.finish()
    }

    pub fn is_shared(&self, base: &Ident) -> bool {
        self.shared_symbols.contains(base)
    }

    /// Marks a generated object (heap allocation) as visible to all
    /// threads, so every thread renames it to the same level-1 identity.
    pub fn add_shared(&mut self, base: Ident) {
        self.shared_symbols.insert(base);
    }

    /// Interleaving markers are emitted once threads exist and we are not
    /// inside an atomic section.
    pub fn emits_interleaving_markers(&self) -> bool {
        self.saw_threads && self.atomic_section == 0
    }

    // -- Locals and frames ---------------------------------------------------

    /// Introduces a local: bumps the frame counter, rebinds level 1, and
    /// resets the SSA version so the first read is unconstrained.
    pub fn declare_local(&mut self, base: &Ident, ty: &Type) -> SsaName {
        let counter = self.frame_counters.entry(base.clone()).or_insert(0);
        *counter += 1;
        let frame_number = *counter;

        let previous = self.level1.insert(base.clone(), frame_number);
        let name = SsaName::new(base.clone())
            .with_thread(self.active_thread)
            .with_frame(frame_number);
        let l1 = name.l1_ident();

        if let Some(frame) = self.call_stack.last_mut() {
            frame.locals.insert(l1.clone());
            frame.saved_level1.entry(base.clone()).or_insert(previous);
        }

        self.level2.reset(&l1);
        self.l1_info.insert(l1, (name.clone(), ty.clone()));
        name
    }

    /// Ends the lifetime of a local: drops the level-1 binding and
    /// invalidates pointer-store and propagation entries.
    pub fn kill_local(&mut self, base: &Ident) {
        if let Some(frame_number) = self.level1.get(base).copied() {
            let l1 = SsaName::new(base.clone())
                .with_thread(self.active_thread)
                .with_frame(frame_number)
                .l1_ident();
            self.value_set.kill(&l1);
            self.propagation.remove(&l1);
            self.level1.shift_remove(base);
        }
    }

    /// Cleans up generated instruction-local names (lifted lets).
    pub fn kill_instruction_locals(&mut self, locals: &[Ident]) {
        for l1 in locals {
            self.value_set.kill(l1);
            self.propagation.remove(l1);
        }
    }

    // -- Threads -------------------------------------------------------------

    /// Registers a new program thread starting at `target` in the current
    /// function, inheriting the renaming context of the spawner.
    pub fn spawn_thread(&mut self, target: usize) -> ThreadId {
        let id = ThreadId(self.next_thread);
        self.next_thread += 1;
        let function = self.pc.function.clone();
        self.threads.push(ThreadSlot {
            id,
            pc: Pc::new(function.clone(), target),
            call_stack: vec![Frame::new(function)],
            level1: self.level1.clone(),
            guard: self.guard.clone(),
            started: false,
            terminated: false,
        });
        self.saw_threads = true;
        id
    }

    /// Index of the next thread that has neither started nor terminated.
    pub fn next_pending_thread(&self) -> Option<usize> {
        self.threads
            .iter()
            .position(|t| !t.started && !t.terminated)
    }

    /// Activates the thread in slot `index`, replacing the (finished)
    /// current context with the slot's saved pc, call stack, and level-1
    /// map.
    pub fn switch_thread(&mut self, index: usize) {
        let slot = &mut self.threads[index];
        slot.started = true;
        self.active_thread = slot.id;
        self.pc = slot.pc.clone();
        self.call_stack = slot.call_stack.clone();
        self.level1 = slot.level1.clone();
        self.guard = slot.guard.clone();
        self.reachable = !self.guard.is_false();
    }

    /// Marks the active thread's slot terminated (no-op for the initial
    /// thread, which has no slot).
    pub fn terminate_active_thread(&mut self) {
        let active = self.active_thread;
        if let Some(slot) = self.threads.iter_mut().find(|t| t.id == active) {
            slot.terminated = true;
        }
    }

    // -- Renaming ------------------------------------------------------------

    /// Levels 0 and 1: decorates every symbol with its thread and frame.
    /// Idempotent; already-decorated symbols pass through.
    pub fn rename_l1(&self, expr: &Expr) -> Expr {
        let mut bound = Vec::new();
        self.rename_l1_inner(expr, &mut bound)
    }

    fn l1_name(&self, name: &SsaName) -> SsaName {
        if name.is_l0_renamed() {
            return name.clone();
        }
        if self.is_shared(&name.base) {
            // Shared globals carry no thread or frame decoration, so all
            // threads rename them to the same level-1 identity.
            return name.clone();
        }
        let mut out = name.clone().with_thread(self.active_thread);
        if let Some(frame_number) = self.level1.get(&name.base) {
            out = out.with_frame(*frame_number);
        }
        out
    }

    fn rename_l1_inner(&self, expr: &Expr, bound: &mut Vec<Ident>) -> Expr {
        let rebuild = |kind: ExprKind| Expr::new(kind, expr.ty().clone());
        match expr.kind() {
            ExprKind::Symbol { name } => {
                if bound.contains(&name.base) {
                    expr.clone()
                } else {
                    Expr::symbol(self.l1_name(name), expr.ty().clone())
                }
            }
            ExprKind::Constant(_) | ExprKind::Nil => expr.clone(),
            ExprKind::Binary { op, lhs, rhs } => rebuild(ExprKind::Binary {
                op: *op,
                lhs: self.rename_l1_inner(lhs, bound),
                rhs: self.rename_l1_inner(rhs, bound),
            }),
            ExprKind::Unary { op, operand } => rebuild(ExprKind::Unary {
                op: *op,
                operand: self.rename_l1_inner(operand, bound),
            }),
            ExprKind::IfThenElse {
                cond,
                true_value,
                false_value,
            } => rebuild(ExprKind::IfThenElse {
                cond: self.rename_l1_inner(cond, bound),
                true_value: self.rename_l1_inner(true_value, bound),
                false_value: self.rename_l1_inner(false_value, bound),
            }),
            ExprKind::Index { array, index } => rebuild(ExprKind::Index {
                array: self.rename_l1_inner(array, bound),
                index: self.rename_l1_inner(index, bound),
            }),
            ExprKind::Member { compound, field } => rebuild(ExprKind::Member {
                compound: self.rename_l1_inner(compound, bound),
                field: field.clone(),
            }),
            ExprKind::Dereference { pointer } => rebuild(ExprKind::Dereference {
                pointer: self.rename_l1_inner(pointer, bound),
            }),
            ExprKind::AddressOf { object } => rebuild(ExprKind::AddressOf {
                object: self.rename_l1_inner(object, bound),
            }),
            ExprKind::Cast { operand } => rebuild(ExprKind::Cast {
                operand: self.rename_l1_inner(operand, bound),
            }),
            ExprKind::ByteExtract { container, offset } => rebuild(ExprKind::ByteExtract {
                container: self.rename_l1_inner(container, bound),
                offset: self.rename_l1_inner(offset, bound),
            }),
            ExprKind::Update {
                compound,
                designator,
                value,
            } => rebuild(ExprKind::Update {
                compound: self.rename_l1_inner(compound, bound),
                designator: match designator {
                    Designator::Index(e) => Designator::Index(self.rename_l1_inner(e, bound)),
                    Designator::Byte(e) => Designator::Byte(self.rename_l1_inner(e, bound)),
                    Designator::Member(m) => Designator::Member(m.clone()),
                },
                value: self.rename_l1_inner(value, bound),
            }),
            ExprKind::FunctionApp { function, args } => rebuild(ExprKind::FunctionApp {
                function: function.clone(),
                args: args
                    .iter()
                    .map(|a| self.rename_l1_inner(a, bound))
                    .collect(),
            }),
            ExprKind::Let {
                binding,
                value,
                body,
            } => {
                let value = self.rename_l1_inner(value, bound);
                bound.push(binding.base.clone());
                let body = self.rename_l1_inner(body, bound);
                bound.pop();
                rebuild(ExprKind::Let {
                    binding: binding.clone(),
                    value,
                    body,
                })
            }
            ExprKind::Quantifier {
                kind,
                variables,
                body,
            } => {
                let depth = bound.len();
                for v in variables {
                    if let Some(name) = v.as_symbol() {
                        bound.push(name.base.clone());
                    }
                }
                let body = self.rename_l1_inner(body, bound);
                bound.truncate(depth);
                rebuild(ExprKind::Quantifier {
                    kind: *kind,
                    variables: variables.clone(),
                    body,
                })
            }
            ExprKind::SideEffect(_) => expr.clone(),
        }
    }

    /// Level 2, for reads: attaches the current SSA version to every
    /// symbol, substituting known constants when propagation is enabled.
    /// Operands of address-of stay version-free.
    pub fn rename_l2(&mut self, expr: &Expr, config: &SymexConfig) -> Expr {
        let mut bound = Vec::new();
        self.rename_l2_inner(expr, config, &mut bound)
    }

    fn rename_l2_inner(
        &mut self,
        expr: &Expr,
        config: &SymexConfig,
        bound: &mut Vec<Ident>,
    ) -> Expr {
        let rebuild = |kind: ExprKind| Expr::new(kind, expr.ty().clone());
        match expr.kind() {
            ExprKind::Symbol { name } => {
                if name.is_l2_renamed() || bound.contains(&name.base) {
                    return expr.clone();
                }
                let l1 = name.l1_ident();
                if config.constant_propagation {
                    if let Some(constant) = self.propagation.get(&l1) {
                        return constant.clone();
                    }
                }
                let version = self.level2.current_version(&l1);
                Expr::symbol(name.clone().with_version(version), expr.ty().clone())
            }
            ExprKind::Constant(_) | ExprKind::Nil => expr.clone(),
            ExprKind::AddressOf { object } => rebuild(ExprKind::AddressOf {
                object: self.rename_l2_address(object, config, bound),
            }),
            ExprKind::Binary { op, lhs, rhs } => rebuild(ExprKind::Binary {
                op: *op,
                lhs: self.rename_l2_inner(lhs, config, bound),
                rhs: self.rename_l2_inner(rhs, config, bound),
            }),
            ExprKind::Unary { op, operand } => rebuild(ExprKind::Unary {
                op: *op,
                operand: self.rename_l2_inner(operand, config, bound),
            }),
            ExprKind::IfThenElse {
                cond,
                true_value,
                false_value,
            } => rebuild(ExprKind::IfThenElse {
                cond: self.rename_l2_inner(cond, config, bound),
                true_value: self.rename_l2_inner(true_value, config, bound),
                false_value: self.rename_l2_inner(false_value, config, bound),
            }),
            ExprKind::Index { array, index } => rebuild(ExprKind::Index {
                array: self.rename_l2_inner(array, config, bound),
                index: self.rename_l2_inner(index, config, bound),
            }),
            ExprKind::Member { compound, field } => rebuild(ExprKind::Member {
                compound: self.rename_l2_inner(compound, config, bound),
                field: field.clone(),
            }),
            ExprKind::Dereference { pointer } => rebuild(ExprKind::Dereference {
                pointer: self.rename_l2_inner(pointer, config, bound),
            }),
            ExprKind::Cast { operand } => rebuild(ExprKind::Cast {
                operand: self.rename_l2_inner(operand, config, bound),
            }),
            ExprKind::ByteExtract { container, offset } => rebuild(ExprKind::ByteExtract {
                container: self.rename_l2_inner(container, config, bound),
                offset: self.rename_l2_inner(offset, config, bound),
            }),
            ExprKind::Update {
                compound,
                designator,
                value,
            } => rebuild(ExprKind::Update {
                compound: self.rename_l2_inner(compound, config, bound),
                designator: match designator {
                    Designator::Index(e) => {
                        Designator::Index(self.rename_l2_inner(e, config, bound))
                    }
                    Designator::Byte(e) => {
                        Designator::Byte(self.rename_l2_inner(e, config, bound))
                    }
                    Designator::Member(m) => Designator::Member(m.clone()),
                },
                value: self.rename_l2_inner(value, config, bound),
            }),
            ExprKind::FunctionApp { function, args } => rebuild(ExprKind::FunctionApp {
                function: function.clone(),
                args: args
                    .iter()
                    .map(|a| self.rename_l2_inner(a, config, bound))
                    .collect(),
            }),
            ExprKind::Let {
                binding,
                value,
                body,
            } => {
                let value = self.rename_l2_inner(value, config, bound);
                bound.push(binding.base.clone());
                let body = self.rename_l2_inner(body, config, bound);
                bound.pop();
                rebuild(ExprKind::Let {
                    binding: binding.clone(),
                    value,
                    body,
                })
            }
            ExprKind::Quantifier {
                kind,
                variables,
                body,
            } => {
                let depth = bound.len();
                for v in variables {
                    if let Some(name) = v.as_symbol() {
                        bound.push(name.base.clone());
                    }
                }
                let body = self.rename_l2_inner(body, config, bound);
                bound.truncate(depth);
                rebuild(ExprKind::Quantifier {
                    kind: *kind,
                    variables: variables.clone(),
                    body,
                })
            }
            ExprKind::SideEffect(_) => expr.clone(),
        }
    }

    /// Renames the object of an address-of: the object symbol itself stays
    /// version-free, but embedded value reads (array indices) get versions.
    /// `&*p` collapses to `p`.
    fn rename_l2_address(
        &mut self,
        object: &Expr,
        config: &SymexConfig,
        bound: &mut Vec<Ident>,
    ) -> Expr {
        match object.kind() {
            ExprKind::Symbol { .. } => object.clone(),
            ExprKind::Index { array, index } => Expr::new(
                ExprKind::Index {
                    array: self.rename_l2_address(array, config, bound),
                    index: self.rename_l2_inner(index, config, bound),
                },
                object.ty().clone(),
            ),
            ExprKind::Member { compound, field } => Expr::new(
                ExprKind::Member {
                    compound: self.rename_l2_address(compound, config, bound),
                    field: field.clone(),
                },
                object.ty().clone(),
            ),
            ExprKind::Dereference { pointer } => self.rename_l2_inner(pointer, config, bound),
            _ => self.rename_l2_inner(object, config, bound),
        }
    }

    /// Bumps the SSA version of a level-1 renamed write target and returns
    /// the new level-2 name.
    pub fn assignment_lhs(&mut self, name: &SsaName, ty: &Type) -> SsaName {
        let l1 = name.l1_ident();
        let version = self.level2.increase(&l1);
        self.l1_info
            .insert(l1, (name.clone().without_version(), ty.clone()));
        name.clone().without_version().with_version(version)
    }
}
