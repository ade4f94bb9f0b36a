//! Branch handling: forking, loop unwinding, and condition propagation.
//!
//! A forward goto forks the state. In merging mode the taken successor is
//! parked at its target and merged back in when execution arrives there; in
//! path-exploration mode it is pushed to path storage and the engine pauses
//! after continuing into the fall-through.
//!
//! A backwards goto is a loop back-edge: the unwind policy decides whether
//! to take it once more or to truncate with an unwinding assertion or
//! assumption.

use gotosym_ir::{Expr, ExprKind};

use crate::clean::clean_read;
use crate::equation::SsaStep;
use crate::error::EngineError;
use crate::path::SavedPath;
use crate::state::{ExecState, LoopKey};
use crate::value_set::filter_by_condition;

use super::{Executor, FunctionSource};

pub(crate) fn symex_goto<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    cond: &Expr,
    target: usize,
) -> Result<(), EngineError> {
    // A dead walker never jumps: falling through visits every parked
    // contributor between here and the end of the function.
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }

    let cleaned = clean_read(state, &mut exec.equation, &exec.config, cond)?;
    state.kill_instruction_locals(&cleaned.instruction_locals);
    let cond = cleaned.expr;

    exec.equation.append(SsaStep::Goto {
        guard: state.guard.as_expr(),
        cond: cond.clone(),
        source: state.source.clone(),
    });

    let backwards = target <= state.pc.index;
    let guard_taken = state.guard.and_cond(cond.clone());
    let guard_not_taken = state.guard.and_cond(Expr::not_(cond.clone()));

    if backwards {
        symex_backwards_goto(exec, state, cond, target, guard_taken, guard_not_taken)
    } else {
        symex_forwards_goto(exec, state, cond, target, guard_taken, guard_not_taken)
    }
}

fn symex_forwards_goto<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    cond: Expr,
    target: usize,
    guard_taken: crate::guard::Guard,
    guard_not_taken: crate::guard::Guard,
) -> Result<(), EngineError> {
    // A branch that cannot be taken is a plain fall-through.
    if cond.is_false() || guard_taken.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }

    if exec.config.doing_path_exploration {
        if cond.is_true() || guard_not_taken.is_false() {
            state.pc = state.pc.at(target);
            return Ok(());
        }
        let mut taken = state.fork();
        taken.guard = guard_taken;
        taken.pc = state.pc.at(target);
        state.guard = guard_not_taken;
        state.pc = state.pc.next();
        apply_branch_condition(exec, &cond, &mut taken, state);
        tracing::debug!(target = %taken.pc, "path exploration: storing taken branch");
        exec.push_saved_path(SavedPath::new(taken));
        exec.should_pause_symex = true;
        return Ok(());
    }

    // Merging mode: the taken successor is parked at its target and the
    // current state walks on under the not-taken guard -- a false guard for
    // an unconditional jump. The walk visits every skipped instruction, so
    // contributors parked in between still get merged.
    let mut taken = state.fork();
    taken.guard = guard_taken;
    taken.pc = state.pc.at(target);

    state.guard = guard_not_taken;
    state.pc = state.pc.next();
    if state.guard.is_false() {
        state.reachable = false;
    }

    apply_branch_condition(exec, &cond, &mut taken, state);

    let at = taken.pc.clone();
    exec.park_for_merge(at, taken);
    Ok(())
}

fn symex_backwards_goto<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    cond: Expr,
    target: usize,
    guard_taken: crate::guard::Guard,
    guard_not_taken: crate::guard::Guard,
) -> Result<(), EngineError> {
    // A back-edge that cannot be taken is just a fall-through.
    if cond.is_false() || guard_taken.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }

    let key = LoopKey {
        function: state.pc.function.clone(),
        target,
        context: state.call_stack_context(),
    };
    let iteration = state.loop_iterations.get(&key).copied().unwrap_or(0) + 1;
    let bound = exec
        .config
        .unwind_limit_for(&state.pc.function, target);

    if let Some(bound) = bound {
        if iteration > bound {
            tracing::debug!(loop_head = target, iteration, bound, "unwind bound reached");
            truncate_loop(exec, state, &cond, guard_taken);
            state.pc = state.pc.next();
            return Ok(());
        }
    }

    state.loop_iterations.insert(key, iteration);

    let mut not_taken = state.fork();
    not_taken.guard = guard_not_taken;
    not_taken.pc = state.pc.next();

    state.guard = guard_taken;
    state.pc = state.pc.at(target);

    apply_branch_condition(exec, &cond, state, &mut not_taken);

    if exec.config.doing_path_exploration {
        exec.push_saved_path(SavedPath::new(not_taken));
        exec.should_pause_symex = true;
    } else if !not_taken.guard.is_false() {
        // The loop exit waits at the fall-through until every unwinding
        // arrives there.
        let at = not_taken.pc.clone();
        exec.park_for_merge(at, not_taken);
    }
    Ok(())
}

/// Truncation at the unwind bound, per configuration. An unwinding
/// assertion obliges the solver to prove the bound sufficient; unless
/// partial loops are allowed, the back-edge is additionally cut by a
/// sound unwinding assumption.
fn truncate_loop<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    cond: &Expr,
    guard_taken: crate::guard::Guard,
) {
    if exec.config.unwinding_assertions {
        let property = state.fresh_name("unwind");
        exec.equation.append(SsaStep::Assert {
            guard: guard_taken.as_expr(),
            cond: Expr::bool_false(),
            msg: "unwinding assertion".into(),
            property,
            source: state.source.clone(),
        });
    }
    // `partial_loops` drops the assumption and lets execution continue past
    // the bound; forcing self-loops to assumptions wins over it.
    if exec.config.partial_loops && !exec.config.self_loops_to_assumptions {
        return;
    }
    let negated = Expr::not_(cond.clone());
    exec.equation.append(SsaStep::Assume {
        guard: state.guard.as_expr(),
        cond: negated.clone(),
        source: state.source.clone(),
    });
    state.guard.add(negated);
    if state.guard.is_false() {
        state.reachable = false;
    }
}

/// Condition propagation into the two successors of a branch.
fn apply_branch_condition<S: FunctionSource>(
    exec: &Executor<'_, S>,
    cond: &Expr,
    taken: &mut ExecState,
    not_taken: &mut ExecState,
) {
    if let ExprKind::Binary {
        op: gotosym_ir::BinaryOp::Eq,
        lhs,
        rhs,
    } = cond.kind()
    {
        // x == const: the taken side learns the binding, the not-taken
        // side forgets any conflicting knowledge.
        let bindings = [(lhs, rhs), (rhs, lhs)];
        for (sym, value) in bindings {
            let (Some(name), Some(_)) = (sym.as_symbol(), value.as_constant()) else {
                continue;
            };
            if exec.config.constant_propagation {
                taken.propagation.bind(name.l1_ident(), value.clone());
                not_taken.propagation.remove(&name.l1_ident());
            }
            break;
        }

        // Pointer equalities sharpen the taken side's target sets.
        if lhs.ty().is_pointer() {
            taken.value_set.apply_condition(cond);
        }
    }

    filter_by_condition(cond, &mut taken.value_set, &mut not_taken.value_set);
}
