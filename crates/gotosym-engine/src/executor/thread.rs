//! Thread spawning, termination, and atomic sections.
//!
//! The modeled program may be multithreaded; the engine itself is not. A
//! spawned thread is recorded as a saved context and executed after the
//! spawning thread finishes. Equation markers (`ThreadSpawn`,
//! `SharedRead`/`SharedWrite`, `AtomicBegin`/`AtomicEnd`) give the
//! downstream solver what it needs to explore interleavings.

use crate::equation::SsaStep;
use crate::error::EngineError;
use crate::state::ExecState;

use super::{Executor, FunctionSource, StepResult};

pub(crate) fn symex_start_thread<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    target: usize,
) -> Result<(), EngineError> {
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }
    let id = state.spawn_thread(target);
    tracing::debug!(thread = %id, target, "spawning thread");
    exec.equation.append(SsaStep::ThreadSpawn {
        guard: state.guard.as_expr(),
        thread: id,
        source: state.source.clone(),
    });
    state.pc = state.pc.next();
    Ok(())
}

pub(crate) fn symex_end_thread<S: FunctionSource>(
    _exec: &mut Executor<'_, S>,
    state: &mut ExecState,
) -> Result<StepResult, EngineError> {
    // A dead walker crossing someone else's thread body keeps walking.
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(StepResult::Continue);
    }
    state.terminate_active_thread();
    Ok(StepResult::EndOfThread)
}

pub(crate) fn symex_atomic_begin<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
) -> Result<(), EngineError> {
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }
    state.atomic_section += 1;
    exec.equation.append(SsaStep::AtomicBegin {
        guard: state.guard.as_expr(),
        source: state.source.clone(),
    });
    state.pc = state.pc.next();
    Ok(())
}

pub(crate) fn symex_atomic_end<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
) -> Result<(), EngineError> {
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }
    if state.atomic_section == 0 {
        return Err(EngineError::InvariantViolation {
            reason: format!("atomic section end without begin at {}", state.pc),
        });
    }
    state.atomic_section -= 1;
    exec.equation.append(SsaStep::AtomicEnd {
        guard: state.guard.as_expr(),
        source: state.source.clone(),
    });
    state.pc = state.pc.next();
    Ok(())
}
