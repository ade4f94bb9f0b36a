//! Exception modeling: handler stacks, throw, landing pads.
//!
//! Each frame keeps a stack of handler sets pushed by `CatchPush`. A throw
//! searches frames from the innermost outwards for a matching tag (the tag
//! `"..."` catches everything), tears down the frames in between exactly
//! like returns would, hands the exception value over in a dedicated
//! symbol, and jumps to the landing pad. The pad's `Landingpad`
//! instruction copies the value into its own variable.

use gotosym_ir::{Expr, Ident, SsaName, Symbol};

use crate::clean::clean_read;
use crate::equation::{AssignmentKind, SsaStep};
use crate::error::EngineError;
use crate::state::ExecState;

use super::assign::{assign_to_symbol, symex_assign};
use super::call::pop_frame;
use super::{Executor, FunctionSource};

/// Base name of the symbol carrying an in-flight exception value.
const EXCEPTION_VALUE: &str = "symex::exception_value";

pub(crate) fn symex_catch_push(
    state: &mut ExecState,
    handlers: &[(Ident, usize)],
) -> Result<(), EngineError> {
    if state.guard.is_false() {
        return Ok(());
    }
    let pc = state.pc.clone();
    let frame = state
        .current_frame_mut()
        .ok_or(EngineError::NoActiveFrame { pc })?;
    frame.catch_stack.push(handlers.to_vec());
    Ok(())
}

pub(crate) fn symex_catch_pop(state: &mut ExecState) -> Result<(), EngineError> {
    // A dead walker may cross a pop whose set a throw already consumed.
    if state.guard.is_false() {
        return Ok(());
    }
    let pc = state.pc.clone();
    let frame = state
        .current_frame_mut()
        .ok_or(EngineError::NoActiveFrame { pc: pc.clone() })?;
    if frame.catch_stack.pop().is_none() {
        return Err(EngineError::InvariantViolation {
            reason: format!("catch pop without a pushed handler set at {pc}"),
        });
    }
    Ok(())
}

pub(crate) fn symex_throw<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    exception: &Expr,
    tag: &Ident,
) -> Result<(), EngineError> {
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }

    let cleaned = clean_read(state, &mut exec.equation, &exec.config, exception)?;
    state.kill_instruction_locals(&cleaned.instruction_locals);

    let Some((frame_index, handler_target)) = find_handler(state, tag) else {
        // No handler anywhere: the throw is a verification failure and the
        // path dies, walking on to drain any parked contributors.
        let property = state.fresh_name("uncaught_exception");
        exec.equation.append(SsaStep::Assert {
            guard: state.guard.as_expr(),
            cond: Expr::bool_false(),
            msg: format!("uncaught exception '{tag}'"),
            property,
            source: state.source.clone(),
        });
        state.guard.add(Expr::bool_false());
        state.reachable = false;
        state.pc = state.pc.next();
        return Ok(());
    };

    let same_frame = frame_index + 1 == state.call_stack.len();

    // Hand the value over before unwinding, in the thrower's context.
    let ty = cleaned.expr.ty().clone();
    let holder_base = Ident::new(EXCEPTION_VALUE);
    let _ = state
        .inner_symbols
        .insert(Symbol::local(holder_base.clone(), ty.clone()));
    let holder_l1 = state
        .rename_l1(&Expr::symbol(SsaName::new(holder_base), ty.clone()))
        .as_symbol()
        .cloned()
        .ok_or_else(|| EngineError::InvariantViolation {
            reason: "level-1 renaming changed a symbol's kind".into(),
        })?;
    assign_to_symbol(
        exec,
        state,
        &holder_l1,
        &ty,
        cleaned.expr,
        AssignmentKind::Hidden,
    )?;

    // Unwind the frames above the handler, emitting their teardown.
    while state.call_stack.len() > frame_index + 1 {
        let function = match state.current_frame() {
            Some(frame) => frame.function.clone(),
            None => break,
        };
        exec.equation.append(SsaStep::FunctionReturn {
            guard: state.guard.as_expr(),
            function: function.clone(),
            source: state.source.clone(),
        });
        pop_frame(state)?;
        if let Some(count) = state.recursion_depth.get_mut(&function) {
            *count = count.saturating_sub(1);
        }
    }

    // The matching handler set (and anything pushed above it) is consumed.
    let handler_function = {
        let pc = state.pc.clone();
        let frame = state
            .current_frame_mut()
            .ok_or(EngineError::NoActiveFrame { pc })?;
        while let Some(set) = frame.catch_stack.pop() {
            let found = set
                .iter()
                .any(|(t, target)| *target == handler_target && handler_matches(t, tag));
            if found {
                break;
            }
        }
        frame.function.clone()
    };

    tracing::debug!(tag = %tag, target = handler_target, "throw caught");
    let handler_pc = gotosym_ir::Pc::new(handler_function, handler_target);

    // A forward jump within the throwing frame is treated like an
    // unconditional goto: the caught state parks at the landing pad and
    // the dead walker drains anything parked in between. Cross-frame
    // unwinding jumps directly.
    if !exec.config.doing_path_exploration && same_frame && handler_target > state.pc.index {
        let mut caught = state.fork();
        caught.pc = handler_pc;
        exec.park_for_merge(caught.pc.clone(), caught);
        state.guard.add(Expr::bool_false());
        state.reachable = false;
        state.pc = state.pc.next();
    } else {
        state.pc = handler_pc;
    }
    Ok(())
}

/// The landing pad copies the in-flight exception value into its variable.
pub(crate) fn symex_landingpad<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    lhs: &Expr,
) -> Result<(), EngineError> {
    let holder = Expr::symbol(SsaName::new(EXCEPTION_VALUE), lhs.ty().clone());
    symex_assign(exec, state, lhs, &holder, AssignmentKind::Hidden)
}

/// Innermost matching handler: `(frame index, landing pad target)`.
fn find_handler(state: &ExecState, tag: &Ident) -> Option<(usize, usize)> {
    for (frame_index, frame) in state.call_stack.iter().enumerate().rev() {
        for set in frame.catch_stack.iter().rev() {
            if let Some((_, target)) = set.iter().find(|(t, _)| handler_matches(t, tag)) {
                return Some((frame_index, *target));
            }
        }
    }
    None
}

fn handler_matches(handler_tag: &Ident, thrown: &Ident) -> bool {
    handler_tag == thrown || handler_tag.as_str() == "..."
}
