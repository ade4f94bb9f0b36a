//! Function calls, returns, and frame teardown.
//!
//! A call cleans its arguments in the caller's renaming context, pushes a
//! frame, binds parameters as fresh locals, and jumps to the callee entry.
//! Calls without an available body havoc their left-hand side (logged
//! once). Recursion re-entry beyond the configured bound is truncated
//! like a loop: an unwinding assertion when enabled, otherwise a havoc of
//! the result.

use gotosym_ir::{Expr, Ident};

use crate::clean::clean_read;
use crate::equation::{AssignmentKind, SsaStep};
use crate::error::EngineError;
use crate::state::{ExecState, Frame};

use super::assign::{assign_to_symbol, havoc};
use super::{Executor, FunctionSource, StepResult};

pub(crate) fn symex_function_call<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    lhs: Option<&Expr>,
    function: &Expr,
    args: &[Expr],
) -> Result<(), EngineError> {
    // Dead paths skip calls entirely; nothing downstream can observe them,
    // and skipping keeps unbounded recursion from spinning under a false
    // guard.
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }

    let name = function
        .as_symbol()
        .map(|n| n.base.clone())
        .ok_or_else(|| EngineError::BadCallTarget {
            pc: state.pc.clone(),
        })?;

    let source = exec.source;
    let Some(callee) = source.get_function(&name) else {
        return symex_missing_body(exec, state, &name, lhs);
    };

    let active = state.recursion_depth.get(&name).copied().unwrap_or(0);
    if let Some(bound) = exec.config.recursion_limit_for(&name) {
        if active > bound {
            tracing::debug!(function = %name, active, bound, "recursion bound reached");
            if exec.config.unwinding_assertions {
                let property = state.fresh_name("recursion");
                exec.equation.append(SsaStep::Assert {
                    guard: state.guard.as_expr(),
                    cond: Expr::bool_false(),
                    msg: format!("recursion unwinding assertion for '{name}'"),
                    property,
                    source: state.source.clone(),
                });
            }
            if let Some(lhs) = lhs {
                havoc(exec, state, lhs)?;
            }
            state.pc = state.pc.next();
            return Ok(());
        }
    }

    // Arguments are cleaned in the caller's renaming context, before the
    // callee frame rebinds any shared base names.
    let mut cleaned_args = Vec::with_capacity(args.len());
    for arg in args {
        let cleaned = clean_read(state, &mut exec.equation, &exec.config, arg)?;
        state.kill_instruction_locals(&cleaned.instruction_locals);
        cleaned_args.push(cleaned.expr);
    }
    // The return target is pinned at level 1 now, so the callee's frame
    // numbering cannot recapture it.
    let return_target = lhs.map(|e| state.rename_l1(e));

    exec.equation.append(SsaStep::FunctionCall {
        guard: state.guard.as_expr(),
        function: name.clone(),
        source: state.source.clone(),
    });

    let mut frame = Frame::new(name.clone());
    frame.return_target = return_target;
    frame.return_pc = Some(state.pc.next());
    state.call_stack.push(frame);
    *state.recursion_depth.entry(name.clone()).or_insert(0) += 1;

    let parameters = callee.parameters.clone();
    for (position, (param, ty)) in parameters.iter().enumerate() {
        let l1_name = state.declare_local(param, ty);
        if let Some(arg) = cleaned_args.get(position) {
            let converted = if arg.ty() == ty {
                arg.clone()
            } else {
                Expr::cast(arg.clone(), ty.clone())
            };
            assign_to_symbol(
                exec,
                state,
                &l1_name,
                ty,
                converted,
                AssignmentKind::Parameter,
            )?;
        }
        // A missing actual leaves the parameter unconstrained.
    }

    state.pc = gotosym_ir::Pc::new(name, 0);
    Ok(())
}

/// A call whose body is unavailable havocs its result. Reported once per
/// function.
fn symex_missing_body<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    name: &Ident,
    lhs: Option<&Expr>,
) -> Result<(), EngineError> {
    if exec.missing_bodies.insert(name.clone()) {
        tracing::warn!(function = %name, "no body available, havocking result");
    }
    if let Some(lhs) = lhs {
        havoc(exec, state, lhs)?;
    }
    state.pc = state.pc.next();
    Ok(())
}

pub(crate) fn symex_return<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    value: Option<&Expr>,
) -> Result<(), EngineError> {
    // A dead walker just keeps visiting instructions; the frame pops at
    // `EndFunction`.
    if state.guard.is_false() {
        state.pc = state.pc.next();
        return Ok(());
    }

    let frame = state
        .current_frame()
        .ok_or_else(|| EngineError::NoActiveFrame {
            pc: state.pc.clone(),
        })?;
    let target = frame.return_target.clone();

    if let (Some(target), Some(value)) = (target, value) {
        super::assign::symex_assign(exec, state, &target, value, AssignmentKind::State)?;
    }

    let end = exec.end_index_of(&state.pc.function)?;
    if exec.config.doing_path_exploration || state.pc.index == end {
        state.pc = state.pc.at(end);
        return Ok(());
    }

    // Like an unconditional forward jump: park at the end so instructions
    // between here and there (and any contributors waiting in them) are
    // still visited by the now-dead walker.
    let mut returned = state.fork();
    returned.pc = state.pc.at(end);
    exec.park_for_merge(returned.pc.clone(), returned);

    state.guard.add(Expr::bool_false());
    state.reachable = false;
    state.pc = state.pc.next();
    Ok(())
}

pub(crate) fn symex_end_function<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
) -> Result<StepResult, EngineError> {
    let function = state.pc.function.clone();
    if !state.guard.is_false() {
        exec.equation.append(SsaStep::FunctionReturn {
            guard: state.guard.as_expr(),
            function: function.clone(),
            source: state.source.clone(),
        });
    }
    let frame = pop_frame(state)?;

    if let Some(count) = state.recursion_depth.get_mut(&function) {
        *count = count.saturating_sub(1);
    }

    match frame.return_pc {
        Some(pc) if !state.call_stack.is_empty() => {
            state.pc = pc;
            Ok(StepResult::Continue)
        }
        // The entry frame and thread entry frames have nowhere to return.
        _ => Ok(StepResult::EndOfThread),
    }
}

/// Tears down the top frame: locals die, shadowed level-1 bindings are
/// restored.
pub(crate) fn pop_frame(state: &mut ExecState) -> Result<Frame, EngineError> {
    let frame = state
        .call_stack
        .pop()
        .ok_or_else(|| EngineError::NoActiveFrame {
            pc: state.pc.clone(),
        })?;

    for l1 in &frame.locals {
        state.value_set.kill(l1);
        state.propagation.remove(l1);
    }
    for (base, previous) in &frame.saved_level1 {
        match previous {
            Some(number) => {
                state.level1.insert(base.clone(), *number);
            }
            None => {
                state.level1.shift_remove(base);
            }
        }
    }
    Ok(frame)
}
