//! Assignment handling.
//!
//! The left-hand side is dissected into a base symbol plus a selector
//! chain: element and field writes become functional updates of the whole
//! container, dereference writes become one conditionally guarded
//! assignment per candidate target, and casts are pushed onto the value.
//! Each reached base symbol gets a fresh SSA version and one equation step.

use gotosym_ir::{simplify, Designator, Expr, ExprKind, SideEffect, SsaName, Symbol, Type};

use crate::clean::{clean_read, validate_l2};
use crate::equation::{AssignmentKind, SsaStep};
use crate::error::EngineError;
use crate::state::ExecState;
use crate::value_set::PointerTarget;

use super::{Executor, FunctionSource};

/// Interprets `lhs := rhs` under the current guard.
pub(crate) fn symex_assign<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    lhs: &Expr,
    rhs: &Expr,
    kind: AssignmentKind,
) -> Result<(), EngineError> {
    if lhs.is_nil() {
        return Err(EngineError::NilExpression {
            pc: state.pc.clone(),
        });
    }
    // A dead walker only exists to reach parked merge contributors; its
    // writes are unobservable and stay out of the equation.
    if state.guard.is_false() {
        return Ok(());
    }
    // Embedded assignments, calls, and throws must have been lowered by the
    // front end; only nondet is legal here (and handled by cleaning).
    if let ExprKind::SideEffect(effect) = rhs.kind() {
        if !matches!(effect, SideEffect::Nondet) {
            return Err(EngineError::Unsupported {
                pc: state.pc.clone(),
                what: "unlowered side effect on assignment right-hand side".into(),
            });
        }
    }

    let cleaned = clean_read(state, &mut exec.equation, &exec.config, rhs)?;
    emit_shared_reads(exec, state, &cleaned.expr);
    assign_rec(exec, state, lhs, cleaned.expr, kind)?;
    state.kill_instruction_locals(&cleaned.instruction_locals);
    Ok(())
}

/// Assigns a nondeterministic value to `lhs` (missing bodies, variadic
/// bookkeeping, unmodeled intrinsics).
pub(crate) fn havoc<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    lhs: &Expr,
) -> Result<(), EngineError> {
    symex_assign(
        exec,
        state,
        lhs,
        &Expr::nondet(lhs.ty().clone()),
        AssignmentKind::Hidden,
    )
}

fn assign_rec<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    lhs: &Expr,
    rhs: Expr,
    kind: AssignmentKind,
) -> Result<(), EngineError> {
    match lhs.kind() {
        ExprKind::Symbol { .. } => {
            let l1 = state.rename_l1(lhs);
            let name = l1.as_symbol().cloned().ok_or_else(|| {
                EngineError::InvariantViolation {
                    reason: "level-1 renaming changed a symbol's kind".into(),
                }
            })?;
            assign_to_symbol(exec, state, &name, lhs.ty(), rhs, kind)
        }

        // a[i] := v  becomes  a := (a with [i] := v)
        ExprKind::Index { array, index } => {
            let cleaned_index = clean_read(state, &mut exec.equation, &exec.config, index)?;
            let current = clean_read(state, &mut exec.equation, &exec.config, array)?;
            let updated = Expr::update(current.expr, Designator::Index(cleaned_index.expr), rhs);
            state.kill_instruction_locals(&cleaned_index.instruction_locals);
            state.kill_instruction_locals(&current.instruction_locals);
            assign_rec(exec, state, array, updated, kind)
        }

        // s.f := v  becomes  s := (s with .f := v)
        ExprKind::Member { compound, field } => {
            let current = clean_read(state, &mut exec.equation, &exec.config, compound)?;
            let updated = Expr::update(current.expr, Designator::Member(field.clone()), rhs);
            state.kill_instruction_locals(&current.instruction_locals);
            assign_rec(exec, state, compound, updated, kind)
        }

        // byte_extract(c, o) := v  becomes  c := (c with byte[o] := v)
        ExprKind::ByteExtract { container, offset } => {
            let cleaned_offset = clean_read(state, &mut exec.equation, &exec.config, offset)?;
            let current = clean_read(state, &mut exec.equation, &exec.config, container)?;
            let updated = Expr::update(current.expr, Designator::Byte(cleaned_offset.expr), rhs);
            state.kill_instruction_locals(&cleaned_offset.instruction_locals);
            state.kill_instruction_locals(&current.instruction_locals);
            assign_rec(exec, state, container, updated, kind)
        }

        // (T)x := v  assigns the value converted back to x's type.
        ExprKind::Cast { operand } => {
            let converted = Expr::cast(rhs, operand.ty().clone());
            assign_rec(exec, state, operand, converted, kind)
        }

        // *p := v  becomes one guarded assignment per candidate target.
        ExprKind::Dereference { pointer } => assign_through_pointer(exec, state, pointer, rhs, kind),

        ExprKind::Nil => Err(EngineError::NilExpression {
            pc: state.pc.clone(),
        }),

        _ => Err(EngineError::Unsupported {
            pc: state.pc.clone(),
            what: format!("assignment to {lhs}"),
        }),
    }
}

/// The base case: one symbol gets a fresh version and one equation step.
pub(crate) fn assign_to_symbol<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    name: &SsaName,
    ty: &Type,
    rhs: Expr,
    kind: AssignmentKind,
) -> Result<(), EngineError> {
    let l1_ident = name.l1_ident();
    let previous = state.level2.current_version(&l1_ident);
    let lhs_name = state.assignment_lhs(name, ty);
    let lhs_l2 = Expr::symbol(lhs_name.clone(), ty.clone());

    if exec.config.run_validation_checks {
        validate_l2(state, &rhs)?;
        if lhs_name.version != Some(previous + 1) {
            return Err(EngineError::InvariantViolation {
                reason: format!(
                    "assignment to '{l1_ident}' skipped from version {previous} to {:?}",
                    lhs_name.version
                ),
            });
        }
    }

    if exec.config.debug_level >= 1 {
        tracing::debug!(lhs = %lhs_l2, "assign");
    }

    exec.equation.append(SsaStep::Assignment {
        guard: state.guard.as_expr(),
        lhs: lhs_l2.clone(),
        rhs: rhs.clone(),
        kind,
        source: state.source.clone(),
    });

    // Constant propagation follows the store: a constant binds, anything
    // else invalidates.
    if exec.config.constant_propagation && rhs.as_constant().is_some() {
        state.propagation.bind(l1_ident.clone(), rhs.clone());
    } else {
        state.propagation.remove(&l1_ident);
    }

    if ty.is_pointer() {
        state.value_set.assign(l1_ident, &rhs);
    }

    if state.emits_interleaving_markers() && state.is_shared(&name.base) {
        exec.equation.append(SsaStep::SharedWrite {
            guard: state.guard.as_expr(),
            symbol: lhs_l2,
            source: state.source.clone(),
        });
    }

    Ok(())
}

/// Writes through a pointer: each candidate object `o` is assigned
/// `if p == &o then rhs else o`, and an empty or incomplete target set
/// raises a validity obligation (plus a failure object to absorb the
/// write).
fn assign_through_pointer<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    pointer: &Expr,
    rhs: Expr,
    kind: AssignmentKind,
) -> Result<(), EngineError> {
    let pointer_l1 = state.rename_l1(pointer);
    let mut pointer_l2 = state.rename_l2(&pointer_l1, &exec.config);
    if exec.config.simplify_opt {
        pointer_l2 = simplify(&pointer_l2);
    }

    let targets = state.value_set.read(&pointer_l1);
    let mut objects = Vec::new();
    let mut covered = true;
    for target in &targets {
        match target {
            PointerTarget::Object(obj) => objects.push(obj.clone()),
            PointerTarget::Null | PointerTarget::Failed(_) | PointerTarget::Unknown => {
                covered = false
            }
        }
    }
    if objects.is_empty() {
        covered = false;
    }

    if !covered && !exec.config.allow_pointer_unsoundness {
        let valid = objects.iter().fold(Expr::bool_false(), |acc, obj| {
            Expr::or(
                acc,
                Expr::eq_(pointer_l2.clone(), Expr::address_of(obj.clone())),
            )
        });
        let property = state.fresh_name("pointer_dereference");
        exec.equation.append(SsaStep::Assert {
            guard: state.guard.as_expr(),
            cond: valid,
            msg: "dereference failure: pointer invalid".into(),
            property,
            source: state.source.clone(),
        });
    }

    if objects.is_empty() {
        // Nothing known to write to: absorb into a failure object so the
        // rest of the path stays consistent.
        let base = state.fresh_name("deref_failed");
        let _ = state
            .inner_symbols
            .insert(Symbol::local(base.clone(), rhs.ty().clone()));
        let failed = state.rename_l1(&Expr::symbol(SsaName::new(base), rhs.ty().clone()));
        return assign_rec(exec, state, &failed, rhs, kind);
    }

    let single = objects.len() == 1 && covered;
    for obj in objects {
        let value = if single {
            // Exactly one possible target: the write is unconditional.
            rhs.clone()
        } else {
            let current = state.rename_l2(&obj, &exec.config);
            let cond = Expr::eq_(pointer_l2.clone(), Expr::address_of(obj.clone()));
            let mut value = Expr::ite(cond, rhs.clone(), current);
            if exec.config.simplify_opt {
                value = simplify(&value);
            }
            value
        };
        assign_rec(exec, state, &obj, value, kind)?;
    }
    Ok(())
}

/// Emits one shared-read marker per distinct shared symbol of `expr`.
fn emit_shared_reads<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &ExecState,
    expr: &Expr,
) {
    if !state.emits_interleaving_markers() {
        return;
    }
    let mut shared = Vec::new();
    expr.visit(&mut |e| {
        if let ExprKind::Symbol { name } = e.kind() {
            if state.is_shared(&name.base) && !shared.contains(e) {
                shared.push(e.clone());
            }
        }
    });
    for symbol in shared {
        exec.equation.append(SsaStep::SharedRead {
            guard: state.guard.as_expr(),
            symbol,
            source: state.source.clone(),
        });
    }
}
