//! The `Other` statement family: I/O recording, allocation, variadic
//! bookkeeping, pointer/array association, and intrinsic pseudo-calls.
//!
//! String builtins (`concat`, `substring`, `empty`) constant-fold when
//! every input is a known character array; the folded result is
//! materialized as a fresh array object whose name is derived from its
//! contents, so re-running the analysis reproduces the same equation.

use gotosym_ir::{ConstValue, Expr, Ident, OtherStatement, SsaName, Symbol, Type};

use crate::clean::clean_read;
use crate::equation::{AssignmentKind, SsaStep};
use crate::error::EngineError;
use crate::state::ExecState;

use super::assign::{assign_to_symbol, havoc, symex_assign};
use super::{Executor, FunctionSource};

pub(crate) fn symex_other<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    other: &OtherStatement,
) -> Result<(), EngineError> {
    if state.guard.is_false() {
        return Ok(());
    }
    match other {
        OtherStatement::Input { args } => {
            let cleaned = clean_args(exec, state, args)?;
            exec.equation.append(SsaStep::Input {
                guard: state.guard.as_expr(),
                args: cleaned,
                source: state.source.clone(),
            });
            Ok(())
        }

        OtherStatement::Output { args } => {
            let cleaned = clean_args(exec, state, args)?;
            exec.equation.append(SsaStep::Output {
                guard: state.guard.as_expr(),
                args: cleaned,
                source: state.source.clone(),
            });
            Ok(())
        }

        // No semantic effect; the values still show up as an output record
        // for trace reconstruction.
        OtherStatement::Printf { args } => {
            let cleaned = clean_args(exec, state, args)?;
            tracing::debug!(pc = %state.pc, "printf");
            exec.equation.append(SsaStep::Output {
                guard: state.guard.as_expr(),
                args: cleaned,
                source: state.source.clone(),
            });
            Ok(())
        }

        OtherStatement::Trace { event, args } => {
            let cleaned = clean_args(exec, state, args)?;
            tracing::debug!(pc = %state.pc, event, "trace");
            exec.equation.append(SsaStep::Output {
                guard: state.guard.as_expr(),
                args: cleaned,
                source: state.source.clone(),
            });
            Ok(())
        }

        OtherStatement::Allocate { lhs, size } => symex_allocate(exec, state, lhs, size),

        OtherStatement::VaStart { lhs } => havoc(exec, state, lhs),

        OtherStatement::ArrayAssociate { pointer, array } => {
            let pointer_l1 = state.rename_l1(pointer);
            let array_l1 = state.rename_l1(array);
            let name = pointer_l1
                .as_symbol()
                .map(|n| n.l1_ident())
                .ok_or_else(|| EngineError::Unsupported {
                    pc: state.pc.clone(),
                    what: "array association with a non-symbol pointer".into(),
                })?;
            state.value_set.assign(name, &Expr::address_of(array_l1));
            Ok(())
        }

        OtherStatement::Intrinsic { name, lhs, args } => {
            symex_intrinsic(exec, state, name, lhs.as_ref(), args)
        }
    }
}

/// Fresh-object allocation: the left-hand side receives the address of a
/// new object registered in the inner symbol table and the pointer store.
fn symex_allocate<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    lhs: &Expr,
    size: &Expr,
) -> Result<(), EngineError> {
    let cleaned_size = clean_read(state, &mut exec.equation, &exec.config, size)?;
    state.kill_instruction_locals(&cleaned_size.instruction_locals);

    let object_ty = match lhs.ty().pointee() {
        Some(ty) => ty.clone(),
        None => Type::Array {
            element: Box::new(Type::unsigned(8)),
            size: cleaned_size
                .expr
                .as_constant()
                .and_then(ConstValue::integer)
                .map(|n| n as u64),
        },
    };

    let base = state.fresh_name("heap");
    let _ = state
        .inner_symbols
        .insert(Symbol::global(base.clone(), object_ty.clone()));
    // Heap objects are reachable from every thread.
    state.add_shared(base.clone());

    tracing::debug!(object = %base, "allocation");
    let object = Expr::symbol(SsaName::new(base), object_ty);
    symex_assign(
        exec,
        state,
        lhs,
        &Expr::address_of(object),
        AssignmentKind::State,
    )
}

fn symex_intrinsic<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    name: &Ident,
    lhs: Option<&Expr>,
    args: &[Expr],
) -> Result<(), EngineError> {
    let cleaned = clean_args(exec, state, args)?;
    let strings: Vec<Option<&str>> = cleaned
        .iter()
        .map(|e| match e.as_constant() {
            Some(ConstValue::String(s)) => Some(s.as_str()),
            _ => None,
        })
        .collect();

    match name.as_str() {
        "concat" => {
            if let [Some(a), Some(b)] = strings.as_slice() {
                let folded = format!("{a}{b}");
                return materialize_string(exec, state, &folded, lhs);
            }
        }
        "substring" => {
            if let (Some(Some(s)), Some(start), Some(end)) = (
                strings.first(),
                constant_index(cleaned.get(1)),
                constant_index(cleaned.get(2)),
            ) {
                if start <= end && end <= s.len() {
                    return materialize_string(exec, state, &s[start..end], lhs);
                }
            }
        }
        "empty" => {
            if let Some(Some(s)) = strings.first() {
                if let Some(lhs) = lhs {
                    return symex_assign(
                        exec,
                        state,
                        lhs,
                        &Expr::bool_const(s.is_empty()),
                        AssignmentKind::State,
                    );
                }
                return Ok(());
            }
        }
        _ => {
            tracing::debug!(intrinsic = %name, "unmodeled intrinsic");
        }
    }

    // Not foldable (or unknown): the result is unconstrained.
    if let Some(lhs) = lhs {
        havoc(exec, state, lhs)?;
    }
    Ok(())
}

fn constant_index(expr: Option<&Expr>) -> Option<usize> {
    expr?
        .as_constant()
        .and_then(ConstValue::integer)
        .and_then(|n| usize::try_from(n).ok())
}

/// Materializes a folded string constant: a content-named array object with
/// its length/data pair assigned, and the caller's left-hand side pointed
/// at it.
fn materialize_string<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    contents: &str,
    lhs: Option<&Expr>,
) -> Result<(), EngineError> {
    let digest = blake3::hash(contents.as_bytes());
    let base = Ident::from(format!("string${}", &digest.to_hex().as_str()[..16]));
    let array_ty = Type::array(Type::unsigned(8), contents.len() as u64);

    // First materialization wins; the content hash makes repeats identical.
    if !state.inner_symbols.contains(&base) {
        let _ = state.inner_symbols.insert(
            Symbol::global(base.clone(), array_ty.clone()).with_value(Expr::constant(
                ConstValue::String(contents.to_owned()),
                array_ty.clone(),
            )),
        );
        state.add_shared(base.clone());

        let data_name = SsaName::new(base.clone());
        assign_to_symbol(
            exec,
            state,
            &data_name,
            &array_ty,
            Expr::constant(ConstValue::String(contents.to_owned()), array_ty.clone()),
            AssignmentKind::Hidden,
        )?;

        let length_base = Ident::from(format!("{base}$length"));
        let length_ty = Type::unsigned(64);
        let _ = state
            .inner_symbols
            .insert(Symbol::global(length_base.clone(), length_ty.clone()));
        state.add_shared(length_base.clone());
        assign_to_symbol(
            exec,
            state,
            &SsaName::new(length_base),
            &length_ty,
            Expr::int(contents.len() as i128, length_ty.clone()),
            AssignmentKind::Hidden,
        )?;
    }

    if let Some(lhs) = lhs {
        let object = Expr::symbol(SsaName::new(base), array_ty);
        symex_assign(
            exec,
            state,
            lhs,
            &Expr::address_of(object),
            AssignmentKind::State,
        )?;
    }
    Ok(())
}

fn clean_args<S: FunctionSource>(
    exec: &mut Executor<'_, S>,
    state: &mut ExecState,
    args: &[Expr],
) -> Result<Vec<Expr>, EngineError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        let cleaned = clean_read(state, &mut exec.equation, &exec.config, arg)?;
        state.kill_instruction_locals(&cleaned.instruction_locals);
        out.push(cleaned.expr);
    }
    Ok(out)
}
