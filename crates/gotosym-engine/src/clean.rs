//! Expression preparation: the read-side cleaning pipeline.
//!
//! Every expression entering the interpreter is put through five stages
//! before it may reach the equation:
//!
//! 1. nondet side effects become fresh unconstrained symbols; any other
//!    side effect at a read position is rejected,
//! 2. let bindings are lifted into auxiliary hidden assignments,
//! 3. symbols are renamed to level 1,
//! 4. dereferences are rewritten into guarded selection ladders over the
//!    pointer's candidate targets,
//! 5. symbols are renamed to level 2 and the result is simplified.
//!
//! Auxiliary names created by stage 2 are instruction-local: the caller
//! kills them once the instruction completes.

use gotosym_ir::{
    simplify, Expr, ExprKind, Ident, SideEffect, SsaName, Symbol, Type,
};

use crate::config::SymexConfig;
use crate::equation::{AssignmentKind, Equation, SsaStep};
use crate::error::EngineError;
use crate::state::ExecState;
use crate::value_set::PointerTarget;

/// A fully cleaned read expression plus the auxiliary names to kill at the
/// end of the current instruction.
#[derive(Debug)]
pub(crate) struct CleanedRead {
    pub expr: Expr,
    pub instruction_locals: Vec<Ident>,
}

/// Runs the full cleaning pipeline on a read expression.
pub(crate) fn clean_read(
    state: &mut ExecState,
    equation: &mut Equation,
    config: &SymexConfig,
    expr: &Expr,
) -> Result<CleanedRead, EngineError> {
    if expr.is_nil() {
        return Err(EngineError::NilExpression {
            pc: state.pc.clone(),
        });
    }

    let mut instruction_locals = Vec::new();
    let no_nondet = replace_nondets(state, expr)?;
    let lifted = lift_lets(state, equation, config, &no_nondet, &mut instruction_locals)?;
    let l1 = state.rename_l1(&lifted);
    let deref_free = remove_dereferences(state, equation, config, &l1)?;
    let l2 = state.rename_l2(&deref_free, config);
    let cleaned = if config.simplify_opt {
        simplify(&l2)
    } else {
        l2
    };

    if config.run_validation_checks {
        validate_l2(state, &cleaned)?;
    }

    Ok(CleanedRead {
        expr: cleaned,
        instruction_locals,
    })
}

/// Checks that every symbol of a cleaned expression carries a version.
pub(crate) fn validate_l2(state: &ExecState, expr: &Expr) -> Result<(), EngineError> {
    let mut bad = None;
    expr.for_each_symbol(&mut |name| {
        if !name.is_l2_renamed() && bad.is_none() {
            bad = Some(name.clone());
        }
    });
    match bad {
        Some(name) => Err(EngineError::InvariantViolation {
            reason: format!(
                "symbol '{name}' escaped level-2 renaming at {pc}",
                pc = state.pc
            ),
        }),
        None => Ok(()),
    }
}

/// Replaces every nondet side effect with a fresh unconstrained symbol and
/// rejects any other side effect at a read position.
fn replace_nondets(state: &mut ExecState, expr: &Expr) -> Result<Expr, EngineError> {
    if !expr.has_side_effect() {
        return Ok(expr.clone());
    }
    match expr.kind() {
        ExprKind::SideEffect(SideEffect::Nondet) => Ok(fresh_nondet(state, expr.ty())),
        ExprKind::SideEffect(_) => Err(EngineError::Unsupported {
            pc: state.pc.clone(),
            what: "side effect in read position".into(),
        }),
        _ => map_children(expr, &mut |child| replace_nondets(state, child)),
    }
}

/// Creates the fresh symbol standing for one nondeterministic value. No
/// constraint is emitted; an unconstrained SSA symbol is nondet downstream.
pub(crate) fn fresh_nondet(state: &mut ExecState, ty: &Type) -> Expr {
    let base = state.fresh_name("nondet");
    let _ = state
        .inner_symbols
        .insert(Symbol::local(base.clone(), ty.clone()));
    Expr::symbol(SsaName::new(base), ty.clone())
}

/// Lifts every let binding into a hidden auxiliary assignment, replacing
/// bound occurrences with the assigned level-2 name.
fn lift_lets(
    state: &mut ExecState,
    equation: &mut Equation,
    config: &SymexConfig,
    expr: &Expr,
    instruction_locals: &mut Vec<Ident>,
) -> Result<Expr, EngineError> {
    if !expr.has_let() {
        return Ok(expr.clone());
    }
    if let ExprKind::Let {
        binding,
        value,
        body,
    } = expr.kind()
    {
        // The bound value goes through the full pipeline itself.
        let cleaned_value = clean_read(state, equation, config, value)?;
        instruction_locals.extend(cleaned_value.instruction_locals);

        let aux_base = state.fresh_name("let");
        let _ = state
            .inner_symbols
            .insert(Symbol::local(aux_base.clone(), value.ty().clone()));
        let aux_l1 = state
            .rename_l1(&Expr::symbol(SsaName::new(aux_base), value.ty().clone()));
        let aux_name = aux_l1.as_symbol().cloned().ok_or_else(|| {
            EngineError::InvariantViolation {
                reason: "auxiliary let symbol did not rename to a symbol".into(),
            }
        })?;
        let aux_l2_name = state.assignment_lhs(&aux_name, value.ty());
        let aux_l2 = Expr::symbol(aux_l2_name, value.ty().clone());

        equation.append(SsaStep::Assignment {
            guard: state.guard.as_expr(),
            lhs: aux_l2.clone(),
            rhs: cleaned_value.expr,
            kind: AssignmentKind::Hidden,
            source: state.source.clone(),
        });
        instruction_locals.push(aux_name.l1_ident());

        let bound_symbol = Expr::symbol(binding.clone(), value.ty().clone());
        let substituted = body.substitute(&bound_symbol, &aux_l2);
        return lift_lets(state, equation, config, &substituted, instruction_locals);
    }
    map_children(expr, &mut |child| {
        lift_lets(state, equation, config, child, instruction_locals)
    })
}

/// Rewrites every dereference into a selection ladder over the pointer's
/// candidate targets, emitting a validity assertion when the target set
/// does not cover the pointer.
fn remove_dereferences(
    state: &mut ExecState,
    equation: &mut Equation,
    config: &SymexConfig,
    expr: &Expr,
) -> Result<Expr, EngineError> {
    if !expr.has_dereference() {
        return Ok(expr.clone());
    }
    if let ExprKind::Dereference { pointer } = expr.kind() {
        let pointer = remove_dereferences(state, equation, config, pointer)?;
        return build_deref_ladder(state, equation, config, &pointer, expr.ty());
    }
    map_children(expr, &mut |child| {
        remove_dereferences(state, equation, config, child)
    })
}

/// The guarded selection ladder for one dereference, in level-1 form.
pub(crate) fn build_deref_ladder(
    state: &mut ExecState,
    equation: &mut Equation,
    config: &SymexConfig,
    pointer: &Expr,
    value_ty: &Type,
) -> Result<Expr, EngineError> {
    let targets = state.value_set.read(pointer);

    let mut objects = Vec::new();
    let mut covered = true;
    for target in &targets {
        match target {
            PointerTarget::Object(obj) => objects.push(obj.clone()),
            PointerTarget::Null | PointerTarget::Failed(_) | PointerTarget::Unknown => {
                covered = false;
            }
        }
    }
    if objects.is_empty() {
        covered = false;
    }

    if !covered && !config.allow_pointer_unsoundness {
        // The pointer may miss every known object; oblige the solver to
        // check it actually hits one.
        let valid = objects.iter().fold(Expr::bool_false(), |acc, obj| {
            Expr::or(
                acc,
                Expr::eq_(pointer.clone(), Expr::address_of(obj.clone())),
            )
        });
        let mut valid_l2 = state.rename_l2(&valid, config);
        if config.simplify_opt {
            valid_l2 = simplify(&valid_l2);
        }
        let property = state.fresh_name("pointer_dereference");
        equation.append(SsaStep::Assert {
            guard: state.guard.as_expr(),
            cond: valid_l2,
            msg: "dereference failure: pointer invalid".into(),
            property,
            source: state.source.clone(),
        });
    }

    // Ladder tail: the last candidate when the set covers the pointer,
    // the failure object otherwise.
    let tail = match (covered, objects.pop()) {
        (true, Some(last)) => {
            // The final candidate needs no own comparison.
            last
        }
        (_, popped) => {
            if let Some(last) = popped {
                objects.push(last);
            }
            let base = state.fresh_name("deref_failed");
            let _ = state
                .inner_symbols
                .insert(Symbol::local(base.clone(), value_ty.clone()));
            state.rename_l1(&Expr::symbol(SsaName::new(base), value_ty.clone()))
        }
    };

    let ladder = objects.into_iter().rev().fold(tail, |acc, obj| {
        Expr::ite(
            Expr::eq_(pointer.clone(), Expr::address_of(obj.clone())),
            obj,
            acc,
        )
    });
    Ok(ladder)
}

/// Rebuilds an expression by applying a fallible transform to each direct
/// child.
fn map_children(
    expr: &Expr,
    f: &mut impl FnMut(&Expr) -> Result<Expr, EngineError>,
) -> Result<Expr, EngineError> {
    use gotosym_ir::Designator;
    let rebuild = |kind: ExprKind| Expr::new(kind, expr.ty().clone());
    Ok(match expr.kind() {
        ExprKind::Symbol { .. } | ExprKind::Constant(_) | ExprKind::Nil => expr.clone(),
        ExprKind::Binary { op, lhs, rhs } => rebuild(ExprKind::Binary {
            op: *op,
            lhs: f(lhs)?,
            rhs: f(rhs)?,
        }),
        ExprKind::Unary { op, operand } => rebuild(ExprKind::Unary {
            op: *op,
            operand: f(operand)?,
        }),
        ExprKind::IfThenElse {
            cond,
            true_value,
            false_value,
        } => rebuild(ExprKind::IfThenElse {
            cond: f(cond)?,
            true_value: f(true_value)?,
            false_value: f(false_value)?,
        }),
        ExprKind::Index { array, index } => rebuild(ExprKind::Index {
            array: f(array)?,
            index: f(index)?,
        }),
        ExprKind::Member { compound, field } => rebuild(ExprKind::Member {
            compound: f(compound)?,
            field: field.clone(),
        }),
        ExprKind::Dereference { pointer } => rebuild(ExprKind::Dereference {
            pointer: f(pointer)?,
        }),
        ExprKind::AddressOf { object } => rebuild(ExprKind::AddressOf { object: f(object)? }),
        ExprKind::Cast { operand } => rebuild(ExprKind::Cast { operand: f(operand)? }),
        ExprKind::ByteExtract { container, offset } => rebuild(ExprKind::ByteExtract {
            container: f(container)?,
            offset: f(offset)?,
        }),
        ExprKind::Update {
            compound,
            designator,
            value,
        } => rebuild(ExprKind::Update {
            compound: f(compound)?,
            designator: match designator {
                Designator::Index(e) => Designator::Index(f(e)?),
                Designator::Byte(e) => Designator::Byte(f(e)?),
                Designator::Member(m) => Designator::Member(m.clone()),
            },
            value: f(value)?,
        }),
        ExprKind::FunctionApp { function, args } => rebuild(ExprKind::FunctionApp {
            function: function.clone(),
            args: args.iter().map(&mut *f).collect::<Result<_, _>>()?,
        }),
        ExprKind::Let {
            binding,
            value,
            body,
        } => rebuild(ExprKind::Let {
            binding: binding.clone(),
            value: f(value)?,
            body: f(body)?,
        }),
        ExprKind::Quantifier {
            kind,
            variables,
            body,
        } => rebuild(ExprKind::Quantifier {
            kind: *kind,
            variables: variables.clone(),
            body: f(body)?,
        }),
        ExprKind::SideEffect(_) => expr.clone(),
    })
}
