//! Joining divergent states at control-flow merge points.
//!
//! Merging is pairwise: each pending contributor is folded into the state
//! that arrived at the join first. The merged guard is the disjunction of
//! both guards; every variable the two sides disagree on (different SSA
//! version or different propagated constant) gets a fresh version assigned
//! by a guarded phi selection, with the contributor's value under its guard
//! and the current value as the tie-breaker tail.

use gotosym_ir::{simplify, Expr};

use crate::config::SymexConfig;
use crate::equation::{AssignmentKind, Equation, SsaStep};
use crate::error::EngineError;
use crate::state::ExecState;

/// Folds `other` into `state`. Both must stand at the same program counter;
/// an unreachable contributor is dropped, an unreachable target is adopted.
pub(crate) fn merge_into(
    state: &mut ExecState,
    other: ExecState,
    equation: &mut Equation,
    config: &SymexConfig,
) -> Result<(), EngineError> {
    if !other.reachable || other.guard.is_false() {
        return Ok(());
    }
    if !state.reachable || state.guard.is_false() {
        *state = other;
        return Ok(());
    }
    if state.pc != other.pc {
        return Err(EngineError::InvariantViolation {
            reason: format!(
                "merging states at different program counters: {} vs {}",
                state.pc, other.pc
            ),
        });
    }
    if state.atomic_section != other.atomic_section {
        return Err(EngineError::InvariantViolation {
            reason: "merging states with different atomic nesting".into(),
        });
    }

    let merged_guard = state.guard.disjunction(&other.guard);
    let other_guard_expr = other.guard.as_expr();

    // Variables to phi: anything with diverging versions or diverging
    // constant bindings. Iterate the union of both level-2 maps in
    // insertion order so emission is deterministic.
    let mut names: Vec<gotosym_ir::Ident> = state.level2.iter().map(|(n, _)| n.clone()).collect();
    for (n, _) in other.level2.iter() {
        if !names.contains(n) {
            names.push(n.clone());
        }
    }

    for l1 in names {
        let version_here = state.level2.current_version(&l1);
        let version_there = other.level2.current_version(&l1);
        let constants_diverge = state.propagation.disagrees_on(&other.propagation, &l1);
        if version_here == version_there && !constants_diverge {
            continue;
        }

        let Some((name, ty)) = state
            .l1_info
            .get(&l1)
            .or_else(|| other.l1_info.get(&l1))
            .cloned()
        else {
            // A version entry without recorded identity is a generated
            // read-only symbol; both sides see the same value.
            continue;
        };

        let value_of = |s: &ExecState, version: u64| -> Expr {
            if config.constant_propagation {
                if let Some(constant) = s.propagation.get(&l1) {
                    return constant.clone();
                }
            }
            Expr::symbol(name.clone().with_version(version), ty.clone())
        };
        let value_here = value_of(state, version_here);
        let value_there = value_of(&other, version_there);

        // The shared generation counter guarantees the phi version exceeds
        // anything any branch has issued.
        let fresh = state.level2.increase(&l1);
        let lhs = Expr::symbol(name.clone().with_version(fresh), ty.clone());

        let mut rhs = Expr::ite(other_guard_expr.clone(), value_there, value_here);
        if config.simplify_opt {
            rhs = simplify(&rhs);
        }

        tracing::trace!(name = %l1, version = fresh, "phi at {}", state.pc);
        equation.append(SsaStep::Assignment {
            guard: merged_guard.as_expr(),
            lhs,
            rhs,
            kind: AssignmentKind::Phi,
            source: state.source.clone(),
        });
    }

    // Pointwise union of target sets.
    state.value_set.merge(&other.value_set);

    // A binding survives only when both sides agree.
    state.propagation.retain_agreeing(&other.propagation);

    // Unwind counters combine by maximum.
    for (key, count) in &other.loop_iterations {
        let entry = state.loop_iterations.entry(key.clone()).or_insert(0);
        *entry = (*entry).max(*count);
    }

    // Generated symbols of the contributor carry over.
    for symbol in other.inner_symbols.iter() {
        if !state.inner_symbols.contains(&symbol.name) {
            let _ = state.inner_symbols.insert(symbol.clone());
        }
    }

    state.depth = state.depth.max(other.depth);
    state.guard = merged_guard;
    Ok(())
}
