//! Engine configuration.
//!
//! [`SymexConfig`] collects every knob the interpreter consults: bounds,
//! path-exploration mode, soundness relaxations, and diagnostics. The
//! default is full-unwind single-path mode with constant propagation and
//! on-the-fly simplification enabled.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use gotosym_ir::Ident;

/// Configuration for one symbolic execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymexConfig {
    /// Hard cap on interpreted steps per path; `0` means unlimited. A path
    /// hitting the cap is truncated with an `assume(false)`.
    pub max_depth: u64,

    /// Fork at branches instead of merging, pausing after each fork so the
    /// caller can schedule stored paths.
    pub doing_path_exploration: bool,

    /// Suppress the validity assertion emitted for dereferences whose
    /// target set is empty or incomplete.
    pub allow_pointer_unsoundness: bool,

    /// Rewrite level-2 reads through the constant-propagation map.
    pub constant_propagation: bool,

    /// Replace back-edges with `assume(false)` once the unwind bound is
    /// reached, even when `partial_loops` would otherwise continue.
    pub self_loops_to_assumptions: bool,

    /// Run the simplifier on every renamed expression.
    pub simplify_opt: bool,

    /// Emit an assertion (rather than an assumption) when an unwind or
    /// recursion bound is breached.
    pub unwinding_assertions: bool,

    /// Allow execution to continue past the unwind bound without the
    /// truncating assumption. Unsound; useful for bug hunting.
    pub partial_loops: bool,

    /// Extra invariant checks on every renaming and assignment. Failures
    /// abort the analysis.
    pub run_validation_checks: bool,

    /// Emit a `tracing` event for every interpreted instruction.
    pub show_symex_steps: bool,

    /// Verbosity of diagnostic events: `0` quiet, `1` debug, `2+` trace.
    pub debug_level: u8,

    /// Default unwind bound for every loop; `None` = unbounded.
    pub unwind_limit: Option<u64>,

    /// Per-loop unwind bounds keyed by `"function.target-index"`,
    /// overriding the default.
    pub loop_unwind_limits: IndexMap<String, u64>,

    /// Default recursion bound (nested re-entries per function);
    /// `None` = unbounded.
    pub recursion_limit: Option<u64>,

    /// Per-function recursion bounds, overriding the default.
    pub function_recursion_limits: IndexMap<String, u64>,
}

impl Default for SymexConfig {
    fn default() -> Self {
        SymexConfig {
            max_depth: 0,
            doing_path_exploration: false,
            allow_pointer_unsoundness: false,
            constant_propagation: true,
            self_loops_to_assumptions: false,
            simplify_opt: true,
            unwinding_assertions: false,
            partial_loops: false,
            run_validation_checks: false,
            show_symex_steps: false,
            debug_level: 0,
            unwind_limit: None,
            loop_unwind_limits: IndexMap::new(),
            recursion_limit: None,
            function_recursion_limits: IndexMap::new(),
        }
    }
}

impl SymexConfig {
    /// The unwind bound for the loop whose back-edge targets `target` in
    /// `function`, or `None` if unbounded.
    pub fn unwind_limit_for(&self, function: &Ident, target: usize) -> Option<u64> {
        let key = format!("{function}.{target}");
        self.loop_unwind_limits
            .get(&key)
            .copied()
            .or(self.unwind_limit)
    }

    /// The recursion bound for `function`, or `None` if unbounded.
    pub fn recursion_limit_for(&self, function: &Ident) -> Option<u64> {
        self.function_recursion_limits
            .get(function.as_str())
            .copied()
            .or(self.recursion_limit)
    }

    /// Sets the bound for one specific loop.
    pub fn set_loop_unwind_limit(&mut self, function: &Ident, target: usize, bound: u64) {
        self.loop_unwind_limits
            .insert(format!("{function}.{target}"), bound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_full_unwind_single_path() {
        let c = SymexConfig::default();
        assert_eq!(c.max_depth, 0);
        assert!(!c.doing_path_exploration);
        assert!(c.constant_propagation);
        assert!(c.simplify_opt);
        assert_eq!(c.unwind_limit, None);
    }

    #[test]
    fn per_loop_limit_overrides_default() {
        let mut c = SymexConfig {
            unwind_limit: Some(10),
            ..SymexConfig::default()
        };
        let f = Ident::new("main");
        c.set_loop_unwind_limit(&f, 3, 2);
        assert_eq!(c.unwind_limit_for(&f, 3), Some(2));
        assert_eq!(c.unwind_limit_for(&f, 7), Some(10));
        assert_eq!(c.unwind_limit_for(&Ident::new("other"), 3), Some(10));
    }

    #[test]
    fn per_function_recursion_limit_overrides_default() {
        let mut c = SymexConfig::default();
        c.function_recursion_limits.insert("fib".into(), 4);
        assert_eq!(c.recursion_limit_for(&Ident::new("fib")), Some(4));
        assert_eq!(c.recursion_limit_for(&Ident::new("main")), None);
    }

    #[test]
    fn serde_roundtrip() {
        let c = SymexConfig {
            max_depth: 100,
            unwinding_assertions: true,
            ..SymexConfig::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: SymexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_depth, 100);
        assert!(back.unwinding_assertions);
    }
}
