//! Path-condition guards.
//!
//! A [`Guard`] is the conjunction of the branch conditions taken to reach
//! the current point, stored as an ordered list of level-2 conjuncts rather
//! than one nested expression: appending is O(1), the common-prefix
//! structure survives across forks, and merges can factor the shared prefix
//! out of the disjunction instead of rebuilding the full conjunction.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use gotosym_ir::{Expr, ExprKind};

/// A conjunction of boolean conditions. `true` is the empty guard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    conjuncts: SmallVec<[Expr; 4]>,
}

impl Guard {
    /// The trivially true guard.
    pub fn always_true() -> Self {
        Guard::default()
    }

    pub fn is_true(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn is_false(&self) -> bool {
        self.conjuncts.iter().any(Expr::is_false)
    }

    /// Appends a condition. Trivially true conditions and exact duplicates
    /// are dropped; `false` collapses the guard.
    pub fn add(&mut self, cond: Expr) {
        if cond.is_true() || self.is_false() {
            return;
        }
        if cond.is_false() {
            self.conjuncts.clear();
            self.conjuncts.push(Expr::bool_false());
            return;
        }
        // Split conjunctions so the prefix structure stays flat.
        if let ExprKind::Binary {
            op: gotosym_ir::BinaryOp::And,
            lhs,
            rhs,
        } = cond.kind()
        {
            let (lhs, rhs) = (lhs.clone(), rhs.clone());
            self.add(lhs);
            self.add(rhs);
            return;
        }
        if !self.conjuncts.contains(&cond) {
            self.conjuncts.push(cond);
        }
    }

    /// A copy of this guard with `cond` appended.
    pub fn and_cond(&self, cond: Expr) -> Guard {
        let mut out = self.clone();
        out.add(cond);
        out
    }

    /// The guard as a single conjunction expression.
    pub fn as_expr(&self) -> Expr {
        self.conjuncts
            .iter()
            .cloned()
            .fold(Expr::bool_true(), Expr::and)
    }

    /// Materializes `guard -> cond` as one expression.
    pub fn implies(&self, cond: Expr) -> Expr {
        Expr::implies(self.as_expr(), cond)
    }

    /// Number of conjuncts.
    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// The disjunction of two guards, factoring out their common prefix.
    ///
    /// `(p ∧ a) ∨ (p ∧ ¬a)` collapses to `p`, which is the shape every
    /// two-way branch merge produces; everything else keeps the prefix and
    /// appends a single disjunction conjunct.
    pub fn disjunction(&self, other: &Guard) -> Guard {
        if self.is_false() {
            return other.clone();
        }
        if other.is_false() {
            return self.clone();
        }
        if self.is_true() || other.is_true() {
            return Guard::always_true();
        }

        let shared = self
            .conjuncts
            .iter()
            .zip(other.conjuncts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut out = Guard {
            conjuncts: self.conjuncts[..shared].iter().cloned().collect(),
        };

        let rest_a = &self.conjuncts[shared..];
        let rest_b = &other.conjuncts[shared..];

        // One side exhausted: the other is strictly stronger, prefix wins.
        if rest_a.is_empty() || rest_b.is_empty() {
            return out;
        }

        // Complementary single conditions cancel.
        if rest_a.len() == 1 && rest_b.len() == 1 && complementary(&rest_a[0], &rest_b[0]) {
            return out;
        }

        let conj = |rest: &[Expr]| {
            rest.iter()
                .cloned()
                .fold(Expr::bool_true(), Expr::and)
        };
        out.add(Expr::or(conj(rest_a), conj(rest_b)));
        out
    }
}

/// Returns `true` if `a` is the negation of `b` or vice versa.
fn complementary(a: &Expr, b: &Expr) -> bool {
    let negated = |x: &Expr, y: &Expr| match x.kind() {
        ExprKind::Unary {
            op: gotosym_ir::UnaryOp::Not,
            operand,
        } => operand == y,
        _ => false,
    };
    negated(a, b) || negated(b, a)
}
