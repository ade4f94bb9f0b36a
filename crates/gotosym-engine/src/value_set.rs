//! The pointer store: which objects may each pointer target.
//!
//! A conservative, flow-sensitive map from level-1 pointer names to sets of
//! candidate targets. Dereferencing queries the set to build the guarded
//! selection ladder; branch conditions sharpen the sets; merges union them
//! pointwise. Objects are stored as version-free (level-1) symbol
//! expressions so that address equalities compare structurally across SSA
//! versions.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use gotosym_ir::{simplify, Expr, ExprKind, Ident};

/// One candidate target of a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerTarget {
    /// A known object, stored as its level-1 symbol expression.
    Object(Expr),
    /// The null pointer.
    Null,
    /// The designated failure object for an unresolvable dereference.
    Failed(Expr),
    /// Anything; the analysis lost track.
    Unknown,
}

impl PointerTarget {
    /// The address expression this target stands for, used when refining
    /// sets against a branch condition. `Unknown` has no address.
    pub fn address_expr(&self) -> Option<Expr> {
        match self {
            PointerTarget::Object(obj) | PointerTarget::Failed(obj) => {
                Some(Expr::address_of(obj.clone()))
            }
            PointerTarget::Null => Some(Expr::null(gotosym_ir::Type::pointer(
                gotosym_ir::Type::Empty,
            ))),
            PointerTarget::Unknown => None,
        }
    }
}

/// Map from level-1 pointer names to candidate target sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSet {
    map: IndexMap<Ident, IndexSet<PointerTarget>>,
}

impl ValueSet {
    pub fn new() -> Self {
        ValueSet::default()
    }

    /// Records a pointer assignment: `lhs` now targets whatever `rhs`
    /// evaluates to. `rhs` is expected in version-free (level-1) form.
    pub fn assign(&mut self, lhs: Ident, rhs: &Expr) {
        let targets = self.eval_pointer(rhs);
        self.map.insert(lhs, targets);
    }

    /// Candidate targets of a pointer expression (version-free form).
    pub fn read(&self, pointer: &Expr) -> IndexSet<PointerTarget> {
        self.eval_pointer(pointer)
    }

    /// Candidate targets for a pointer known only by name.
    pub fn read_name(&self, name: &Ident) -> IndexSet<PointerTarget> {
        self.map.get(name).cloned().unwrap_or_default()
    }

    fn eval_pointer(&self, expr: &Expr) -> IndexSet<PointerTarget> {
        let mut out = IndexSet::new();
        match expr.kind() {
            ExprKind::AddressOf { object } => {
                out.insert(PointerTarget::Object(object.clone()));
            }
            ExprKind::Constant(c) if matches!(c, gotosym_ir::ConstValue::Null) => {
                out.insert(PointerTarget::Null);
            }
            ExprKind::Symbol { name } => match self.map.get(&name.l1_ident()) {
                Some(targets) => out.extend(targets.iter().cloned()),
                None => {
                    out.insert(PointerTarget::Unknown);
                }
            },
            ExprKind::IfThenElse {
                true_value,
                false_value,
                ..
            } => {
                out.extend(self.eval_pointer(true_value));
                out.extend(self.eval_pointer(false_value));
            }
            ExprKind::Cast { operand } => {
                out.extend(self.eval_pointer(operand));
            }
            _ => {
                out.insert(PointerTarget::Unknown);
            }
        }
        out
    }

    /// Drops one candidate from a pointer's set.
    pub fn remove_target(&mut self, name: &Ident, target: &PointerTarget) {
        if let Some(targets) = self.map.get_mut(name) {
            targets.shift_remove(target);
        }
    }

    /// Refines the store against a branch condition known to hold:
    /// `p == q` sharpens both pointers to the intersection of their sets,
    /// `p == &o` pins the pointer to the one object. Anything else is left
    /// alone; skipping refinement is always sound.
    pub fn apply_condition(&mut self, cond: &Expr) {
        let ExprKind::Binary {
            op: gotosym_ir::BinaryOp::Eq,
            lhs,
            rhs,
        } = cond.kind()
        else {
            return;
        };
        if !lhs.ty().is_pointer() {
            return;
        }
        match (lhs.as_symbol(), rhs.as_symbol()) {
            (Some(p), Some(q)) => self.intersect(&p.l1_ident(), &q.l1_ident()),
            _ => {
                for (pointer, address) in [(lhs, rhs), (rhs, lhs)] {
                    let Some(p) = pointer.as_symbol() else { continue };
                    if let ExprKind::AddressOf { object } = address.kind() {
                        let mut pinned = IndexSet::new();
                        pinned.insert(PointerTarget::Object(object.clone()));
                        self.map.insert(p.l1_ident(), pinned);
                        break;
                    }
                }
            }
        }
    }

    /// Sharpens both pointers to the intersection of their sets, for a
    /// `p == q` branch.
    pub fn intersect(&mut self, p: &Ident, q: &Ident) {
        let (Some(ts_p), Some(ts_q)) = (self.map.get(p), self.map.get(q)) else {
            return;
        };
        let common: IndexSet<PointerTarget> =
            ts_p.intersection(ts_q).cloned().collect();
        self.map.insert(p.clone(), common.clone());
        self.map.insert(q.clone(), common);
    }

    /// Pointwise union with another store.
    pub fn merge(&mut self, other: &ValueSet) {
        for (name, targets) in &other.map {
            self.map
                .entry(name.clone())
                .or_default()
                .extend(targets.iter().cloned());
        }
    }

    /// Removes the pointer's own entry and every target referencing the
    /// named object, when a variable dies.
    pub fn kill(&mut self, name: &Ident) {
        self.map.shift_remove(name);
        for targets in self.map.values_mut() {
            targets.retain(|t| match t {
                PointerTarget::Object(obj) | PointerTarget::Failed(obj) => {
                    let mut references = false;
                    obj.for_each_symbol(&mut |sym| {
                        if &sym.l1_ident() == name {
                            references = true;
                        }
                    });
                    !references
                }
                _ => true,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Refines the taken/not-taken stores against a branch condition.
///
/// Looks for exactly one free pointer-typed symbol in `cond`; substituting
/// each of its candidate addresses, a candidate that makes the condition
/// unconditionally false cannot hold on the taken branch, and one that makes
/// it unconditionally true cannot hold on the not-taken branch. Skipping
/// this refinement is always sound; it only shrinks the ladders built later.
pub fn filter_by_condition(cond: &Expr, taken: &mut ValueSet, not_taken: &mut ValueSet) {
    // Collect the distinct pointer-typed symbols of the condition.
    let mut pointers: Vec<Expr> = Vec::new();
    cond.visit(&mut |e| {
        if matches!(e.kind(), ExprKind::Symbol { .. })
            && e.ty().is_pointer()
            && !pointers.contains(e)
        {
            pointers.push(e.clone());
        }
    });
    let [pointer] = pointers.as_slice() else {
        return;
    };
    let Some(name) = pointer.as_symbol().map(|n| n.l1_ident()) else {
        return;
    };

    for target in taken.read_name(&name) {
        let Some(address) = target.address_expr() else {
            continue;
        };
        let substituted = simplify(&cond.substitute(pointer, &address));
        if substituted.is_false() {
            taken.remove_target(&name, &target);
        } else if substituted.is_true() {
            not_taken.remove_target(&name, &target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotosym_ir::{BinaryOp, SsaName, ThreadId, Type};

    fn obj(name: &str) -> Expr {
        Expr::symbol(
            SsaName::new(name).with_thread(ThreadId(0)),
            Type::signed(32),
        )
    }

    fn ptr_name(name: &str) -> Ident {
        SsaName::new(name).with_thread(ThreadId(0)).l1_ident()
    }

    fn ptr_expr(name: &str) -> Expr {
        Expr::symbol(
            SsaName::new(name).with_thread(ThreadId(0)),
            Type::pointer(Type::signed(32)),
        )
    }

    #[test]
    fn address_of_assignment_yields_singleton() {
        let mut vs = ValueSet::new();
        vs.assign(ptr_name("p"), &Expr::address_of(obj("a")));
        let targets = vs.read_name(&ptr_name("p"));
        assert_eq!(targets.len(), 1);
        assert!(targets.contains(&PointerTarget::Object(obj("a"))));
    }

    #[test]
    fn ite_assignment_unions_both_arms() {
        let mut vs = ValueSet::new();
        let rhs = Expr::new(
            ExprKind::IfThenElse {
                cond: Expr::plain_symbol("c", Type::Bool),
                true_value: Expr::address_of(obj("a")),
                false_value: Expr::address_of(obj("b")),
            },
            Type::pointer(Type::signed(32)),
        );
        vs.assign(ptr_name("p"), &rhs);
        assert_eq!(vs.read_name(&ptr_name("p")).len(), 2);
    }

    #[test]
    fn pointer_copy_transfers_targets() {
        let mut vs = ValueSet::new();
        vs.assign(ptr_name("p"), &Expr::address_of(obj("a")));
        vs.assign(ptr_name("q"), &ptr_expr("p"));
        assert!(vs
            .read_name(&ptr_name("q"))
            .contains(&PointerTarget::Object(obj("a"))));
    }

    #[test]
    fn unknown_pointer_reads_as_unknown() {
        let vs = ValueSet::new();
        let targets = vs.read(&ptr_expr("p"));
        assert!(targets.contains(&PointerTarget::Unknown));
    }

    #[test]
    fn null_constant_reads_as_null() {
        let vs = ValueSet::new();
        let targets = vs.read(&Expr::null(Type::pointer(Type::signed(32))));
        assert!(targets.contains(&PointerTarget::Null));
    }

    #[test]
    fn intersect_sharpens_both_sides() {
        let mut vs = ValueSet::new();
        let two = Expr::new(
            ExprKind::IfThenElse {
                cond: Expr::plain_symbol("c", Type::Bool),
                true_value: Expr::address_of(obj("a")),
                false_value: Expr::address_of(obj("b")),
            },
            Type::pointer(Type::signed(32)),
        );
        vs.assign(ptr_name("p"), &two);
        vs.assign(ptr_name("q"), &Expr::address_of(obj("b")));
        vs.intersect(&ptr_name("p"), &ptr_name("q"));
        let targets = vs.read_name(&ptr_name("p"));
        assert_eq!(targets.len(), 1);
        assert!(targets.contains(&PointerTarget::Object(obj("b"))));
    }

    #[test]
    fn apply_condition_pins_pointer_to_compared_address() {
        let mut vs = ValueSet::new();
        let two = Expr::new(
            ExprKind::IfThenElse {
                cond: Expr::plain_symbol("c", Type::Bool),
                true_value: Expr::address_of(obj("a")),
                false_value: Expr::address_of(obj("b")),
            },
            Type::pointer(Type::signed(32)),
        );
        vs.assign(ptr_name("p"), &two);

        let cond = Expr::binary(
            BinaryOp::Eq,
            ptr_expr("p"),
            Expr::address_of(obj("a")),
            Type::Bool,
        );
        vs.apply_condition(&cond);
        let targets = vs.read_name(&ptr_name("p"));
        assert_eq!(targets.len(), 1);
        assert!(targets.contains(&PointerTarget::Object(obj("a"))));
    }

    #[test]
    fn apply_condition_ignores_non_pointer_conditions() {
        let mut vs = ValueSet::new();
        vs.assign(ptr_name("p"), &Expr::address_of(obj("a")));
        let cond = Expr::binary(
            BinaryOp::Eq,
            Expr::plain_symbol("x", Type::signed(32)),
            Expr::int(3, Type::signed(32)),
            Type::Bool,
        );
        vs.apply_condition(&cond);
        assert_eq!(vs.read_name(&ptr_name("p")).len(), 1);
    }

    #[test]
    fn merge_unions_pointwise() {
        let mut a = ValueSet::new();
        let mut b = ValueSet::new();
        a.assign(ptr_name("p"), &Expr::address_of(obj("a")));
        b.assign(ptr_name("p"), &Expr::address_of(obj("b")));
        a.merge(&b);
        assert_eq!(a.read_name(&ptr_name("p")).len(), 2);
    }

    #[test]
    fn kill_removes_entry_and_referencing_targets() {
        let mut vs = ValueSet::new();
        vs.assign(ptr_name("p"), &Expr::address_of(obj("a")));
        vs.assign(ptr_name("q"), &Expr::address_of(obj("a")));
        vs.kill(&obj("a").as_symbol().unwrap().l1_ident());
        assert!(vs.read_name(&ptr_name("p")).is_empty());
        assert!(vs.read_name(&ptr_name("q")).is_empty());
    }

    #[test]
    fn filter_drops_contradicted_target_from_taken() {
        let mut taken = ValueSet::new();
        let two = Expr::new(
            ExprKind::IfThenElse {
                cond: Expr::plain_symbol("c", Type::Bool),
                true_value: Expr::address_of(obj("a")),
                false_value: Expr::address_of(obj("b")),
            },
            Type::pointer(Type::signed(32)),
        );
        taken.assign(ptr_name("p"), &two);
        let mut not_taken = taken.clone();

        // Branch on p == &a.
        let cond = Expr::binary(
            BinaryOp::Eq,
            ptr_expr("p"),
            Expr::address_of(obj("a")),
            Type::Bool,
        );
        filter_by_condition(&cond, &mut taken, &mut not_taken);

        // &b makes the condition false, so it leaves the taken set;
        // &a makes it true, so it leaves the not-taken set.
        assert!(!taken
            .read_name(&ptr_name("p"))
            .contains(&PointerTarget::Object(obj("b"))));
        assert!(taken
            .read_name(&ptr_name("p"))
            .contains(&PointerTarget::Object(obj("a"))));
        assert!(!not_taken
            .read_name(&ptr_name("p"))
            .contains(&PointerTarget::Object(obj("a"))));
        assert!(not_taken
            .read_name(&ptr_name("p"))
            .contains(&PointerTarget::Object(obj("b"))));
    }
}
