//! Expression simplification.
//!
//! [`simplify`] is a pure, semantics-preserving constant folder: boolean
//! algebra, integer arithmetic and comparison on constants, if-then-else
//! with a decided condition, casts of integer constants, and double
//! negation. It rebuilds bottom-up and returns the input (a cheap `Rc`
//! clone) when nothing folds.

use crate::expr::{BinaryOp, Designator, Expr, ExprKind, UnaryOp};
use crate::types::{ConstValue, Type};

/// Simplifies an expression. Pure; the input is never mutated.
pub fn simplify(expr: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::Symbol { .. }
        | ExprKind::Constant(_)
        | ExprKind::Nil
        | ExprKind::SideEffect(_) => expr.clone(),

        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = simplify(lhs);
            let rhs = simplify(rhs);
            fold_binary(*op, lhs, rhs, expr.ty().clone())
        }

        ExprKind::Unary { op, operand } => {
            let operand = simplify(operand);
            match op {
                UnaryOp::Not => Expr::not_(operand),
                UnaryOp::Neg => match operand.as_constant().and_then(ConstValue::integer) {
                    Some(v) => Expr::int(-v, expr.ty().clone()),
                    None => Expr::unary(UnaryOp::Neg, operand, expr.ty().clone()),
                },
            }
        }

        ExprKind::IfThenElse {
            cond,
            true_value,
            false_value,
        } => Expr::ite(simplify(cond), simplify(true_value), simplify(false_value)),

        ExprKind::Cast { operand } => {
            let operand = simplify(operand);
            match (operand.as_constant(), expr.ty()) {
                (Some(ConstValue::Integer(v)), ty) if ty.is_numeric() => {
                    Expr::int(truncate_to(*v, ty), ty.clone())
                }
                (Some(ConstValue::Bool(b)), ty) if ty.is_numeric() => {
                    Expr::int(i128::from(*b), ty.clone())
                }
                _ => Expr::cast(operand, expr.ty().clone()),
            }
        }

        ExprKind::Index { array, index } => {
            let array = simplify(array);
            let index = simplify(index);
            Expr::new(ExprKind::Index { array, index }, expr.ty().clone())
        }

        ExprKind::Member { compound, field } => Expr::new(
            ExprKind::Member {
                compound: simplify(compound),
                field: field.clone(),
            },
            expr.ty().clone(),
        ),

        ExprKind::Dereference { pointer } => Expr::new(
            ExprKind::Dereference {
                pointer: simplify(pointer),
            },
            expr.ty().clone(),
        ),

        ExprKind::AddressOf { object } => Expr::new(
            ExprKind::AddressOf {
                object: simplify(object),
            },
            expr.ty().clone(),
        ),

        ExprKind::ByteExtract { container, offset } => Expr::new(
            ExprKind::ByteExtract {
                container: simplify(container),
                offset: simplify(offset),
            },
            expr.ty().clone(),
        ),

        ExprKind::Update {
            compound,
            designator,
            value,
        } => Expr::new(
            ExprKind::Update {
                compound: simplify(compound),
                designator: match designator {
                    Designator::Index(e) => Designator::Index(simplify(e)),
                    Designator::Byte(e) => Designator::Byte(simplify(e)),
                    Designator::Member(m) => Designator::Member(m.clone()),
                },
                value: simplify(value),
            },
            expr.ty().clone(),
        ),

        ExprKind::FunctionApp { function, args } => Expr::new(
            ExprKind::FunctionApp {
                function: function.clone(),
                args: args.iter().map(simplify).collect(),
            },
            expr.ty().clone(),
        ),

        ExprKind::Let {
            binding,
            value,
            body,
        } => Expr::new(
            ExprKind::Let {
                binding: binding.clone(),
                value: simplify(value),
                body: simplify(body),
            },
            expr.ty().clone(),
        ),

        ExprKind::Quantifier {
            kind,
            variables,
            body,
        } => Expr::new(
            ExprKind::Quantifier {
                kind: *kind,
                variables: variables.clone(),
                body: simplify(body),
            },
            expr.ty().clone(),
        ),
    }
}

fn fold_binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    // Boolean connectives: the smart constructors fold units and absorbers.
    match op {
        BinaryOp::And => return Expr::and(lhs, rhs),
        BinaryOp::Or => return Expr::or(lhs, rhs),
        BinaryOp::Implies => return Expr::implies(lhs, rhs),
        _ => {}
    }

    if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
        if let Some(folded) = fold_constants(op, a, b, &ty) {
            return folded;
        }
    }

    // Address comparisons: distinct named objects have distinct, non-null
    // addresses.
    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        if let Some(equal) = fold_address_eq(&lhs, &rhs) {
            return Expr::bool_const(if op == BinaryOp::Eq { equal } else { !equal });
        }
    }

    match op {
        BinaryOp::Eq => Expr::eq_(lhs, rhs),
        BinaryOp::Ne => Expr::ne_(lhs, rhs),
        BinaryOp::Xor => {
            if let (Some(a), Some(b)) = (
                lhs.as_constant().and_then(ConstValue::boolean),
                rhs.as_constant().and_then(ConstValue::boolean),
            ) {
                Expr::bool_const(a != b)
            } else {
                Expr::binary(BinaryOp::Xor, lhs, rhs, ty)
            }
        }
        _ => Expr::binary(op, lhs, rhs, ty),
    }
}

fn fold_constants(op: BinaryOp, lhs: &ConstValue, rhs: &ConstValue, ty: &Type) -> Option<Expr> {
    let (a, b) = (lhs.integer()?, rhs.integer()?);
    let folded = match op {
        BinaryOp::Add => Expr::int(a.checked_add(b)?, ty.clone()),
        BinaryOp::Sub => Expr::int(a.checked_sub(b)?, ty.clone()),
        BinaryOp::Mul => Expr::int(a.checked_mul(b)?, ty.clone()),
        // Division and remainder by zero stay symbolic.
        BinaryOp::Div => Expr::int(a.checked_div(b)?, ty.clone()),
        BinaryOp::Rem => Expr::int(a.checked_rem(b)?, ty.clone()),
        BinaryOp::Eq => Expr::bool_const(a == b),
        BinaryOp::Ne => Expr::bool_const(a != b),
        BinaryOp::Lt => Expr::bool_const(a < b),
        BinaryOp::Le => Expr::bool_const(a <= b),
        BinaryOp::Gt => Expr::bool_const(a > b),
        BinaryOp::Ge => Expr::bool_const(a >= b),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Implies => return None,
    };
    Some(folded)
}

/// Decides equality of address expressions where possible: two `&symbol`
/// terms compare by object identity, and an object address is never null.
fn fold_address_eq(lhs: &Expr, rhs: &Expr) -> Option<bool> {
    let object_of = |e: &Expr| match e.kind() {
        ExprKind::AddressOf { object } => object.as_symbol().map(|n| n.l1_ident()),
        _ => None,
    };
    let is_null = |e: &Expr| matches!(e.as_constant(), Some(ConstValue::Null));

    match (object_of(lhs), object_of(rhs)) {
        (Some(a), Some(b)) => Some(a == b),
        (Some(_), None) if is_null(rhs) => Some(false),
        (None, Some(_)) if is_null(lhs) => Some(false),
        _ => None,
    }
}

/// Wraps an integer constant into the representable range of a bitvector
/// type. Types without a modeled width pass the value through.
fn truncate_to(value: i128, ty: &Type) -> i128 {
    match ty {
        Type::UnsignedBv { width } if *width < 128 => {
            let mask = (1i128 << width) - 1;
            value & mask
        }
        Type::SignedBv { width } if *width < 128 => {
            let mask = (1i128 << width) - 1;
            let wrapped = value & mask;
            let sign = 1i128 << (width - 1);
            if wrapped & sign != 0 {
                wrapped - (1i128 << width)
            } else {
                wrapped
            }
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_ty() -> Type {
        Type::signed(32)
    }

    fn sym(name: &str) -> Expr {
        Expr::plain_symbol(name, i32_ty())
    }

    fn int(v: i128) -> Expr {
        Expr::int(v, i32_ty())
    }

    #[test]
    fn folds_integer_arithmetic() {
        let e = Expr::binary(BinaryOp::Add, int(2), int(3), i32_ty());
        assert_eq!(simplify(&e), int(5));

        let e = Expr::binary(BinaryOp::Mul, int(4), int(-3), i32_ty());
        assert_eq!(simplify(&e), int(-12));
    }

    #[test]
    fn folds_integer_comparison() {
        let e = Expr::binary(BinaryOp::Lt, int(1), int(2), Type::Bool);
        assert!(simplify(&e).is_true());

        let e = Expr::binary(BinaryOp::Ge, int(1), int(2), Type::Bool);
        assert!(simplify(&e).is_false());
    }

    #[test]
    fn division_by_zero_stays_symbolic() {
        let e = Expr::binary(BinaryOp::Div, int(1), int(0), i32_ty());
        let s = simplify(&e);
        assert!(s.as_constant().is_none());
    }

    #[test]
    fn folds_nested_trees() {
        // (2 + 3) < (10 - 1)  ->  true
        let lhs = Expr::binary(BinaryOp::Add, int(2), int(3), i32_ty());
        let rhs = Expr::binary(BinaryOp::Sub, int(10), int(1), i32_ty());
        let e = Expr::binary(BinaryOp::Lt, lhs, rhs, Type::Bool);
        assert!(simplify(&e).is_true());
    }

    #[test]
    fn folds_boolean_connectives_around_symbols() {
        let c = Expr::binary(BinaryOp::Lt, sym("x"), int(0), Type::Bool);
        let e = Expr::binary(BinaryOp::And, Expr::bool_true(), c.clone(), Type::Bool);
        assert_eq!(simplify(&e), c);

        let e = Expr::binary(BinaryOp::Or, c.clone(), Expr::bool_true(), Type::Bool);
        assert!(simplify(&e).is_true());
    }

    #[test]
    fn folds_ite_with_decided_condition() {
        let cond = Expr::binary(BinaryOp::Gt, int(5), int(0), Type::Bool);
        let e = Expr::new(
            ExprKind::IfThenElse {
                cond,
                true_value: sym("a"),
                false_value: sym("b"),
            },
            i32_ty(),
        );
        assert_eq!(simplify(&e), sym("a"));
    }

    #[test]
    fn folds_negation_and_double_not() {
        let e = Expr::unary(UnaryOp::Neg, int(7), i32_ty());
        assert_eq!(simplify(&e), int(-7));

        let c = Expr::binary(BinaryOp::Eq, sym("x"), int(0), Type::Bool);
        let e = Expr::not_(Expr::not_(c.clone()));
        assert_eq!(simplify(&e), c);
    }

    #[test]
    fn folds_cast_of_integer_constant() {
        let e = Expr::cast(Expr::int(300, i32_ty()), Type::unsigned(8));
        assert_eq!(simplify(&e), Expr::int(44, Type::unsigned(8)));

        let e = Expr::cast(Expr::int(200, i32_ty()), Type::signed(8));
        assert_eq!(simplify(&e), Expr::int(-56, Type::signed(8)));
    }

    #[test]
    fn equality_of_identical_symbols_folds() {
        let e = Expr::binary(BinaryOp::Eq, sym("x"), sym("x"), Type::Bool);
        assert!(simplify(&e).is_true());
    }

    #[test]
    fn symbolic_expression_is_unchanged() {
        let e = Expr::binary(BinaryOp::Add, sym("x"), sym("y"), i32_ty());
        assert_eq!(simplify(&e), e);
    }

    #[test]
    fn address_comparison_folds_by_object_identity() {
        let a = Expr::plain_symbol("a", i32_ty());
        let b = Expr::plain_symbol("b", i32_ty());
        let eq_same = Expr::binary(
            BinaryOp::Eq,
            Expr::address_of(a.clone()),
            Expr::address_of(a.clone()),
            Type::Bool,
        );
        assert!(simplify(&eq_same).is_true());

        let eq_diff = Expr::binary(
            BinaryOp::Eq,
            Expr::address_of(a.clone()),
            Expr::address_of(b),
            Type::Bool,
        );
        assert!(simplify(&eq_diff).is_false());

        let eq_null = Expr::binary(
            BinaryOp::Eq,
            Expr::address_of(a),
            Expr::null(Type::pointer(i32_ty())),
            Type::Bool,
        );
        assert!(simplify(&eq_null).is_false());
    }

    #[test]
    fn xor_of_constants_folds() {
        let e = Expr::binary(
            BinaryOp::Xor,
            Expr::bool_true(),
            Expr::bool_false(),
            Type::Bool,
        );
        assert!(simplify(&e).is_true());
    }
}
