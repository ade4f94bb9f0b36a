//! Symbolic expression trees.
//!
//! [`Expr`] is a reference-counted, immutable expression node carrying its
//! kind, type, optional source location, and a precomputed structural hash.
//! Sharing via `Rc` makes cloning cheap, which matters because renaming and
//! simplification rebuild trees constantly. Equality and hashing are
//! structural and ignore source locations; the precomputed hash makes both
//! cheap (children contribute their cached hashes).
//!
//! Constructor helpers (`and`, `or`, `implies`, `ite`, ...) fold the trivial
//! cases eagerly so that guards and conditions stay small without a full
//! simplifier pass.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::id::Ident;
use crate::source::SourceLocation;
use crate::ssa::SsaName;
use crate::types::{ConstValue, Type};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Implies,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Returns `true` if the operator produces a boolean.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::Implies
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^",
            BinaryOp::Implies => "=>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Quantifier kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    Forall,
    Exists,
}

/// Accessor into a compound value, used by functional updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Designator {
    /// Array element at the given index.
    Index(Expr),
    /// Struct field by name.
    Member(Ident),
    /// Raw byte range at the given offset.
    Byte(Expr),
}

/// Side effects embedded in expressions by the front end. The interpreter
/// strips these during assignment handling; none may reach the equation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideEffect {
    /// A nondeterministic value of the carrying expression's type.
    Nondet,
    /// Embedded assignment (`x = e` as a subexpression).
    Assign { lhs: Expr, rhs: Expr },
    /// Embedded function call.
    FunctionCall { function: Ident, args: Vec<Expr> },
    /// Thrown exception.
    Throw { exception: Expr, tag: Ident },
    /// Statement expression (GNU-style block yielding its last value).
    StatementExpression { exprs: Vec<Expr> },
}

/// The expression variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    /// A (possibly renamed) symbol.
    Symbol { name: SsaName },
    /// A literal constant.
    Constant(ConstValue),
    Binary {
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
    },
    Unary {
        op: UnaryOp,
        operand: Expr,
    },
    IfThenElse {
        cond: Expr,
        true_value: Expr,
        false_value: Expr,
    },
    /// Array element read.
    Index { array: Expr, index: Expr },
    /// Struct field read.
    Member { compound: Expr, field: Ident },
    Dereference { pointer: Expr },
    AddressOf { object: Expr },
    /// Conversion to the carrying expression's type.
    Cast { operand: Expr },
    /// Raw byte read out of a container.
    ByteExtract { container: Expr, offset: Expr },
    /// Functional update of a compound value at one designator.
    Update {
        compound: Expr,
        designator: Designator,
        value: Expr,
    },
    /// Uninterpreted function application.
    FunctionApp { function: Ident, args: Vec<Expr> },
    /// Let binding, lifted into an auxiliary assignment by the interpreter.
    Let {
        binding: SsaName,
        value: Expr,
        body: Expr,
    },
    Quantifier {
        kind: QuantifierKind,
        variables: Vec<Expr>,
        body: Expr,
    },
    SideEffect(SideEffect),
    /// The absent expression. Rejected at the interpreter boundary.
    Nil,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExprData {
    kind: ExprKind,
    ty: Type,
    source: Option<SourceLocation>,
    hash: u64,
}

/// A shared, immutable expression node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr(Rc<ExprData>);

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        // Pointer equality first (interning makes this the common case),
        // then the cached hash as a cheap negative filter.
        Rc::ptr_eq(&self.0, &other.0)
            || (self.0.hash == other.0.hash
                && self.0.ty == other.0.ty
                && self.0.kind == other.0.kind)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

fn structural_hash(kind: &ExprKind, ty: &Type) -> u64 {
    let mut h = DefaultHasher::new();
    kind.hash(&mut h);
    ty.hash(&mut h);
    h.finish()
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Expr {
        let hash = structural_hash(&kind, &ty);
        Expr(Rc::new(ExprData {
            kind,
            ty,
            source: None,
            hash,
        }))
    }

    /// Rebuilds this expression with a source location attached.
    pub fn with_source(&self, source: SourceLocation) -> Expr {
        Expr(Rc::new(ExprData {
            kind: self.0.kind.clone(),
            ty: self.0.ty.clone(),
            source: Some(source),
            hash: self.0.hash,
        }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn source(&self) -> Option<&SourceLocation> {
        self.0.source.as_ref()
    }

    /// The precomputed structural hash (source locations excluded).
    pub fn structural_hash(&self) -> u64 {
        self.0.hash
    }

    // -- Leaf constructors --------------------------------------------------

    pub fn symbol(name: SsaName, ty: Type) -> Expr {
        Expr::new(ExprKind::Symbol { name }, ty)
    }

    /// An undecorated program symbol.
    pub fn plain_symbol(base: impl Into<Ident>, ty: Type) -> Expr {
        Expr::symbol(SsaName::new(base.into()), ty)
    }

    pub fn constant(value: ConstValue, ty: Type) -> Expr {
        Expr::new(ExprKind::Constant(value), ty)
    }

    pub fn bool_true() -> Expr {
        Expr::constant(ConstValue::Bool(true), Type::Bool)
    }

    pub fn bool_false() -> Expr {
        Expr::constant(ConstValue::Bool(false), Type::Bool)
    }

    pub fn bool_const(value: bool) -> Expr {
        if value {
            Expr::bool_true()
        } else {
            Expr::bool_false()
        }
    }

    pub fn int(value: i128, ty: Type) -> Expr {
        Expr::constant(ConstValue::Integer(value), ty)
    }

    pub fn null(ty: Type) -> Expr {
        Expr::constant(ConstValue::Null, ty)
    }

    pub fn nil() -> Expr {
        Expr::new(ExprKind::Nil, Type::Nil)
    }

    pub fn nondet(ty: Type) -> Expr {
        Expr::new(ExprKind::SideEffect(SideEffect::Nondet), ty)
    }

    // -- Compound constructors ----------------------------------------------

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
        Expr::new(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn unary(op: UnaryOp, operand: Expr, ty: Type) -> Expr {
        Expr::new(ExprKind::Unary { op, operand }, ty)
    }

    /// Conjunction, folding the neutral and absorbing elements.
    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        if lhs.is_true() {
            return rhs;
        }
        if rhs.is_true() {
            return lhs;
        }
        if lhs.is_false() || rhs.is_false() {
            return Expr::bool_false();
        }
        Expr::binary(BinaryOp::And, lhs, rhs, Type::Bool)
    }

    /// Disjunction, folding the neutral and absorbing elements.
    pub fn or(lhs: Expr, rhs: Expr) -> Expr {
        if lhs.is_false() {
            return rhs;
        }
        if rhs.is_false() {
            return lhs;
        }
        if lhs.is_true() || rhs.is_true() {
            return Expr::bool_true();
        }
        Expr::binary(BinaryOp::Or, lhs, rhs, Type::Bool)
    }

    /// Negation, folding constants and double negation.
    pub fn not_(operand: Expr) -> Expr {
        if operand.is_true() {
            return Expr::bool_false();
        }
        if operand.is_false() {
            return Expr::bool_true();
        }
        if let ExprKind::Unary {
            op: UnaryOp::Not,
            operand: inner,
        } = operand.kind()
        {
            return inner.clone();
        }
        Expr::unary(UnaryOp::Not, operand, Type::Bool)
    }

    /// Implication, folding the trivial antecedent/consequent cases.
    pub fn implies(lhs: Expr, rhs: Expr) -> Expr {
        if lhs.is_true() {
            return rhs;
        }
        if lhs.is_false() || rhs.is_true() {
            return Expr::bool_true();
        }
        if rhs.is_false() {
            return Expr::not_(lhs);
        }
        Expr::binary(BinaryOp::Implies, lhs, rhs, Type::Bool)
    }

    /// Equality, folding syntactic identity.
    pub fn eq_(lhs: Expr, rhs: Expr) -> Expr {
        if lhs == rhs {
            return Expr::bool_true();
        }
        Expr::binary(BinaryOp::Eq, lhs, rhs, Type::Bool)
    }

    pub fn ne_(lhs: Expr, rhs: Expr) -> Expr {
        if lhs == rhs {
            return Expr::bool_false();
        }
        Expr::binary(BinaryOp::Ne, lhs, rhs, Type::Bool)
    }

    /// If-then-else, folding constant conditions and equal branches.
    pub fn ite(cond: Expr, true_value: Expr, false_value: Expr) -> Expr {
        if cond.is_true() {
            return true_value;
        }
        if cond.is_false() {
            return false_value;
        }
        if true_value == false_value {
            return true_value;
        }
        let ty = true_value.ty().clone();
        Expr::new(
            ExprKind::IfThenElse {
                cond,
                true_value,
                false_value,
            },
            ty,
        )
    }

    pub fn address_of(object: Expr) -> Expr {
        let ty = Type::pointer(object.ty().clone());
        Expr::new(ExprKind::AddressOf { object }, ty)
    }

    pub fn deref(pointer: Expr) -> Expr {
        let ty = pointer
            .ty()
            .pointee()
            .cloned()
            .unwrap_or(Type::Nil);
        Expr::new(ExprKind::Dereference { pointer }, ty)
    }

    pub fn index(array: Expr, index: Expr) -> Expr {
        let ty = array.ty().element().cloned().unwrap_or(Type::Nil);
        Expr::new(ExprKind::Index { array, index }, ty)
    }

    pub fn member(compound: Expr, field: impl Into<Ident>, ty: Type) -> Expr {
        Expr::new(
            ExprKind::Member {
                compound,
                field: field.into(),
            },
            ty,
        )
    }

    pub fn cast(operand: Expr, ty: Type) -> Expr {
        Expr::new(ExprKind::Cast { operand }, ty)
    }

    pub fn update(compound: Expr, designator: Designator, value: Expr) -> Expr {
        let ty = compound.ty().clone();
        Expr::new(
            ExprKind::Update {
                compound,
                designator,
                value,
            },
            ty,
        )
    }

    // -- Predicates ---------------------------------------------------------

    pub fn is_true(&self) -> bool {
        matches!(self.kind(), ExprKind::Constant(ConstValue::Bool(true)))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind(), ExprKind::Constant(ConstValue::Bool(false)))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.kind(), ExprKind::Nil)
    }

    pub fn as_constant(&self) -> Option<&ConstValue> {
        match self.kind() {
            ExprKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&SsaName> {
        match self.kind() {
            ExprKind::Symbol { name } => Some(name),
            _ => None,
        }
    }

    /// Returns `true` if any node in the tree is a side effect.
    pub fn has_side_effect(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e.kind(), ExprKind::SideEffect(_)) {
                found = true;
            }
        });
        found
    }

    /// Returns `true` if any node in the tree is a dereference.
    pub fn has_dereference(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e.kind(), ExprKind::Dereference { .. }) {
                found = true;
            }
        });
        found
    }

    /// Returns `true` if any node in the tree is a let binding.
    pub fn has_let(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e.kind(), ExprKind::Let { .. }) {
                found = true;
            }
        });
        found
    }

    // -- Traversal ----------------------------------------------------------

    /// Pre-order visit of every node in the tree.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self.kind() {
            ExprKind::Symbol { .. } | ExprKind::Constant(_) | ExprKind::Nil => {}
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand } => operand.visit(f),
            ExprKind::IfThenElse {
                cond,
                true_value,
                false_value,
            } => {
                cond.visit(f);
                true_value.visit(f);
                false_value.visit(f);
            }
            ExprKind::Index { array, index } => {
                array.visit(f);
                index.visit(f);
            }
            ExprKind::Member { compound, .. } => compound.visit(f),
            ExprKind::Dereference { pointer } => pointer.visit(f),
            ExprKind::AddressOf { object } => object.visit(f),
            ExprKind::ByteExtract { container, offset } => {
                container.visit(f);
                offset.visit(f);
            }
            ExprKind::Update {
                compound,
                designator,
                value,
            } => {
                compound.visit(f);
                match designator {
                    Designator::Index(e) | Designator::Byte(e) => e.visit(f),
                    Designator::Member(_) => {}
                }
                value.visit(f);
            }
            ExprKind::FunctionApp { args, .. } => {
                for a in args {
                    a.visit(f);
                }
            }
            ExprKind::Let { value, body, .. } => {
                value.visit(f);
                body.visit(f);
            }
            ExprKind::Quantifier {
                variables, body, ..
            } => {
                for v in variables {
                    v.visit(f);
                }
                body.visit(f);
            }
            ExprKind::SideEffect(effect) => match effect {
                SideEffect::Nondet => {}
                SideEffect::Assign { lhs, rhs } => {
                    lhs.visit(f);
                    rhs.visit(f);
                }
                SideEffect::FunctionCall { args, .. } => {
                    for a in args {
                        a.visit(f);
                    }
                }
                SideEffect::Throw { exception, .. } => exception.visit(f),
                SideEffect::StatementExpression { exprs } => {
                    for e in exprs {
                        e.visit(f);
                    }
                }
            },
        }
    }

    /// Calls `f` on every symbol name in the tree.
    pub fn for_each_symbol(&self, f: &mut impl FnMut(&SsaName)) {
        self.visit(&mut |e| {
            if let ExprKind::Symbol { name } = e.kind() {
                f(name);
            }
        });
    }

    /// Replaces every occurrence of `target` (structural match) with
    /// `replacement`, rebuilding only the spine that changes.
    pub fn substitute(&self, target: &Expr, replacement: &Expr) -> Expr {
        if self == target {
            return replacement.clone();
        }
        let rebuild = |kind: ExprKind| Expr::new(kind, self.ty().clone());
        match self.kind() {
            ExprKind::Symbol { .. } | ExprKind::Constant(_) | ExprKind::Nil => self.clone(),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = lhs.substitute(target, replacement);
                let r = rhs.substitute(target, replacement);
                if &l == lhs && &r == rhs {
                    self.clone()
                } else {
                    rebuild(ExprKind::Binary {
                        op: *op,
                        lhs: l,
                        rhs: r,
                    })
                }
            }
            ExprKind::Unary { op, operand } => {
                let o = operand.substitute(target, replacement);
                if &o == operand {
                    self.clone()
                } else {
                    rebuild(ExprKind::Unary { op: *op, operand: o })
                }
            }
            ExprKind::Cast { operand } => {
                let o = operand.substitute(target, replacement);
                if &o == operand {
                    self.clone()
                } else {
                    rebuild(ExprKind::Cast { operand: o })
                }
            }
            ExprKind::IfThenElse {
                cond,
                true_value,
                false_value,
            } => rebuild(ExprKind::IfThenElse {
                cond: cond.substitute(target, replacement),
                true_value: true_value.substitute(target, replacement),
                false_value: false_value.substitute(target, replacement),
            }),
            ExprKind::Index { array, index } => rebuild(ExprKind::Index {
                array: array.substitute(target, replacement),
                index: index.substitute(target, replacement),
            }),
            ExprKind::Member { compound, field } => rebuild(ExprKind::Member {
                compound: compound.substitute(target, replacement),
                field: field.clone(),
            }),
            ExprKind::Dereference { pointer } => rebuild(ExprKind::Dereference {
                pointer: pointer.substitute(target, replacement),
            }),
            ExprKind::AddressOf { object } => rebuild(ExprKind::AddressOf {
                object: object.substitute(target, replacement),
            }),
            ExprKind::ByteExtract { container, offset } => rebuild(ExprKind::ByteExtract {
                container: container.substitute(target, replacement),
                offset: offset.substitute(target, replacement),
            }),
            ExprKind::Update {
                compound,
                designator,
                value,
            } => rebuild(ExprKind::Update {
                compound: compound.substitute(target, replacement),
                designator: match designator {
                    Designator::Index(e) => Designator::Index(e.substitute(target, replacement)),
                    Designator::Byte(e) => Designator::Byte(e.substitute(target, replacement)),
                    Designator::Member(m) => Designator::Member(m.clone()),
                },
                value: value.substitute(target, replacement),
            }),
            ExprKind::FunctionApp { function, args } => rebuild(ExprKind::FunctionApp {
                function: function.clone(),
                args: args
                    .iter()
                    .map(|a| a.substitute(target, replacement))
                    .collect(),
            }),
            ExprKind::Let {
                binding,
                value,
                body,
            } => rebuild(ExprKind::Let {
                binding: binding.clone(),
                value: value.substitute(target, replacement),
                body: body.substitute(target, replacement),
            }),
            ExprKind::Quantifier {
                kind,
                variables,
                body,
            } => rebuild(ExprKind::Quantifier {
                kind: *kind,
                variables: variables.clone(),
                body: body.substitute(target, replacement),
            }),
            ExprKind::SideEffect(_) => self.clone(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Symbol { name } => write!(f, "{name}"),
            ExprKind::Constant(c) => write!(f, "{c}"),
            ExprKind::Binary { op, lhs, rhs } => {
                write!(f, "({lhs} {} {rhs})", op.symbol())
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
            },
            ExprKind::IfThenElse {
                cond,
                true_value,
                false_value,
            } => write!(f, "({cond} ? {true_value} : {false_value})"),
            ExprKind::Index { array, index } => write!(f, "{array}[{index}]"),
            ExprKind::Member { compound, field } => write!(f, "{compound}.{field}"),
            ExprKind::Dereference { pointer } => write!(f, "*{pointer}"),
            ExprKind::AddressOf { object } => write!(f, "&{object}"),
            ExprKind::Cast { operand } => write!(f, "cast({operand}, {})", self.ty()),
            ExprKind::ByteExtract { container, offset } => {
                write!(f, "byte_extract({container}, {offset})")
            }
            ExprKind::Update {
                compound,
                designator,
                value,
            } => {
                write!(f, "({compound} with ")?;
                match designator {
                    Designator::Index(i) => write!(f, "[{i}]")?,
                    Designator::Member(m) => write!(f, ".{m}")?,
                    Designator::Byte(o) => write!(f, "byte[{o}]")?,
                }
                write!(f, " := {value})")
            }
            ExprKind::FunctionApp { function, args } => {
                write!(f, "{function}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ExprKind::Let {
                binding,
                value,
                body,
            } => write!(f, "(let {binding} = {value} in {body})"),
            ExprKind::Quantifier {
                kind,
                variables,
                body,
            } => {
                match kind {
                    QuantifierKind::Forall => write!(f, "forall ")?,
                    QuantifierKind::Exists => write!(f, "exists ")?,
                }
                for (i, v) in variables.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ". {body}")
            }
            ExprKind::SideEffect(effect) => match effect {
                SideEffect::Nondet => write!(f, "nondet()"),
                SideEffect::Assign { lhs, rhs } => write!(f, "({lhs} = {rhs})"),
                SideEffect::FunctionCall { function, args } => {
                    write!(f, "call {function}(")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    write!(f, ")")
                }
                SideEffect::Throw { exception, tag } => write!(f, "throw {tag}({exception})"),
                SideEffect::StatementExpression { .. } => write!(f, "({{...}})"),
            },
            ExprKind::Nil => write!(f, "nil"),
        }
    }
}
