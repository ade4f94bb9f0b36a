pub mod cfg;
pub mod error;
pub mod expr;
pub mod id;
pub mod instruction;
pub mod program;
pub mod simplify;
pub mod source;
pub mod ssa;
pub mod symbol;
pub mod types;

// Re-export commonly used types
pub use cfg::Cfg;
pub use error::IrError;
pub use expr::{BinaryOp, Designator, Expr, ExprKind, QuantifierKind, SideEffect, UnaryOp};
pub use id::{Ident, ThreadId};
pub use instruction::{Instruction, InstructionKind, OtherStatement};
pub use program::{GotoFunction, GotoProgram, Pc};
pub use simplify::simplify;
pub use source::SourceLocation;
pub use ssa::SsaName;
pub use symbol::{Symbol, SymbolTable};
pub use types::{ConstValue, Type};
