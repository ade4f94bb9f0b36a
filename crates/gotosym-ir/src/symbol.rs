//! Symbols and symbol tables.
//!
//! The outer symbol table describes the input program and is read-only
//! during execution; the engine owns a second, inner table into which it
//! inserts generated symbols (auxiliary lets, allocated objects, failed
//! dereference objects, materialized string constants).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::expr::Expr;
use crate::id::Ident;
use crate::source::SourceLocation;
use crate::types::Type;

/// One named program object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: Ident,
    pub ty: Type,
    /// Initial value, if the front end provides one.
    pub value: Option<Expr>,
    /// `true` for globals and heap objects; such symbols are visible across
    /// threads and participate in shared-access instrumentation.
    pub is_static_lifetime: bool,
    /// `true` for thread-local storage; exempt from shared-access
    /// instrumentation even when static.
    pub is_thread_local: bool,
    pub source: SourceLocation,
}

impl Symbol {
    /// A plain local variable.
    pub fn local(name: impl Into<Ident>, ty: Type) -> Self {
        Symbol {
            name: name.into(),
            ty,
            value: None,
            is_static_lifetime: false,
            is_thread_local: false,
            source: SourceLocation::none(),
        }
    }

    /// A global with static lifetime.
    pub fn global(name: impl Into<Ident>, ty: Type) -> Self {
        Symbol {
            name: name.into(),
            ty,
            value: None,
            is_static_lifetime: true,
            is_thread_local: false,
            source: SourceLocation::none(),
        }
    }

    pub fn with_value(mut self, value: Expr) -> Self {
        self.value = Some(value);
        self
    }

    pub fn thread_local(mut self) -> Self {
        self.is_thread_local = true;
        self
    }

    /// Shared symbols are the ones whose accesses other threads can observe.
    pub fn is_shared(&self) -> bool {
        self.is_static_lifetime && !self.is_thread_local
    }
}

/// An insertion-ordered symbol table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: IndexMap<Ident, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Inserts a symbol; rejects duplicates.
    pub fn insert(&mut self, symbol: Symbol) -> Result<(), IrError> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(IrError::DuplicateSymbol { name: symbol.name });
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &Ident) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &Ident) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::local("x", Type::signed(32))).unwrap();
        assert!(table.contains(&Ident::new("x")));
        assert_eq!(table.lookup(&Ident::new("x")).unwrap().ty, Type::signed(32));
        assert!(table.lookup(&Ident::new("y")).is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::local("x", Type::signed(32))).unwrap();
        let err = table.insert(Symbol::local("x", Type::Bool));
        assert!(matches!(err, Err(IrError::DuplicateSymbol { .. })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn shared_classification() {
        assert!(Symbol::global("g", Type::signed(32)).is_shared());
        assert!(!Symbol::local("x", Type::signed(32)).is_shared());
        assert!(!Symbol::global("t", Type::signed(32)).thread_local().is_shared());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::local("b", Type::Bool)).unwrap();
        table.insert(Symbol::local("a", Type::Bool)).unwrap();
        let names: Vec<&str> = table.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn serde_roundtrip_symbol_table() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::global("g", Type::signed(64)).with_value(Expr::int(0, Type::signed(64))))
            .unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: SymbolTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert!(back.contains(&Ident::new("g")));
    }
}
