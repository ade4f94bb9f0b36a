//! Renaming maps: SSA version counters and constant propagation.
//!
//! The level-2 map tracks, per level-1 name, the current SSA version. Reads
//! use the current version (a name read before any write gets version 0 and
//! is unconstrained downstream); writes bump the counter, which makes the
//! version history of every name strictly increasing along a path.
//!
//! The propagation map shadows the level-2 map with known constant values:
//! when a name is bound, a level-2 read may return the constant in place of
//! the versioned symbol.
//!
//! Versions are issued from a generation counter shared by every state
//! forked from the same analysis (forks clone the `Rc`). A fork's *current*
//! version is its own, but a write always gets a version no other branch
//! has used, so a level-2 name is unique across the whole equation even
//! after merges.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use gotosym_ir::{Expr, Ident};

/// Per-name SSA version tracking, keyed by the flattened level-1 spelling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level2Map {
    /// The version each name currently reads as, per path.
    current: IndexMap<Ident, u64>,
    /// The largest version ever issued per name, shared across forks.
    generations: Rc<RefCell<IndexMap<Ident, u64>>>,
}

impl Level2Map {
    pub fn new() -> Self {
        Level2Map::default()
    }

    /// The version a read of `name` sees. Names never written read as
    /// version 0.
    pub fn current_version(&self, name: &Ident) -> u64 {
        self.current.get(name).copied().unwrap_or(0)
    }

    /// Issues a globally fresh version for a write and makes it current.
    pub fn increase(&mut self, name: &Ident) -> u64 {
        let mut generations = self.generations.borrow_mut();
        let generation = generations.entry(name.clone()).or_insert(0);
        *generation += 1;
        let next = *generation;
        self.current.insert(name.clone(), next);
        next
    }

    /// Resets the read version for a freshly declared name, so its first
    /// read is the unconstrained version 0.
    pub fn reset(&mut self, name: &Ident) {
        self.current.insert(name.clone(), 0);
    }

    /// Whether the name has ever been written (or declared) on this path.
    pub fn knows(&self, name: &Ident) -> bool {
        self.current.contains_key(name)
    }

    /// Iterates `(name, current version)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Ident, u64)> {
        self.current.iter().map(|(k, v)| (k, *v))
    }
}

/// Known-constant bindings for level-1 names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropagationMap {
    bindings: IndexMap<Ident, Expr>,
}

impl PropagationMap {
    pub fn new() -> Self {
        PropagationMap::default()
    }

    /// Binds `name` to a constant. Non-constant expressions are rejected by
    /// the caller, not here.
    pub fn bind(&mut self, name: Ident, value: Expr) {
        self.bindings.insert(name, value);
    }

    pub fn get(&self, name: &Ident) -> Option<&Expr> {
        self.bindings.get(name)
    }

    /// Removes a binding after a non-constant write.
    pub fn remove(&mut self, name: &Ident) {
        self.bindings.shift_remove(name);
    }

    /// Keeps only the bindings on which `self` and `other` agree. Used at
    /// merges: disagreeing names get a phi instead.
    pub fn retain_agreeing(&mut self, other: &PropagationMap) {
        self.bindings
            .retain(|name, value| other.get(name) == Some(value));
    }

    /// `true` if `self` and `other` bind `name` differently (including
    /// bound-on-one-side-only).
    pub fn disagrees_on(&self, other: &PropagationMap, name: &Ident) -> bool {
        self.get(name) != other.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ident, &Expr)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotosym_ir::Type;

    fn name(s: &str) -> Ident {
        Ident::new(s)
    }

    #[test]
    fn unwritten_name_reads_as_version_zero() {
        let l2 = Level2Map::new();
        assert_eq!(l2.current_version(&name("x!0@1")), 0);
        assert!(!l2.knows(&name("x!0@1")));
    }

    #[test]
    fn increase_is_strictly_monotonic() {
        let mut l2 = Level2Map::new();
        let x = name("x!0@1");
        assert_eq!(l2.increase(&x), 1);
        assert_eq!(l2.increase(&x), 2);
        assert_eq!(l2.current_version(&x), 2);
    }

    #[test]
    fn names_version_independently() {
        let mut l2 = Level2Map::new();
        l2.increase(&name("x!0@1"));
        l2.increase(&name("x!0@1"));
        assert_eq!(l2.current_version(&name("y!0@1")), 0);
    }

    #[test]
    fn reset_returns_reads_to_version_zero() {
        let mut l2 = Level2Map::new();
        let x = name("x!0@1");
        l2.increase(&x);
        l2.reset(&x);
        assert_eq!(l2.current_version(&x), 0);
        assert!(l2.knows(&x));
    }

    #[test]
    fn forks_share_the_generation_counter() {
        let mut a = Level2Map::new();
        let x = name("x!0@1");
        a.increase(&x);

        let mut b = a.clone();
        assert_eq!(b.increase(&x), 2);
        // The other fork still reads its own version but never reissues 2.
        assert_eq!(a.current_version(&x), 1);
        assert_eq!(a.increase(&x), 3);
    }

    #[test]
    fn propagation_bind_and_remove() {
        let mut prop = PropagationMap::new();
        let x = name("x!0@1");
        prop.bind(x.clone(), Expr::int(5, Type::signed(32)));
        assert_eq!(prop.get(&x), Some(&Expr::int(5, Type::signed(32))));
        prop.remove(&x);
        assert_eq!(prop.get(&x), None);
    }

    #[test]
    fn retain_agreeing_drops_conflicts() {
        let mut a = PropagationMap::new();
        let mut b = PropagationMap::new();
        let x = name("x");
        let y = name("y");
        let z = name("z");
        a.bind(x.clone(), Expr::int(1, Type::signed(32)));
        a.bind(y.clone(), Expr::int(2, Type::signed(32)));
        a.bind(z.clone(), Expr::int(3, Type::signed(32)));
        b.bind(x.clone(), Expr::int(1, Type::signed(32)));
        b.bind(y.clone(), Expr::int(9, Type::signed(32)));

        a.retain_agreeing(&b);
        assert_eq!(a.get(&x), Some(&Expr::int(1, Type::signed(32))));
        assert_eq!(a.get(&y), None);
        assert_eq!(a.get(&z), None);
    }

    #[test]
    fn disagreement_detection() {
        let mut a = PropagationMap::new();
        let b = PropagationMap::new();
        let x = name("x");
        assert!(!a.disagrees_on(&b, &x));
        a.bind(x.clone(), Expr::int(1, Type::signed(32)));
        assert!(a.disagrees_on(&b, &x));
    }
}
