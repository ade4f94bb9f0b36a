//! Identifier newtypes shared across the IR.
//!
//! [`Ident`] is a cheaply clonable, reference-counted string used for symbol
//! base names, function names, struct tags, and property identifiers.
//! [`ThreadId`] is the numeric identity of a program thread, used as the
//! level-0 decoration on renamed symbols.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An interned identifier. Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(Arc<str>);

impl Ident {
    /// Creates an identifier from any string-like value.
    pub fn new(name: impl AsRef<str>) -> Self {
        Ident(Arc::from(name.as_ref()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::new(s)
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Ident(Arc::from(s.as_str()))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Serialize as a plain string so identifiers read naturally in JSON.

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Ident::from(s))
    }
}

/// Identity of a program thread. The initial thread is `ThreadId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_display() {
        assert_eq!(format!("{}", Ident::new("main")), "main");
    }

    #[test]
    fn ident_equality_by_content() {
        let a = Ident::new("x");
        let b = Ident::from("x".to_string());
        assert_eq!(a, b);
        assert_ne!(a, Ident::new("y"));
    }

    #[test]
    fn ident_clone_is_cheap_and_equal() {
        let a = Ident::new("long_symbol_name");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.as_str(), "long_symbol_name");
    }

    #[test]
    fn thread_id_display() {
        assert_eq!(format!("{}", ThreadId(3)), "3");
    }

    #[test]
    fn serde_roundtrip_ident() {
        let id = Ident::new("f::local");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"f::local\"");
        let back: Ident = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn serde_roundtrip_thread_id() {
        let t = ThreadId(7);
        let json = serde_json::to_string(&t).unwrap();
        let back: ThreadId = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
