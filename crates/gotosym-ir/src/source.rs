//! Source locations attached to expressions and instructions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::Ident;

/// Where an expression or instruction came from in the original program.
///
/// All fields are optional -- generated instructions (phi assignments,
/// auxiliary lets) carry an empty location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file name.
    pub file: Option<Ident>,
    /// Line number within the file (1-based).
    pub line: Option<u32>,
    /// Function the location belongs to.
    pub function: Option<Ident>,
}

impl SourceLocation {
    /// An empty location for generated code.
    pub fn none() -> Self {
        SourceLocation::default()
    }

    /// A location naming only the enclosing function.
    pub fn in_function(function: impl Into<Ident>) -> Self {
        SourceLocation {
            file: None,
            line: None,
            function: Some(function.into()),
        }
    }

    /// Returns `true` if no field is set.
    pub fn is_none(&self) -> bool {
        self.file.is_none() && self.line.is_none() && self.function.is_none()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(file) = &self.file {
            write!(f, "{file}")?;
            wrote = true;
        }
        if let Some(line) = self.line {
            if wrote {
                write!(f, ":")?;
            }
            write!(f, "{line}")?;
            wrote = true;
        }
        if let Some(function) = &self.function {
            if wrote {
                write!(f, " ")?;
            }
            write!(f, "function {function}")?;
            wrote = true;
        }
        if !wrote {
            write!(f, "<generated>")?;
        }
        Ok(())
    }
}
