//! Three-level renamed symbol names.
//!
//! A program symbol is promoted to a globally unique SSA name in three steps:
//!
//! - **L0** attaches the thread: `x` becomes `x!0`.
//! - **L1** attaches the frame counter for locals, so recursive or repeated
//!   calls get distinct names: `x!0` becomes `x!0@2`. Globals skip this step.
//! - **L2** attaches the SSA version, incremented on every write:
//!   `x!0@2` becomes `x!0@2#5`.
//!
//! The decorations are optional fields; a name is considered L2-renamed once
//! its version is set, which is the precondition for appearing in the
//! equation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{Ident, ThreadId};

/// A symbol name with optional level-0/1/2 decorations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SsaName {
    /// The textual base identifier.
    pub base: Ident,
    /// Level 0: owning thread.
    pub thread: Option<ThreadId>,
    /// Level 1: frame counter. Stays `None` for globals.
    pub frame: Option<u64>,
    /// Level 2: SSA version.
    pub version: Option<u64>,
}

impl SsaName {
    /// An undecorated name, as it appears in the input program.
    pub fn new(base: impl Into<Ident>) -> Self {
        SsaName {
            base: base.into(),
            thread: None,
            frame: None,
            version: None,
        }
    }

    pub fn with_thread(mut self, thread: ThreadId) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_frame(mut self, frame: u64) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Drops the L2 version, keeping the L1 spelling.
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn is_l0_renamed(&self) -> bool {
        self.thread.is_some()
    }

    pub fn is_l2_renamed(&self) -> bool {
        self.version.is_some()
    }

    /// The flattened L1 spelling (`base!t@f`, version omitted). This is the
    /// key under which renaming maps and value sets track the symbol.
    pub fn l1_ident(&self) -> Ident {
        let mut s = self.base.as_str().to_owned();
        if let Some(t) = self.thread {
            s.push('!');
            s.push_str(&t.0.to_string());
        }
        if let Some(fr) = self.frame {
            s.push('@');
            s.push_str(&fr.to_string());
        }
        Ident::from(s)
    }

    /// The fully decorated spelling including the version.
    pub fn full_ident(&self) -> Ident {
        let mut s = self.l1_ident().as_str().to_owned();
        if let Some(v) = self.version {
            s.push('#');
            s.push_str(&v.to_string());
        }
        Ident::from(s)
    }
}

impl fmt::Display for SsaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(t) = self.thread {
            write!(f, "!{t}")?;
        }
        if let Some(fr) = self.frame {
            write!(f, "@{fr}")?;
        }
        if let Some(v) = self.version {
            write!(f, "#{v}")?;
        }
        Ok(())
    }
}

impl From<&str> for SsaName {
    fn from(s: &str) -> Self {
        SsaName::new(s)
    }
}
