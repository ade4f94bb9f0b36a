//! GOTO programs: functions, bodies, and program counters.
//!
//! A [`GotoProgram`] is an ordered map of [`GotoFunction`]s plus an entry
//! point. Bodies are flat instruction vectors; a [`Pc`] addresses one
//! instruction as a (function, index) pair.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::id::Ident;
use crate::instruction::{Instruction, InstructionKind};
use crate::types::Type;

/// One function of the program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotoFunction {
    pub name: Ident,
    /// Named parameters with their types, in call order.
    pub parameters: Vec<(Ident, Type)>,
    pub return_type: Type,
    pub body: Vec<Instruction>,
}

impl GotoFunction {
    pub fn new(name: impl Into<Ident>, return_type: Type) -> Self {
        GotoFunction {
            name: name.into(),
            parameters: Vec::new(),
            return_type,
            body: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<Ident>, ty: Type) -> Self {
        self.parameters.push((name.into(), ty));
        self
    }

    pub fn with_body(mut self, body: Vec<Instruction>) -> Self {
        self.body = body;
        self
    }

    /// Index of the final `EndFunction` instruction.
    pub fn end_index(&self) -> usize {
        self.body.len().saturating_sub(1)
    }

    /// Returns `true` if the goto at `index` jumps backwards in program
    /// order, i.e. is a loop back-edge. Self-loops count as back-edges.
    pub fn is_back_edge(&self, index: usize, target: usize) -> bool {
        target <= index
    }

    /// Checks that every target lies in the body and the body ends with
    /// `EndFunction`.
    pub fn validate(&self) -> Result<(), IrError> {
        match self.body.last().map(|i| &i.kind) {
            Some(InstructionKind::EndFunction) => {}
            _ => {
                return Err(IrError::MissingEndFunction {
                    function: self.name.clone(),
                })
            }
        }
        for (index, instruction) in self.body.iter().enumerate() {
            for target in instruction.targets() {
                if target >= self.body.len() {
                    return Err(IrError::InvalidTarget {
                        function: self.name.clone(),
                        index,
                        target,
                        len: self.body.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A whole program: ordered functions plus the entry point name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotoProgram {
    functions: IndexMap<Ident, GotoFunction>,
    pub entry_point: Ident,
}

impl GotoProgram {
    pub fn new(entry_point: impl Into<Ident>) -> Self {
        GotoProgram {
            functions: IndexMap::new(),
            entry_point: entry_point.into(),
        }
    }

    pub fn add_function(&mut self, function: GotoFunction) -> Result<(), IrError> {
        if self.functions.contains_key(&function.name) {
            return Err(IrError::DuplicateFunction {
                function: function.name,
            });
        }
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn get(&self, name: &Ident) -> Option<&GotoFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &GotoFunction> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Validates every function and the entry point.
    pub fn validate(&self) -> Result<(), IrError> {
        if !self.functions.contains_key(&self.entry_point) {
            return Err(IrError::EntryPointNotFound {
                function: self.entry_point.clone(),
            });
        }
        for function in self.functions.values() {
            function.validate()?;
        }
        Ok(())
    }
}

/// A program counter: one instruction in one function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pc {
    pub function: Ident,
    pub index: usize,
}

impl Pc {
    pub fn new(function: impl Into<Ident>, index: usize) -> Self {
        Pc {
            function: function.into(),
            index,
        }
    }

    /// The next instruction in the same function.
    pub fn next(&self) -> Pc {
        Pc {
            function: self.function.clone(),
            index: self.index + 1,
        }
    }

    /// The same function at a different index.
    pub fn at(&self, index: usize) -> Pc {
        Pc {
            function: self.function.clone(),
            index,
        }
    }
}

impl fmt::Display for Pc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function, self.index)
    }
}
