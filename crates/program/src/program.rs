//! Instruction records, programs, and the builder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{GuardTerm, LocationDescriptor, Place};
use crate::expr::{ExprChunk, ExprOp};
use crate::opcode::Opcode;
use crate::value::TypedValue;

/// One instruction: an opcode, up to two argument descriptors, and up to
/// three guard terms controlling whether it executes. Records are
/// immutable once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub opcode: Opcode,
    pub args: [LocationDescriptor; 2],
    pub guards: [GuardTerm; 3],
}

impl InstructionRecord {
    pub const NO_GUARDS: [GuardTerm; 3] = [GuardTerm::NONE; 3];

    pub fn new(opcode: Opcode) -> InstructionRecord {
        InstructionRecord {
            opcode,
            args: [LocationDescriptor::NONE; 2],
            guards: InstructionRecord::NO_GUARDS,
        }
    }

    pub fn with_args(mut self, first: LocationDescriptor, second: LocationDescriptor) -> Self {
        self.args = [first, second];
        self
    }

    pub fn with_arg(mut self, first: LocationDescriptor) -> Self {
        self.args[0] = first;
        self
    }

    pub fn with_guards(mut self, guards: [GuardTerm; 3]) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_guard(mut self, guard: GuardTerm) -> Self {
        self.guards[0] = guard;
        self
    }
}

/// A loaded program: the ordered record table plus its pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub records: Vec<InstructionRecord>,
    pub constants: Vec<TypedValue>,
    pub expressions: Vec<ExprChunk>,
    /// Initial variable values; one slot per declared variable.
    pub variables: Vec<TypedValue>,
}

/// Program validation failures.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("record {record}: constant #{index} out of range")]
    BadConstant { record: usize, index: u16 },
    #[error("record {record}: variable #{index} out of range")]
    BadVariable { record: usize, index: u16 },
    #[error("record {record}: expression #{index} out of range")]
    BadExpression { record: usize, index: u16 },
    #[error("expression {chunk}: literal #{index} out of range")]
    BadLiteral { chunk: usize, index: u16 },
    #[error("expression {chunk}: descriptor #{index} out of range")]
    BadArg { chunk: usize, index: u16 },
    #[error("expression {chunk}: variable #{index} out of range")]
    BadChunkVariable { chunk: usize, index: u16 },
    #[error("expression {chunk}: sub-expression #{index} out of range")]
    BadSubExpression { chunk: usize, index: u16 },
}

impl Program {
    /// Check every pool index the records and expression chunks reference.
    pub fn validate(&self) -> Result<(), ProgramError> {
        for (record, rec) in self.records.iter().enumerate() {
            for arg in &rec.args {
                self.check_place(&arg.place, record)?;
            }
        }
        for (chunk_idx, chunk) in self.expressions.iter().enumerate() {
            for step in &chunk.steps {
                match step.op {
                    ExprOp::Literal(index) => {
                        if usize::from(index) >= chunk.literals.len() {
                            return Err(ProgramError::BadLiteral { chunk: chunk_idx, index });
                        }
                    }
                    ExprOp::LoadVariable(index) => {
                        if usize::from(index) >= self.variables.len() {
                            return Err(ProgramError::BadChunkVariable { chunk: chunk_idx, index });
                        }
                    }
                    ExprOp::LoadArg(index) => {
                        if usize::from(index) >= chunk.args.len() {
                            return Err(ProgramError::BadArg { chunk: chunk_idx, index });
                        }
                    }
                    ExprOp::CallExpr(index) => {
                        if usize::from(index) >= self.expressions.len() {
                            return Err(ProgramError::BadSubExpression { chunk: chunk_idx, index });
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn check_place(&self, place: &Place, record: usize) -> Result<(), ProgramError> {
        match *place {
            Place::Const(index) if usize::from(index) >= self.constants.len() => {
                Err(ProgramError::BadConstant { record, index })
            }
            Place::Variable(index) if usize::from(index) >= self.variables.len() => {
                Err(ProgramError::BadVariable { record, index })
            }
            Place::Expr(index) if usize::from(index) >= self.expressions.len() => {
                Err(ProgramError::BadExpression { record, index })
            }
            _ => Ok(()),
        }
    }
}

/// Assembles programs record by record; stands in for the external 4GL
/// compiler in tests and embedding hosts.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    records: Vec<InstructionRecord>,
    constants: Vec<TypedValue>,
    expressions: Vec<ExprChunk>,
    variables: Vec<TypedValue>,
}

impl ProgramBuilder {
    pub fn new() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    /// Add a constant, returning its pool index; duplicates share an entry.
    pub fn constant(&mut self, value: TypedValue) -> u16 {
        if let Some(idx) = self.constants.iter().position(|v| v == &value) {
            return idx as u16;
        }
        let idx = self.constants.len() as u16;
        self.constants.push(value);
        idx
    }

    /// Declare a variable with its initial value, returning its slot.
    pub fn variable(&mut self, initial: TypedValue) -> u16 {
        let idx = self.variables.len() as u16;
        self.variables.push(initial);
        idx
    }

    /// Add a compiled expression, returning its pool index.
    pub fn expression(&mut self, chunk: ExprChunk) -> u16 {
        let idx = self.expressions.len() as u16;
        self.expressions.push(chunk);
        idx
    }

    /// Append a record, returning its line number.
    pub fn emit(&mut self, record: InstructionRecord) -> usize {
        let line = self.records.len();
        self.records.push(record);
        line
    }

    /// Line number the next `emit` will occupy.
    pub fn next_line(&self) -> usize {
        self.records.len()
    }

    pub fn finish(self) -> Program {
        Program {
            records: self.records,
            constants: self.constants,
            expressions: self.expressions,
            variables: self.variables,
        }
    }
}
