//! Program model for the Tabula execution core.
//!
//! A program is an immutable table of instruction records plus the pools
//! they reference: typed constants, compiled expressions, and initial
//! variable values. Everything here is plain data; execution state lives
//! in `tabula-runtime`.

pub mod date;
pub mod decimal;
pub mod descriptor;
pub mod expr;
pub mod opcode;
pub mod program;
pub mod value;

pub use date::Date;
pub use decimal::Decimal;
pub use descriptor::{GuardTerm, LocationDescriptor, Place};
pub use expr::{ExprChunk, ExprOp, Step};
pub use opcode::{ConditionOp, ControlOp, MoveOp, OpGroup, Opcode, Relation, Route};
pub use program::{InstructionRecord, Program, ProgramBuilder, ProgramError};
pub use value::{Kind, TypedValue};
