//! Compiled expressions.
//!
//! A chunk is a flat step list plus the pools its steps index: literal
//! values and full location descriptors. Each step pairs an operation with
//! the value kind it operates on; the engine rejects pairs the operation
//! is not defined for. Produced by the external 4GL compiler, by
//! `ProgramBuilder` callers, or by the runtime's on-the-fly source
//! compiler.

use serde::{Deserialize, Serialize};

use crate::descriptor::LocationDescriptor;
use crate::value::{Kind, TypedValue};

/// One step: an operation plus its operand kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub op: ExprOp,
    pub kind: Kind,
}

impl Step {
    pub fn new(op: ExprOp, kind: Kind) -> Step {
        Step { op, kind }
    }
}

/// Expression operations. Pops and pushes go through the operand stack
/// except for text, which stages through the pending-text stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExprOp {
    /// Push a literal (index into the chunk's literal pool).
    Literal(u16),
    /// Push a database field value.
    LoadField { file: u8, field: u8 },
    /// Push a program variable.
    LoadVariable(u16),
    /// Resolve and push a pooled location descriptor.
    LoadArg(u16),
    /// Run a program-pooled sub-expression and adopt its result.
    CallExpr(u16),
    Add,
    Sub,
    Mul,
    Div,
    /// Bitwise AND, integer only.
    BitAnd,
    /// Bitwise OR, integer only.
    BitOr,
    /// Clamping reducer: replace the two top operands with the smaller.
    Min,
    /// Clamping reducer: replace the two top operands with the larger.
    Max,
    Neg,
    Abs,
    /// Kind conversions; the step kind is the *source* kind.
    ToText,
    ToDecimal,
    ToDate,
    ToInt,
    ToReal,
    /// Signed round-half-away real→integer conversion.
    Round,
    /// Push the pending text's length.
    Length,
    /// Pop the final result for the caller.
    Output,
    // Single-kind real function band.
    Log,
    Exp,
    Sin,
    Asin,
    Cos,
    Acos,
    Tan,
    Atan,
    Sqrt,
    Pow,
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprChunk {
    pub steps: Vec<Step>,
    pub literals: Vec<TypedValue>,
    pub args: Vec<LocationDescriptor>,
    /// Kind the final `Output` step produces.
    pub result: Kind,
}

impl Default for ExprChunk {
    fn default() -> Self {
        ExprChunk::new(Kind::Decimal)
    }
}

impl ExprChunk {
    pub fn new(result: Kind) -> ExprChunk {
        ExprChunk {
            steps: Vec::new(),
            literals: Vec::new(),
            args: Vec::new(),
            result,
        }
    }

    /// Append a step.
    pub fn push(&mut self, op: ExprOp, kind: Kind) {
        self.steps.push(Step::new(op, kind));
    }

    /// Add a literal, returning its index; duplicates share one entry.
    pub fn add_literal(&mut self, value: TypedValue) -> u16 {
        if let Some(idx) = self.literals.iter().position(|v| v == &value) {
            return idx as u16;
        }
        let idx = self.literals.len() as u16;
        self.literals.push(value);
        idx
    }

    /// Add a location descriptor, returning its index.
    pub fn add_arg(&mut self, descriptor: LocationDescriptor) -> u16 {
        if let Some(idx) = self.args.iter().position(|d| d == &descriptor) {
            return idx as u16;
        }
        let idx = self.args.len() as u16;
        self.args.push(descriptor);
        idx
    }
}
