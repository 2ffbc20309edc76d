//! Runtime errors and their numeric codes.
//!
//! Programs observe errors as numbers (the error registers, the recovery
//! protocol), so every `Error` variant maps to an `ErrorCode`. The codes
//! keep the original runtime's assignments where one exists.

use std::fmt;

use thiserror::Error;

use tabula_program::{ExprOp, Kind, ProgramError};

/// Runtime result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error code as seen by programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u16);

/// Codes that always abort the run when no recovery handler takes them.
const FATAL_CODES: &[u16] = &[3, 10, 18, 19, 20, 21, 22, 43, 70, 72, 74, 75, 78, 80, 97];

impl ErrorCode {
    /// True for the hard-fatal band (codes >= 100 are host/user defined
    /// and never hard-fatal).
    pub fn is_fatal(self) -> bool {
        self.0 < 100 && FATAL_CODES.contains(&self.0)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Assigned error codes raised by the core.
pub mod code {
    use super::ErrorCode;

    /// Internal stack fault: imbalance, underflow, bad pool reference.
    pub const STACK_FAULT: ErrorCode = ErrorCode(50);
    /// Expression failed to compile or used an undefined step/kind pair.
    pub const BAD_EXPRESSION: ErrorCode = ErrorCode(56);
    /// Evaluation refused: not enough operand-stack headroom.
    pub const EVAL_SPACE: ErrorCode = ErrorCode(57);
    /// Operation has no host implementation.
    pub const UNSUPPORTED: ErrorCode = ErrorCode(58);
    /// Trapped numeric domain/range fault; result substituted with zero.
    pub const MATH_DOMAIN: ErrorCode = ErrorCode(59);
    /// Return-address stack exhausted.
    pub const CALL_DEPTH: ErrorCode = ErrorCode(97);
}

/// Runtime errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("operand stack exhausted")]
    StackExhausted,

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand stack imbalanced after evaluation")]
    StackImbalance,

    #[error("expression produced no result")]
    NoResult,

    #[error("no pending text operand")]
    NoPendingText,

    #[error("{op:?} is undefined for {kind:?} operands")]
    UndefinedStep { op: ExprOp, kind: Kind },

    #[error("cannot compile expression: {0}")]
    BadSource(String),

    #[error("unknown compiled expression #{0}")]
    UnknownExpression(u16),

    #[error("unknown variable slot #{0}")]
    UnknownVariable(u16),

    #[error("unknown constant #{0}")]
    UnknownConstant(u16),

    #[error("instruction argument missing")]
    MissingArgument,

    #[error("location is read-only")]
    ReadOnlyLocation,

    #[error("jump target {0} out of range")]
    BadJumpTarget(i64),

    #[error("too many nested calls")]
    CallDepthExceeded,

    #[error("return without a pending call")]
    ReturnWithoutCall,

    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    #[error("{0} is not implemented by this host")]
    Unsupported(&'static str),

    #[error("host error {code}: {message}")]
    Host { code: u16, message: String },

    #[error("program rejected: {0}")]
    BadProgram(#[from] ProgramError),
}

impl Error {
    /// The numeric code published to the error registers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::StackExhausted => code::EVAL_SPACE,
            Error::StackUnderflow
            | Error::StackImbalance
            | Error::NoResult
            | Error::NoPendingText
            | Error::UnknownVariable(_)
            | Error::UnknownConstant(_)
            | Error::MissingArgument
            | Error::ReadOnlyLocation
            | Error::BadJumpTarget(_)
            | Error::ReturnWithoutCall
            | Error::UnknownOpcode(_)
            | Error::BadProgram(_) => code::STACK_FAULT,
            Error::UndefinedStep { .. } | Error::BadSource(_) | Error::UnknownExpression(_) => {
                code::BAD_EXPRESSION
            }
            Error::CallDepthExceeded => code::CALL_DEPTH,
            Error::Unsupported(_) => code::UNSUPPORTED,
            Error::Host { code, .. } => ErrorCode(*code),
        }
    }
}
