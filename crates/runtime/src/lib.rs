//! Tabula runtime: the 4GL execution core.
//!
//! Interprets a loaded instruction table line by line, gating each record
//! on its indicator guard chain, and evaluates compiled expressions on a
//! shared multi-view operand stack with reentrant save/restore semantics.

mod compile;
pub mod condition;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod host;
pub mod resolve;
pub mod stack;

pub use condition::{compare, guard_chain, pattern_match};
pub use context::{
    flag, reg, ChainRequest, Exec, IndicatorTable, RuntimeContext, INDICATOR_COUNT, MAX_CALL_DEPTH,
};
pub use dispatch::{evaluate_standalone, AbortReason, ExitStatus, Runtime};
pub use error::{code, Error, ErrorCode, Result};
pub use eval::{evaluate, evaluate_source, MAX_EVAL_DEPTH, REAL_TO_INT_TRUNCATES};
pub use host::{Host, NullHost};
pub use stack::{OperandStack, MIN_HEADROOM, STACK_BYTES};
