//! Interpreter state.
//!
//! Everything an executing program mutates lives in one `RuntimeContext`:
//! the indicator table, control state, system registers, variable space,
//! and the shared operand/text stacks. The original kept these as free
//! globals; gathering them gives single-owner mutation and makes the
//! reentrancy discipline explicit.

use tabula_program::{Program, TypedValue};

use crate::error::{Error, ErrorCode, Result};
use crate::host::Host;
use crate::stack::OperandStack;

/// Number of indicator flags.
pub const INDICATOR_COUNT: usize = 129;
/// Maximum call nesting.
pub const MAX_CALL_DEPTH: usize = 18;
/// Number of system registers.
pub const REGISTER_COUNT: usize = 128;

/// Reserved indicator indices. 0..=119 are general purpose; the high band
/// is set by the core and its collaborators.
pub mod flag {
    pub const MULTI_USER: usize = 120;
    pub const SEQ_EOL: usize = 121;
    /// Set by `Incr` when the counter passes its limit.
    pub const LOOP_DONE: usize = 122;
    /// Set by `KeyCheck` when a key is waiting.
    pub const KEY_LIVE: usize = 123;
    pub const PAGE_BREAK: usize = 124;
    /// Last sequential read hit end of input.
    pub const SEQ_AT_END: usize = 125;
    /// Last database operation failed.
    pub const FILE_ERROR: usize = 126;
    /// Last instruction raised an error.
    pub const ERROR: usize = 127;
}

/// Assigned system-register indices.
pub mod reg {
    /// Line of the most recent call instruction.
    pub const LAST_CALL_LINE: usize = 0;
    /// Code of the last runtime error.
    pub const ERROR_CODE: usize = 5;
    /// Line of the last runtime error.
    pub const ERROR_LINE: usize = 6;
    /// Error-recovery subroutine address; 0 disables recovery.
    pub const ON_ERROR: usize = 31;
}

/// The process-wide indicator table.
#[derive(Debug)]
pub struct IndicatorTable {
    flags: [bool; INDICATOR_COUNT],
}

impl Default for IndicatorTable {
    fn default() -> Self {
        IndicatorTable {
            flags: [false; INDICATOR_COUNT],
        }
    }
}

impl IndicatorTable {
    /// Out-of-range indices read false.
    pub fn get(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    /// Out-of-range writes are ignored.
    pub fn set(&mut self, index: usize, value: bool) {
        if let Some(slot) = self.flags.get_mut(index) {
            *slot = value;
        }
    }

    pub fn clear_all(&mut self) {
        self.flags = [false; INDICATOR_COUNT];
    }
}

/// The system register file.
#[derive(Debug)]
pub struct Registers {
    values: [i32; REGISTER_COUNT],
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            values: [0; REGISTER_COUNT],
        }
    }
}

impl Registers {
    pub fn get(&self, index: usize) -> i32 {
        self.values.get(index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, value: i32) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }
}

/// Typed program variables, seeded from the program's declarations.
#[derive(Debug, Default)]
pub struct VariableSpace {
    slots: Vec<TypedValue>,
}

impl VariableSpace {
    pub fn seed(values: &[TypedValue]) -> VariableSpace {
        VariableSpace {
            slots: values.to_vec(),
        }
    }

    pub fn get(&self, slot: u16) -> Result<&TypedValue> {
        self.slots
            .get(usize::from(slot))
            .ok_or(Error::UnknownVariable(slot))
    }

    pub fn set(&mut self, slot: u16, value: TypedValue) -> Result<()> {
        match self.slots.get_mut(usize::from(slot)) {
            Some(entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(Error::UnknownVariable(slot)),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Owned pending-text stack. Replaces the original's single scratch
/// buffer; the width-one invariant becomes a saved/restored watermark.
#[derive(Debug, Default)]
pub struct TextStack {
    items: Vec<String>,
}

impl TextStack {
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn truncate(&mut self, depth: usize) {
        self.items.truncate(depth);
    }

    pub fn push(&mut self, text: String) {
        self.items.push(text);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop()
    }

    /// Length of the pending text, or 0 when none is staged.
    pub fn pending_len(&self) -> usize {
        self.items.last().map(String::len).unwrap_or(0)
    }
}

/// Call/return, abort, and error state.
#[derive(Debug)]
pub struct ControlState {
    /// Index of the next record to execute.
    pub next: usize,
    /// Index of the record currently executing.
    pub current: usize,
    return_stack: [usize; MAX_CALL_DEPTH],
    depth: usize,
    /// Monotonic abort flag; only a fresh load clears it.
    pub abort: bool,
    pending: Option<(ErrorCode, String)>,
    /// Line the pending error was raised on.
    pub error_line: usize,
    recovery_depth: Option<usize>,
    /// Set when the program ran off its end.
    pub completed: bool,
    /// Unrecovered hard failure, if any.
    pub fatal: Option<(ErrorCode, usize)>,
}

impl Default for ControlState {
    fn default() -> Self {
        ControlState {
            next: 0,
            current: 0,
            return_stack: [0; MAX_CALL_DEPTH],
            depth: 0,
            abort: false,
            pending: None,
            error_line: 0,
            recovery_depth: None,
            completed: false,
            fatal: None,
        }
    }
}

impl ControlState {
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Push the resume point and jump. Refuses the push past the bound;
    /// the caller raises code 97.
    pub fn call(&mut self, target: usize) -> Result<()> {
        if self.depth == MAX_CALL_DEPTH {
            return Err(Error::CallDepthExceeded);
        }
        self.return_stack[self.depth] = self.next;
        self.depth += 1;
        self.next = target;
        Ok(())
    }

    /// Pop one frame. Returning from the depth the recovery handler was
    /// armed at releases the recovery latch.
    pub fn ret(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::ReturnWithoutCall);
        }
        if self.recovery_depth == Some(self.depth) {
            self.recovery_depth = None;
        }
        self.depth -= 1;
        self.next = self.return_stack[self.depth];
        Ok(())
    }

    /// Record that recovery entered at the current depth.
    pub fn arm_recovery(&mut self) {
        self.recovery_depth = Some(self.depth);
    }

    pub fn recovery_armed(&self) -> bool {
        self.recovery_depth.is_some()
    }
}

/// A requested successor program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRequest {
    pub target: String,
}

/// Everything an executing program mutates.
#[derive(Debug)]
pub struct RuntimeContext {
    pub indicators: IndicatorTable,
    pub control: ControlState,
    pub registers: Registers,
    pub variables: VariableSpace,
    pub operands: OperandStack,
    pub texts: TextStack,
    /// Nested-evaluation depth, bounded alongside stack headroom.
    pub(crate) eval_depth: usize,
    /// Runtime option bits.
    pub options: u32,
    /// Per-line execution tracing toggle.
    pub debug_trace: bool,
    /// Successor program captured by the chain handler.
    pub chain: Option<ChainRequest>,
    /// Survives a terminate so an outer run loop keeps resources open.
    pub leave_open: bool,
    /// Sub-program nesting level, set by the embedding host.
    pub nest_level: u32,
}

impl RuntimeContext {
    pub fn new(program: &Program) -> RuntimeContext {
        RuntimeContext {
            indicators: IndicatorTable::default(),
            control: ControlState::default(),
            registers: Registers::default(),
            variables: VariableSpace::seed(&program.variables),
            operands: OperandStack::new(),
            texts: TextStack::default(),
            eval_depth: 0,
            options: 0,
            debug_trace: false,
            chain: None,
            leave_open: false,
            nest_level: 0,
        }
    }

    /// Latch a runtime error; the first unhandled error per instruction
    /// wins.
    pub fn raise(&mut self, code: ErrorCode, message: impl Into<String>) {
        if self.control.pending.is_none() {
            self.control.error_line = self.control.current;
            self.control.pending = Some((code, message.into()));
        }
    }

    pub fn raise_error(&mut self, error: &Error) {
        self.raise(error.code(), error.to_string());
    }

    pub fn has_pending_error(&self) -> bool {
        self.control.pending.is_some()
    }

    /// Code of the pending error, if any.
    pub fn pending_error(&self) -> Option<ErrorCode> {
        self.control.pending.as_ref().map(|(code, _)| *code)
    }

    pub(crate) fn take_pending(&mut self) -> Option<(ErrorCode, String)> {
        self.control.pending.take()
    }
}

/// Borrowed execution bundle threaded through every handler.
pub struct Exec<'a> {
    pub ctx: &'a mut RuntimeContext,
    pub program: &'a Program,
    pub host: &'a mut dyn Host,
}
