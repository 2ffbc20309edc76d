//! The collaborator surface.
//!
//! Database fields, window buffers, the console, and every instruction
//! group outside the core reach the runtime through this trait. Every
//! method has a refusing default so hosts implement only what their
//! environment provides; a missing collaborator is a program-visible
//! runtime error, not a crash.

use tabula_program::{InstructionRecord, Kind, OpGroup, Program, TypedValue};

use crate::context::RuntimeContext;
use crate::error::{Error, ErrorCode, Result};

pub trait Host {
    fn field_read(&mut self, _file: u8, _field: u8, _kind: Kind) -> Result<TypedValue> {
        Err(Error::Unsupported("database fields"))
    }

    fn field_write(&mut self, _file: u8, _field: u8, _value: TypedValue) -> Result<()> {
        Err(Error::Unsupported("database fields"))
    }

    fn window_read(&mut self, _slot: u16, _kind: Kind) -> Result<TypedValue> {
        Err(Error::Unsupported("window buffers"))
    }

    fn window_write(&mut self, _slot: u16, _value: TypedValue) -> Result<()> {
        Err(Error::Unsupported("window buffers"))
    }

    /// Open status of a data file; >= 2 means open.
    fn file_status(&mut self, _file: u8) -> u8 {
        0
    }

    /// True when a key press is waiting.
    fn key_pressed(&mut self) -> bool {
        false
    }

    /// Clear any warning line shown for an earlier error.
    fn clear_warning(&mut self) {}

    /// Execute one instruction from a group outside the core.
    fn group(
        &mut self,
        group: OpGroup,
        _ctx: &mut RuntimeContext,
        _program: &Program,
        _record: &InstructionRecord,
    ) -> Result<()> {
        Err(Error::Unsupported(group.name()))
    }

    /// Execute an entry-style (forms input) instruction.
    fn entry(
        &mut self,
        _ctx: &mut RuntimeContext,
        _program: &Program,
        _record: &InstructionRecord,
    ) -> Result<()> {
        Err(Error::Unsupported("entry instructions"))
    }

    /// Run another program and wait for it to finish.
    fn chain_wait(&mut self, _command: &str, _wait: bool) -> Result<()> {
        Err(Error::Unsupported("chain-wait"))
    }

    /// Final report when a run aborts on an error.
    fn report_error(&mut self, _code: ErrorCode, _line: usize, _message: &str) {}
}

/// A host that provides nothing. Standalone evaluation and tests.
#[derive(Debug, Default)]
pub struct NullHost;

impl Host for NullHost {}
