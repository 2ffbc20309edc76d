//! The instruction dispatcher and the public runtime facade.
//!
//! Each loop iteration fetches the record at the program counter,
//! advances the counter, gates on the record's guard chain, and routes by
//! opcode: control and move run in the core, the condition family goes to
//! the condition evaluator, entry-style instructions and the remaining
//! groups go to the host. After every instruction the pending-error check
//! runs the recovery protocol.

use tracing::{debug, error, info, instrument, trace};

use tabula_program::{
    ControlOp, ExprChunk, InstructionRecord, Kind, MoveOp, OpGroup, Program, Route, TypedValue,
};

use crate::condition;
use crate::context::{flag, reg, ChainRequest, Exec, RuntimeContext};
use crate::error::{Error, ErrorCode, Result};
use crate::eval;
use crate::host::{Host, NullHost};
use crate::resolve;

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The program ran off its end.
    Completed,
    /// The abort flag was raised.
    Aborted(AbortReason),
    /// A successor program was requested.
    ChainRequested { target: String, leave_open: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// An explicit terminate instruction.
    Requested,
    /// An unrecovered hard error.
    FatalError { code: ErrorCode, line: usize },
}

/// A validated program plus the context that executes it.
pub struct Runtime {
    program: Program,
    ctx: RuntimeContext,
}

impl Runtime {
    /// Validate and load a program, seeding a fresh context.
    pub fn load(program: Program) -> Result<Runtime> {
        program.validate()?;
        let ctx = RuntimeContext::new(&program);
        info!(records = program.records.len(), "program loaded");
        Ok(Runtime { program, ctx })
    }

    /// Execute until completion, abort, or chain request.
    #[instrument(skip_all)]
    pub fn run(&mut self, host: &mut dyn Host) -> ExitStatus {
        {
            let mut x = Exec {
                ctx: &mut self.ctx,
                program: &self.program,
                host,
            };
            while !x.ctx.control.abort {
                step(&mut x);
                if x.ctx.has_pending_error() {
                    recover(&mut x);
                }
            }
        }
        if let Some(ChainRequest { target }) = self.ctx.chain.take() {
            info!(chain = %target, "chain requested");
            return ExitStatus::ChainRequested {
                target,
                leave_open: self.ctx.leave_open,
            };
        }
        if let Some((code, line)) = self.ctx.control.fatal {
            return ExitStatus::Aborted(AbortReason::FatalError { code, line });
        }
        if self.ctx.control.completed {
            ExitStatus::Completed
        } else {
            ExitStatus::Aborted(AbortReason::Requested)
        }
    }

    /// Evaluate expression source against this runtime's state.
    pub fn evaluate_source(
        &mut self,
        host: &mut dyn Host,
        source: &str,
        target: Kind,
    ) -> Result<TypedValue> {
        let mut x = Exec {
            ctx: &mut self.ctx,
            program: &self.program,
            host,
        };
        eval::evaluate_source(&mut x, source, target)
    }

    /// Evaluate a compiled chunk against this runtime's state.
    pub fn evaluate_expr(
        &mut self,
        host: &mut dyn Host,
        chunk: &ExprChunk,
        target: Kind,
    ) -> Result<TypedValue> {
        let mut x = Exec {
            ctx: &mut self.ctx,
            program: &self.program,
            host,
        };
        eval::evaluate(&mut x, chunk, target)
    }

    pub fn indicator(&self, index: usize) -> bool {
        self.ctx.indicators.get(index)
    }

    pub fn set_indicator(&mut self, index: usize, value: bool) {
        self.ctx.indicators.set(index, value);
    }

    pub fn register(&self, index: usize) -> i32 {
        self.ctx.registers.get(index)
    }

    pub fn set_register(&mut self, index: usize, value: i32) {
        self.ctx.registers.set(index, value);
    }

    pub fn variable(&self, slot: u16) -> Option<&TypedValue> {
        self.ctx.variables.get(slot).ok()
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RuntimeContext {
        &mut self.ctx
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Evaluate expression source with no loaded program; the standalone entry
/// point collaborators use for form-input validation.
pub fn evaluate_standalone(source: &str, target: Kind) -> Result<TypedValue> {
    let program = Program::default();
    let mut ctx = RuntimeContext::new(&program);
    let mut host = NullHost;
    let mut x = Exec {
        ctx: &mut ctx,
        program: &program,
        host: &mut host,
    };
    eval::evaluate_source(&mut x, source, target)
}

fn step(x: &mut Exec<'_>) {
    let line = x.ctx.control.next;
    if line >= x.program.records.len() {
        x.ctx.control.completed = true;
        x.ctx.control.abort = true;
        return;
    }
    x.ctx.control.current = line;
    x.ctx.control.next = line + 1;
    let record = x.program.records[line];

    if !condition::guard_chain(&x.ctx.indicators, &record.guards, true) {
        return;
    }
    if x.ctx.debug_trace {
        debug!(line, opcode = record.opcode.0, "executing");
    }

    let outcome = match record.opcode.route() {
        Route::Entry => x.host.entry(x.ctx, x.program, &record),
        Route::Condition => condition::execute(x, &record),
        Route::Group(Some(OpGroup::Nop), _) => Ok(()),
        Route::Group(Some(OpGroup::Control), number) => control_op(x, number, &record),
        Route::Group(Some(OpGroup::Move), number) => move_op(x, number, &record),
        Route::Group(Some(group), _) => x.host.group(group, x.ctx, x.program, &record),
        Route::Group(None, _) => Err(Error::UnknownOpcode(record.opcode.0)),
    };
    if let Err(err) = outcome {
        trace!(line, error = %err, "instruction raised");
        x.ctx.raise_error(&err);
    }
}

fn control_op(x: &mut Exec<'_>, number: u8, record: &InstructionRecord) -> Result<()> {
    let op = ControlOp::from_number(number).ok_or(Error::UnknownOpcode(record.opcode.0))?;
    match op {
        ControlOp::Abort => {
            x.ctx.control.abort = true;
            if x.ctx.nest_level == 0 {
                x.ctx.leave_open = false;
            }
            Ok(())
        }
        ControlOp::Goto => {
            let target = resolve::read_int(x, &record.args[0])?;
            x.ctx.control.next =
                usize::try_from(target).map_err(|_| Error::BadJumpTarget(i64::from(target)))?;
            Ok(())
        }
        ControlOp::Gosub => {
            let target = resolve::read_int(x, &record.args[0])?;
            let target =
                usize::try_from(target).map_err(|_| Error::BadJumpTarget(i64::from(target)))?;
            x.ctx
                .registers
                .set(reg::LAST_CALL_LINE, x.ctx.control.current as i32);
            x.ctx.control.call(target)
        }
        ControlOp::Return => {
            x.ctx.control.ret()?;
            // An explicit target overrides the popped resume point.
            if !record.args[0].is_none() {
                let target = resolve::read_int(x, &record.args[0])?;
                if target > 0 {
                    x.ctx.control.next = target as usize;
                }
            }
            Ok(())
        }
        ControlOp::Debug => {
            x.ctx.debug_trace = !x.ctx.debug_trace;
            Ok(())
        }
        ControlOp::Chain => {
            let target = resolve::read_text(x, &record.args[0])?;
            let keep = if record.args[1].is_none() {
                false
            } else {
                resolve::read_int(x, &record.args[1])? != 0
            };
            x.ctx.leave_open = x.ctx.leave_open || keep;
            x.ctx.chain = Some(ChainRequest { target });
            x.ctx.control.abort = true;
            Ok(())
        }
        ControlOp::KeyCheck => {
            let live = x.host.key_pressed();
            x.ctx.indicators.set(flag::KEY_LIVE, live);
            Ok(())
        }
        ControlOp::RaiseError => {
            let number = resolve::read_int(x, &record.args[0])?;
            let message = if record.args[1].is_none() {
                String::new()
            } else {
                resolve::read_text(x, &record.args[1])?
            };
            x.ctx.raise(ErrorCode(number as u16), message);
            Ok(())
        }
        ControlOp::ErrClear => {
            x.host.clear_warning();
            x.ctx.indicators.set(flag::ERROR, false);
            Ok(())
        }
        ControlOp::ChainWait => {
            let command = resolve::read_text(x, &record.args[0])?;
            let wait = if record.args[1].is_none() {
                false
            } else {
                resolve::read_int(x, &record.args[1])? != 0
            };
            x.host.chain_wait(&command, wait)
        }
        ControlOp::OptSet => {
            let bit = resolve::read_int(x, &record.args[0])? & 31;
            x.ctx.options |= 1u32 << bit;
            Ok(())
        }
        ControlOp::OptClr => {
            let bit = resolve::read_int(x, &record.args[0])? & 31;
            x.ctx.options &= !(1u32 << bit);
            Ok(())
        }
    }
}

fn move_op(x: &mut Exec<'_>, number: u8, record: &InstructionRecord) -> Result<()> {
    let op = MoveOp::from_number(number).ok_or(Error::UnknownOpcode(record.opcode.0))?;
    match op {
        MoveOp::MoveText => copy_as(x, record, Kind::Text),
        MoveOp::MoveDecimal => copy_as(x, record, Kind::Decimal),
        MoveOp::MoveInt => copy_as(x, record, Kind::Int),
        MoveOp::MoveDate => copy_as(x, record, Kind::Date),
        MoveOp::MoveReal => copy_as(x, record, Kind::Real),
        MoveOp::Move => {
            let value = resolve::read_arg_natural(x, &record.args[0])?;
            resolve::write_arg(x, &record.args[1], value)
        }
        MoveOp::Incr => {
            let next = resolve::read_int(x, &record.args[0])?.wrapping_add(1);
            resolve::write_arg(x, &record.args[0], TypedValue::Int(next))?;
            let limit = resolve::read_int(x, &record.args[1])?;
            x.ctx.indicators.set(flag::LOOP_DONE, next > limit);
            Ok(())
        }
    }
}

fn copy_as(x: &mut Exec<'_>, record: &InstructionRecord, kind: Kind) -> Result<()> {
    let value = resolve::read_arg(x, &record.args[0], kind)?;
    resolve::write_arg(x, &record.args[1], value)
}

/// Post-instruction error recovery: publish the code and line to the
/// error registers, arm the user recovery subroutine when one is
/// configured and eligible, otherwise upgrade hard-fatal codes (and any
/// re-entry while recovery is active) to an abort.
fn recover(x: &mut Exec<'_>) {
    let Some((err_code, message)) = x.ctx.take_pending() else {
        return;
    };
    let line = x.ctx.control.error_line;
    x.ctx.registers.set(reg::ERROR_CODE, i32::from(err_code.0));
    x.ctx.registers.set(reg::ERROR_LINE, line as i32);

    let handler = x.ctx.registers.get(reg::ON_ERROR);
    let inside = x.ctx.control.recovery_armed();
    let eligible = handler > 0 && !x.ctx.indicators.get(flag::ERROR) && !inside;

    let mut fatal = false;
    if eligible {
        match x.ctx.control.call(handler as usize) {
            Ok(()) => x.ctx.control.arm_recovery(),
            Err(_) => fatal = true,
        }
        // Call-depth exhaustion aborts even when a handler takes it.
        if err_code == crate::error::code::CALL_DEPTH {
            fatal = true;
        }
    } else if err_code.is_fatal() || inside {
        fatal = true;
    }

    x.ctx.indicators.set(flag::ERROR, true);
    if fatal {
        error!(code = err_code.0, line, %message, "fatal error, aborting");
        x.ctx.control.abort = true;
        if x.ctx.control.fatal.is_none() {
            x.ctx.control.fatal = Some((err_code, line));
        }
        x.host.report_error(err_code, line, &message);
    } else {
        debug!(code = err_code.0, line, %message, "runtime error");
    }
}
