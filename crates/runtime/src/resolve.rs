//! Location-descriptor argument resolution.
//!
//! Constants, variables, and registers resolve in-core; fields and
//! windows go to the host; nested expressions re-enter the engine. Kind
//! coercion happens here on both reads and writes; text requested as a
//! numeric kind is evaluated as expression source, per the engine's
//! conversion rules.

use tabula_program::{Kind, LocationDescriptor, Place, Program, TypedValue};

use crate::context::{Exec, RuntimeContext};
use crate::error::{Error, Result};
use crate::eval;

/// Read a value at the requested kind.
pub fn read_arg(x: &mut Exec<'_>, desc: &LocationDescriptor, kind: Kind) -> Result<TypedValue> {
    let raw = match desc.place {
        Place::None | Place::Guards(_) => return Err(Error::MissingArgument),
        Place::Const(index) => x
            .program
            .constants
            .get(usize::from(index))
            .cloned()
            .ok_or(Error::UnknownConstant(index))?,
        Place::Variable(slot) => x.ctx.variables.get(slot)?.clone(),
        Place::Register(index) => TypedValue::Int(x.ctx.registers.get(usize::from(index))),
        Place::Window(slot) => x.host.window_read(slot, kind)?,
        Place::Field { file, field } => x.host.field_read(file, field, kind)?,
        Place::Expr(index) => {
            let program = x.program;
            let chunk = program
                .expressions
                .get(usize::from(index))
                .ok_or(Error::UnknownExpression(index))?;
            eval::run_chunk(x, chunk)?
        }
    };
    coerce(x, raw, kind)
}

/// Read an argument at its descriptor's own kind.
pub fn read_arg_natural(x: &mut Exec<'_>, desc: &LocationDescriptor) -> Result<TypedValue> {
    read_arg(x, desc, desc.kind)
}

/// Convenience integer read.
pub fn read_int(x: &mut Exec<'_>, desc: &LocationDescriptor) -> Result<i32> {
    Ok(read_arg(x, desc, Kind::Int)?.as_int().unwrap_or(0))
}

/// Convenience text read.
pub fn read_text(x: &mut Exec<'_>, desc: &LocationDescriptor) -> Result<String> {
    match read_arg(x, desc, Kind::Text)? {
        TypedValue::Text(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Write a value, coercing to the descriptor's kind.
pub fn write_arg(x: &mut Exec<'_>, desc: &LocationDescriptor, value: TypedValue) -> Result<()> {
    let value = coerce(x, value, desc.kind)?;
    match desc.place {
        Place::None | Place::Guards(_) => Err(Error::MissingArgument),
        Place::Const(_) | Place::Expr(_) => Err(Error::ReadOnlyLocation),
        Place::Variable(slot) => x.ctx.variables.set(slot, value),
        Place::Register(index) => {
            x.ctx.registers.set(usize::from(index), value.as_int().unwrap_or(0));
            Ok(())
        }
        Place::Window(slot) => x.host.window_write(slot, value),
        Place::Field { file, field } => x.host.field_write(file, field, value),
    }
}

/// Coerce a value to a kind. Text→numeric re-enters the expression
/// engine: a text operand may itself be an expression.
pub fn coerce(x: &mut Exec<'_>, value: TypedValue, kind: Kind) -> Result<TypedValue> {
    if value.kind() == kind {
        return Ok(value);
    }
    if let TypedValue::Text(source) = value {
        return eval::evaluate_source(x, &source, kind);
    }
    value.convert(kind).ok_or(Error::MissingArgument)
}

/// Engine-free resolution for host implementations: constants, variables,
/// and registers only, with numeric-to-numeric coercion.
pub fn read_arg_simple(
    ctx: &RuntimeContext,
    program: &Program,
    desc: &LocationDescriptor,
    kind: Kind,
) -> Result<TypedValue> {
    let raw = match desc.place {
        Place::Const(index) => program
            .constants
            .get(usize::from(index))
            .cloned()
            .ok_or(Error::UnknownConstant(index))?,
        Place::Variable(slot) => ctx.variables.get(slot)?.clone(),
        Place::Register(index) => TypedValue::Int(ctx.registers.get(usize::from(index))),
        _ => return Err(Error::Unsupported("indirect argument")),
    };
    if raw.kind() == kind {
        Ok(raw)
    } else {
        raw.convert(kind).ok_or(Error::Unsupported("text coercion"))
    }
}
