//! The expression engine.
//!
//! Executes compiled chunks against the shared operand stack. Every entry
//! saves the stack cursor and text watermark and restores them on every
//! exit path, because conversions and sub-expression calls recurse back
//! in; an inner invocation can never pop below the cursor it observed on
//! entry. After execution the cursor must sit exactly where it started;
//! anything else is a fatal internal inconsistency, not a recoverable
//! error.

use tracing::trace;

use tabula_program::{Date, Decimal, ExprChunk, ExprOp, Kind, Step, TypedValue};

use crate::compile;
use crate::context::Exec;
use crate::error::{code, Error, Result};
use crate::resolve;
use crate::stack::MIN_HEADROOM;

/// Real→integer conversions truncate toward zero; the `Round` step is the
/// only rounding path.
pub const REAL_TO_INT_TRUNCATES: bool = true;

/// Bound on nested evaluations, alongside the byte-headroom check.
pub const MAX_EVAL_DEPTH: usize = 32;

/// Evaluate a compiled chunk and coerce the result to `target`.
pub fn evaluate(x: &mut Exec<'_>, chunk: &ExprChunk, target: Kind) -> Result<TypedValue> {
    let value = run_chunk(x, chunk)?;
    resolve::coerce(x, value, target)
}

/// Evaluate expression source text. Wholly numeric text parses directly
/// (the fast path); anything else compiles to a fresh chunk and runs.
pub fn evaluate_source(x: &mut Exec<'_>, source: &str, target: Kind) -> Result<TypedValue> {
    if let Some(value) = compile::parse_literal(source, target) {
        return Ok(value);
    }
    trace!(source, kind = ?target, "compiling expression source");
    let chunk = compile::compile(source, target)?;
    let value = run_chunk(x, &chunk)?;
    resolve::coerce(x, value, target)
}

/// Execute a chunk reentrantly: save the cursor and text watermark, run,
/// verify balance, restore.
pub(crate) fn run_chunk(x: &mut Exec<'_>, chunk: &ExprChunk) -> Result<TypedValue> {
    if x.ctx.operands.headroom() < MIN_HEADROOM || x.ctx.eval_depth >= MAX_EVAL_DEPTH {
        return Err(Error::StackExhausted);
    }
    let floor = x.ctx.operands.cursor();
    let text_mark = x.ctx.texts.depth();
    x.ctx.eval_depth += 1;
    let outcome = exec_steps(x, chunk, floor);
    x.ctx.eval_depth -= 1;
    x.ctx.operands.truncate(floor);
    x.ctx.texts.truncate(text_mark);
    outcome
}

fn exec_steps(x: &mut Exec<'_>, chunk: &ExprChunk, floor: usize) -> Result<TypedValue> {
    let mut result = None;
    for step in &chunk.steps {
        run_step(x, chunk, *step, floor, &mut result)?;
    }
    if x.ctx.operands.cursor() != floor {
        return Err(Error::StackImbalance);
    }
    result.ok_or(Error::NoResult)
}

fn push_value(x: &mut Exec<'_>, value: TypedValue) -> Result<()> {
    match value {
        TypedValue::Int(v) => x.ctx.operands.push_int(v),
        TypedValue::Real(v) => x.ctx.operands.push_real(v),
        TypedValue::Decimal(d) => x.ctx.operands.push_decimal(d),
        // Dates take the decimal band.
        TypedValue::Date(d) => x.ctx.operands.push_decimal(Decimal::from_int(d.day_number())),
        TypedValue::Text(s) => {
            x.ctx.texts.push(s);
            Ok(())
        }
    }
}

fn pop_value(x: &mut Exec<'_>, kind: Kind, floor: usize) -> Result<TypedValue> {
    Ok(match kind {
        Kind::Int => TypedValue::Int(x.ctx.operands.pop_int(floor)?),
        Kind::Real => TypedValue::Real(x.ctx.operands.pop_real(floor)?),
        Kind::Decimal => TypedValue::Decimal(x.ctx.operands.pop_decimal(floor)?),
        Kind::Date => {
            let days = x.ctx.operands.pop_decimal(floor)?.to_int();
            TypedValue::Date(Date::from_day_number(days))
        }
        Kind::Text => TypedValue::Text(x.ctx.texts.pop().ok_or(Error::NoPendingText)?),
    })
}

/// Trap a non-finite result: latch code 59 and substitute zero.
fn finite_or_zero(x: &mut Exec<'_>, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        x.ctx.raise(code::MATH_DOMAIN, "numeric fault");
        0.0
    }
}

fn undefined(op: ExprOp, kind: Kind) -> Error {
    Error::UndefinedStep { op, kind }
}

fn run_step(
    x: &mut Exec<'_>,
    chunk: &ExprChunk,
    step: Step,
    floor: usize,
    result: &mut Option<TypedValue>,
) -> Result<()> {
    let Step { op, kind } = step;
    match op {
        ExprOp::Literal(index) => {
            let value = chunk
                .literals
                .get(usize::from(index))
                .cloned()
                .ok_or(Error::UnknownConstant(index))?;
            let value = resolve::coerce(x, value, kind)?;
            push_value(x, value)
        }
        ExprOp::LoadField { file, field } => {
            let value = x.host.field_read(file, field, kind)?;
            let value = resolve::coerce(x, value, kind)?;
            push_value(x, value)
        }
        ExprOp::LoadVariable(slot) => {
            let value = x.ctx.variables.get(slot)?.clone();
            let value = resolve::coerce(x, value, kind)?;
            push_value(x, value)
        }
        ExprOp::LoadArg(index) => {
            let descriptor = *chunk
                .args
                .get(usize::from(index))
                .ok_or(Error::MissingArgument)?;
            let value = resolve::read_arg(x, &descriptor, kind)?;
            push_value(x, value)
        }
        ExprOp::CallExpr(index) => {
            let program = x.program;
            let sub = program
                .expressions
                .get(usize::from(index))
                .ok_or(Error::UnknownExpression(index))?;
            let value = run_chunk(x, sub)?;
            let value = resolve::coerce(x, value, kind)?;
            push_value(x, value)
        }

        ExprOp::Add | ExprOp::Sub | ExprOp::Mul | ExprOp::Div => binary_arith(x, op, kind, floor),

        ExprOp::BitAnd | ExprOp::BitOr => {
            if kind != Kind::Int {
                return Err(undefined(op, kind));
            }
            let b = x.ctx.operands.pop_int(floor)?;
            let a = x.ctx.operands.pop_int(floor)?;
            let value = if op == ExprOp::BitAnd { a & b } else { a | b };
            x.ctx.operands.push_int(value)
        }

        ExprOp::Min | ExprOp::Max => reducer(x, op, kind, floor),

        ExprOp::Neg => match kind {
            Kind::Int => {
                let v = x.ctx.operands.pop_int(floor)?;
                x.ctx.operands.push_int(v.wrapping_neg())
            }
            Kind::Real => {
                let v = x.ctx.operands.pop_real(floor)?;
                x.ctx.operands.push_real(-v)
            }
            Kind::Decimal | Kind::Date => {
                let v = x.ctx.operands.pop_decimal(floor)?;
                x.ctx.operands.push_decimal(v.neg())
            }
            Kind::Text => Err(undefined(op, kind)),
        },

        ExprOp::Abs => match kind {
            Kind::Int => {
                let v = x.ctx.operands.pop_int(floor)?;
                x.ctx.operands.push_int(v.wrapping_abs())
            }
            Kind::Real => {
                let v = x.ctx.operands.pop_real(floor)?;
                x.ctx.operands.push_real(v.abs())
            }
            Kind::Decimal | Kind::Date => {
                let v = x.ctx.operands.pop_decimal(floor)?;
                x.ctx.operands.push_decimal(v.abs())
            }
            Kind::Text => Err(undefined(op, kind)),
        },

        ExprOp::ToInt => match kind {
            Kind::Text => {
                let source = x.ctx.texts.pop().ok_or(Error::NoPendingText)?;
                let value = evaluate_source(x, &source, Kind::Int)?;
                push_value(x, value)
            }
            Kind::Decimal | Kind::Date => {
                let v = x.ctx.operands.pop_decimal(floor)?;
                x.ctx.operands.push_int(v.to_int())
            }
            Kind::Real => {
                let v = x.ctx.operands.pop_real(floor)?;
                x.ctx.operands.push_int(v as i32)
            }
            Kind::Int => Err(undefined(op, kind)),
        },

        ExprOp::ToReal => match kind {
            Kind::Text => {
                let source = x.ctx.texts.pop().ok_or(Error::NoPendingText)?;
                let value = evaluate_source(x, &source, Kind::Real)?;
                push_value(x, value)
            }
            Kind::Decimal | Kind::Date => {
                let v = x.ctx.operands.pop_decimal(floor)?;
                x.ctx.operands.push_real(v.to_real())
            }
            Kind::Int => {
                let v = x.ctx.operands.pop_int(floor)?;
                x.ctx.operands.push_real(f64::from(v))
            }
            Kind::Real => Err(undefined(op, kind)),
        },

        ExprOp::ToDecimal => match kind {
            Kind::Text => {
                let source = x.ctx.texts.pop().ok_or(Error::NoPendingText)?;
                let value = evaluate_source(x, &source, Kind::Decimal)?;
                push_value(x, value)
            }
            Kind::Int => {
                let v = x.ctx.operands.pop_int(floor)?;
                x.ctx.operands.push_decimal(Decimal::from_int(v))
            }
            Kind::Real => {
                let v = x.ctx.operands.pop_real(floor)?;
                x.ctx.operands.push_decimal(Decimal::from_real(v))
            }
            Kind::Decimal | Kind::Date => Err(undefined(op, kind)),
        },

        ExprOp::ToDate => match kind {
            Kind::Text => {
                // Date text parses directly; garbage reads as day zero.
                let source = x.ctx.texts.pop().ok_or(Error::NoPendingText)?;
                let days = source.trim().parse::<Date>().map(Date::day_number).unwrap_or(0);
                x.ctx.operands.push_decimal(Decimal::from_int(days))
            }
            Kind::Int => {
                let v = x.ctx.operands.pop_int(floor)?;
                x.ctx.operands.push_decimal(Decimal::from_int(v))
            }
            Kind::Real => {
                let v = x.ctx.operands.pop_real(floor)?;
                x.ctx.operands.push_decimal(Decimal::from_real(v))
            }
            Kind::Decimal | Kind::Date => Err(undefined(op, kind)),
        },

        ExprOp::ToText => {
            let text = match kind {
                Kind::Int => x.ctx.operands.pop_int(floor)?.to_string(),
                Kind::Real => x.ctx.operands.pop_real(floor)?.to_string(),
                Kind::Decimal => x.ctx.operands.pop_decimal(floor)?.to_string(),
                Kind::Date => {
                    let days = x.ctx.operands.pop_decimal(floor)?.to_int();
                    Date::from_day_number(days).to_string()
                }
                Kind::Text => return Err(undefined(op, kind)),
            };
            x.ctx.texts.push(text);
            Ok(())
        }

        ExprOp::Round => match kind {
            Kind::Real => {
                let v = x.ctx.operands.pop_real(floor)?;
                let shifted = if v >= 0.0 { v + 0.5 } else { v - 0.5 };
                x.ctx.operands.push_int(shifted as i32)
            }
            _ => Err(undefined(op, kind)),
        },

        ExprOp::Length => match kind {
            Kind::Text => {
                let len = x.ctx.texts.pending_len() as i32;
                x.ctx.operands.push_int(len)
            }
            _ => Err(undefined(op, kind)),
        },

        ExprOp::Output => {
            *result = Some(pop_value(x, kind, floor)?);
            Ok(())
        }

        ExprOp::Log
        | ExprOp::Exp
        | ExprOp::Sin
        | ExprOp::Asin
        | ExprOp::Cos
        | ExprOp::Acos
        | ExprOp::Tan
        | ExprOp::Atan
        | ExprOp::Sqrt
        | ExprOp::Pow => real_fn(x, op, kind, floor),
    }
}

fn binary_arith(x: &mut Exec<'_>, op: ExprOp, kind: Kind, floor: usize) -> Result<()> {
    match kind {
        Kind::Int => {
            let b = x.ctx.operands.pop_int(floor)?;
            let a = x.ctx.operands.pop_int(floor)?;
            let value = match op {
                ExprOp::Add => a.wrapping_add(b),
                ExprOp::Sub => a.wrapping_sub(b),
                ExprOp::Mul => a.wrapping_mul(b),
                // Division by zero yields zero, not an error.
                ExprOp::Div => {
                    if b == 0 {
                        0
                    } else {
                        a.wrapping_div(b)
                    }
                }
                _ => return Err(undefined(op, kind)),
            };
            x.ctx.operands.push_int(value)
        }
        Kind::Real => {
            let b = x.ctx.operands.pop_real(floor)?;
            let a = x.ctx.operands.pop_real(floor)?;
            let value = match op {
                ExprOp::Add => a + b,
                ExprOp::Sub => a - b,
                ExprOp::Mul => a * b,
                ExprOp::Div => {
                    if b == 0.0 {
                        0.0
                    } else {
                        a / b
                    }
                }
                _ => return Err(undefined(op, kind)),
            };
            let value = finite_or_zero(x, value);
            x.ctx.operands.push_real(value)
        }
        Kind::Decimal | Kind::Date => {
            let b = x.ctx.operands.pop_decimal(floor)?;
            let a = x.ctx.operands.pop_decimal(floor)?;
            let value = match op {
                ExprOp::Add => a.add(b),
                ExprOp::Sub => a.sub(b),
                ExprOp::Mul => a.mul(b),
                // Delegates the zero policy to the decimal implementation.
                ExprOp::Div => a.div(b),
                _ => return Err(undefined(op, kind)),
            };
            x.ctx.operands.push_decimal(value)
        }
        Kind::Text => Err(undefined(op, kind)),
    }
}

fn reducer(x: &mut Exec<'_>, op: ExprOp, kind: Kind, floor: usize) -> Result<()> {
    let minimum = op == ExprOp::Min;
    match kind {
        Kind::Int => {
            let b = x.ctx.operands.pop_int(floor)?;
            let a = x.ctx.operands.pop_int(floor)?;
            x.ctx.operands.push_int(if minimum { a.min(b) } else { a.max(b) })
        }
        Kind::Real => {
            let b = x.ctx.operands.pop_real(floor)?;
            let a = x.ctx.operands.pop_real(floor)?;
            x.ctx.operands.push_real(if minimum { a.min(b) } else { a.max(b) })
        }
        Kind::Decimal | Kind::Date => {
            let b = x.ctx.operands.pop_decimal(floor)?;
            let a = x.ctx.operands.pop_decimal(floor)?;
            x.ctx.operands.push_decimal(if minimum { a.min(b) } else { a.max(b) })
        }
        Kind::Text => Err(undefined(op, kind)),
    }
}

fn real_fn(x: &mut Exec<'_>, op: ExprOp, kind: Kind, floor: usize) -> Result<()> {
    if kind != Kind::Real {
        return Err(undefined(op, kind));
    }
    if op == ExprOp::Pow {
        let b = x.ctx.operands.pop_real(floor)?;
        let a = x.ctx.operands.pop_real(floor)?;
        let value = if a < 0.0 {
            // Negative base: compute on the magnitude, fault on a
            // fractional exponent, negate for odd integer exponents.
            let magnitude = (-a).powf(b);
            if b.fract() != 0.0 {
                x.ctx.raise(code::MATH_DOMAIN, "negative base raised to fractional power");
            }
            if (b as i64) & 1 == 1 {
                -magnitude
            } else {
                magnitude
            }
        } else {
            a.powf(b)
        };
        let value = finite_or_zero(x, value);
        return x.ctx.operands.push_real(value);
    }
    let a = x.ctx.operands.pop_real(floor)?;
    let value = match op {
        ExprOp::Log => {
            if a <= 0.0 {
                x.ctx.raise(code::MATH_DOMAIN, "log of non-positive value");
                0.0
            } else {
                a.ln()
            }
        }
        ExprOp::Exp => a.exp(),
        ExprOp::Sin => a.sin(),
        ExprOp::Asin => a.asin(),
        ExprOp::Cos => a.cos(),
        ExprOp::Acos => a.acos(),
        ExprOp::Tan => a.tan(),
        ExprOp::Atan => a.atan(),
        // Square root of the absolute value.
        ExprOp::Sqrt => a.abs().sqrt(),
        _ => return Err(undefined(op, kind)),
    };
    let value = finite_or_zero(x, value);
    x.ctx.operands.push_real(value)
}
