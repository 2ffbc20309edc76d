//! Typed runtime values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::date::Date;
use crate::decimal::{self, Decimal};

/// Value kind carried by every operand and expression-stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Text,
    Decimal,
    Date,
    Int,
    Real,
}

impl Kind {
    /// Width of one value of this kind on the operand stack, in bytes.
    /// Text never lives on the operand stack; dates take the decimal band.
    pub fn stack_width(self) -> usize {
        match self {
            Kind::Text => 0,
            Kind::Int => 4,
            Kind::Real => 8,
            Kind::Decimal | Kind::Date => decimal::PACKED_WIDTH,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown value kind {0:?}")]
pub struct ParseKindError(String);

impl FromStr for Kind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Kind, ParseKindError> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Kind::Text),
            "decimal" => Ok(Kind::Decimal),
            "date" => Ok(Kind::Date),
            "int" | "integer" => Ok(Kind::Int),
            "real" => Ok(Kind::Real),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// A tagged runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Text(String),
    Decimal(Decimal),
    Date(Date),
    Int(i32),
    Real(f64),
}

impl TypedValue {
    pub fn kind(&self) -> Kind {
        match self {
            TypedValue::Text(_) => Kind::Text,
            TypedValue::Decimal(_) => Kind::Decimal,
            TypedValue::Date(_) => Kind::Date,
            TypedValue::Int(_) => Kind::Int,
            TypedValue::Real(_) => Kind::Real,
        }
    }

    /// The zero/empty value of a kind.
    pub fn zero(kind: Kind) -> TypedValue {
        match kind {
            Kind::Text => TypedValue::Text(String::new()),
            Kind::Decimal => TypedValue::Decimal(Decimal::ZERO),
            Kind::Date => TypedValue::Date(Date::from_day_number(0)),
            Kind::Int => TypedValue::Int(0),
            Kind::Real => TypedValue::Real(0.0),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            TypedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            TypedValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            TypedValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to another kind without consulting the expression engine.
    ///
    /// Returns `None` for text-to-numeric conversions, which go through
    /// recursive expression evaluation instead (a text operand may itself
    /// be an expression); the runtime supplies that path.
    pub fn convert(self, kind: Kind) -> Option<TypedValue> {
        if self.kind() == kind {
            return Some(self);
        }
        Some(match (self, kind) {
            (TypedValue::Int(v), Kind::Real) => TypedValue::Real(f64::from(v)),
            (TypedValue::Int(v), Kind::Decimal) => TypedValue::Decimal(Decimal::from_int(v)),
            (TypedValue::Int(v), Kind::Date) => TypedValue::Date(Date::from_day_number(v)),
            (TypedValue::Int(v), Kind::Text) => TypedValue::Text(v.to_string()),

            // Real→int truncates toward zero; `Round` is the rounding path.
            (TypedValue::Real(v), Kind::Int) => TypedValue::Int(v as i32),
            (TypedValue::Real(v), Kind::Decimal) => TypedValue::Decimal(Decimal::from_real(v)),
            (TypedValue::Real(v), Kind::Date) => TypedValue::Date(Date::from_day_number(v as i32)),
            (TypedValue::Real(v), Kind::Text) => TypedValue::Text(v.to_string()),

            (TypedValue::Decimal(d), Kind::Int) => TypedValue::Int(d.to_int()),
            (TypedValue::Decimal(d), Kind::Real) => TypedValue::Real(d.to_real()),
            (TypedValue::Decimal(d), Kind::Date) => TypedValue::Date(Date::from_day_number(d.to_int())),
            (TypedValue::Decimal(d), Kind::Text) => TypedValue::Text(d.to_string()),

            (TypedValue::Date(d), Kind::Int) => TypedValue::Int(d.day_number()),
            (TypedValue::Date(d), Kind::Real) => TypedValue::Real(f64::from(d.day_number())),
            (TypedValue::Date(d), Kind::Decimal) => {
                TypedValue::Decimal(Decimal::from_int(d.day_number()))
            }
            (TypedValue::Date(d), Kind::Text) => TypedValue::Text(d.to_string()),

            // Text→numeric defers to the engine; same-kind pairs returned
            // above.
            _ => return None,
        })
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Text(s) => f.write_str(s),
            TypedValue::Decimal(d) => d.fmt(f),
            TypedValue::Date(d) => d.fmt(f),
            TypedValue::Int(v) => v.fmt(f),
            TypedValue::Real(v) => v.fmt(f),
        }
    }
}
