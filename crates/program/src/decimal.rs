//! Fixed-point decimal numbers.
//!
//! The 4GL's money/numeric type: a signed value with six implied fractional
//! digits, stored as a scaled `i128` and packed to 12 bytes on the operand
//! stack. Division by zero yields zero by policy; overflow saturates.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Implied fractional digits.
pub const SCALE: u32 = 6;
/// Packed width of one decimal on the operand stack, in bytes.
pub const PACKED_WIDTH: usize = 12;

const FACTOR: i128 = 1_000_000;
/// Largest raw magnitude that fits the 12-byte packed form (signed 96 bits).
const MAX_RAW: i128 = (1i128 << 95) - 1;
const MIN_RAW: i128 = -(1i128 << 95);

/// A fixed-point decimal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(i128);

impl Decimal {
    pub const ZERO: Decimal = Decimal(0);

    /// Build from a raw scaled representation (`value * 10^SCALE`).
    pub fn from_raw(raw: i128) -> Decimal {
        Decimal(raw.clamp(MIN_RAW, MAX_RAW))
    }

    /// The raw scaled representation.
    pub fn raw(self) -> i128 {
        self.0
    }

    pub fn from_int(value: i32) -> Decimal {
        Decimal(i128::from(value) * FACTOR)
    }

    pub fn from_real(value: f64) -> Decimal {
        if !value.is_finite() {
            return Decimal::ZERO;
        }
        let scaled = (value * FACTOR as f64).round();
        if scaled >= MAX_RAW as f64 {
            Decimal(MAX_RAW)
        } else if scaled <= MIN_RAW as f64 {
            Decimal(MIN_RAW)
        } else {
            Decimal(scaled as i128)
        }
    }

    /// Truncate toward zero to a 32-bit integer, saturating at the ends.
    pub fn to_int(self) -> i32 {
        (self.0 / FACTOR).clamp(i128::from(i32::MIN), i128::from(i32::MAX)) as i32
    }

    pub fn to_real(self) -> f64 {
        self.0 as f64 / FACTOR as f64
    }

    pub fn add(self, rhs: Decimal) -> Decimal {
        Decimal::from_raw(self.0.saturating_add(rhs.0))
    }

    pub fn sub(self, rhs: Decimal) -> Decimal {
        Decimal::from_raw(self.0.saturating_sub(rhs.0))
    }

    pub fn mul(self, rhs: Decimal) -> Decimal {
        match self.0.checked_mul(rhs.0) {
            Some(product) => Decimal::from_raw(product / FACTOR),
            None => {
                if (self.0 < 0) == (rhs.0 < 0) {
                    Decimal(MAX_RAW)
                } else {
                    Decimal(MIN_RAW)
                }
            }
        }
    }

    /// Division by zero yields zero.
    pub fn div(self, rhs: Decimal) -> Decimal {
        if rhs.0 == 0 {
            return Decimal::ZERO;
        }
        match self.0.checked_mul(FACTOR) {
            Some(scaled) => Decimal::from_raw(scaled / rhs.0),
            None => {
                // Re-associate to keep the magnitude in range at some
                // precision cost; only reachable near the packed limits.
                Decimal::from_raw((self.0 / rhs.0).saturating_mul(FACTOR))
            }
        }
    }

    pub fn neg(self) -> Decimal {
        Decimal::from_raw(-self.0)
    }

    pub fn abs(self) -> Decimal {
        Decimal::from_raw(self.0.abs())
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn cmp_value(self, rhs: Decimal) -> Ordering {
        self.0.cmp(&rhs.0)
    }

    /// Pack into the operand-stack byte form (little endian, 96 bits).
    pub fn pack(self) -> [u8; PACKED_WIDTH] {
        let bytes = self.0.to_le_bytes();
        let mut packed = [0u8; PACKED_WIDTH];
        packed.copy_from_slice(&bytes[..PACKED_WIDTH]);
        packed
    }

    /// Unpack from the operand-stack byte form, sign-extending.
    pub fn unpack(packed: [u8; PACKED_WIDTH]) -> Decimal {
        let fill = if packed[PACKED_WIDTH - 1] & 0x80 != 0 { 0xff } else { 0x00 };
        let mut bytes = [fill; 16];
        bytes[..PACKED_WIDTH].copy_from_slice(&packed);
        Decimal(i128::from_le_bytes(bytes))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid decimal literal")]
pub struct ParseDecimalError;

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Decimal, ParseDecimalError> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (units, frac) = match digits.split_once('.') {
            Some((u, f)) => (u, f),
            None => (digits, ""),
        };
        if units.is_empty() && frac.is_empty() {
            return Err(ParseDecimalError);
        }
        if !units.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseDecimalError);
        }
        let mut raw: i128 = 0;
        for b in units.bytes() {
            raw = raw
                .saturating_mul(10)
                .saturating_add(i128::from(b - b'0'));
        }
        raw = raw.saturating_mul(FACTOR);
        let mut place = FACTOR / 10;
        for b in frac.bytes().take(SCALE as usize) {
            raw = raw.saturating_add(i128::from(b - b'0') * place);
            place /= 10;
        }
        if negative {
            raw = -raw;
        }
        Ok(Decimal::from_raw(raw))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0;
        let magnitude = raw.unsigned_abs();
        let units = magnitude / FACTOR.unsigned_abs();
        let frac = magnitude % FACTOR.unsigned_abs();
        if raw < 0 {
            write!(f, "-")?;
        }
        if frac == 0 {
            write!(f, "{units}")
        } else {
            let text = format!("{frac:06}");
            write!(f, "{units}.{}", text.trim_end_matches('0'))
        }
    }
}
