//! The multi-view operand stack.
//!
//! One contiguous buffer with a single byte cursor, pushed and popped
//! through width-typed views: word (2), integer (4), real (8), decimal
//! (12). The instruction stream is trusted to pop with the view it pushed
//! with (slots carry no kind tag), but every pop takes the caller's entry
//! watermark as a floor, so a nested evaluation can never consume operands
//! it did not push.

use tabula_program::decimal::PACKED_WIDTH;
use tabula_program::Decimal;

use crate::error::{Error, Result};

/// Total stack capacity in bytes.
pub const STACK_BYTES: usize = 4096;
/// Minimum free bytes required to begin an evaluation.
pub const MIN_HEADROOM: usize = 400;

pub const WORD_WIDTH: usize = 2;
pub const INT_WIDTH: usize = 4;
pub const REAL_WIDTH: usize = 8;
pub const DECIMAL_WIDTH: usize = PACKED_WIDTH;

/// The shared operand stack.
#[derive(Debug)]
pub struct OperandStack {
    buf: Vec<u8>,
    cursor: usize,
}

impl Default for OperandStack {
    fn default() -> Self {
        OperandStack::new()
    }
}

impl OperandStack {
    pub fn new() -> OperandStack {
        OperandStack {
            buf: vec![0; STACK_BYTES],
            cursor: 0,
        }
    }

    /// Current top-of-stack byte offset.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Free bytes above the cursor.
    pub fn headroom(&self) -> usize {
        STACK_BYTES - self.cursor
    }

    /// Drop everything above `cursor` (restore a saved watermark).
    pub fn truncate(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.cursor);
        self.cursor = cursor.min(self.cursor);
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.cursor + bytes.len();
        if end > STACK_BYTES {
            return Err(Error::StackExhausted);
        }
        self.buf[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(())
    }

    fn take(&mut self, width: usize, floor: usize) -> Result<usize> {
        if self.cursor < floor + width {
            return Err(Error::StackUnderflow);
        }
        self.cursor -= width;
        Ok(self.cursor)
    }

    pub fn push_word(&mut self, value: u16) -> Result<()> {
        self.push_bytes(&value.to_le_bytes())
    }

    pub fn pop_word(&mut self, floor: usize) -> Result<u16> {
        let at = self.take(WORD_WIDTH, floor)?;
        let mut bytes = [0u8; WORD_WIDTH];
        bytes.copy_from_slice(&self.buf[at..at + WORD_WIDTH]);
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn push_int(&mut self, value: i32) -> Result<()> {
        self.push_bytes(&value.to_le_bytes())
    }

    pub fn pop_int(&mut self, floor: usize) -> Result<i32> {
        let at = self.take(INT_WIDTH, floor)?;
        let mut bytes = [0u8; INT_WIDTH];
        bytes.copy_from_slice(&self.buf[at..at + INT_WIDTH]);
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn push_real(&mut self, value: f64) -> Result<()> {
        self.push_bytes(&value.to_le_bytes())
    }

    pub fn pop_real(&mut self, floor: usize) -> Result<f64> {
        let at = self.take(REAL_WIDTH, floor)?;
        let mut bytes = [0u8; REAL_WIDTH];
        bytes.copy_from_slice(&self.buf[at..at + REAL_WIDTH]);
        Ok(f64::from_le_bytes(bytes))
    }

    pub fn push_decimal(&mut self, value: Decimal) -> Result<()> {
        self.push_bytes(&value.pack())
    }

    pub fn pop_decimal(&mut self, floor: usize) -> Result<Decimal> {
        let at = self.take(DECIMAL_WIDTH, floor)?;
        let mut bytes = [0u8; DECIMAL_WIDTH];
        bytes.copy_from_slice(&self.buf[at..at + DECIMAL_WIDTH]);
        Ok(Decimal::unpack(bytes))
    }
}
