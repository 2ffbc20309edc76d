//! Packed opcode words and their decoded forms.
//!
//! An opcode is one 16-bit word. Bit 15 marks an entry-style instruction
//! (forms input, routed to the host). Bit 14 marks a condition instruction
//! whose bits 6..14 carry the target indicator slot (bit 7 of the slot
//! negates the stored result). Otherwise bits 6..14 select the instruction
//! group and bits 0..6 the instruction number within it.

use serde::{Deserialize, Serialize};

use crate::value::Kind;

/// Bit 15: entry-style instruction.
pub const ENTRY_BIT: u16 = 0x8000;
/// Bit 14: condition instruction storing into an indicator slot.
pub const CONDITION_BIT: u16 = 0x4000;

/// A packed opcode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opcode(pub u16);

/// Top-level routing of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Entry-style instruction, host-handled.
    Entry,
    /// Condition instruction (relational/boolean/pattern family).
    Condition,
    /// Regular group instruction; `None` when the group index is unassigned.
    Group(Option<OpGroup>, u8),
}

/// Instruction groups. Control and Move run in the core; the rest are the
/// host's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpGroup {
    Nop,
    Control,
    Move,
    File,
    SeqIo,
    Console,
    Open,
    Form,
    Print,
    Str,
    Enter,
    Interrupt,
    FileInfo,
    Factor,
    Graph,
    Com,
    User,
}

impl OpGroup {
    pub fn index(self) -> u16 {
        match self {
            OpGroup::Nop => 0,
            OpGroup::Control => 1,
            OpGroup::Move => 2,
            OpGroup::File => 3,
            OpGroup::SeqIo => 4,
            OpGroup::Console => 5,
            OpGroup::Open => 6,
            OpGroup::Form => 7,
            OpGroup::Print => 8,
            OpGroup::Str => 9,
            OpGroup::Enter => 10,
            OpGroup::Interrupt => 11,
            OpGroup::FileInfo => 12,
            OpGroup::Factor => 13,
            OpGroup::Graph => 14,
            OpGroup::Com => 15,
            OpGroup::User => 16,
        }
    }

    pub fn from_index(index: u16) -> Option<OpGroup> {
        Some(match index {
            0 => OpGroup::Nop,
            1 => OpGroup::Control,
            2 => OpGroup::Move,
            3 => OpGroup::File,
            4 => OpGroup::SeqIo,
            5 => OpGroup::Console,
            6 => OpGroup::Open,
            7 => OpGroup::Form,
            8 => OpGroup::Print,
            9 => OpGroup::Str,
            10 => OpGroup::Enter,
            11 => OpGroup::Interrupt,
            12 => OpGroup::FileInfo,
            13 => OpGroup::Factor,
            14 => OpGroup::Graph,
            15 => OpGroup::Com,
            16 => OpGroup::User,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            OpGroup::Nop => "no-op group",
            OpGroup::Control => "control group",
            OpGroup::Move => "move group",
            OpGroup::File => "file group",
            OpGroup::SeqIo => "sequential I/O group",
            OpGroup::Console => "console group",
            OpGroup::Open => "open/close group",
            OpGroup::Form => "forms group",
            OpGroup::Print => "print group",
            OpGroup::Str => "string group",
            OpGroup::Enter => "enter group",
            OpGroup::Interrupt => "interrupt group",
            OpGroup::FileInfo => "file-info group",
            OpGroup::Factor => "factor group",
            OpGroup::Graph => "graphics group",
            OpGroup::Com => "comms group",
            OpGroup::User => "user group",
        }
    }
}

/// Control-group instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Abort,
    Goto,
    Gosub,
    Return,
    Debug,
    Chain,
    KeyCheck,
    RaiseError,
    ErrClear,
    ChainWait,
    OptSet,
    OptClr,
}

impl ControlOp {
    pub fn number(self) -> u8 {
        match self {
            ControlOp::Abort => 0,
            ControlOp::Goto => 1,
            ControlOp::Gosub => 2,
            ControlOp::Return => 3,
            ControlOp::Debug => 4,
            ControlOp::Chain => 5,
            ControlOp::KeyCheck => 6,
            ControlOp::RaiseError => 7,
            ControlOp::ErrClear => 8,
            ControlOp::ChainWait => 9,
            ControlOp::OptSet => 10,
            ControlOp::OptClr => 11,
        }
    }

    pub fn from_number(number: u8) -> Option<ControlOp> {
        Some(match number {
            0 => ControlOp::Abort,
            1 => ControlOp::Goto,
            2 => ControlOp::Gosub,
            3 => ControlOp::Return,
            4 => ControlOp::Debug,
            5 => ControlOp::Chain,
            6 => ControlOp::KeyCheck,
            7 => ControlOp::RaiseError,
            8 => ControlOp::ErrClear,
            9 => ControlOp::ChainWait,
            10 => ControlOp::OptSet,
            11 => ControlOp::OptClr,
            _ => return None,
        })
    }
}

/// Move-group instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOp {
    MoveText,
    MoveDecimal,
    MoveInt,
    Incr,
    MoveDate,
    MoveReal,
    /// Typeless move: the source is read at its own kind.
    Move,
}

impl MoveOp {
    pub fn number(self) -> u8 {
        match self {
            MoveOp::MoveText => 0,
            MoveOp::MoveDecimal => 1,
            MoveOp::MoveInt => 2,
            MoveOp::Incr => 3,
            MoveOp::MoveDate => 4,
            MoveOp::MoveReal => 5,
            MoveOp::Move => 6,
        }
    }

    pub fn from_number(number: u8) -> Option<MoveOp> {
        Some(match number {
            0 => MoveOp::MoveText,
            1 => MoveOp::MoveDecimal,
            2 => MoveOp::MoveInt,
            3 => MoveOp::Incr,
            4 => MoveOp::MoveDate,
            5 => MoveOp::MoveReal,
            6 => MoveOp::Move,
            _ => return None,
        })
    }
}

/// Relational operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl Relation {
    fn index(self) -> u16 {
        match self {
            Relation::Lt => 0,
            Relation::Le => 1,
            Relation::Eq => 2,
            Relation::Ge => 3,
            Relation::Gt => 4,
            Relation::Ne => 5,
        }
    }

    fn from_index(index: u16) -> Option<Relation> {
        Some(match index {
            0 => Relation::Lt,
            1 => Relation::Le,
            2 => Relation::Eq,
            3 => Relation::Ge,
            4 => Relation::Gt,
            5 => Relation::Ne,
            _ => return None,
        })
    }
}

/// Condition instructions. The comparison kind selector has four bands;
/// dates compare through the decimal band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    /// Compare two arguments of one kind, store the relation's truth.
    Relational { relation: Relation, kind: Kind },
    /// Combine two packed indicator chains with AND/OR. Each chain is
    /// evaluated with its own seed polarity.
    Boolean {
        left_all: bool,
        right_all: bool,
        conjunction: bool,
    },
    /// True when the host reports the file open (status >= 2).
    FileStatus,
    /// True when the first text occurs inside the second.
    Contains,
    /// Masked pattern match (`?` wildcard, `*` truncation).
    Match,
}

fn kind_selector(kind: Kind) -> u16 {
    match kind {
        Kind::Text => 0,
        Kind::Decimal | Kind::Date => 1,
        Kind::Int => 2,
        Kind::Real => 3,
    }
}

fn selected_kind(selector: u16) -> Kind {
    match selector {
        0 => Kind::Text,
        1 => Kind::Decimal,
        2 => Kind::Int,
        _ => Kind::Real,
    }
}

impl ConditionOp {
    fn encode(self) -> u16 {
        match self {
            ConditionOp::Relational { relation, kind } => {
                relation.index() * 4 + kind_selector(kind)
            }
            ConditionOp::Boolean {
                left_all,
                right_all,
                conjunction,
            } => 0x20 | (u16::from(left_all) << 2) | (u16::from(right_all) << 1) | u16::from(conjunction),
            ConditionOp::FileStatus => 0x29,
            ConditionOp::Contains => 0x30,
            ConditionOp::Match => 0x31,
        }
    }

    fn decode(sub: u16) -> Option<ConditionOp> {
        match sub {
            0x00..=0x17 => Some(ConditionOp::Relational {
                relation: Relation::from_index(sub / 4)?,
                kind: selected_kind(sub % 4),
            }),
            0x20..=0x27 => Some(ConditionOp::Boolean {
                left_all: sub & 4 != 0,
                right_all: sub & 2 != 0,
                conjunction: sub & 1 != 0,
            }),
            0x29 => Some(ConditionOp::FileStatus),
            0x30 => Some(ConditionOp::Contains),
            0x31 => Some(ConditionOp::Match),
            _ => None,
        }
    }
}

impl Opcode {
    pub fn nop() -> Opcode {
        Opcode(0)
    }

    pub fn group(group: OpGroup, number: u8) -> Opcode {
        Opcode((group.index() << 6) | u16::from(number & 0x3f))
    }

    pub fn control(op: ControlOp) -> Opcode {
        Opcode::group(OpGroup::Control, op.number())
    }

    pub fn movement(op: MoveOp) -> Opcode {
        Opcode::group(OpGroup::Move, op.number())
    }

    /// A condition instruction targeting `slot`, negated when `negate`.
    pub fn condition(op: ConditionOp, slot: u8, negate: bool) -> Opcode {
        let slot_bits = u16::from(slot & 0x7f) | (u16::from(negate) << 7);
        Opcode(CONDITION_BIT | (slot_bits << 6) | op.encode())
    }

    pub fn entry(number: u8) -> Opcode {
        Opcode(ENTRY_BIT | u16::from(number))
    }

    /// In-group instruction number.
    pub fn number(self) -> u8 {
        (self.0 & 0x3f) as u8
    }

    pub fn route(self) -> Route {
        if self.0 & ENTRY_BIT != 0 {
            Route::Entry
        } else if self.0 & CONDITION_BIT != 0 {
            Route::Condition
        } else {
            Route::Group(OpGroup::from_index((self.0 >> 6) & 0x3ff), self.number())
        }
    }

    /// Decode the condition family; `None` for unassigned numbers.
    pub fn condition_op(self) -> Option<ConditionOp> {
        ConditionOp::decode(self.0 & 0x3f)
    }

    /// The indicator slot a condition instruction stores into, plus its
    /// negate bit.
    pub fn indicator_slot(self) -> (u8, bool) {
        let bits = ((self.0 >> 6) & 0xff) as u8;
        (bits & 0x7f, bits & 0x80 != 0)
    }
}
