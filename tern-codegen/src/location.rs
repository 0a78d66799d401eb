//! Value locations
//!
//! A `Location` describes where a value currently lives during lowering.
//! The enum is a closed union; every consumer matches it exhaustively so a
//! new variant forces every decision point to be revisited.

use crate::asm::{CcReg, Cond, Reg};
use std::fmt;

/// Debug sentinel written when an `Undefined` value is materialized
pub const UNDEF_SENTINEL: u64 = 0xaaaa_aaaa_aaaa_aaaa;

/// Where a value lives at one point in the lowering process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Zero-size value; nothing is stored anywhere
    None,
    /// Control flow proves this value is never observed
    Unreachable,
    /// The value's last use has passed; resolving it again is a backend bug
    Dead,
    /// Uninitialized; materializing is optional and writes a sentinel
    Undefined,
    /// Compile-time constant, not yet materialized
    Immediate(u64),
    Register(Reg),
    /// The value is stored at this absolute memory address
    Memory(u64),
    /// Stack slot: the value lives at `[%fp - offset]`
    StackOffset(u32),
    /// Address of a stack slot: the value is `%fp - offset` itself
    StackAddress(u32),
    /// Pending signed comparison in the condition codes; consumed at most
    /// once before being branched on or forced into a register
    FlagsSigned(Cond, CcReg),
    /// Pending unsigned comparison
    FlagsUnsigned(Cond, CcReg),
}

impl Location {
    /// Whether reading the value touches memory
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Location::Memory(_) | Location::StackOffset(_)
        )
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Location::Immediate(_))
    }

    /// Whether the location can be overwritten in place and therefore
    /// reused for a result when its current owner dies
    pub fn is_mutable_in_place(&self) -> bool {
        matches!(self, Location::Register(_) | Location::StackOffset(_))
    }

    /// Whether a pending comparison lives here
    pub fn is_flags(&self) -> bool {
        matches!(
            self,
            Location::FlagsSigned(_, _) | Location::FlagsUnsigned(_, _)
        )
    }

    /// Panic unless this location holds an observable value. `Dead` and
    /// `Unreachable` operands reaching a consumer is a lowering bug, not a
    /// recoverable input-program error.
    pub fn assert_materialized(&self) {
        match self {
            Location::Dead => panic!("dead value used as an operand"),
            Location::Unreachable => panic!("unreachable value used as an operand"),
            Location::None => panic!("zero-size value used where a value is required"),
            _ => {}
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::None => write!(f, "none"),
            Location::Unreachable => write!(f, "unreachable"),
            Location::Dead => write!(f, "dead"),
            Location::Undefined => write!(f, "undef"),
            Location::Immediate(v) => write!(f, "#{}", v),
            Location::Register(r) => write!(f, "{}", r),
            Location::Memory(addr) => write!(f, "[{:#x}]", addr),
            Location::StackOffset(off) => write!(f, "[%fp-{}]", off),
            Location::StackAddress(off) => write!(f, "%fp-{}", off),
            Location::FlagsSigned(cond, cc) => write!(f, "flags.s({}, {})", cond, cc),
            Location::FlagsUnsigned(cond, cc) => write!(f, "flags.u({}, {})", cond, cc),
        }
    }
}
