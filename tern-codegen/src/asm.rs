//! SPARC64 Instruction Definitions
//!
//! This module defines the register model and the output instruction list
//! produced by the lowering backend. Branch targets are symbolic
//! instruction indices, resolved to byte offsets only by the final encoder;
//! references to other functions and data are carried as relocation
//! records, never as premature addresses.

use std::fmt;

/// Index of an instruction within one function's output list
pub type InstIdx = usize;

/// Smallest/largest values of the 13-bit signed immediate field
pub const SIMM13_MIN: i64 = -4096;
pub const SIMM13_MAX: i64 = 4095;

/// Whether a value fits the 13-bit signed immediate field shared by the
/// ALU immediate forms and load/store displacements
pub fn fits_simm13(value: i64) -> bool {
    (SIMM13_MIN..=SIMM13_MAX).contains(&value)
}

/// SPARC64 integer register file
///
/// 32 registers in four window groups. `%g0` reads as zero and ignores
/// writes. `save`/`restore` rotate the window: the caller's `%o` registers
/// become the callee's `%i` registers, so the same physical slot has two
/// names depending on which side of a call names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    // Globals
    G0, G1, G2, G3, G4, G5, G6, G7,
    // Outgoing: caller-view arguments, %o6 is the stack pointer
    O0, O1, O2, O3, O4, O5, O6, O7,
    // Window locals
    L0, L1, L2, L3, L4, L5, L6, L7,
    // Incoming: callee-view arguments, %i6 is the frame pointer
    I0, I1, I2, I3, I4, I5, I6, I7,
}

impl Reg {
    /// Hardwired zero
    pub const ZERO: Reg = Reg::G0;
    /// Scratch register reserved for materialization sequences
    pub const SCRATCH: Reg = Reg::G1;
    /// Stack pointer (caller view)
    pub const SP: Reg = Reg::O6;
    /// Frame pointer (callee view of the caller's %o6)
    pub const FP: Reg = Reg::I6;
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (group, n) = match self {
            Reg::G0 => ("g", 0), Reg::G1 => ("g", 1), Reg::G2 => ("g", 2), Reg::G3 => ("g", 3),
            Reg::G4 => ("g", 4), Reg::G5 => ("g", 5), Reg::G6 => ("g", 6), Reg::G7 => ("g", 7),
            Reg::O0 => ("o", 0), Reg::O1 => ("o", 1), Reg::O2 => ("o", 2), Reg::O3 => ("o", 3),
            Reg::O4 => ("o", 4), Reg::O5 => ("o", 5), Reg::O6 => ("o", 6), Reg::O7 => ("o", 7),
            Reg::L0 => ("l", 0), Reg::L1 => ("l", 1), Reg::L2 => ("l", 2), Reg::L3 => ("l", 3),
            Reg::L4 => ("l", 4), Reg::L5 => ("l", 5), Reg::L6 => ("l", 6), Reg::L7 => ("l", 7),
            Reg::I0 => ("i", 0), Reg::I1 => ("i", 1), Reg::I2 => ("i", 2), Reg::I3 => ("i", 3),
            Reg::I4 => ("i", 4), Reg::I5 => ("i", 5), Reg::I6 => ("i", 6), Reg::I7 => ("i", 7),
        };
        write!(f, "%{}{}", group, n)
    }
}

/// Integer condition-code register written by `cmp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcReg {
    /// 32-bit results
    Icc,
    /// 64-bit results
    Xcc,
}

impl fmt::Display for CcReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CcReg::Icc => write!(f, "%icc"),
            CcReg::Xcc => write!(f, "%xcc"),
        }
    }
}

/// Branch conditions over the integer condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    // Signed
    Lt,
    Le,
    Gt,
    Ge,
    // Unsigned
    Ltu,
    Leu,
    Gtu,
    Geu,
}

impl Cond {
    /// The condition that holds exactly when `self` does not
    pub fn negate(&self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
            Cond::Ltu => Cond::Geu,
            Cond::Leu => Cond::Gtu,
            Cond::Gtu => Cond::Leu,
            Cond::Geu => Cond::Ltu,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cond::Eq => "e",
            Cond::Ne => "ne",
            Cond::Lt => "l",
            Cond::Le => "le",
            Cond::Gt => "g",
            Cond::Ge => "ge",
            Cond::Ltu => "lu",
            Cond::Leu => "leu",
            Cond::Gtu => "gu",
            Cond::Geu => "geu",
        };
        write!(f, "{}", s)
    }
}

/// SPARC64 Output Instructions
///
/// All ALU forms are three-address. Immediate forms carry a value already
/// checked against the simm13 field. Every branch and call has exactly one
/// delay slot; the lowering backend fills it explicitly (`Nop`, or
/// `Restore` for the return sequence).
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    // Arithmetic, register form: rd = rs1 op rs2
    Add(Reg, Reg, Reg),
    Sub(Reg, Reg, Reg),
    Mulx(Reg, Reg, Reg),
    And(Reg, Reg, Reg),
    Or(Reg, Reg, Reg),
    Xor(Reg, Reg, Reg),
    Sllx(Reg, Reg, Reg),
    Srlx(Reg, Reg, Reg),
    Srax(Reg, Reg, Reg),

    // Arithmetic, immediate form: rd = rs op simm13
    AddI(Reg, Reg, i16),
    SubI(Reg, Reg, i16),
    MulxI(Reg, Reg, i16),
    AndI(Reg, Reg, i16),
    OrI(Reg, Reg, i16),
    XorI(Reg, Reg, i16),
    SllxI(Reg, Reg, u8),
    SrlxI(Reg, Reg, u8),
    SraxI(Reg, Reg, u8),

    /// rd = imm22 << 10; paired with `OrI` to build 32-bit constants
    SetHi(Reg, u32),
    /// rd = rs
    Mov(Reg, Reg),

    /// Compare, setting the condition codes (no destination)
    Cmp(CcReg, Reg, Reg),
    CmpI(CcReg, Reg, i16),
    /// rd = 1 if cond holds in cc, else 0
    MovCond(Cond, CcReg, Reg),

    /// rd = memory[base + offset], `size` bytes, sign- or zero-extended
    Ld {
        rd: Reg,
        base: Reg,
        offset: i16,
        size: u8,
        signed: bool,
    },
    /// memory[base + offset] = rs, `size` bytes
    St {
        rs: Reg,
        base: Reg,
        offset: i16,
        size: u8,
    },

    /// Branch always to an instruction index
    Ba(InstIdx),
    /// Branch on condition codes
    Bcc(Cond, CcReg, InstIdx),
    /// Branch if register is zero / non-zero
    Brz(Reg, InstIdx),
    Brnz(Reg, InstIdx),
    /// Call a symbol; the matching `Reloc` carries the target
    Call(String),
    /// rd = GOT slot of `symbol`; the matching `Reloc` carries the target
    LdGot { rd: Reg, symbol: String },

    Nop,
    /// Window save with frame allocation: `save %sp, -size, %sp`.
    /// Emitted with a placeholder size and backpatched after the frame is
    /// finalized.
    Save(u32),
    Restore,
    Ret,

    // Debug-info boundary markers; a no-op sink drops them
    DbgPrologueEnd,
    DbgEpilogueBegin,
}

impl Inst {
    /// Mutable access to the symbolic branch target, if this is a branch
    pub fn branch_target_mut(&mut self) -> Option<&mut InstIdx> {
        match self {
            Inst::Ba(t) | Inst::Bcc(_, _, t) | Inst::Brz(_, t) | Inst::Brnz(_, t) => Some(t),
            _ => None,
        }
    }

    pub fn branch_target(&self) -> Option<InstIdx> {
        match self {
            Inst::Ba(t) | Inst::Bcc(_, _, t) | Inst::Brz(_, t) | Inst::Brnz(_, t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Add(rd, rs1, rs2) => write!(f, "add {}, {}, {}", rs1, rs2, rd),
            Inst::Sub(rd, rs1, rs2) => write!(f, "sub {}, {}, {}", rs1, rs2, rd),
            Inst::Mulx(rd, rs1, rs2) => write!(f, "mulx {}, {}, {}", rs1, rs2, rd),
            Inst::And(rd, rs1, rs2) => write!(f, "and {}, {}, {}", rs1, rs2, rd),
            Inst::Or(rd, rs1, rs2) => write!(f, "or {}, {}, {}", rs1, rs2, rd),
            Inst::Xor(rd, rs1, rs2) => write!(f, "xor {}, {}, {}", rs1, rs2, rd),
            Inst::Sllx(rd, rs1, rs2) => write!(f, "sllx {}, {}, {}", rs1, rs2, rd),
            Inst::Srlx(rd, rs1, rs2) => write!(f, "srlx {}, {}, {}", rs1, rs2, rd),
            Inst::Srax(rd, rs1, rs2) => write!(f, "srax {}, {}, {}", rs1, rs2, rd),
            Inst::AddI(rd, rs, imm) => write!(f, "add {}, {}, {}", rs, imm, rd),
            Inst::SubI(rd, rs, imm) => write!(f, "sub {}, {}, {}", rs, imm, rd),
            Inst::MulxI(rd, rs, imm) => write!(f, "mulx {}, {}, {}", rs, imm, rd),
            Inst::AndI(rd, rs, imm) => write!(f, "and {}, {}, {}", rs, imm, rd),
            Inst::OrI(rd, rs, imm) => write!(f, "or {}, {}, {}", rs, imm, rd),
            Inst::XorI(rd, rs, imm) => write!(f, "xor {}, {}, {}", rs, imm, rd),
            Inst::SllxI(rd, rs, sh) => write!(f, "sllx {}, {}, {}", rs, sh, rd),
            Inst::SrlxI(rd, rs, sh) => write!(f, "srlx {}, {}, {}", rs, sh, rd),
            Inst::SraxI(rd, rs, sh) => write!(f, "srax {}, {}, {}", rs, sh, rd),
            Inst::SetHi(rd, imm) => write!(f, "sethi %hi({}), {}", imm, rd),
            Inst::Mov(rd, rs) => write!(f, "mov {}, {}", rs, rd),
            Inst::Cmp(cc, rs1, rs2) => write!(f, "cmp[{}] {}, {}", cc, rs1, rs2),
            Inst::CmpI(cc, rs, imm) => write!(f, "cmp[{}] {}, {}", cc, rs, imm),
            Inst::MovCond(cond, cc, rd) => write!(f, "mov{} {}, 1, {}", cond, cc, rd),
            Inst::Ld {
                rd,
                base,
                offset,
                size,
                signed,
            } => write!(
                f,
                "ld{}{} [{}{:+}], {}",
                if *signed { "s" } else { "u" },
                size,
                base,
                offset,
                rd
            ),
            Inst::St {
                rs,
                base,
                offset,
                size,
            } => write!(f, "st{} {}, [{}{:+}]", size, rs, base, offset),
            Inst::Ba(t) => write!(f, "ba ->{}", t),
            Inst::Bcc(cond, cc, t) => write!(f, "b{} {}, ->{}", cond, cc, t),
            Inst::Brz(rs, t) => write!(f, "brz {}, ->{}", rs, t),
            Inst::Brnz(rs, t) => write!(f, "brnz {}, ->{}", rs, t),
            Inst::Call(sym) => write!(f, "call {}", sym),
            Inst::LdGot { rd, symbol } => write!(f, "ldx [%got({})], {}", symbol, rd),
            Inst::Nop => write!(f, "nop"),
            Inst::Save(size) => write!(f, "save %sp, -{}, %sp", size),
            Inst::Restore => write!(f, "restore"),
            Inst::Ret => write!(f, "ret"),
            Inst::DbgPrologueEnd => write!(f, ".dbg prologue_end"),
            Inst::DbgEpilogueBegin => write!(f, ".dbg epilogue_begin"),
        }
    }
}

/// Typed relocation kinds understood by the linker/encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// PC-relative call to another compiled function
    Call,
    /// Load of a symbol's global-offset-table slot
    GotLoad,
}

/// A relocation record attached to one output instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Reloc {
    pub kind: RelocKind,
    pub symbol: String,
    pub inst: InstIdx,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_display() {
        assert_eq!(format!("{}", Reg::G0), "%g0");
        assert_eq!(format!("{}", Reg::O6), "%o6");
        assert_eq!(format!("{}", Reg::L3), "%l3");
        assert_eq!(format!("{}", Reg::I7), "%i7");
    }

    #[test]
    fn test_instruction_display() {
        assert_eq!(
            format!("{}", Inst::Add(Reg::L2, Reg::I0, Reg::I1)),
            "add %i0, %i1, %l2"
        );
        assert_eq!(format!("{}", Inst::AddI(Reg::L0, Reg::I0, 5)), "add %i0, 5, %l0");
        assert_eq!(
            format!(
                "{}",
                Inst::Ld {
                    rd: Reg::L1,
                    base: Reg::FP,
                    offset: -16,
                    size: 8,
                    signed: true
                }
            ),
            "lds8 [%i6-16], %l1"
        );
        assert_eq!(format!("{}", Inst::Bcc(Cond::Ne, CcReg::Xcc, 12)), "bne %xcc, ->12");
    }

    #[test]
    fn test_simm13_bounds() {
        assert!(fits_simm13(0));
        assert!(fits_simm13(4095));
        assert!(fits_simm13(-4096));
        assert!(!fits_simm13(4096));
        assert!(!fits_simm13(-4097));
    }

    #[test]
    fn test_cond_negate_roundtrip() {
        for cond in [
            Cond::Eq,
            Cond::Ne,
            Cond::Lt,
            Cond::Le,
            Cond::Gt,
            Cond::Ge,
            Cond::Ltu,
            Cond::Leu,
            Cond::Gtu,
            Cond::Geu,
        ] {
            assert_eq!(cond.negate().negate(), cond);
        }
    }

    #[test]
    fn test_branch_target_patching() {
        let mut inst = Inst::Ba(0);
        *inst.branch_target_mut().unwrap() = 42;
        assert_eq!(inst.branch_target(), Some(42));
        assert!(Inst::Nop.branch_target().is_none());
    }
}
