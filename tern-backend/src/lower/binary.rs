//! Binary arithmetic and comparison lowering
//!
//! Every ALU op exists in a register form and a simm13 immediate form.
//! Constant operands that fit the immediate field stay unmaterialized;
//! commutative ops swap operands to get a constant onto the immediate side.
//! Comparisons produce no register value at all, only a pending condition
//! in `%icc`/`%xcc` owned by the result value.

use super::FnLowering;
use tern_codegen::{fits_simm13, CcReg, Cond, Inst, Location, Reg};
use tern_common::CompilerError;
use tern_ir::ir::{BinOp, CmpOp, ValueId};
use tern_ir::types::Type;

/// Constant operand usable as a simm13, if any
fn imm13(loc: Location) -> Option<i16> {
    match loc {
        Location::Immediate(value) if fits_simm13(value as i64) => Some(value as i16),
        _ => None,
    }
}

fn reg_form(op: BinOp, signed: bool, rd: Reg, rs1: Reg, rs2: Reg) -> Inst {
    match op {
        BinOp::Add => Inst::Add(rd, rs1, rs2),
        BinOp::Sub => Inst::Sub(rd, rs1, rs2),
        BinOp::Mul => Inst::Mulx(rd, rs1, rs2),
        BinOp::And => Inst::And(rd, rs1, rs2),
        BinOp::Or => Inst::Or(rd, rs1, rs2),
        BinOp::Xor => Inst::Xor(rd, rs1, rs2),
        BinOp::Shl => Inst::Sllx(rd, rs1, rs2),
        BinOp::Shr => {
            if signed {
                Inst::Srax(rd, rs1, rs2)
            } else {
                Inst::Srlx(rd, rs1, rs2)
            }
        }
    }
}

fn imm_form(op: BinOp, rd: Reg, rs: Reg, imm: i16) -> Inst {
    match op {
        BinOp::Add => Inst::AddI(rd, rs, imm),
        BinOp::Sub => Inst::SubI(rd, rs, imm),
        BinOp::Mul => Inst::MulxI(rd, rs, imm),
        BinOp::And => Inst::AndI(rd, rs, imm),
        BinOp::Or => Inst::OrI(rd, rs, imm),
        BinOp::Xor => Inst::XorI(rd, rs, imm),
        BinOp::Shl | BinOp::Shr => panic!("shift amounts use the dedicated forms"),
    }
}

fn cond_for(op: CmpOp, signed: bool) -> Cond {
    match (op, signed) {
        (CmpOp::Eq, _) => Cond::Eq,
        (CmpOp::Ne, _) => Cond::Ne,
        (CmpOp::Lt, true) => Cond::Lt,
        (CmpOp::Le, true) => Cond::Le,
        (CmpOp::Gt, true) => Cond::Gt,
        (CmpOp::Ge, true) => Cond::Ge,
        (CmpOp::Lt, false) => Cond::Ltu,
        (CmpOp::Le, false) => Cond::Leu,
        (CmpOp::Gt, false) => Cond::Gtu,
        (CmpOp::Ge, false) => Cond::Geu,
    }
}

impl<'a> FnLowering<'a> {
    pub(crate) fn lower_binary(
        &mut self,
        v: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: Type,
    ) -> Result<Location, CompilerError> {
        let lhs_loc = self.table.resolve(lhs);
        let rhs_loc = self.table.resolve(rhs);
        let signed = ty.is_signed();

        // Shift amounts are 6-bit fields, not simm13
        if matches!(op, BinOp::Shl | BinOp::Shr) {
            if let Location::Immediate(amount) = rhs_loc {
                return self.shift_by_const(v, op, signed, lhs, (amount & 63) as u8);
            }
        }

        // Multiplication by a power of two is a shift, no matter how wide
        // the constant is.
        if op == BinOp::Mul {
            if let Location::Immediate(k) = rhs_loc {
                if k.is_power_of_two() {
                    return self.shift_by_const(v, BinOp::Shl, signed, lhs, k.trailing_zeros() as u8);
                }
            }
            if let Location::Immediate(k) = lhs_loc {
                if k.is_power_of_two() {
                    return self.shift_by_const_swapped(v, rhs, k.trailing_zeros() as u8);
                }
            }
        }

        if !matches!(op, BinOp::Shl | BinOp::Shr) {
            if let Some(imm) = imm13(rhs_loc) {
                let (rs, lock) = self.operand_reg(lhs)?;
                let rd = match self.take_over_operand(v, 0, lhs) {
                    Some(r) => r,
                    None => self.alloc_reg(v)?,
                };
                self.emit(imm_form(op, rd, rs, imm));
                self.unlock(lock);
                return Ok(Location::Register(rd));
            }
            if op.is_commutative() {
                if let Some(imm) = imm13(lhs_loc) {
                    let (rs, lock) = self.operand_reg(rhs)?;
                    let rd = match self.take_over_operand(v, 1, rhs) {
                        Some(r) => r,
                        None => self.alloc_reg(v)?,
                    };
                    self.emit(imm_form(op, rd, rs, imm));
                    self.unlock(lock);
                    return Ok(Location::Register(rd));
                }
            }
        }

        let (rs1, lock1) = self.operand_reg(lhs)?;
        let (rs2, lock2) = self.operand_reg(rhs)?;
        let rd = match self.take_over_operand(v, 0, lhs) {
            Some(r) => r,
            None => match self.take_over_operand(v, 1, rhs) {
                Some(r) => r,
                None => self.alloc_reg(v)?,
            },
        };
        self.emit(reg_form(op, signed, rd, rs1, rs2));
        self.unlock(lock2);
        self.unlock(lock1);
        Ok(Location::Register(rd))
    }

    fn shift_by_const(
        &mut self,
        v: ValueId,
        op: BinOp,
        signed: bool,
        operand: ValueId,
        amount: u8,
    ) -> Result<Location, CompilerError> {
        let (rs, lock) = self.operand_reg(operand)?;
        let rd = match self.take_over_operand(v, 0, operand) {
            Some(r) => r,
            None => self.alloc_reg(v)?,
        };
        let inst = match op {
            BinOp::Shl => Inst::SllxI(rd, rs, amount),
            BinOp::Shr => {
                if signed {
                    Inst::SraxI(rd, rs, amount)
                } else {
                    Inst::SrlxI(rd, rs, amount)
                }
            }
            _ => unreachable!(),
        };
        self.emit(inst);
        self.unlock(lock);
        Ok(Location::Register(rd))
    }

    /// `const * x` with the variable on the right-hand side
    fn shift_by_const_swapped(
        &mut self,
        v: ValueId,
        operand: ValueId,
        amount: u8,
    ) -> Result<Location, CompilerError> {
        let (rs, lock) = self.operand_reg(operand)?;
        let rd = match self.take_over_operand(v, 1, operand) {
            Some(r) => r,
            None => self.alloc_reg(v)?,
        };
        self.emit(Inst::SllxI(rd, rs, amount));
        self.unlock(lock);
        Ok(Location::Register(rd))
    }

    pub(crate) fn lower_cmp(
        &mut self,
        v: ValueId,
        op: CmpOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<Location, CompilerError> {
        // A previous comparison still parked in the condition codes gets
        // forced into a register before we clobber them.
        self.spill_flags()?;

        let func = self.func;
        let operand_ty = func.inst(lhs).ty;
        let signed = operand_ty.is_signed();
        let cc = if operand_ty.size_in_bytes() <= 4 && !operand_ty.is_pointer() {
            CcReg::Icc
        } else {
            CcReg::Xcc
        };

        let lhs_loc = self.table.resolve(lhs);
        let rhs_loc = self.table.resolve(rhs);

        let effective_op = if let Some(imm) = imm13(rhs_loc) {
            let (rs, lock) = self.operand_reg(lhs)?;
            self.emit(Inst::CmpI(cc, rs, imm));
            self.unlock(lock);
            op
        } else if let Some(imm) = imm13(lhs_loc) {
            // Constant on the left: compare the other way around and flip
            // the condition accordingly.
            let (rs, lock) = self.operand_reg(rhs)?;
            self.emit(Inst::CmpI(cc, rs, imm));
            self.unlock(lock);
            op.swap_operands()
        } else {
            let (rs1, lock1) = self.operand_reg(lhs)?;
            let (rs2, lock2) = self.operand_reg(rhs)?;
            self.emit(Inst::Cmp(cc, rs1, rs2));
            self.unlock(lock2);
            self.unlock(lock1);
            op
        };

        let cond = cond_for(effective_op, signed);
        self.flags_owner = Some(v);
        Ok(if signed {
            Location::FlagsSigned(cond, cc)
        } else {
            Location::FlagsUnsigned(cond, cc)
        })
    }
}
