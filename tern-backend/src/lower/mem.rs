//! Loads, stores, and address arithmetic
//!
//! Pointers to stack slots stay symbolic (`StackAddress`) as long as
//! possible: constant-offset projections fold into the offset and memory
//! accesses through them become single `%fp`-relative instructions. Only
//! dynamic indexing forces an address into a register.

use super::FnLowering;
use tern_codegen::{fits_simm13, Inst, Location, Reg};
use tern_common::CompilerError;
use tern_ir::ir::ValueId;
use tern_ir::types::Type;

impl<'a> FnLowering<'a> {
    pub(crate) fn lower_load(
        &mut self,
        v: ValueId,
        ptr: ValueId,
        ty: Type,
    ) -> Result<Location, CompilerError> {
        let size = ty.size_in_bytes() as u8;
        let signed = ty.is_signed();
        let ptr_loc = self.table.resolve(ptr);

        match ptr_loc {
            Location::StackAddress(off) => {
                let rd = self.alloc_reg(v)?;
                let disp = self.fp_offset(off)?;
                self.emit(Inst::Ld {
                    rd,
                    base: Reg::FP,
                    offset: disp,
                    size,
                    signed,
                });
                Ok(Location::Register(rd))
            }
            // Anything else, a pointer parked in memory included, goes
            // through a register: fetch the pointer value first, then
            // dereference it.
            _ => {
                let (base, lock) = self.operand_reg(ptr)?;
                let rd = match self.take_over_operand(v, 0, ptr) {
                    Some(r) => r,
                    None => self.alloc_reg(v)?,
                };
                self.emit(Inst::Ld {
                    rd,
                    base,
                    offset: 0,
                    size,
                    signed,
                });
                self.unlock(lock);
                Ok(Location::Register(rd))
            }
        }
    }

    pub(crate) fn lower_store(
        &mut self,
        ptr: ValueId,
        value: ValueId,
    ) -> Result<Location, CompilerError> {
        let func = self.func;
        let size = func.inst(value).ty.size_in_bytes() as u8;
        let ptr_loc = self.table.resolve(ptr);
        let val_loc = self.table.resolve(value);

        match ptr_loc {
            Location::StackAddress(off) => {
                self.gen_set_stack(off, size, val_loc)?;
            }
            _ => {
                let (base, base_lock) = self.operand_reg(ptr)?;
                let (rs, val_lock) = self.operand_reg(value)?;
                self.emit(Inst::St {
                    rs,
                    base,
                    offset: 0,
                    size,
                });
                self.unlock(val_lock);
                self.unlock(base_lock);
            }
        }
        Ok(Location::None)
    }

    pub(crate) fn lower_field_ptr(
        &mut self,
        v: ValueId,
        base: ValueId,
        offset: u32,
    ) -> Result<Location, CompilerError> {
        let func = self.func;
        let field_size = match func.inst(v).ty {
            Type::Ptr { elem_size } => elem_size,
            other => panic!("field projection produced non-pointer {}", other),
        };
        let pointee = match func.inst(base).ty {
            Type::Ptr { elem_size } => elem_size,
            other => panic!("field projection through non-pointer {}", other),
        };
        assert!(
            offset as u64 + field_size as u64 <= pointee as u64,
            "field projection escapes its base object"
        );

        let base_loc = self.table.resolve(base);
        match base_loc {
            Location::StackAddress(n) => {
                // The slot lives at [%fp - n, %fp - n + size); a field at
                // +offset is just a smaller fp displacement.
                assert!(offset <= n, "field offset escapes its slot");
                Ok(Location::StackAddress(n - offset))
            }
            _ => self.add_const_offset(v, base, offset as u64),
        }
    }

    pub(crate) fn lower_ptr_add(
        &mut self,
        v: ValueId,
        base: ValueId,
        index: ValueId,
        elem_size: u32,
    ) -> Result<Location, CompilerError> {
        let idx_loc = self.table.resolve(index);

        // Constant index: reduce to a constant-offset projection
        if let Location::Immediate(k) = idx_loc {
            let bytes = k.wrapping_mul(elem_size as u64);
            let base_loc = self.table.resolve(base);
            return match base_loc {
                Location::StackAddress(n) if bytes <= n as u64 => {
                    Ok(Location::StackAddress(n - bytes as u32))
                }
                _ => self.add_const_offset(v, base, bytes),
            };
        }

        let (base_reg, base_lock) = self.operand_reg(base)?;
        let (idx_reg, idx_lock) = self.operand_reg(index)?;

        // Scale the index into bytes. Power-of-two element sizes shift
        // instead of multiplying.
        let bytes_reg = if elem_size == 1 {
            idx_reg
        } else if elem_size.is_power_of_two() {
            self.emit(Inst::SllxI(
                Reg::SCRATCH,
                idx_reg,
                elem_size.trailing_zeros() as u8,
            ));
            Reg::SCRATCH
        } else if fits_simm13(elem_size as i64) {
            self.emit(Inst::MulxI(Reg::SCRATCH, idx_reg, elem_size as i16));
            Reg::SCRATCH
        } else {
            self.materialize_imm(Reg::SCRATCH, elem_size as u64)?;
            self.emit(Inst::Mulx(Reg::SCRATCH, idx_reg, Reg::SCRATCH));
            Reg::SCRATCH
        };

        let rd = match self.take_over_operand(v, 0, base) {
            Some(r) => r,
            None => {
                let taken = if elem_size == 1 {
                    self.take_over_operand(v, 1, index)
                } else {
                    None
                };
                match taken {
                    Some(r) => r,
                    None => self.alloc_reg(v)?,
                }
            }
        };
        self.emit(Inst::Add(rd, base_reg, bytes_reg));
        self.unlock(idx_lock);
        self.unlock(base_lock);
        Ok(Location::Register(rd))
    }

    /// `base + bytes` where the base is not a foldable symbolic address
    fn add_const_offset(
        &mut self,
        v: ValueId,
        base: ValueId,
        bytes: u64,
    ) -> Result<Location, CompilerError> {
        let (rs, lock) = self.operand_reg(base)?;
        let rd = match self.take_over_operand(v, 0, base) {
            Some(r) => r,
            None => self.alloc_reg(v)?,
        };
        if bytes == 0 {
            if rd != rs {
                self.emit(Inst::Mov(rd, rs));
            }
        } else if fits_simm13(bytes as i64) {
            self.emit(Inst::AddI(rd, rs, bytes as i16));
        } else {
            self.materialize_imm(Reg::SCRATCH, bytes)?;
            self.emit(Inst::Add(rd, rs, Reg::SCRATCH));
        }
        self.unlock(lock);
        Ok(Location::Register(rd))
    }
}
