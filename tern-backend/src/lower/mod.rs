//! SPARC64 lowering engine
//!
//! Walks a function's structured body in program order, tracking where every
//! value lives through the branch-scoped [`ValueTable`], the register pool,
//! and the stack frame. Each instruction resolves its operands, emits code,
//! records its result location, and then processes operand deaths from a
//! working copy of the liveness bits.
//!
//! The working copy matters: when a result takes over a dying operand's
//! register, the corresponding death bit is cleared here so the register is
//! not freed out from under the result. The shared [`Liveness`] is never
//! modified.

mod binary;
mod call;
mod control;
mod mem;

#[cfg(test)]
mod tests;

use crate::frame::StackFrame;
use crate::table::ValueTable;
use log::{debug, info, trace};
use std::collections::HashMap;
use tern_codegen::{
    fits_simm13, CallingConvention, Inst, InstIdx, Location, ParamLocation, Reg, RegLock,
    RegisterPool, Reloc, Role, ALLOCATABLE_REGISTERS,
};
use tern_common::{CompilerError, ErrorReporter, SourceLocation};
use tern_ir::ir::{Function, Module, Op, ValueId};
use tern_ir::liveness::Liveness;
use tern_ir::types::CallConv;

/// Sentinel branch target, replaced when the jump's destination is known
pub(crate) const PENDING_TARGET: InstIdx = usize::MAX;

/// Lowered machine code for one function
#[derive(Debug)]
pub struct FnOutput {
    pub name: String,
    pub insts: Vec<Inst>,
    pub relocs: Vec<Reloc>,
    pub frame_size: u32,
}

/// An open `Block` scope: jumps waiting for the block's end index, and the
/// result location the first `br` committed to
#[derive(Debug, Default)]
pub(crate) struct BlockScope {
    pub(crate) pending: Vec<InstIdx>,
    pub(crate) result: Option<Location>,
}

pub(crate) struct FnLowering<'a> {
    pub(crate) func: &'a Function,
    liveness: &'a Liveness,
    /// Working copy of the per-instruction death bits
    pub(crate) tombs: Vec<u16>,
    pub(crate) insts: Vec<Inst>,
    pub(crate) relocs: Vec<Reloc>,
    pub(crate) pool: RegisterPool,
    /// Allocation snapshots of every enclosing conditional arm and loop,
    /// innermost last. Block result registers are reserved in all of them.
    pub(crate) branch_pools: Vec<RegisterPool>,
    pub(crate) frame: StackFrame,
    pub(crate) table: ValueTable,
    pub(crate) blocks: HashMap<ValueId, BlockScope>,
    /// Value whose location is a live `Flags*`, if any
    pub(crate) flags_owner: Option<ValueId>,
    /// Jumps into the shared epilogue, patched during assembly
    exitlude: Vec<InstIdx>,
    ret_loc: Location,
    abi_params: Vec<ParamLocation>,
    naked: bool,
    pub(crate) loc: SourceLocation,
}

/// Lower every function of a module. Failed functions produce a diagnostic
/// and are skipped; the rest of the module compiles normally.
pub fn generate_module(module: &Module) -> (Vec<FnOutput>, ErrorReporter) {
    let mut outputs = Vec::new();
    let mut reporter = ErrorReporter::new();
    for func in &module.functions {
        let liveness = Liveness::analyze(func);
        match generate_function(func, &liveness) {
            Ok(out) => {
                info!(
                    "{}: {} instructions, frame {} bytes",
                    out.name,
                    out.insts.len(),
                    out.frame_size
                );
                outputs.push(out);
            }
            Err(err) => reporter.report(&err, func.span.clone()),
        }
    }
    (outputs, reporter)
}

/// Lower one function against its liveness annotations.
pub fn generate_function(func: &Function, liveness: &Liveness) -> Result<FnOutput, CompilerError> {
    debug!("lowering {}", func.name);
    let loc = func.span.start.clone();
    let abi = CallingConvention::resolve(&func.ty, Role::Callee)
        .map_err(|e| CompilerError::not_implemented(e.to_string(), loc.clone()))?;
    let naked = func.ty.conv == CallConv::Naked;

    let tombs = (0..func.insts.len())
        .map(|i| liveness.tomb_bits(ValueId(i as u32)))
        .collect();

    let mut fl = FnLowering {
        func,
        liveness,
        tombs,
        insts: Vec::new(),
        relocs: Vec::new(),
        pool: RegisterPool::new(),
        branch_pools: Vec::new(),
        frame: StackFrame::new(),
        table: ValueTable::new(),
        blocks: HashMap::new(),
        flags_owner: None,
        exitlude: Vec::new(),
        ret_loc: abi.ret,
        abi_params: abi.params,
        naked,
        loc,
    };

    if !fl.naked {
        // Placeholder frame size, backpatched once the frame is final
        fl.emit(Inst::Save(0));
        fl.emit(Inst::DbgPrologueEnd);
    }
    fl.walk_body(&func.body)?;
    Ok(fl.assemble())
}

impl<'a> FnLowering<'a> {
    pub(crate) fn walk_body(&mut self, body: &[ValueId]) -> Result<(), CompilerError> {
        for &v in body {
            self.lower_inst(v)?;
        }
        Ok(())
    }

    fn lower_inst(&mut self, v: ValueId) -> Result<(), CompilerError> {
        let func = self.func;
        let inst = func.inst(v);
        trace!("{} <- {:?}", v, inst.op);

        // Pure instructions with unused results produce no code, but their
        // operands still die here.
        if self.liveness.is_unused(v) && !inst.op.has_side_effects() {
            self.table.set(v, Location::Dead);
            self.process_deaths(v);
            return Ok(());
        }

        if !inst.ty.is_lowerable() {
            return Err(CompilerError::not_implemented(
                format!("values of type {}", inst.ty),
                self.loc.clone(),
            ));
        }

        let result = match &inst.op {
            Op::Arg { index } => self.lower_arg(v, *index)?,
            Op::ConstInt { value } => Location::Immediate(*value),
            Op::Alloc { size, align } => {
                let off = self.frame.allocate(v, *size, (*align).max(1));
                Location::StackAddress(off)
            }
            Op::Load { ptr } => self.lower_load(v, *ptr, inst.ty)?,
            Op::Store { ptr, value } => self.lower_store(*ptr, *value)?,
            Op::FieldPtr { base, offset } => self.lower_field_ptr(v, *base, *offset)?,
            Op::PtrAdd {
                base,
                index,
                elem_size,
            } => self.lower_ptr_add(v, *base, *index, *elem_size)?,
            Op::Bin { op, lhs, rhs } => self.lower_binary(v, *op, *lhs, *rhs, inst.ty)?,
            Op::Cmp { op, lhs, rhs } => self.lower_cmp(v, *op, *lhs, *rhs)?,
            Op::Call { callee, sig, args } => self.lower_call(v, callee, sig, args)?,
            Op::GlobalAddr { symbol } => self.lower_global_addr(v, symbol)?,
            Op::Block { body } => self.lower_block(v, body)?,
            Op::Loop { body } => self.lower_loop(body)?,
            Op::Br { block, operand } => self.lower_br(v, *block, *operand)?,
            Op::CondBr {
                cond,
                then_body,
                else_body,
            } => self.lower_cond_br(v, *cond, then_body, else_body)?,
            Op::Ret { operand } => self.lower_ret(v, *operand)?,
            Op::Unreachable => Location::Unreachable,
        };

        self.table.set(v, result);
        self.process_deaths(v);
        Ok(())
    }

    fn lower_arg(&mut self, v: ValueId, index: u16) -> Result<Location, CompilerError> {
        let param = *self
            .abi_params
            .get(index as usize)
            .unwrap_or_else(|| panic!("argument index {} out of range", index));
        match param {
            ParamLocation::Register(r) => Ok(Location::Register(r)),
            ParamLocation::Stack(off) => {
                // Copy the incoming slot into the local frame so the value
                // has a %fp-negative home like everything else.
                let slot = self.frame.allocate(v, 8, 8);
                let src = self.checked_disp((CallingConvention::RESERVED_AREA + off) as i64)?;
                self.emit(Inst::Ld {
                    rd: Reg::SCRATCH,
                    base: Reg::FP,
                    offset: src,
                    size: 8,
                    signed: false,
                });
                let dst = self.fp_offset(slot)?;
                self.emit(Inst::St {
                    rs: Reg::SCRATCH,
                    base: Reg::FP,
                    offset: dst,
                    size: 8,
                });
                Ok(Location::StackOffset(slot))
            }
        }
    }

    fn lower_ret(
        &mut self,
        v: ValueId,
        operand: Option<ValueId>,
    ) -> Result<Location, CompilerError> {
        if let Some(o) = operand {
            let loc = self.table.resolve(o);
            match self.ret_loc {
                Location::Register(rd) => self.gen_set_reg(rd, loc)?,
                Location::None => {}
                other => panic!("unexpected return location {}", other),
            }
        }
        self.process_deaths(v);
        if self.naked {
            self.emit(Inst::Ret);
            self.emit(Inst::Nop);
        } else {
            // All returns funnel through one epilogue
            let idx = self.emit(Inst::Ba(PENDING_TARGET));
            self.emit(Inst::Nop);
            self.exitlude.push(idx);
        }
        Ok(Location::None)
    }

    fn lower_global_addr(&mut self, v: ValueId, symbol: &str) -> Result<Location, CompilerError> {
        let rd = self.alloc_reg(v)?;
        let idx = self.emit(Inst::LdGot {
            rd,
            symbol: symbol.to_string(),
        });
        self.relocs.push(Reloc {
            kind: tern_codegen::RelocKind::GotLoad,
            symbol: symbol.to_string(),
            inst: idx,
        });
        Ok(Location::Register(rd))
    }

    fn assemble(mut self) -> FnOutput {
        assert_eq!(self.table.depth(), 1, "unclosed value table scopes");
        assert!(self.branch_pools.is_empty(), "unclosed branch snapshots");
        assert!(self.blocks.is_empty(), "unclosed block scopes");

        if self.naked {
            assert_eq!(
                self.frame.locals_bytes(),
                0,
                "naked function cannot use the stack frame"
            );
            return FnOutput {
                name: self.func.name.clone(),
                insts: self.insts,
                relocs: self.relocs,
                frame_size: 0,
            };
        }

        // A return at the very end of the body would jump to the next
        // instruction; drop it and fall through into the epilogue.
        if self.insts.len() >= 2 {
            let ba = self.insts.len() - 2;
            if self.exitlude.last() == Some(&ba)
                && matches!(self.insts[ba], Inst::Ba(PENDING_TARGET))
            {
                debug_assert!(matches!(self.insts[ba + 1], Inst::Nop));
                self.insts.truncate(ba);
                self.exitlude.pop();
            }
        }

        let epilogue = self.insts.len();
        let pending = std::mem::take(&mut self.exitlude);
        for idx in pending {
            self.patch_branch(idx, epilogue);
        }

        self.emit(Inst::DbgEpilogueBegin);
        self.emit(Inst::Ret);
        // The delay slot restores the caller's register window
        self.emit(Inst::Restore);

        let frame_size = self.frame.finalize(CallingConvention::STACK_ALIGN);
        self.insts[0] = Inst::Save(frame_size);

        FnOutput {
            name: self.func.name.clone(),
            insts: self.insts,
            relocs: self.relocs,
            frame_size,
        }
    }

    // ---- emission helpers ----

    pub(crate) fn emit(&mut self, inst: Inst) -> InstIdx {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    /// Index the next emitted instruction will get
    pub(crate) fn here(&self) -> InstIdx {
        self.insts.len()
    }

    pub(crate) fn patch_branch(&mut self, idx: InstIdx, target: InstIdx) {
        match self.insts[idx].branch_target_mut() {
            Some(t) => *t = target,
            None => panic!("patching a non-branch at {}", idx),
        }
    }

    // ---- liveness helpers ----

    pub(crate) fn is_unused(&self, v: ValueId) -> bool {
        self.liveness.is_unused(v)
    }

    pub(crate) fn operand_dies(&self, v: ValueId, index: usize) -> bool {
        self.tombs[v.index()] & (1 << index) != 0
    }

    /// Free resources of every operand dying at `v`, per the working copy
    /// of the death bits. Consumes the bits, so branching instructions that
    /// process their deaths early are not double-counted by the main walk.
    pub(crate) fn process_deaths(&mut self, v: ValueId) {
        let func = self.func;
        let operands = func.inst(v).op.operands();
        let bits = std::mem::replace(&mut self.tombs[v.index()], 0);
        for (index, &operand) in operands.iter().enumerate() {
            if bits & (1 << index) != 0 {
                self.kill_value(operand);
            }
        }
    }

    pub(crate) fn kill_value(&mut self, value: ValueId) {
        let loc = self.table.resolve(value);
        trace!("{} dies at {}", value, loc);
        if let Location::Register(r) = loc {
            if RegisterPool::is_allocatable(r) && self.pool.owner(r) == Some(value) {
                self.pool.free(r);
            }
        }
        if loc.is_flags() && self.flags_owner == Some(value) {
            self.flags_owner = None;
        }
        self.table.kill(value);
    }

    // ---- register helpers ----

    /// Allocate a register for `value`, spilling at most one existing
    /// resident to make room. With every register locked there is nothing
    /// left to evict and the function fails.
    pub(crate) fn alloc_reg(&mut self, value: ValueId) -> Result<Reg, CompilerError> {
        if let Some(r) = self.pool.try_allocate(value) {
            return Ok(r);
        }
        let (reg, owner) =
            self.pool
                .spill_candidate()
                .ok_or_else(|| CompilerError::OutOfRegisters {
                    location: self.loc.clone(),
                })?;
        self.spill(reg, owner)?;
        Ok(self
            .pool
            .try_allocate(value)
            .expect("register freed by spill"))
    }

    /// Evict `owner` from `reg` into a fresh stack slot.
    pub(crate) fn spill(&mut self, reg: Reg, owner: ValueId) -> Result<(), CompilerError> {
        debug!("spilling {} out of {}", owner, reg);
        let off = self.frame.allocate(owner, 8, 8);
        let disp = self.fp_offset(off)?;
        self.emit(Inst::St {
            rs: reg,
            base: Reg::FP,
            offset: disp,
            size: 8,
        });
        self.table.set(owner, Location::StackOffset(off));
        self.pool.free(reg);
        Ok(())
    }

    /// Bring an operand into a register, locking it for the duration of the
    /// current instruction. Values not already in a register are
    /// materialized into a freshly allocated one and re-homed there.
    pub(crate) fn operand_reg(
        &mut self,
        v: ValueId,
    ) -> Result<(Reg, Option<RegLock>), CompilerError> {
        let loc = self.table.resolve(v);
        if let Location::Register(r) = loc {
            let lock = if RegisterPool::is_allocatable(r) {
                Some(self.pool.lock(r))
            } else {
                None
            };
            return Ok((r, lock));
        }
        if loc == Location::Immediate(0) {
            return Ok((Reg::ZERO, None));
        }
        let r = self.alloc_reg(v)?;
        let lock = self.pool.lock(r);
        self.gen_set_reg(r, loc)?;
        self.table.set(v, Location::Register(r));
        Ok((r, Some(lock)))
    }

    pub(crate) fn unlock(&mut self, lock: Option<RegLock>) {
        if let Some(lock) = lock {
            self.pool.unlock(lock);
        }
    }

    /// If the operand at `index` dies at `v` and lives in a pool register,
    /// transfer the register to `v` and clear the death bit.
    pub(crate) fn take_over_operand(
        &mut self,
        v: ValueId,
        index: usize,
        operand: ValueId,
    ) -> Option<Reg> {
        if !self.operand_dies(v, index) {
            return None;
        }
        match self.table.resolve(operand) {
            Location::Register(r)
                if RegisterPool::is_allocatable(r) && self.pool.owner(r) == Some(operand) =>
            {
                trace!("{} takes over {} from {}", v, r, operand);
                self.pool.reassign(r, v);
                self.tombs[v.index()] &= !(1 << index);
                self.table.kill(operand);
                Some(r)
            }
            _ => None,
        }
    }

    /// Force a pending comparison out of the condition codes and into a
    /// register, ahead of anything that will clobber them.
    pub(crate) fn spill_flags(&mut self) -> Result<(), CompilerError> {
        let Some(owner) = self.flags_owner.take() else {
            return Ok(());
        };
        let loc = self.table.resolve(owner);
        debug_assert!(loc.is_flags());
        let r = self.alloc_reg(owner)?;
        self.gen_set_reg(r, loc)?;
        self.table.set(owner, Location::Register(r));
        Ok(())
    }

    /// Move every register-resident value to the stack. Loop entries do
    /// this so the state at the back edge trivially matches the state at
    /// the loop head.
    pub(crate) fn spill_everything(&mut self) -> Result<(), CompilerError> {
        self.spill_flags()?;
        for &reg in ALLOCATABLE_REGISTERS.iter() {
            if let Some(owner) = self.pool.owner(reg) {
                // Open block results keep their register; a value that does
                // not exist yet cannot be parked in a slot.
                if self.blocks.contains_key(&owner) {
                    continue;
                }
                self.spill(reg, owner)?;
            }
        }
        Ok(())
    }

    // ---- value movement ----

    /// Emit code putting `src` into register `rd`.
    pub(crate) fn gen_set_reg(&mut self, rd: Reg, src: Location) -> Result<(), CompilerError> {
        src.assert_materialized();
        match src {
            Location::None | Location::Dead | Location::Unreachable => unreachable!(),
            Location::Undefined => self.materialize_imm(rd, tern_codegen::UNDEF_SENTINEL)?,
            Location::Immediate(value) => self.materialize_imm(rd, value)?,
            Location::Register(rs) => {
                if rs != rd {
                    self.emit(Inst::Mov(rd, rs));
                }
            }
            Location::StackOffset(off) => {
                let disp = self.fp_offset(off)?;
                self.emit(Inst::Ld {
                    rd,
                    base: Reg::FP,
                    offset: disp,
                    size: 8,
                    signed: false,
                });
            }
            Location::StackAddress(off) => {
                let disp = self.fp_offset(off)?;
                self.emit(Inst::AddI(rd, Reg::FP, disp));
            }
            Location::Memory(addr) => {
                self.materialize_imm(rd, addr)?;
                self.emit(Inst::Ld {
                    rd,
                    base: rd,
                    offset: 0,
                    size: 8,
                    signed: false,
                });
            }
            Location::FlagsSigned(cond, cc) | Location::FlagsUnsigned(cond, cc) => {
                self.emit(Inst::MovCond(cond, cc, rd));
            }
        }
        Ok(())
    }

    /// Emit code storing `src` into the slot at `%fp - offset`.
    pub(crate) fn gen_set_stack(
        &mut self,
        offset: u32,
        size: u8,
        src: Location,
    ) -> Result<(), CompilerError> {
        src.assert_materialized();
        let disp = self.fp_offset(offset)?;
        let rs = match src {
            Location::Register(r) => r,
            Location::Immediate(0) => Reg::ZERO,
            _ => {
                self.gen_set_reg(Reg::SCRATCH, src)?;
                Reg::SCRATCH
            }
        };
        self.emit(Inst::St {
            rs,
            base: Reg::FP,
            offset: disp,
            size,
        });
        Ok(())
    }

    /// Write `src` into a destination that must be a register or stack
    /// slot. Used for branch result funnelling and reconciliation.
    pub(crate) fn gen_set_loc(&mut self, dst: Location, src: Location) -> Result<(), CompilerError> {
        if dst == src {
            return Ok(());
        }
        match dst {
            Location::Register(rd) => self.gen_set_reg(rd, src),
            Location::StackOffset(off) => self.gen_set_stack(off, 8, src),
            Location::None => Ok(()),
            other => panic!("cannot store into {}", other),
        }
    }

    /// Load a constant into `rd`: one instruction up to simm13, a
    /// `sethi`/`or` pair up to 32 bits.
    pub(crate) fn materialize_imm(&mut self, rd: Reg, value: u64) -> Result<(), CompilerError> {
        if fits_simm13(value as i64) {
            // or %g0, simm13 sign-extends, covering small negatives too
            self.emit(Inst::OrI(rd, Reg::ZERO, value as i16));
        } else if value <= u32::MAX as u64 {
            self.emit(Inst::SetHi(rd, (value >> 10) as u32));
            let low = (value & 0x3ff) as i16;
            if low != 0 {
                self.emit(Inst::OrI(rd, rd, low));
            }
        } else {
            return Err(CompilerError::not_implemented(
                "constants wider than 32 bits",
                self.loc.clone(),
            ));
        }
        Ok(())
    }

    // ---- displacements ----

    /// Displacement of the slot at `%fp - offset`, checked against the
    /// 13-bit field.
    pub(crate) fn fp_offset(&self, offset: u32) -> Result<i16, CompilerError> {
        self.checked_disp(-(offset as i64))
    }

    pub(crate) fn checked_disp(&self, disp: i64) -> Result<i16, CompilerError> {
        if !fits_simm13(disp) {
            return Err(CompilerError::not_implemented(
                "stack frames beyond the 13-bit displacement range",
                self.loc.clone(),
            ));
        }
        Ok(disp as i16)
    }
}
