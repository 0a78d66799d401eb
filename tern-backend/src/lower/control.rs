//! Control flow lowering
//!
//! Blocks collect forward jumps whose target index is unknown until the
//! block closes; the first `br` into a block also commits the block's
//! result location, and every later `br` funnels its operand into it.
//! Loops jump back unconditionally. Conditional branches run each arm
//! against its own value-table overlay and a snapshot of the allocation
//! state, then reconcile the two arms at the join: the then arm's location
//! is canonical, and fix-up moves are emitted only on the else path, right
//! before the join point.

use super::{BlockScope, FnLowering, PENDING_TARGET};
use log::debug;
use std::collections::HashMap;
use tern_codegen::{Inst, Location, Reg, RegisterPool, ALLOCATABLE_REGISTERS};
use tern_common::CompilerError;
use tern_ir::ir::ValueId;

impl<'a> FnLowering<'a> {
    pub(crate) fn lower_block(
        &mut self,
        v: ValueId,
        body: &[ValueId],
    ) -> Result<Location, CompilerError> {
        self.blocks.insert(v, BlockScope::default());
        self.table.push_scope();
        self.walk_body(body)?;
        // Straight-line scope: everything learned inside stays valid
        self.table.pop_scope_merge();

        let scope = self.blocks.remove(&v).expect("block scope vanished");
        let end = self.here();
        for idx in scope.pending {
            self.patch_branch(idx, end);
        }
        Ok(scope.result.unwrap_or(Location::None))
    }

    pub(crate) fn lower_loop(&mut self, body: &[ValueId]) -> Result<Location, CompilerError> {
        // Park everything on the stack so the machine state at the back
        // edge matches the state at the loop head without fix-ups.
        self.spill_everything()?;
        self.branch_pools.push(self.pool.clone());

        let start = self.here();
        self.table.push_scope();
        self.walk_body(body)?;
        self.table.pop_scope();

        self.emit(Inst::Ba(start));
        self.emit(Inst::Nop);

        self.pool = self.branch_pools.pop().expect("loop entry snapshot");
        self.flags_owner = None;
        Ok(Location::None)
    }

    pub(crate) fn lower_br(
        &mut self,
        v: ValueId,
        block: ValueId,
        operand: Option<ValueId>,
    ) -> Result<Location, CompilerError> {
        assert!(self.blocks.contains_key(&block), "br to a closed block");

        if let Some(op_v) = operand {
            let op_loc = self.table.resolve(op_v);
            let dst = match self.blocks[&block].result {
                Some(c) => c,
                None => {
                    let c = self.choose_block_result(v, block, op_v, op_loc)?;
                    debug!("{}: result location {}", block, c);
                    self.blocks.get_mut(&block).unwrap().result = Some(c);
                    c
                }
            };
            if dst != op_loc {
                self.gen_set_loc(dst, op_loc)?;
            }
        }

        self.process_deaths(v);
        let idx = self.emit(Inst::Ba(PENDING_TARGET));
        self.emit(Inst::Nop);
        self.blocks.get_mut(&block).unwrap().pending.push(idx);
        Ok(Location::None)
    }

    /// Commit the block's result location at its first `br`. A dying
    /// operand's home is adopted when that is safe; otherwise a register
    /// free on every enclosing path is reserved, falling back to a stack
    /// slot under pressure.
    fn choose_block_result(
        &mut self,
        v: ValueId,
        block: ValueId,
        op_v: ValueId,
        op_loc: Location,
    ) -> Result<Location, CompilerError> {
        if self.operand_dies(v, 0) {
            match op_loc {
                // Slots are never reused, so adopting one is always safe
                Location::StackOffset(_) => {
                    self.tombs[v.index()] &= !1;
                    self.table.kill(op_v);
                    return Ok(op_loc);
                }
                // A register can change hands only when no enclosing arm
                // could see a different owner for it
                Location::Register(r)
                    if self.branch_pools.is_empty()
                        && RegisterPool::is_allocatable(r)
                        && self.pool.owner(r) == Some(op_v) =>
                {
                    self.pool.reassign(r, block);
                    self.tombs[v.index()] &= !1;
                    self.table.kill(op_v);
                    return Ok(op_loc);
                }
                _ => {}
            }
        }

        for &reg in ALLOCATABLE_REGISTERS.iter() {
            if self.pool.is_free(reg) && self.branch_pools.iter().all(|p| p.owner(reg).is_none()) {
                self.pool.mark_allocated(reg, block);
                for pool in &mut self.branch_pools {
                    pool.mark_allocated(reg, block);
                }
                return Ok(Location::Register(reg));
            }
        }
        let off = self.frame.allocate(block, 8, 8);
        Ok(Location::StackOffset(off))
    }

    pub(crate) fn lower_cond_br(
        &mut self,
        v: ValueId,
        cond: ValueId,
        then_body: &[ValueId],
        else_body: &[ValueId],
    ) -> Result<Location, CompilerError> {
        // Keep the condition codes only when they belong to this condition
        // and nothing reads it again afterwards.
        let cond_dies = self.operand_dies(v, 0);
        if self.flags_owner != Some(cond) || !cond_dies {
            self.spill_flags()?;
        }

        // Jump to the else arm when the condition fails
        let to_else = match self.table.resolve(cond) {
            Location::FlagsSigned(c, cc) | Location::FlagsUnsigned(c, cc) => {
                self.emit(Inst::Bcc(c.negate(), cc, PENDING_TARGET))
            }
            _ => {
                let (r, lock) = self.operand_reg(cond)?;
                let idx = self.emit(Inst::Brz(r, PENDING_TARGET));
                self.unlock(lock);
                idx
            }
        };
        self.emit(Inst::Nop);
        self.process_deaths(v);

        let (then_deaths, else_deaths) = self.liveness.cond_br_deaths(v);
        let then_deaths = then_deaths.to_vec();
        let else_deaths = else_deaths.to_vec();

        let saved_flags = self.flags_owner;
        self.branch_pools.push(self.pool.clone());

        // then arm
        self.table.push_scope();
        for &d in &then_deaths {
            self.kill_value(d);
        }
        self.walk_body(then_body)?;
        let then_overlay = self.table.pop_scope();
        let skip_else = self.emit(Inst::Ba(PENDING_TARGET));
        self.emit(Inst::Nop);

        // else arm, from the snapshot the then arm started with
        self.patch_branch(to_else, self.here());
        self.pool = self.branch_pools.last().expect("branch snapshot").clone();
        self.flags_owner = saved_flags;
        self.table.push_scope();
        for &d in &else_deaths {
            self.kill_value(d);
        }
        self.walk_body(else_body)?;
        let else_overlay = self.table.pop_scope();

        // Fix-ups land at the end of the else path; the then arm's jump
        // goes straight past them to the join point.
        self.reconcile(&then_overlay, &else_overlay)?;

        self.branch_pools.pop();
        self.patch_branch(skip_else, self.here());
        self.flags_owner = None;
        self.sweep_stale_registers();
        Ok(Location::None)
    }

    /// Merge the two arms of a conditional. For every value either arm
    /// relocated, the then arm's location becomes canonical; the else path
    /// gets moves making its state match. Every canonical decision is made
    /// before any fix-up is emitted, so a later decision never disturbs a
    /// location that was already settled. Values dead on both arms are
    /// dead after the join, and a value dead on exactly one arm means the
    /// liveness bits and the lowering disagree, which is fatal.
    fn reconcile(
        &mut self,
        then_overlay: &HashMap<ValueId, Location>,
        else_overlay: &HashMap<ValueId, Location>,
    ) -> Result<(), CompilerError> {
        let mut keys: Vec<ValueId> = then_overlay
            .keys()
            .chain(else_overlay.keys())
            .copied()
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let mut fixups: Vec<(ValueId, Location, Location)> = Vec::new();
        for value in keys {
            let outer = self.table.get(value);
            let (then_loc, else_loc) = match (
                then_overlay.get(&value).copied().or(outer),
                else_overlay.get(&value).copied().or(outer),
            ) {
                (Some(t), Some(e)) => (t, e),
                // Defined inside one arm; cannot be observed past the join
                _ => continue,
            };

            if then_loc == else_loc {
                if outer != Some(then_loc) {
                    self.table.set(value, then_loc);
                }
                continue;
            }

            if then_loc == Location::Dead || else_loc == Location::Dead {
                panic!("{} is dead on only one branch arm", value);
            }

            debug!(
                "reconciling {}: {} (then) vs {} (else)",
                value, then_loc, else_loc
            );
            // The else path is done with this register; the data moves out
            // of it below.
            if let Location::Register(r) = else_loc {
                if RegisterPool::is_allocatable(r) && self.pool.owner(r) == Some(value) {
                    self.pool.free(r);
                }
            }
            // Immediates and addresses are position-independent, so an
            // arm's register cache of one is simply abandoned.
            if matches!(then_loc, Location::Register(_) | Location::StackOffset(_)) {
                fixups.push((value, then_loc, else_loc));
            }
            self.table.set(value, then_loc);
        }

        for &(value, dst, _) in &fixups {
            if let Location::Register(r) = dst {
                if RegisterPool::is_allocatable(r) {
                    self.pool.mark_allocated(r, value);
                }
            }
        }

        // Emit the moves so that no register is overwritten while another
        // pending move still reads it; a cycle parks one source in a fresh
        // stack slot.
        while !fixups.is_empty() {
            let ready = fixups.iter().position(|&(_, dst, _)| match dst {
                Location::Register(r) => !fixups
                    .iter()
                    .any(|&(_, other, src)| other != dst && src == Location::Register(r)),
                _ => true,
            });
            match ready {
                Some(i) => {
                    let (_, dst, src) = fixups.swap_remove(i);
                    self.gen_set_loc(dst, src)?;
                }
                None => {
                    let i = fixups
                        .iter()
                        .position(|&(_, _, src)| matches!(src, Location::Register(_)))
                        .expect("blocked fix-ups with no register source");
                    let (value, _, src) = fixups[i];
                    let Location::Register(rs) = src else {
                        unreachable!()
                    };
                    let off = self.frame.allocate(value, 8, 8);
                    let disp = self.fp_offset(off)?;
                    self.emit(Inst::St {
                        rs,
                        base: Reg::FP,
                        offset: disp,
                        size: 8,
                    });
                    fixups[i].2 = Location::StackOffset(off);
                }
            }
        }
        Ok(())
    }

    /// Drop pool ownership that no longer matches the value table. After a
    /// join, a path may have parked a value elsewhere while the restored
    /// snapshot still pins its old register.
    fn sweep_stale_registers(&mut self) {
        for &reg in ALLOCATABLE_REGISTERS.iter() {
            if let Some(owner) = self.pool.owner(reg) {
                if self.blocks.contains_key(&owner) {
                    continue;
                }
                if self.table.get(owner) != Some(Location::Register(reg)) {
                    self.pool.free(reg);
                }
            }
        }
    }
}
