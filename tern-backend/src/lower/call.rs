//! Call lowering
//!
//! Calls resolve the caller-side view of the callee's signature: arguments
//! move into `%o0-%o5` or the outgoing stack area, the `call` carries a
//! relocation record instead of an address, and its delay slot gets a nop.
//! Window locals survive the call untouched, so nothing else needs saving;
//! only a pending comparison has to leave the condition codes first.

use super::FnLowering;
use tern_codegen::{
    CallingConvention, Inst, Location, ParamLocation, Reg, Reloc, RelocKind, Role,
};
use tern_common::CompilerError;
use tern_ir::ir::ValueId;
use tern_ir::types::FnType;

impl<'a> FnLowering<'a> {
    pub(crate) fn lower_call(
        &mut self,
        v: ValueId,
        callee: &str,
        sig: &FnType,
        args: &[ValueId],
    ) -> Result<Location, CompilerError> {
        self.spill_flags()?;

        let abi = CallingConvention::resolve(sig, Role::Caller)
            .map_err(|e| CompilerError::not_implemented(e.to_string(), self.loc.clone()))?;
        assert_eq!(abi.params.len(), args.len(), "call arity mismatch");
        self.frame.record_outgoing(abi.stack_bytes);

        for (&arg, &param) in args.iter().zip(abi.params.iter()) {
            let loc = self.table.resolve(arg);
            match param {
                ParamLocation::Register(rd) => self.gen_set_reg(rd, loc)?,
                ParamLocation::Stack(off) => {
                    let disp =
                        self.checked_disp((CallingConvention::RESERVED_AREA + off) as i64)?;
                    let rs = match loc {
                        Location::Register(r) => r,
                        Location::Immediate(0) => Reg::ZERO,
                        _ => {
                            self.gen_set_reg(Reg::SCRATCH, loc)?;
                            Reg::SCRATCH
                        }
                    };
                    self.emit(Inst::St {
                        rs,
                        base: Reg::SP,
                        offset: disp,
                        size: 8,
                    });
                }
            }
        }

        let idx = self.emit(Inst::Call(callee.to_string()));
        self.relocs.push(Reloc {
            kind: RelocKind::Call,
            symbol: callee.to_string(),
            inst: idx,
        });
        self.emit(Inst::Nop);

        match abi.ret {
            Location::None => Ok(Location::None),
            Location::Register(ret_reg) => {
                if self.is_unused(v) {
                    return Ok(Location::None);
                }
                // Get the result out of the volatile window before the next
                // call overwrites it.
                let rd = self.alloc_reg(v)?;
                self.emit(Inst::Mov(rd, ret_reg));
                Ok(Location::Register(rd))
            }
            other => panic!("unexpected return placement {}", other),
        }
    }
}
