//! SPARC64 Calling Convention
//!
//! Resolves a function type into concrete argument and return placements.
//! Because `save` rotates the register window, the same physical argument
//! slot is `%o0-%o5` from the caller's side and `%i0-%i5` from the callee's
//! side; [`Role`] selects which view the resolver produces.

use crate::asm::Reg;
use crate::location::Location;
use tern_ir::types::{CallConv, FnType};
use thiserror::Error;

/// Which side of a call is asking for placements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Callee,
}

/// Errors raised during calling-convention resolution
///
/// Both variants mark inputs the backend does not handle yet; callers
/// convert them into function-scoped "not yet implemented" diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("parameter {index} is {size} bytes and would need to be split across registers")]
    SplitParameter { index: usize, size: u32 },

    #[error("return value is {size} bytes and does not fit the return register")]
    ReturnTooWide { size: u32 },
}

/// Where one parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Register(Reg),
    /// Byte offset into the outgoing argument area, past the reserved
    /// region. The caller addresses it off `%sp`, the callee off `%fp`.
    Stack(u32),
}

/// Placements for every parameter and the return value of one signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAbi {
    pub params: Vec<ParamLocation>,
    /// `Location::None` for unit returns, otherwise a register
    pub ret: Location,
    /// Bytes of stack argument area the caller must provide beyond the
    /// reserved region
    pub stack_bytes: u32,
}

pub struct CallingConvention;

impl CallingConvention {
    /// Argument registers as the caller names them
    pub const ARG_REGS_CALLER: [Reg; 6] =
        [Reg::O0, Reg::O1, Reg::O2, Reg::O3, Reg::O4, Reg::O5];
    /// The same physical registers after the window rotates
    pub const ARG_REGS_CALLEE: [Reg; 6] =
        [Reg::I0, Reg::I1, Reg::I2, Reg::I3, Reg::I4, Reg::I5];

    pub const RET_REG_CALLER: Reg = Reg::O0;
    pub const RET_REG_CALLEE: Reg = Reg::I0;

    /// Every frame reserves this much below the stack pointer: 128 bytes
    /// for the register window spill area plus 48 bytes of ABI scratch.
    /// Stack arguments start immediately above it.
    pub const RESERVED_AREA: u32 = 176;

    /// Required alignment of the stack pointer at all times
    pub const STACK_ALIGN: u32 = 16;

    /// Each stack argument occupies one 8-byte slot
    pub const ARG_SLOT_SIZE: u32 = 8;

    /// Resolve `fn_ty` into placements from the given side of the call.
    pub fn resolve(fn_ty: &FnType, role: Role) -> Result<ResolvedAbi, AbiError> {
        if fn_ty.conv == CallConv::Naked {
            assert!(
                fn_ty.params.is_empty(),
                "naked function declared with parameters"
            );
            return Ok(ResolvedAbi {
                params: Vec::new(),
                ret: Location::None,
                stack_bytes: 0,
            });
        }

        let (arg_regs, ret_reg) = match role {
            Role::Caller => (&Self::ARG_REGS_CALLER, Self::RET_REG_CALLER),
            Role::Callee => (&Self::ARG_REGS_CALLEE, Self::RET_REG_CALLEE),
        };

        let mut params = Vec::with_capacity(fn_ty.params.len());
        let mut next_reg = 0;
        let mut stack_bytes = 0u32;
        for (index, ty) in fn_ty.params.iter().enumerate() {
            let size = ty.size_in_bytes();
            if size <= 8 {
                if next_reg < arg_regs.len() {
                    params.push(ParamLocation::Register(arg_regs[next_reg]));
                    next_reg += 1;
                } else {
                    params.push(ParamLocation::Stack(stack_bytes));
                    stack_bytes += Self::ARG_SLOT_SIZE;
                }
            } else if size <= 16 {
                return Err(AbiError::SplitParameter { index, size });
            } else {
                // Large aggregates go on the stack by value
                params.push(ParamLocation::Stack(stack_bytes));
                stack_bytes += size.div_ceil(Self::ARG_SLOT_SIZE) * Self::ARG_SLOT_SIZE;
            }
        }

        let ret_size = fn_ty.ret.size_in_bytes();
        let ret = if ret_size == 0 {
            Location::None
        } else if ret_size <= 8 {
            Location::Register(ret_reg)
        } else {
            return Err(AbiError::ReturnTooWide { size: ret_size });
        };

        Ok(ResolvedAbi {
            params,
            ret,
            stack_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tern_ir::types::Type;

    #[test]
    fn test_two_scalar_args_caller_view() {
        let ty = FnType::new(vec![Type::I64, Type::I64], Type::I64);
        let abi = CallingConvention::resolve(&ty, Role::Caller).unwrap();
        assert_eq!(
            abi.params,
            vec![
                ParamLocation::Register(Reg::O0),
                ParamLocation::Register(Reg::O1)
            ]
        );
        assert_eq!(abi.ret, Location::Register(Reg::O0));
        assert_eq!(abi.stack_bytes, 0);
    }

    #[test]
    fn test_callee_sees_incoming_window() {
        let ty = FnType::new(vec![Type::U32], Type::U32);
        let abi = CallingConvention::resolve(&ty, Role::Callee).unwrap();
        assert_eq!(abi.params, vec![ParamLocation::Register(Reg::I0)]);
        assert_eq!(abi.ret, Location::Register(Reg::I0));
    }

    #[test]
    fn test_seventh_argument_spills_to_stack() {
        let ty = FnType::new(vec![Type::I64; 8], Type::Unit);
        let abi = CallingConvention::resolve(&ty, Role::Caller).unwrap();
        assert_eq!(abi.params[5], ParamLocation::Register(Reg::O5));
        assert_eq!(abi.params[6], ParamLocation::Stack(0));
        assert_eq!(abi.params[7], ParamLocation::Stack(8));
        assert_eq!(abi.stack_bytes, 16);
        assert_eq!(abi.ret, Location::None);
    }

    #[test]
    fn test_split_parameter_is_rejected() {
        let ty = FnType::new(vec![Type::I128], Type::Unit);
        let err = CallingConvention::resolve(&ty, Role::Callee).unwrap_err();
        assert_eq!(err, AbiError::SplitParameter { index: 0, size: 16 });
    }

    #[test]
    fn test_naked_has_no_placements() {
        let ty = FnType::naked(Type::Unit);
        let abi = CallingConvention::resolve(&ty, Role::Callee).unwrap();
        assert!(abi.params.is_empty());
        assert_eq!(abi.ret, Location::None);
    }
}
