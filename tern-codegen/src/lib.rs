//! Tern Compiler - SPARC64 Target Description
//!
//! This crate defines the SPARC64 machine model shared by the lowering
//! backend and the encoder: the register file and its window views, the
//! output instruction list, the value-location model, the register pool,
//! and the calling convention.

pub mod abi;
pub mod asm;
pub mod location;
pub mod regalloc;

pub use abi::{AbiError, CallingConvention, ParamLocation, ResolvedAbi, Role};
pub use asm::{fits_simm13, CcReg, Cond, Inst, InstIdx, Reg, Reloc, RelocKind};
pub use location::{Location, UNDEF_SENTINEL};
pub use regalloc::{RegLock, RegisterPool, ALLOCATABLE_REGISTERS};
