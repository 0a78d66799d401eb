//! Tern Compiler - Mid-Level IR
//!
//! This crate defines the typed, architecture-independent instruction stream
//! that target backends consume, together with the liveness annotations
//! ("tomb bits") that drive register freeing during lowering. The front end
//! produces both; backends treat them as immutable input.

pub mod ir;
pub mod liveness;
pub mod types;

pub use ir::{BinOp, CmpOp, FuncBuilder, Function, Inst, Module, Op, ValueId};
pub use liveness::Liveness;
pub use types::{CallConv, FnType, Type};
