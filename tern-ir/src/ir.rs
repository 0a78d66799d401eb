//! IR instruction stream
//!
//! A function body is an ordered list of `ValueId`s into the function's
//! instruction table. Control flow is structured: `Block` and `Loop` own
//! nested bodies, `Br` targets an enclosing `Block` (optionally carrying its
//! result value), and `CondBr` owns a then/else body pair. This keeps
//! lowering a single depth-first walk with explicit scopes, which is exactly
//! the shape the branch-scoped value table in the backend wants.

use crate::types::{FnType, Type};
use std::fmt;
use tern_common::SourceSpan;

/// Index of an instruction (and therefore of the value it produces)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Binary arithmetic/logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    /// Whether operands may be swapped to fit an immediate on either side
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor
        )
    }
}

/// Comparison operators; signedness comes from the operand type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// The comparison that holds after swapping the two operands
    pub fn swap_operands(&self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }
}

/// IR operations
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// The n-th function parameter
    Arg { index: u16 },
    /// Integer constant; the instruction's type gives width and signedness
    ConstInt { value: u64 },
    /// Reserve a stack slot; the value is its address
    Alloc { size: u32, align: u32 },
    Load {
        ptr: ValueId,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
    },
    /// Address of a field at a constant byte offset from a base pointer
    FieldPtr {
        base: ValueId,
        offset: u32,
    },
    /// `base + index * elem_size`, in bytes
    PtrAdd {
        base: ValueId,
        index: ValueId,
        elem_size: u32,
    },
    Bin {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cmp {
        op: CmpOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Call {
        callee: String,
        sig: FnType,
        args: Vec<ValueId>,
    },
    /// Address of a global symbol, resolved through the GOT at link time
    GlobalAddr { symbol: String },
    /// Scoped block; `Br`s targeting it supply its result value
    Block { body: Vec<ValueId> },
    /// Infinite loop; exits happen via `Br` to an enclosing block
    Loop { body: Vec<ValueId> },
    /// Jump to the end of `block`, optionally carrying the block's result
    Br {
        block: ValueId,
        operand: Option<ValueId>,
    },
    CondBr {
        cond: ValueId,
        then_body: Vec<ValueId>,
        else_body: Vec<ValueId>,
    },
    Ret { operand: Option<ValueId> },
    Unreachable,
}

impl Op {
    /// Operand values, in tomb-bit order
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::Arg { .. }
            | Op::ConstInt { .. }
            | Op::Alloc { .. }
            | Op::GlobalAddr { .. }
            | Op::Block { .. }
            | Op::Loop { .. }
            | Op::Unreachable => Vec::new(),
            Op::Load { ptr } => vec![*ptr],
            Op::Store { ptr, value } => vec![*ptr, *value],
            Op::FieldPtr { base, .. } => vec![*base],
            Op::PtrAdd { base, index, .. } => vec![*base, *index],
            Op::Bin { lhs, rhs, .. } | Op::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Call { args, .. } => args.clone(),
            Op::Br { operand, .. } => operand.iter().copied().collect(),
            Op::CondBr { cond, .. } => vec![*cond],
            Op::Ret { operand } => operand.iter().copied().collect(),
        }
    }

    /// Whether the operation must be emitted even if its result is unused
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Op::Store { .. }
                | Op::Call { .. }
                | Op::Block { .. }
                | Op::Loop { .. }
                | Op::Br { .. }
                | Op::CondBr { .. }
                | Op::Ret { .. }
                | Op::Unreachable
        )
    }
}

/// One IR instruction: an operation plus the type of the value it produces
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub op: Op,
    pub ty: Type,
}

/// A function: signature, instruction table, top-level body, source span
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ty: FnType,
    pub insts: Vec<Inst>,
    pub body: Vec<ValueId>,
    pub span: SourceSpan,
}

impl Function {
    pub fn inst(&self, v: ValueId) -> &Inst {
        &self.insts[v.index()]
    }
}

/// A whole compilation unit handed to a backend
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }
}

enum BuildFrame {
    /// Reserved block/loop instruction, accumulating its body
    Block(ValueId, Vec<ValueId>),
    Loop(ValueId, Vec<ValueId>),
    /// Cond-br under construction: condition, finished then-body (if the
    /// else side is open), current body
    CondThen(ValueId, Vec<ValueId>),
    CondElse(ValueId, Vec<ValueId>, Vec<ValueId>),
}

/// Convenience builder used by tests and by front ends that construct IR
/// directly. Blocks and loops reserve their instruction slot up front so
/// `Br` can reference them while their body is still open.
pub struct FuncBuilder {
    name: String,
    ty: FnType,
    insts: Vec<Inst>,
    body: Vec<ValueId>,
    frames: Vec<BuildFrame>,
}

impl FuncBuilder {
    pub fn new(name: impl Into<String>, ty: FnType) -> Self {
        Self {
            name: name.into(),
            ty,
            insts: Vec::new(),
            body: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Append an instruction to the innermost open body
    pub fn push(&mut self, op: Op, ty: Type) -> ValueId {
        let id = ValueId(self.insts.len() as u32);
        self.insts.push(Inst { op, ty });
        self.current_body().push(id);
        id
    }

    fn current_body(&mut self) -> &mut Vec<ValueId> {
        match self.frames.last_mut() {
            Some(BuildFrame::Block(_, body))
            | Some(BuildFrame::Loop(_, body))
            | Some(BuildFrame::CondThen(_, body))
            | Some(BuildFrame::CondElse(_, _, body)) => body,
            None => &mut self.body,
        }
    }

    fn reserve(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.insts.len() as u32);
        // Placeholder, replaced when the scope closes
        self.insts.push(Inst {
            op: Op::Unreachable,
            ty,
        });
        self.current_body().push(id);
        id
    }

    pub fn arg(&mut self, index: u16, ty: Type) -> ValueId {
        self.push(Op::Arg { index }, ty)
    }

    pub fn const_int(&mut self, value: u64, ty: Type) -> ValueId {
        self.push(Op::ConstInt { value }, ty)
    }

    pub fn bin(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId, ty: Type) -> ValueId {
        self.push(Op::Bin { op, lhs, rhs }, ty)
    }

    pub fn cmp(&mut self, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Op::Cmp { op, lhs, rhs }, Type::Bool)
    }

    pub fn alloc(&mut self, size: u32, align: u32) -> ValueId {
        self.push(Op::Alloc { size, align }, Type::Ptr { elem_size: size })
    }

    pub fn load(&mut self, ptr: ValueId, ty: Type) -> ValueId {
        self.push(Op::Load { ptr }, ty)
    }

    pub fn store(&mut self, ptr: ValueId, value: ValueId) -> ValueId {
        self.push(Op::Store { ptr, value }, Type::Unit)
    }

    pub fn field_ptr(&mut self, base: ValueId, offset: u32, elem_size: u32) -> ValueId {
        self.push(Op::FieldPtr { base, offset }, Type::Ptr { elem_size })
    }

    pub fn ptr_add(&mut self, base: ValueId, index: ValueId, elem_size: u32) -> ValueId {
        self.push(
            Op::PtrAdd {
                base,
                index,
                elem_size,
            },
            Type::Ptr { elem_size },
        )
    }

    pub fn call(
        &mut self,
        callee: impl Into<String>,
        sig: FnType,
        args: Vec<ValueId>,
    ) -> ValueId {
        let ret = sig.ret;
        self.push(
            Op::Call {
                callee: callee.into(),
                sig,
                args,
            },
            ret,
        )
    }

    pub fn global_addr(&mut self, symbol: impl Into<String>, elem_size: u32) -> ValueId {
        self.push(
            Op::GlobalAddr {
                symbol: symbol.into(),
            },
            Type::Ptr { elem_size },
        )
    }

    pub fn ret(&mut self, operand: Option<ValueId>) -> ValueId {
        self.push(Op::Ret { operand }, Type::Unit)
    }

    pub fn br(&mut self, block: ValueId, operand: Option<ValueId>) -> ValueId {
        self.push(Op::Br { block, operand }, Type::Unit)
    }

    /// Open a block; returns its value id for `br` targets
    pub fn begin_block(&mut self, ty: Type) -> ValueId {
        let id = self.reserve(ty);
        self.frames.push(BuildFrame::Block(id, Vec::new()));
        id
    }

    pub fn end_block(&mut self) -> ValueId {
        match self.frames.pop() {
            Some(BuildFrame::Block(id, body)) => {
                self.insts[id.index()].op = Op::Block { body };
                id
            }
            _ => panic!("end_block without matching begin_block"),
        }
    }

    pub fn begin_loop(&mut self) -> ValueId {
        let id = self.reserve(Type::Unit);
        self.frames.push(BuildFrame::Loop(id, Vec::new()));
        id
    }

    pub fn end_loop(&mut self) -> ValueId {
        match self.frames.pop() {
            Some(BuildFrame::Loop(id, body)) => {
                self.insts[id.index()].op = Op::Loop { body };
                id
            }
            _ => panic!("end_loop without matching begin_loop"),
        }
    }

    /// Open a conditional; instructions go to the then-body until
    /// `else_branch` is called
    pub fn begin_cond_br(&mut self, cond: ValueId) {
        self.frames.push(BuildFrame::CondThen(cond, Vec::new()));
    }

    pub fn else_branch(&mut self) {
        match self.frames.pop() {
            Some(BuildFrame::CondThen(cond, then_body)) => {
                self.frames
                    .push(BuildFrame::CondElse(cond, then_body, Vec::new()));
            }
            _ => panic!("else_branch without matching begin_cond_br"),
        }
    }

    pub fn end_cond_br(&mut self) -> ValueId {
        match self.frames.pop() {
            Some(BuildFrame::CondElse(cond, then_body, else_body)) => {
                let id = ValueId(self.insts.len() as u32);
                self.insts.push(Inst {
                    op: Op::CondBr {
                        cond,
                        then_body,
                        else_body,
                    },
                    ty: Type::Unit,
                });
                self.current_body().push(id);
                id
            }
            Some(BuildFrame::CondThen(cond, then_body)) => {
                let id = ValueId(self.insts.len() as u32);
                self.insts.push(Inst {
                    op: Op::CondBr {
                        cond,
                        then_body,
                        else_body: Vec::new(),
                    },
                    ty: Type::Unit,
                });
                self.current_body().push(id);
                id
            }
            _ => panic!("end_cond_br without matching begin_cond_br"),
        }
    }

    pub fn finish(self) -> Function {
        assert!(self.frames.is_empty(), "unclosed scopes in function body");
        Function {
            name: self.name,
            ty: self.ty,
            insts: self.insts,
            body: self.body,
            span: SourceSpan::dummy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_simple_add() {
        let mut b = FuncBuilder::new("add", FnType::new(vec![Type::I64, Type::I64], Type::I64));
        let a = b.arg(0, Type::I64);
        let c = b.arg(1, Type::I64);
        let sum = b.bin(BinOp::Add, a, c, Type::I64);
        b.ret(Some(sum));
        let f = b.finish();

        assert_eq!(f.body.len(), 4);
        assert_eq!(f.inst(sum).op, Op::Bin {
            op: BinOp::Add,
            lhs: a,
            rhs: c,
        });
    }

    #[test]
    fn test_builder_block_scopes() {
        let mut b = FuncBuilder::new("f", FnType::new(vec![], Type::I64));
        let blk = b.begin_block(Type::I64);
        let five = b.const_int(5, Type::I64);
        b.br(blk, Some(five));
        b.end_block();
        b.ret(Some(blk));
        let f = b.finish();

        match &f.inst(blk).op {
            Op::Block { body } => assert_eq!(body.len(), 2),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "unclosed scopes")]
    fn test_builder_unclosed_scope_panics() {
        let mut b = FuncBuilder::new("f", FnType::new(vec![], Type::Unit));
        b.begin_block(Type::Unit);
        let _ = b.finish();
    }

    #[test]
    fn test_operand_order_matches_tomb_bits() {
        let st = Op::Store {
            ptr: ValueId(0),
            value: ValueId(1),
        };
        assert_eq!(st.operands(), vec![ValueId(0), ValueId(1)]);
    }
}
