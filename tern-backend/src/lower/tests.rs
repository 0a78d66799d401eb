use super::*;
use pretty_assertions::assert_eq;
use tern_codegen::{CcReg, Cond, RelocKind};
use tern_ir::ir::{BinOp, CmpOp, FuncBuilder};
use tern_ir::types::{FnType, Type};

fn lower(func: &Function) -> FnOutput {
    let _ = env_logger::builder().is_test(true).try_init();
    let liveness = Liveness::analyze(func);
    generate_function(func, &liveness).expect("lowering failed")
}

fn count<F: Fn(&Inst) -> bool>(out: &FnOutput, pred: F) -> usize {
    out.insts.iter().filter(|i| pred(i)).count()
}

#[test]
fn test_add_two_arguments() {
    let mut b = FuncBuilder::new("add", FnType::new(vec![Type::I64, Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let c = b.arg(1, Type::I64);
    let sum = b.bin(BinOp::Add, a, c, Type::I64);
    b.ret(Some(sum));
    let out = lower(&b.finish());

    assert_eq!(
        out.insts,
        vec![
            Inst::Save(176),
            Inst::DbgPrologueEnd,
            Inst::Add(Reg::L0, Reg::I0, Reg::I1),
            Inst::Mov(Reg::I0, Reg::L0),
            Inst::DbgEpilogueBegin,
            Inst::Ret,
            Inst::Restore,
        ]
    );
    assert_eq!(out.frame_size, 176);
    assert!(out.relocs.is_empty());
}

#[test]
fn test_small_constant_stays_immediate() {
    let mut b = FuncBuilder::new("add5", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let five = b.const_int(5, Type::I64);
    let sum = b.bin(BinOp::Add, a, five, Type::I64);
    b.ret(Some(sum));
    let out = lower(&b.finish());

    // The constant rides in the immediate field; nothing materializes it
    assert_eq!(
        out.insts,
        vec![
            Inst::Save(176),
            Inst::DbgPrologueEnd,
            Inst::AddI(Reg::L0, Reg::I0, 5),
            Inst::Mov(Reg::I0, Reg::L0),
            Inst::DbgEpilogueBegin,
            Inst::Ret,
            Inst::Restore,
        ]
    );
}

#[test]
fn test_commutative_swap_fits_immediate() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let seven = b.const_int(7, Type::I64);
    let a = b.arg(0, Type::I64);
    let sum = b.bin(BinOp::Add, seven, a, Type::I64);
    b.ret(Some(sum));
    let out = lower(&b.finish());

    assert_eq!(count(&out, |i| matches!(i, Inst::AddI(_, _, 7))), 1);
    assert_eq!(count(&out, |i| matches!(i, Inst::SetHi(..) | Inst::OrI(..))), 0);
}

#[test]
fn test_constant_past_simm13_is_materialized() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let big = b.const_int(4096, Type::I64);
    let sum = b.bin(BinOp::Add, a, big, Type::I64);
    b.ret(Some(sum));
    let out = lower(&b.finish());

    // 4096 is one past the field; sethi materializes it and the add takes
    // the register form, reusing the constant's dying register
    assert_eq!(count(&out, |i| matches!(i, Inst::SetHi(Reg::L0, 4))), 1);
    assert_eq!(
        count(&out, |i| matches!(i, Inst::Add(Reg::L0, Reg::I0, Reg::L0))),
        1
    );
    assert_eq!(count(&out, |i| matches!(i, Inst::AddI(..))), 0);
}

#[test]
fn test_multiply_by_power_of_two_is_a_shift() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let eight = b.const_int(8, Type::I64);
    let prod = b.bin(BinOp::Mul, a, eight, Type::I64);
    b.ret(Some(prod));
    let out = lower(&b.finish());

    assert_eq!(count(&out, |i| matches!(i, Inst::SllxI(_, _, 3))), 1);
    assert_eq!(count(&out, |i| matches!(i, Inst::Mulx(..) | Inst::MulxI(..))), 0);
}

#[test]
fn test_alloc_load_store_fold_to_fp_relative() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let slot = b.alloc(8, 8);
    b.store(slot, a);
    let x = b.load(slot, Type::I64);
    b.ret(Some(x));
    let out = lower(&b.finish());

    // The slot address never touches a register
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::St {
                rs: Reg::I0,
                base: Reg::FP,
                offset: -8,
                ..
            }
        )),
        1
    );
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::Ld {
                base: Reg::FP,
                offset: -8,
                ..
            }
        )),
        1
    );
    assert_eq!(count(&out, |i| matches!(i, Inst::AddI(_, Reg::FP, _))), 0);
}

#[test]
fn test_field_projection_folds_into_offset() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::Unit));
    let a = b.arg(0, Type::I64);
    let slot = b.alloc(16, 8);
    let field = b.field_ptr(slot, 8, 8);
    b.store(field, a);
    b.ret(None);
    let out = lower(&b.finish());

    // Slot at [%fp-16, %fp); field at +8 stores to %fp-8
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::St {
                base: Reg::FP,
                offset: -8,
                ..
            }
        )),
        1
    );
}

#[test]
fn test_dynamic_index_scales_then_adds() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let idx = b.arg(0, Type::I64);
    let base = b.global_addr("table", 4);
    let elem = b.ptr_add(base, idx, 4);
    let x = b.load(elem, Type::I32);
    b.ret(Some(x));
    let out = lower(&b.finish());

    assert_eq!(
        count(&out, |i| matches!(i, Inst::SllxI(Reg::G1, Reg::I0, 2))),
        1
    );
    assert_eq!(count(&out, |i| matches!(i, Inst::Add(_, _, Reg::G1))), 1);
    assert_eq!(out.relocs.len(), 1);
    assert_eq!(out.relocs[0].kind, RelocKind::GotLoad);
    assert_eq!(out.relocs[0].symbol, "table");
}

#[test]
fn test_comparison_rides_the_condition_codes() {
    let mut b = FuncBuilder::new("lt", FnType::new(vec![Type::I64, Type::I64], Type::Bool));
    let a = b.arg(0, Type::I64);
    let c = b.arg(1, Type::I64);
    let lt = b.cmp(CmpOp::Lt, a, c);
    b.ret(Some(lt));
    let out = lower(&b.finish());

    // Returned as a value, the comparison materializes via a conditional
    // move into the return register
    assert_eq!(
        count(&out, |i| matches!(i, Inst::Cmp(CcReg::Xcc, Reg::I0, Reg::I1))),
        1
    );
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::MovCond(Cond::Lt, CcReg::Xcc, Reg::I0)
        )),
        1
    );
}

#[test]
fn test_swapped_comparison_flips_condition() {
    // 3 < a compares a against 3 with the mirrored condition
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::U64], Type::Bool));
    let three = b.const_int(3, Type::U64);
    let a = b.arg(0, Type::U64);
    let lt = b.cmp(CmpOp::Lt, three, a);
    b.ret(Some(lt));
    let out = lower(&b.finish());

    assert_eq!(
        count(&out, |i| matches!(i, Inst::CmpI(CcReg::Xcc, Reg::I0, 3))),
        1
    );
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::MovCond(Cond::Gtu, CcReg::Xcc, Reg::I0)
        )),
        1
    );
}

#[test]
fn test_call_moves_arguments_and_collects_result() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let g = b.call("g", FnType::new(vec![Type::I64], Type::I64), vec![a]);
    b.ret(Some(g));
    let out = lower(&b.finish());

    let call_idx = out
        .insts
        .iter()
        .position(|i| matches!(i, Inst::Call(_)))
        .expect("no call emitted");
    // Argument staged into the outgoing window before the call, delay slot
    // filled, result copied out of the volatile window after
    assert_eq!(out.insts[call_idx - 1], Inst::Mov(Reg::O0, Reg::I0));
    assert_eq!(out.insts[call_idx + 1], Inst::Nop);
    assert_eq!(out.insts[call_idx + 2], Inst::Mov(Reg::L0, Reg::O0));
    assert_eq!(
        out.relocs,
        vec![Reloc {
            kind: RelocKind::Call,
            symbol: "g".to_string(),
            inst: call_idx,
        }]
    );
}

#[test]
fn test_stack_argument_is_copied_into_the_frame() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64; 8], Type::I64));
    let h = b.arg(7, Type::I64);
    b.ret(Some(h));
    let out = lower(&b.finish());

    // Eighth argument: second stack slot, at reserved + 8
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::Ld {
                rd: Reg::G1,
                base: Reg::FP,
                offset: 184,
                ..
            }
        )),
        1
    );
    assert_eq!(
        count(&out, |i| matches!(
            i,
            Inst::St {
                rs: Reg::G1,
                base: Reg::FP,
                offset: -8,
                ..
            }
        )),
        1
    );
}

#[test]
fn test_block_result_funnels_through_canonical_location() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![], Type::I64));
    let blk = b.begin_block(Type::I64);
    let five = b.const_int(5, Type::I64);
    b.br(blk, Some(five));
    b.end_block();
    b.ret(Some(blk));
    let out = lower(&b.finish());

    assert_eq!(
        out.insts,
        vec![
            Inst::Save(176),
            Inst::DbgPrologueEnd,
            Inst::OrI(Reg::L0, Reg::G0, 5),
            Inst::Ba(5),
            Inst::Nop,
            Inst::Mov(Reg::I0, Reg::L0),
            Inst::DbgEpilogueBegin,
            Inst::Ret,
            Inst::Restore,
        ]
    );
}

#[test]
fn test_trailing_return_jump_is_removed() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![], Type::Unit));
    b.ret(None);
    let out = lower(&b.finish());

    // The lone return's jump-to-epilogue would hop over nothing
    assert_eq!(
        out.insts,
        vec![
            Inst::Save(176),
            Inst::DbgPrologueEnd,
            Inst::DbgEpilogueBegin,
            Inst::Ret,
            Inst::Restore,
        ]
    );
}

#[test]
fn test_early_return_jump_survives() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let zero = b.const_int(0, Type::I64);
    let cond = b.cmp(CmpOp::Eq, a, zero);
    b.begin_cond_br(cond);
    let one = b.const_int(1, Type::I64);
    b.ret(Some(one));
    b.else_branch();
    b.end_cond_br();
    b.ret(Some(a));
    let out = lower(&b.finish());

    // The early return keeps its jump into the shared epilogue; only the
    // final one falls through
    let epilogue = out
        .insts
        .iter()
        .position(|i| matches!(i, Inst::DbgEpilogueBegin))
        .unwrap();
    let jumps: Vec<_> = out
        .insts
        .iter()
        .filter_map(|i| match i {
            Inst::Ba(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert!(jumps.contains(&epilogue));
    assert_eq!(count(&out, |i| matches!(i, Inst::Ret)), 1);
}

#[test]
fn test_cond_br_branches_on_negated_condition() {
    let mut b = FuncBuilder::new("max", FnType::new(vec![Type::I64, Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let c = b.arg(1, Type::I64);
    let blk = b.begin_block(Type::I64);
    let gt = b.cmp(CmpOp::Gt, a, c);
    b.begin_cond_br(gt);
    b.br(blk, Some(a));
    b.else_branch();
    b.br(blk, Some(c));
    b.end_cond_br();
    b.end_block();
    b.ret(Some(blk));
    let out = lower(&b.finish());

    // bg fails -> ble to the else arm
    assert_eq!(
        count(&out, |i| matches!(i, Inst::Bcc(Cond::Le, CcReg::Xcc, _))),
        1
    );
    // Both arms write the same canonical register
    assert_eq!(count(&out, |i| matches!(i, Inst::Mov(Reg::L0, Reg::I0))), 1);
    assert_eq!(count(&out, |i| matches!(i, Inst::Mov(Reg::L0, Reg::I1))), 1);
    assert_eq!(count(&out, |i| matches!(i, Inst::Mov(Reg::I0, Reg::L0))), 1);
}

#[test]
fn test_boolean_register_condition_uses_brz() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::Bool], Type::I64));
    let flag = b.arg(0, Type::Bool);
    b.begin_cond_br(flag);
    let one = b.const_int(1, Type::I64);
    b.ret(Some(one));
    b.else_branch();
    let two = b.const_int(2, Type::I64);
    b.ret(Some(two));
    b.end_cond_br();
    let out = lower(&b.finish());

    assert_eq!(count(&out, |i| matches!(i, Inst::Brz(Reg::I0, _))), 1);
    assert_eq!(count(&out, |i| matches!(i, Inst::Bcc(..))), 0);
}

#[test]
fn test_divergent_branch_state_is_reconciled_on_the_else_path() {
    // A wide constant is register-cached inside the then arm only; the
    // else path must be patched to agree before the join, because the
    // constant is read again afterwards.
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64, Type::Bool], Type::I64));
    let a = b.arg(0, Type::I64);
    let flag = b.arg(1, Type::Bool);
    let big = b.const_int(4096, Type::I64);
    let slot = b.alloc(8, 8);
    b.begin_cond_br(flag);
    let t = b.bin(BinOp::Add, a, big, Type::I64);
    b.store(slot, t);
    b.else_branch();
    b.store(slot, a);
    b.end_cond_br();
    let sum = b.bin(BinOp::Add, a, big, Type::I64);
    b.ret(Some(sum));
    let out = lower(&b.finish());

    // Materialized once in the then arm and once more as an else-path
    // fix-up, into the same canonical register
    let sethis: Vec<_> = out
        .insts
        .iter()
        .filter_map(|i| match i {
            Inst::SetHi(rd, 4) => Some(*rd),
            _ => None,
        })
        .collect();
    assert_eq!(sethis.len(), 2);
    assert_eq!(sethis[0], sethis[1]);

    // After the join the cached register is used directly: no third
    // materialization
    assert_eq!(count(&out, |i| matches!(i, Inst::SetHi(..))), 2);
}

#[test]
fn test_join_fixups_preserve_settled_locations() {
    // Eight loads pin the whole pool before the branch; the then arm
    // materializes a wide constant, spilling two of them. Everything is
    // read again after the join, so each value must end up at one agreed
    // location on both paths: the spilled loads in their slots, the
    // constant in its then-arm register.
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64, Type::Bool], Type::I64));
    let a = b.arg(0, Type::I64);
    let flag = b.arg(1, Type::Bool);
    let slot = b.alloc(8, 8);
    b.store(slot, a);
    let loads: Vec<_> = (0..8).map(|_| b.load(slot, Type::I64)).collect();
    let big = b.const_int(4096, Type::I64);
    let sink = b.alloc(8, 8);
    b.begin_cond_br(flag);
    let t = b.bin(BinOp::Add, loads[0], big, Type::I64);
    b.store(sink, t);
    b.else_branch();
    b.end_cond_br();
    let mut acc = loads[0];
    for &l in &loads[1..] {
        acc = b.bin(BinOp::Add, acc, l, Type::I64);
    }
    acc = b.bin(BinOp::Add, acc, big, Type::I64);
    b.ret(Some(acc));
    let out = lower(&b.finish());

    // The constant is materialized in the then arm and once more as the
    // else-path fix-up, into the same register both times
    let sethis: Vec<_> = out
        .insts
        .iter()
        .filter_map(|i| match i {
            Inst::SetHi(rd, 4) => Some(*rd),
            _ => None,
        })
        .collect();
    assert_eq!(sethis.len(), 2);
    assert_eq!(sethis[0], sethis[1]);

    // The first load was never spilled, so nothing may store its register;
    // its location survives the join untouched
    assert_eq!(count(&out, |i| matches!(i, Inst::St { rs: Reg::L0, .. })), 0);
    // Eight original loads plus one reload for each spilled value
    assert_eq!(count(&out, |i| matches!(i, Inst::Ld { base: Reg::FP, .. })), 10);
}

#[test]
fn test_loop_jumps_back_to_its_head() {
    // while (n != 0) n -= 1
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::Unit));
    let n = b.arg(0, Type::I64);
    let slot = b.alloc(8, 8);
    b.store(slot, n);
    let exit = b.begin_block(Type::Unit);
    b.begin_loop();
    let x = b.load(slot, Type::I64);
    let zero = b.const_int(0, Type::I64);
    let done = b.cmp(CmpOp::Eq, x, zero);
    b.begin_cond_br(done);
    b.br(exit, None);
    b.else_branch();
    b.end_cond_br();
    let one = b.const_int(1, Type::I64);
    let next = b.bin(BinOp::Sub, x, one, Type::I64);
    b.store(slot, next);
    b.end_loop();
    b.end_block();
    b.ret(None);
    let out = lower(&b.finish());

    // Exactly one backward jump, with a nop in its delay slot
    let back_edges: Vec<_> = out
        .insts
        .iter()
        .enumerate()
        .filter(|(idx, i)| matches!(i, Inst::Ba(t) if t <= idx))
        .collect();
    assert_eq!(back_edges.len(), 1);
    let (idx, _) = back_edges[0];
    assert_eq!(out.insts[idx + 1], Inst::Nop);
}

#[test]
fn test_register_pressure_forces_a_spill() {
    // Nine values live at once across an eight-register pool
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let slot = b.alloc(8, 8);
    b.store(slot, a);
    let loads: Vec<_> = (0..9).map(|_| b.load(slot, Type::I64)).collect();
    let mut acc = loads[0];
    for &l in &loads[1..] {
        acc = b.bin(BinOp::Add, acc, l, Type::I64);
    }
    b.ret(Some(acc));
    let out = lower(&b.finish());

    // One store parks the argument; at least one more is a spill
    let fp_stores = count(&out, |i| matches!(i, Inst::St { base: Reg::FP, .. }));
    assert!(fp_stores >= 2, "expected a spill store, got {}", fp_stores);
    // Spilled values reload before use
    let fp_loads = count(&out, |i| matches!(i, Inst::Ld { base: Reg::FP, .. }));
    assert!(fp_loads > 9);
    assert!(out.frame_size > 176);
}

#[test]
fn test_naked_function_has_no_frame() {
    let mut b = FuncBuilder::new("trampoline", FnType::naked(Type::Unit));
    b.ret(None);
    let out = lower(&b.finish());

    assert_eq!(out.insts, vec![Inst::Ret, Inst::Nop]);
    assert_eq!(out.frame_size, 0);
}

#[test]
fn test_unused_pure_value_emits_nothing() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let five = b.const_int(5, Type::I64);
    let _dead = b.bin(BinOp::Add, a, five, Type::I64);
    let a2 = b.arg(0, Type::I64);
    b.ret(Some(a2));
    let out = lower(&b.finish());

    assert_eq!(count(&out, |i| matches!(i, Inst::Add(..) | Inst::AddI(..))), 0);
}

#[test]
fn test_ignored_call_result_claims_no_register() {
    // The call is emitted for its side effect, but the unread result must
    // not occupy a pool register afterwards: eight loads fit exactly.
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::I64));
    let a = b.arg(0, Type::I64);
    let slot = b.alloc(8, 8);
    b.store(slot, a);
    b.call("notify", FnType::new(vec![Type::I64], Type::I64), vec![a]);
    let loads: Vec<_> = (0..8).map(|_| b.load(slot, Type::I64)).collect();
    let mut acc = loads[0];
    for &l in &loads[1..] {
        acc = b.bin(BinOp::Add, acc, l, Type::I64);
    }
    b.ret(Some(acc));
    let out = lower(&b.finish());

    assert_eq!(count(&out, |i| matches!(i, Inst::Call(_))), 1);
    // No copy out of the volatile return register
    assert_eq!(count(&out, |i| matches!(i, Inst::Mov(_, Reg::O0))), 0);
    // Only the argument-parking store; no spills
    assert_eq!(count(&out, |i| matches!(i, Inst::St { base: Reg::FP, .. })), 1);
}

#[test]
fn test_pointer_value_parked_in_memory_is_fetched_before_dereference() {
    // A pointer whose home is an absolute address must itself be loaded
    // before it can be dereferenced.
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::Ptr { elem_size: 8 }], Type::I64));
    let p = b.arg(0, Type::Ptr { elem_size: 8 });
    let x = b.load(p, Type::I64);
    b.ret(Some(x));
    let func = b.finish();
    let liveness = Liveness::analyze(&func);

    let tombs = (0..func.insts.len())
        .map(|i| liveness.tomb_bits(ValueId(i as u32)))
        .collect();
    let mut fl = FnLowering {
        func: &func,
        liveness: &liveness,
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
        ret_loc: Location::None,
        abi_params: Vec::new(),
        naked: false,
        loc: SourceLocation::dummy(),
    };
    fl.table.set(p, Location::Memory(0x2000));

    let loc = fl.lower_load(x, p, Type::I64).unwrap();
    assert_eq!(loc, Location::Register(Reg::L0));
    assert_eq!(
        fl.insts,
        vec![
            Inst::SetHi(Reg::L0, 8),
            Inst::Ld {
                rd: Reg::L0,
                base: Reg::L0,
                offset: 0,
                size: 8,
                signed: false,
            },
            Inst::Ld {
                rd: Reg::L0,
                base: Reg::L0,
                offset: 0,
                size: 8,
                signed: true,
            },
        ]
    );
}

#[test]
#[should_panic(expected = "escapes its base object")]
fn test_field_projection_past_the_slot_panics() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![Type::I64], Type::Unit));
    let a = b.arg(0, Type::I64);
    let slot = b.alloc(8, 8);
    let past = b.field_ptr(slot, 8, 8);
    b.store(past, a);
    b.ret(None);
    lower(&b.finish());
}

#[test]
fn test_module_keeps_compiling_past_failed_functions() {
    let mut module = Module::new("demo");

    let mut bad = FuncBuilder::new("wide", FnType::new(vec![Type::I128], Type::Unit));
    bad.ret(None);
    module.add_function(bad.finish());

    let mut good = FuncBuilder::new("id", FnType::new(vec![Type::I64], Type::I64));
    let a = good.arg(0, Type::I64);
    good.ret(Some(a));
    module.add_function(good.finish());

    let (outputs, reporter) = generate_module(&module);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].name, "id");
    assert_eq!(reporter.error_count(), 1);
    // Backend limitations carry the keep-going note
    assert_eq!(reporter.diagnostics()[0].notes.len(), 1);
}

#[test]
fn test_float_arithmetic_is_rejected_not_fatal() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![], Type::F64));
    let x = b.const_int(0, Type::F64);
    b.ret(Some(x));
    let func = b.finish();
    let liveness = Liveness::analyze(&func);
    let err = generate_function(&func, &liveness).unwrap_err();
    assert!(err.is_backend_limitation());
}

#[test]
fn test_wide_constant_is_rejected_not_fatal() {
    let mut b = FuncBuilder::new("f", FnType::new(vec![], Type::U64));
    let x = b.const_int(1 << 32, Type::U64);
    b.ret(Some(x));
    let func = b.finish();
    let liveness = Liveness::analyze(&func);
    let err = generate_function(&func, &liveness).unwrap_err();
    assert!(matches!(err, CompilerError::NotImplemented { .. }));
}
