//! Liveness annotations ("tomb bits")
//!
//! For every instruction we record which of its operands die at that use
//! site, plus whether the instruction's own result is never used. The
//! backend frees a value's register the moment its tomb bit fires, so these
//! bits are the single source of truth for value lifetimes during lowering.
//!
//! Encoding: one `u16` per instruction. Bits 0..=14 are operand-death flags
//! in operand order; bit 15 means the result is unused. Conditional
//! branches additionally carry two death lists: values that are dead on
//! entry to the then path (because only the else path or nothing consumes
//! them) and vice versa.

use crate::ir::{Function, Op, ValueId};
use log::trace;
use std::collections::{HashMap, HashSet};

const UNUSED_BIT: u16 = 1 << 15;
const MAX_TRACKED_OPERANDS: usize = 15;

/// Per-function liveness data, produced by the front end (or by
/// [`Liveness::analyze`]) and consumed read-only by backends.
#[derive(Debug, Clone)]
pub struct Liveness {
    tombs: Vec<u16>,
    cond_deaths: HashMap<ValueId, (Vec<ValueId>, Vec<ValueId>)>,
}

impl Liveness {
    /// Whether operand `index` of `inst` dies at this use site
    pub fn operand_dies(&self, inst: ValueId, index: usize) -> bool {
        assert!(index < MAX_TRACKED_OPERANDS, "operand index out of range");
        self.tombs[inst.index()] & (1 << index) != 0
    }

    /// Whether the result of `inst` is never used
    pub fn is_unused(&self, inst: ValueId) -> bool {
        self.tombs[inst.index()] & UNUSED_BIT != 0
    }

    /// Raw tomb bits for one instruction; the backend keeps a mutable
    /// working copy of these so operand reuse can clear a bit without
    /// touching the shared analysis result
    pub fn tomb_bits(&self, inst: ValueId) -> u16 {
        self.tombs[inst.index()]
    }

    /// (dead on entry to then-path, dead on entry to else-path) for a
    /// conditional branch
    pub fn cond_br_deaths(&self, inst: ValueId) -> (&[ValueId], &[ValueId]) {
        match self.cond_deaths.get(&inst) {
            Some((t, e)) => (t, e),
            None => (&[], &[]),
        }
    }

    /// Compute liveness for a function by a backward walk of its body.
    ///
    /// Values defined outside a loop and used inside it are kept live
    /// across the whole loop rather than given iteration-exact deaths.
    pub fn analyze(func: &Function) -> Liveness {
        let mut lv = Liveness {
            tombs: vec![0; func.insts.len()],
            cond_deaths: HashMap::new(),
        };
        let mut live: HashSet<ValueId> = HashSet::new();
        walk_body(func, &mut lv, &mut live, &func.body);
        lv
    }
}

fn walk_body(func: &Function, lv: &mut Liveness, live: &mut HashSet<ValueId>, body: &[ValueId]) {
    for &v in body.iter().rev() {
        analyze_inst(func, lv, live, v);
    }
}

fn analyze_inst(func: &Function, lv: &mut Liveness, live: &mut HashSet<ValueId>, v: ValueId) {
    let inst = func.inst(v);

    // The flag is set for side-effecting instructions too; the backend
    // still emits them but knows not to claim a home for the result.
    if !live.contains(&v) {
        lv.tombs[v.index()] |= UNUSED_BIT;
        trace!("{} is unused", v);
    }
    live.remove(&v);

    match &inst.op {
        Op::Block { body } => {
            walk_body(func, lv, live, body);
        }
        Op::Loop { body } => {
            // Everything the loop reads from outside stays live across it.
            let defs = collect_defs(func, body);
            for used in collect_uses(func, body) {
                if !defs.contains(&used) {
                    live.insert(used);
                }
            }
            walk_body(func, lv, live, body);
        }
        Op::CondBr {
            cond,
            then_body,
            else_body,
        } => {
            let live_after: HashSet<ValueId> = live.clone();

            let mut live_then = live_after.clone();
            walk_body(func, lv, &mut live_then, then_body);
            let mut live_else = live_after;
            walk_body(func, lv, &mut live_else, else_body);

            // Live on one path's entry but not the other's: dead on entry
            // to the path that never reads it.
            let mut then_deaths: Vec<ValueId> =
                live_else.difference(&live_then).copied().collect();
            let mut else_deaths: Vec<ValueId> =
                live_then.difference(&live_else).copied().collect();
            then_deaths.sort();
            else_deaths.sort();
            if !then_deaths.is_empty() || !else_deaths.is_empty() {
                trace!(
                    "{}: then-entry deaths {:?}, else-entry deaths {:?}",
                    v,
                    then_deaths,
                    else_deaths
                );
                lv.cond_deaths.insert(v, (then_deaths, else_deaths));
            }

            *live = live_then.union(&live_else).copied().collect();
            mark_operand_uses(lv, live, v, &[*cond]);
        }
        _ => {
            let operands = inst.op.operands();
            mark_operand_uses(lv, live, v, &operands);
        }
    }
}

fn mark_operand_uses(lv: &mut Liveness, live: &mut HashSet<ValueId>, v: ValueId, operands: &[ValueId]) {
    assert!(
        operands.len() <= MAX_TRACKED_OPERANDS,
        "too many operands for tomb encoding"
    );
    for (idx, &o) in operands.iter().enumerate() {
        if live.insert(o) {
            // First (reverse-order) sighting: this is the operand's last use
            lv.tombs[v.index()] |= 1 << idx;
        }
    }
}

fn collect_defs(func: &Function, body: &[ValueId]) -> HashSet<ValueId> {
    let mut defs = HashSet::new();
    let mut stack: Vec<&[ValueId]> = vec![body];
    while let Some(b) = stack.pop() {
        for &v in b {
            defs.insert(v);
            match &func.inst(v).op {
                Op::Block { body } | Op::Loop { body } => stack.push(body),
                Op::CondBr {
                    then_body,
                    else_body,
                    ..
                } => {
                    stack.push(then_body);
                    stack.push(else_body);
                }
                _ => {}
            }
        }
    }
    defs
}

fn collect_uses(func: &Function, body: &[ValueId]) -> Vec<ValueId> {
    let mut uses = Vec::new();
    let mut stack: Vec<&[ValueId]> = vec![body];
    while let Some(b) = stack.pop() {
        for &v in b {
            let inst = func.inst(v);
            uses.extend(inst.op.operands());
            match &inst.op {
                Op::Block { body } | Op::Loop { body } => stack.push(body),
                Op::CondBr {
                    then_body,
                    else_body,
                    ..
                } => {
                    stack.push(then_body);
                    stack.push(else_body);
                }
                _ => {}
            }
        }
    }
    uses
}
