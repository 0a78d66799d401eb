//! Register Pool
//!
//! Tracks ownership and lock state of the allocatable registers during
//! lowering. The pool itself never spills: it reports a spill candidate and
//! the backend decides what to do with the evicted value. Cloning the pool
//! is how conditional branches snapshot allocation state.

use crate::asm::Reg;
use tern_ir::ir::ValueId;

/// Registers the backend may hand out. Window locals survive calls without
/// any save/restore traffic, so the pool is built entirely from them.
/// `%g1` stays out as the materialization scratch register.
pub const ALLOCATABLE_REGISTERS: [Reg; 8] = [
    Reg::L0,
    Reg::L1,
    Reg::L2,
    Reg::L3,
    Reg::L4,
    Reg::L5,
    Reg::L6,
    Reg::L7,
];

/// Proof that a register was locked; redeem it with [`RegisterPool::unlock`].
/// Locks nest, so holding two tokens for the same register is fine.
#[must_use = "locked registers must be unlocked with the returned token"]
#[derive(Debug)]
pub struct RegLock(Reg);

impl RegLock {
    pub fn reg(&self) -> Reg {
        self.0
    }
}

/// Ownership and lock state of the allocatable register set
#[derive(Debug, Clone, Default)]
pub struct RegisterPool {
    owners: [Option<ValueId>; ALLOCATABLE_REGISTERS.len()],
    locks: [u32; ALLOCATABLE_REGISTERS.len()],
}

impl RegisterPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allocatable(reg: Reg) -> bool {
        ALLOCATABLE_REGISTERS.contains(&reg)
    }

    fn index(reg: Reg) -> usize {
        ALLOCATABLE_REGISTERS
            .iter()
            .position(|&r| r == reg)
            .unwrap_or_else(|| panic!("{} is not an allocatable register", reg))
    }

    /// Hand out a free, unlocked register and record `value` as its owner.
    pub fn try_allocate(&mut self, value: ValueId) -> Option<Reg> {
        for (i, &reg) in ALLOCATABLE_REGISTERS.iter().enumerate() {
            if self.owners[i].is_none() && self.locks[i] == 0 {
                self.owners[i] = Some(value);
                return Some(reg);
            }
        }
        None
    }

    /// First owned, unlocked register: the one the backend will evict when
    /// allocation fails. `None` means every register is locked and the
    /// function cannot be compiled.
    pub fn spill_candidate(&self) -> Option<(Reg, ValueId)> {
        for (i, &reg) in ALLOCATABLE_REGISTERS.iter().enumerate() {
            if self.locks[i] == 0 {
                if let Some(owner) = self.owners[i] {
                    return Some((reg, owner));
                }
            }
        }
        None
    }

    /// Pin `reg` so it can neither be allocated nor picked for spilling
    /// until the token is returned.
    pub fn lock(&mut self, reg: Reg) -> RegLock {
        self.locks[Self::index(reg)] += 1;
        RegLock(reg)
    }

    pub fn unlock(&mut self, lock: RegLock) {
        let i = Self::index(lock.0);
        assert!(self.locks[i] > 0, "unlock without a matching lock");
        self.locks[i] -= 1;
    }

    /// Release `reg` back to the pool. The register must not be locked;
    /// deaths are processed only after operand locks are dropped.
    pub fn free(&mut self, reg: Reg) {
        let i = Self::index(reg);
        assert!(self.locks[i] == 0, "freeing locked register {}", reg);
        self.owners[i] = None;
    }

    /// Record an allocation decided elsewhere, e.g. a value arriving in a
    /// fixed ABI register.
    pub fn mark_allocated(&mut self, reg: Reg, value: ValueId) {
        let i = Self::index(reg);
        if let Some(owner) = self.owners[i] {
            assert!(owner == value, "{} already owned by {}", reg, owner);
        }
        self.owners[i] = Some(value);
    }

    /// Transfer ownership of `reg` to `value`, in place. Used when a result
    /// takes over a dying operand's register.
    pub fn reassign(&mut self, reg: Reg, value: ValueId) {
        let i = Self::index(reg);
        assert!(self.owners[i].is_some(), "reassigning unowned register");
        self.owners[i] = Some(value);
    }

    pub fn owner(&self, reg: Reg) -> Option<ValueId> {
        self.owners[Self::index(reg)]
    }

    /// Unowned and unlocked
    pub fn is_free(&self, reg: Reg) -> bool {
        let i = Self::index(reg);
        self.owners[i].is_none() && self.locks[i] == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(n: u32) -> ValueId {
        ValueId(n)
    }

    #[test]
    fn test_allocation_exhausts_in_order() {
        let mut pool = RegisterPool::new();
        for (i, &reg) in ALLOCATABLE_REGISTERS.iter().enumerate() {
            assert_eq!(pool.try_allocate(v(i as u32)), Some(reg));
        }
        assert_eq!(pool.try_allocate(v(99)), None);
    }

    #[test]
    fn test_locked_register_is_skipped() {
        let mut pool = RegisterPool::new();
        let lock = pool.lock(Reg::L0);
        assert_eq!(pool.try_allocate(v(0)), Some(Reg::L1));
        pool.unlock(lock);
        assert_eq!(pool.try_allocate(v(1)), Some(Reg::L0));
    }

    #[test]
    fn test_spill_candidate_ignores_locked_owners() {
        let mut pool = RegisterPool::new();
        pool.mark_allocated(Reg::L0, v(0));
        pool.mark_allocated(Reg::L1, v(1));
        let lock = pool.lock(Reg::L0);
        assert_eq!(pool.spill_candidate(), Some((Reg::L1, v(1))));
        pool.unlock(lock);
        assert_eq!(pool.spill_candidate(), Some((Reg::L0, v(0))));
    }

    #[test]
    fn test_all_locked_has_no_candidate() {
        let mut pool = RegisterPool::new();
        let mut locks = Vec::new();
        for (i, &reg) in ALLOCATABLE_REGISTERS.iter().enumerate() {
            pool.mark_allocated(reg, v(i as u32));
            locks.push(pool.lock(reg));
        }
        assert_eq!(pool.try_allocate(v(99)), None);
        assert_eq!(pool.spill_candidate(), None);
        for lock in locks {
            pool.unlock(lock);
        }
    }

    #[test]
    fn test_free_then_reallocate() {
        let mut pool = RegisterPool::new();
        let r = pool.try_allocate(v(0)).unwrap();
        pool.free(r);
        assert_eq!(pool.owner(r), None);
        assert_eq!(pool.try_allocate(v(1)), Some(r));
    }

    #[test]
    #[should_panic(expected = "freeing locked register")]
    fn test_free_while_locked_panics() {
        let mut pool = RegisterPool::new();
        pool.mark_allocated(Reg::L0, v(0));
        let _lock = pool.lock(Reg::L0);
        pool.free(Reg::L0);
    }

    #[test]
    #[should_panic(expected = "not an allocatable register")]
    fn test_non_allocatable_register_panics() {
        let mut pool = RegisterPool::new();
        pool.free(Reg::G1);
    }

    #[test]
    fn test_reassign_transfers_ownership() {
        let mut pool = RegisterPool::new();
        let r = pool.try_allocate(v(0)).unwrap();
        pool.reassign(r, v(1));
        assert_eq!(pool.owner(r), Some(v(1)));
    }
}
