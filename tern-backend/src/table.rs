//! Branch-scoped value table
//!
//! Maps values to their current `Location`. The table is a stack of overlay
//! maps: each open scope (block, loop, conditional arm) gets its own
//! overlay, lookups search innermost-outward, and writes always go to the
//! innermost overlay. That makes a conditional arm's relocations invisible
//! to the other arm until the join point reconciles them.

use std::collections::HashMap;
use tern_codegen::Location;
use tern_ir::ir::ValueId;

#[derive(Debug)]
pub struct ValueTable {
    scopes: Vec<HashMap<ValueId, Location>>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope and hand back its overlay for
    /// reconciliation.
    pub fn pop_scope(&mut self) -> HashMap<ValueId, Location> {
        assert!(self.scopes.len() > 1, "popping the function-level scope");
        self.scopes.pop().unwrap()
    }

    /// Close the innermost scope and fold its entries into the parent.
    /// Used for scopes control flow cannot diverge around, where every
    /// relocation made inside is equally valid outside.
    pub fn pop_scope_merge(&mut self) {
        let overlay = self.pop_scope();
        self.scopes.last_mut().unwrap().extend(overlay);
    }

    /// Innermost-outward lookup
    pub fn get(&self, value: ValueId) -> Option<Location> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&value).copied())
    }

    /// Lookup skipping the innermost overlay; used when reconciling a
    /// branch arm against the state outside it.
    pub fn get_outer(&self, value: ValueId) -> Option<Location> {
        self.scopes[..self.scopes.len() - 1]
            .iter()
            .rev()
            .find_map(|scope| scope.get(&value).copied())
    }

    /// Location of a value that must still be live. A missing entry or a
    /// `Dead` record here is an internal consistency failure.
    pub fn resolve(&self, value: ValueId) -> Location {
        match self.get(value) {
            Some(Location::Dead) => panic!("{} resolved after its death", value),
            Some(loc) => loc,
            None => panic!("{} has no recorded location", value),
        }
    }

    /// Record `value`'s location in the innermost scope
    pub fn set(&mut self, value: ValueId, loc: Location) {
        self.scopes.last_mut().unwrap().insert(value, loc);
    }

    /// Mark `value` dead. Killing an already-dead value is a double free
    /// in the liveness bookkeeping and panics.
    pub fn kill(&mut self, value: ValueId) {
        if self.get(value) == Some(Location::Dead) {
            panic!("{} killed twice", value);
        }
        self.set(value, Location::Dead);
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Keys of the innermost overlay, for reconciliation
    pub fn innermost(&self) -> &HashMap<ValueId, Location> {
        self.scopes.last().unwrap()
    }
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new()
    }
}
