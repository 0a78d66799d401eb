//! Stack frame layout
//!
//! Slots are carved out below the frame pointer, strictly monotonically.
//! Offsets are never reused, even for values that are long dead; the frame
//! only ever grows, which keeps every emitted `%fp`-relative access valid no
//! matter which control-flow path reached it.

use log::trace;
use std::collections::HashMap;
use tern_codegen::CallingConvention;
use tern_ir::ir::ValueId;

/// Per-function stack frame allocator.
///
/// A slot at offset `n` occupies the bytes `[%fp - n, %fp - n + size)`.
#[derive(Debug, Clone)]
pub struct StackFrame {
    next_offset: u32,
    /// Largest outgoing argument area of any call in the function
    outgoing_bytes: u32,
    slots: HashMap<ValueId, (u32, u32)>,
    total: Option<u32>,
}

impl StackFrame {
    pub fn new() -> Self {
        Self {
            next_offset: 0,
            outgoing_bytes: 0,
            slots: HashMap::new(),
            total: None,
        }
    }

    /// Claim a fresh slot for `value` and return its offset below `%fp`.
    pub fn allocate(&mut self, value: ValueId, size: u32, align: u32) -> u32 {
        assert!(self.total.is_none(), "allocation after frame was finalized");
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        // The frame pointer is 16-byte aligned, so the slot address is
        // aligned whenever the offset is.
        let offset = (self.next_offset + size).next_multiple_of(align);
        self.next_offset = offset;
        self.slots.insert(value, (offset, size));
        trace!("{}: stack slot [%fp-{}], {} bytes", value, offset, size);
        offset
    }

    /// Record the outgoing argument area one call needs; the frame keeps
    /// the maximum over all calls.
    pub fn record_outgoing(&mut self, bytes: u32) {
        assert!(self.total.is_none(), "call lowered after frame was finalized");
        self.outgoing_bytes = self.outgoing_bytes.max(bytes);
    }

    /// Slot offset and size previously allocated for `value`
    pub fn slot(&self, value: ValueId) -> Option<(u32, u32)> {
        self.slots.get(&value).copied()
    }

    /// Bytes of locals claimed so far
    pub fn locals_bytes(&self) -> u32 {
        self.next_offset
    }

    /// Freeze the frame and return its total size: reserved area, outgoing
    /// arguments, and locals, rounded up to `align`. Idempotent; further
    /// allocation panics.
    pub fn finalize(&mut self, align: u32) -> u32 {
        if let Some(total) = self.total {
            return total;
        }
        let raw = CallingConvention::RESERVED_AREA + self.outgoing_bytes + self.next_offset;
        let total = raw.next_multiple_of(align);
        self.total = Some(total);
        total
    }
}

impl Default for StackFrame {
    fn default() -> Self {
        Self::new()
    }
}
