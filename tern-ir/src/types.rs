//! IR type model
//!
//! Types are deliberately flat: integers by width and signedness, booleans,
//! pointers (which carry their pointee size for address arithmetic), and a
//! few types the backends recognise only to reject with a clear diagnostic.

use std::fmt;

/// Value types carried by IR instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    /// Zero-sized type; instructions of this type produce no value
    Unit,
    /// Pointer to a value of `elem_size` bytes
    Ptr { elem_size: u32 },
    // Recognised but not lowered by any backend yet
    I128,
    F32,
    F64,
}

impl Type {
    /// Size of a value of this type in bytes
    pub fn size_in_bytes(&self) -> u32 {
        match self {
            Type::I8 | Type::U8 | Type::Bool => 1,
            Type::I16 | Type::U16 => 2,
            Type::I32 | Type::U32 | Type::F32 => 4,
            Type::I64 | Type::U64 | Type::F64 | Type::Ptr { .. } => 8,
            Type::I128 => 16,
            Type::Unit => 0,
        }
    }

    /// Whether comparisons and widening loads treat the value as signed
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::I128
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr { .. })
    }

    /// Whether any backend can lower arithmetic on this type at all
    pub fn is_lowerable(&self) -> bool {
        !matches!(self, Type::I128 | Type::F32 | Type::F64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::Bool => write!(f, "bool"),
            Type::Unit => write!(f, "unit"),
            Type::Ptr { elem_size } => write!(f, "ptr<{}>", elem_size),
            Type::I128 => write!(f, "i128"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
        }
    }
}

/// Calling convention tag on a function type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    /// Standard frame: register-window prologue/epilogue, ABI argument and
    /// return placement
    Standard,
    /// No standard prologue/epilogue; the body is emitted as-is and must
    /// take no parameters
    Naked,
}

/// A function signature: ordered parameter types, return type, convention
#[derive(Debug, Clone, PartialEq)]
pub struct FnType {
    pub params: Vec<Type>,
    pub ret: Type,
    pub conv: CallConv,
}

impl FnType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret,
            conv: CallConv::Standard,
        }
    }

    pub fn naked(ret: Type) -> Self {
        Self {
            params: Vec::new(),
            ret,
            conv: CallConv::Naked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sizes() {
        assert_eq!(Type::I64.size_in_bytes(), 8);
        assert_eq!(Type::Bool.size_in_bytes(), 1);
        assert_eq!(Type::Ptr { elem_size: 4 }.size_in_bytes(), 8);
        assert_eq!(Type::Unit.size_in_bytes(), 0);
    }

    #[test]
    fn test_lowerable() {
        assert!(Type::I64.is_lowerable());
        assert!(!Type::F64.is_lowerable());
        assert!(!Type::I128.is_lowerable());
    }
}
