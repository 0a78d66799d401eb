//! Tern Compiler - SPARC64 Backend
//!
//! Lowers the structured IR of one module into SPARC64 instruction lists.
//! Each function is compiled independently; unsupported constructs and
//! register exhaustion abort only the function that hit them, and the
//! driver reports a diagnostic and keeps going.

pub mod frame;
pub mod lower;
pub mod table;

pub use frame::StackFrame;
pub use lower::{generate_function, generate_module, FnOutput};
pub use table::ValueTable;
