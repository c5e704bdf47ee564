//! Generic utility primitives with zero domain knowledge.
//!
//! - `input` - Argument validation helpers
//! - `io` - File I/O with consistent error handling

pub mod input;
pub mod io;
