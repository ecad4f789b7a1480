//! RISC-V boot GDB MCP tools module

pub mod gdb_tools;
pub mod types;

pub use gdb_tools::*;
pub use types::*;
