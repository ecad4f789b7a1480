//! RISC-V Boot GDB
//!
//! Sets up a GDB session for stepping through a RISC-V boot: OpenSBI
//! firmware as the primary target, Linux kernel symbols on top, and
//! breakpoints at the firmware and kernel entry points. The build tree is
//! located through the `GDB_WORK_DIR` environment variable.
//!
//! The same session can be applied to a live GDB over MI, written out as a
//! GDB command file, or served as MCP tools.

pub mod config;
pub mod error;
pub mod gdb_client;
pub mod layout;
pub mod recorder;
pub mod script;
pub mod session;
pub mod tools;

pub use config::{Args, Config, Mode};
pub use error::{DebuggerError, InitError, LayoutError, WORK_DIR_VAR};
pub use layout::{BootLayout, BreakpointLocation, BreakpointSpec};
pub use session::{Debugger, DebuggerCommand, SessionInitializer};
pub use tools::GdbBootToolHandler;
