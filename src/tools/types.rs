//! Type definitions for RISC-V boot GDB MCP tools

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;

use crate::session::{DebuggerCommand, InitReport};

// ============================================================================
// plan_session
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanSessionArgs {
    /// Root directory holding builds/ (defaults to --work-dir, then GDB_WORK_DIR)
    #[serde(default)]
    pub work_dir: Option<String>,
    /// Also include the symbolic breakpoints that are off by default (e.g. fw_main)
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanSessionResult {
    pub root: String,
    pub commands: Vec<DebuggerCommand>,
    /// The same commands in GDB CLI syntax
    pub script: Vec<String>,
}

// ============================================================================
// write_init_script
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteInitScriptArgs {
    /// File to write the GDB command script to
    pub output_path: String,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

// ============================================================================
// start_session
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartSessionArgs {
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    /// Extra gdb command-line arguments
    #[serde(default)]
    pub extra_args: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResult {
    pub session_id: String,
    pub report: InitReport,
}

// ============================================================================
// execute
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteArgs {
    /// Session ID
    pub session_id: String,
    /// GDB CLI command (e.g., "info breakpoints", "target remote :1234")
    pub command: String,
}

// ============================================================================
// reinitialize
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReinitializeArgs {
    /// Session ID
    pub session_id: String,
}

// ============================================================================
// end_session
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EndSessionArgs {
    /// Session ID to end
    pub session_id: String,
}
