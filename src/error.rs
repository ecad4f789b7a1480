//! Error types for the RISC-V boot GDB initializer

use thiserror::Error;

/// Environment variable naming the root of the build tree
pub const WORK_DIR_VAR: &str = "GDB_WORK_DIR";

/// Errors raised while initializing a debugger session
#[derive(Error, Debug)]
pub enum InitError {
    #[error("{0} environment variable is not set")]
    MissingConfiguration(&'static str),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Debugger(#[from] DebuggerError),
}

/// Errors reported by a debugger backend
#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error("GDB launch failed: {0}")]
    LaunchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed: {message}")]
    Rejected { command: String, message: String },

    #[error("Connection closed by GDB")]
    ConnectionClosed,

    #[error("Command timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Errors loading a boot layout file
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid layout: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, InitError>;
