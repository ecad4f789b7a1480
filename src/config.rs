//! Configuration for the riscv-boot-gdb initializer and MCP server

use std::path::{Path, PathBuf};
use std::time::Duration;
use clap::{Parser, Subcommand};

use crate::error::{InitError, Result, WORK_DIR_VAR};
use crate::gdb_client::DEFAULT_COMMAND_TIMEOUT;
use crate::layout::BootLayout;
use crate::session::SessionInitializer;

/// GDB binaries tried in order when no path is configured
const GDB_CANDIDATES: &[&str] = &[
    "gdb-multiarch",
    "riscv64-unknown-elf-gdb",
    "riscv64-linux-gnu-gdb",
    "gdb",
];

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "riscv-boot-gdb")]
#[command(about = "Set up GDB for debugging a RISC-V OpenSBI + Linux boot")]
#[command(version)]
pub struct Args {
    /// Root directory holding builds/ (overrides GDB_WORK_DIR)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Path to gdb binary (defaults to searching PATH)
    #[arg(long)]
    pub gdb_path: Option<PathBuf>,

    /// JSON file overriding the boot layout
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Also install the symbolic breakpoints that are off by default
    #[arg(long)]
    pub enable_symbolic: bool,

    /// Per-command GDB timeout in seconds
    #[arg(long, default_value_t = DEFAULT_COMMAND_TIMEOUT.as_secs())]
    pub command_timeout: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Serve MCP tools over stdio (default)
    Serve,
    /// Print the GDB command file, or write it to --output
    Script {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run GDB interactively with the session commands applied at startup
    Launch {
        /// Extra arguments passed through to gdb
        #[arg(last = true)]
        gdb_args: Vec<String>,
    },
    /// Dry run: print the commands and resulting session state as JSON
    Plan,
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit root; `GDB_WORK_DIR` is used when absent
    pub work_dir: Option<PathBuf>,
    /// Path to gdb binary
    pub gdb_path: Option<PathBuf>,
    pub layout: BootLayout,
    pub command_timeout: Duration,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut layout = match &args.layout {
            Some(path) => BootLayout::from_json_file(path)?,
            None => BootLayout::default(),
        };
        if args.enable_symbolic {
            layout.enable_symbolic_breakpoints();
        }

        Ok(Self {
            work_dir: args.work_dir.clone(),
            gdb_path: args.gdb_path.clone(),
            layout,
            command_timeout: Duration::from_secs(args.command_timeout),
        })
    }

    /// Initializer for `root` if given, else the configured root, else
    /// `GDB_WORK_DIR`
    pub fn initializer(&self, root: Option<&Path>, include_inactive: bool) -> Result<SessionInitializer> {
        let mut layout = self.layout.clone();
        if include_inactive {
            layout.enable_symbolic_breakpoints();
        }

        match root.or(self.work_dir.as_deref()) {
            Some(root) if !root.as_os_str().is_empty() => Ok(SessionInitializer::new(root, layout)),
            Some(_) => Err(InitError::MissingConfiguration(WORK_DIR_VAR)),
            None => SessionInitializer::from_env(layout),
        }
    }

    /// Find gdb binary path: config, then PATH
    pub fn find_gdb(&self) -> std::result::Result<PathBuf, String> {
        if let Some(path) = &self.gdb_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(format!("Configured gdb path does not exist: {}", path.display()));
        }

        GDB_CANDIDATES
            .iter()
            .find_map(|name| which(name).ok())
            .ok_or_else(|| {
                "gdb not found. Install gdb-multiarch or a riscv64 GDB toolchain".to_string()
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: None,
            gdb_path: None,
            layout: BootLayout::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Find an executable on PATH (simple which implementation)
fn which(name: &str) -> std::result::Result<PathBuf, ()> {
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(())
}
