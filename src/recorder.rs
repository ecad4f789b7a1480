//! In-memory debugger
//!
//! Keeps the same bookkeeping GDB does for the commands the initializer
//! issues, without running GDB. Backs dry runs and tests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::DebuggerError;
use crate::layout::BreakpointLocation;
use crate::session::{CommandOutcome, Debugger, DebuggerCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBreakpoint {
    pub number: u32,
    pub location: BreakpointLocation,
}

#[derive(Debug, Default)]
pub struct RecordingDebugger {
    issued: Vec<DebuggerCommand>,
    primary: Option<PathBuf>,
    symbol_files: Vec<PathBuf>,
    breakpoints: Vec<RecordedBreakpoint>,
    next_breakpoint: u32,
    /// (command prefix, error message) to reject with
    reject: Option<(String, String)>,
}

impl RecordingDebugger {
    pub fn new() -> Self {
        Self { next_breakpoint: 1, ..Self::default() }
    }

    /// Fail any command whose CLI form starts with `prefix`
    pub fn reject_matching(&mut self, prefix: &str, message: &str) {
        self.reject = Some((prefix.to_string(), message.to_string()));
    }

    /// Every command received, including rejected ones
    pub fn issued(&self) -> &[DebuggerCommand] {
        &self.issued
    }

    pub fn primary(&self) -> Option<&Path> {
        self.primary.as_deref()
    }

    pub fn symbol_files(&self) -> &[PathBuf] {
        &self.symbol_files
    }

    pub fn breakpoints(&self) -> &[RecordedBreakpoint] {
        &self.breakpoints
    }

    /// Distinct addresses that currently carry a breakpoint
    pub fn breakpoint_addresses(&self) -> BTreeSet<u64> {
        self.breakpoints
            .iter()
            .filter_map(|bp| match bp.location {
                BreakpointLocation::Address(addr) => Some(addr),
                BreakpointLocation::Symbol(_) => None,
            })
            .collect()
    }

    fn apply(&mut self, command: &DebuggerCommand) -> CommandOutcome {
        match command {
            DebuggerCommand::LoadExecutable(path) => {
                self.primary = Some(path.clone());
                CommandOutcome {
                    output: format!("Reading symbols from {}...\n", path.display()),
                    breakpoint: None,
                }
            }
            DebuggerCommand::AddSymbolFile(path) => {
                self.symbol_files.push(path.clone());
                CommandOutcome {
                    output: format!("Reading symbols from {}...\n", path.display()),
                    breakpoint: None,
                }
            }
            DebuggerCommand::Break(location) => {
                let number = self.next_breakpoint;
                self.next_breakpoint += 1;
                self.breakpoints.push(RecordedBreakpoint { number, location: location.clone() });
                CommandOutcome {
                    output: format!("Breakpoint {number} at {location}\n"),
                    breakpoint: Some(number),
                }
            }
        }
    }
}

impl Debugger for RecordingDebugger {
    async fn execute(&mut self, command: &DebuggerCommand) -> Result<CommandOutcome, DebuggerError> {
        self.issued.push(command.clone());
        let rendered = command.to_string();

        if let Some((prefix, message)) = &self.reject {
            if rendered.starts_with(prefix.as_str()) {
                return Err(DebuggerError::Rejected { command: rendered, message: message.clone() });
            }
        }

        debug!("Recorded: {}", rendered);
        Ok(self.apply(command))
    }
}
