//! Session initializer
//!
//! Resolves the work directory, then loads the firmware as the primary
//! target, registers the extra symbol files and installs the boot
//! breakpoints, in that order, on any [`Debugger`].

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DebuggerError, InitError, Result, WORK_DIR_VAR};
use crate::layout::{BootLayout, BreakpointLocation};

/// A single command issued to the debugger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "arg", rename_all = "snake_case")]
pub enum DebuggerCommand {
    /// Load an executable and its symbols as the primary target
    LoadExecutable(PathBuf),
    /// Add a file's symbols without replacing the primary target
    AddSymbolFile(PathBuf),
    Break(BreakpointLocation),
}

impl fmt::Display for DebuggerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadExecutable(path) => write!(f, "file {}", path.display()),
            Self::AddSymbolFile(path) => write!(f, "add-symbol-file {}", path.display()),
            Self::Break(location) => write!(f, "break {location}"),
        }
    }
}

/// What the debugger reported for a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Console text printed by the debugger
    pub output: String,
    /// Number assigned to a newly created breakpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint: Option<u32>,
}

/// A debugger that accepts session commands
pub trait Debugger {
    fn execute(
        &mut self,
        command: &DebuggerCommand,
    ) -> impl Future<Output = std::result::Result<CommandOutcome, DebuggerError>> + Send;
}

/// Commands issued during one initialization run, with their outcomes
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub root: PathBuf,
    pub steps: Vec<InitStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitStep {
    pub command: DebuggerCommand,
    pub outcome: CommandOutcome,
}

impl InitReport {
    pub fn breakpoint_numbers(&self) -> Vec<u32> {
        self.steps.iter().filter_map(|s| s.outcome.breakpoint).collect()
    }
}

/// Configures a debugger for the boot image found under a root directory
#[derive(Debug, Clone)]
pub struct SessionInitializer {
    root: PathBuf,
    layout: BootLayout,
}

impl SessionInitializer {
    pub fn new(root: impl Into<PathBuf>, layout: BootLayout) -> Self {
        Self { root: root.into(), layout }
    }

    /// Build from `GDB_WORK_DIR` in the process environment
    pub fn from_env(layout: BootLayout) -> Result<Self> {
        Self::from_lookup(layout, |name| std::env::var_os(name))
    }

    /// Build from `GDB_WORK_DIR` as reported by `lookup`. Unset and empty
    /// values are both missing.
    pub fn from_lookup<F, V>(layout: BootLayout, lookup: F) -> Result<Self>
    where
        F: FnOnce(&str) -> Option<V>,
        V: Into<PathBuf>,
    {
        let root: PathBuf = lookup(WORK_DIR_VAR)
            .map(Into::into)
            .filter(|p: &PathBuf| !p.as_os_str().is_empty())
            .ok_or(InitError::MissingConfiguration(WORK_DIR_VAR))?;
        Ok(Self::new(root, layout))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &BootLayout {
        &self.layout
    }

    /// Every command an initialization run issues, in order
    pub fn plan(&self) -> Vec<DebuggerCommand> {
        let mut commands = vec![DebuggerCommand::LoadExecutable(self.layout.firmware_path(&self.root))];
        commands.extend(
            self.layout
                .symbol_paths(&self.root)
                .into_iter()
                .map(DebuggerCommand::AddSymbolFile),
        );
        commands.extend(self.layout.active_breakpoints().cloned().map(DebuggerCommand::Break));
        commands
    }

    /// Issue the plan against `debugger`. Stops at the first failure and
    /// hands the debugger's error back unchanged.
    pub async fn initialize<D: Debugger>(&self, debugger: &mut D) -> Result<InitReport> {
        info!("Initializing boot debug session from {}", self.root.display());

        let mut steps = Vec::new();
        for command in self.plan() {
            debug!("Issuing: {}", command);
            let outcome = debugger.execute(&command).await?;
            steps.push(InitStep { command, outcome });
        }

        info!("Session initialized ({} commands)", steps.len());
        Ok(InitReport { root: self.root.clone(), steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecordingDebugger;

    fn scenario() -> SessionInitializer {
        SessionInitializer::from_lookup(BootLayout::default(), |_| Some("/tmp/x")).unwrap()
    }

    #[test]
    fn test_missing_variable() {
        let result = SessionInitializer::from_lookup(BootLayout::default(), |_| None::<String>);
        assert!(matches!(result, Err(InitError::MissingConfiguration("GDB_WORK_DIR"))));
    }

    #[test]
    fn test_empty_variable_is_missing() {
        let result = SessionInitializer::from_lookup(BootLayout::default(), |_| Some(""));
        assert!(matches!(result, Err(InitError::MissingConfiguration(_))));
    }

    #[test]
    fn test_lookup_reads_work_dir_var() {
        let init = SessionInitializer::from_lookup(BootLayout::default(), |name| {
            assert_eq!(name, "GDB_WORK_DIR");
            Some("/srv/boot")
        })
        .unwrap();
        assert_eq!(init.root(), Path::new("/srv/boot"));
    }

    #[test]
    fn test_plan_order() {
        let plan = scenario().plan();
        assert_eq!(
            plan,
            vec![
                DebuggerCommand::LoadExecutable(
                    "/tmp/x/builds/opensbi/platform/generic/firmware/fw_jump.elf".into()
                ),
                DebuggerCommand::AddSymbolFile("/tmp/x/builds/linux/vmlinux".into()),
                DebuggerCommand::Break(BreakpointLocation::Address(0x80000000)),
                DebuggerCommand::Break(BreakpointLocation::Address(0x80200000)),
            ]
        );
    }

    #[test]
    fn test_command_display() {
        let rendered: Vec<String> = scenario().plan().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "file /tmp/x/builds/opensbi/platform/generic/firmware/fw_jump.elf",
                "add-symbol-file /tmp/x/builds/linux/vmlinux",
                "break *0x80000000",
                "break *0x80200000",
            ]
        );
    }

    #[test]
    fn test_command_serializes_tagged() {
        let json = serde_json::to_value(DebuggerCommand::Break(BreakpointLocation::Address(16))).unwrap();
        assert_eq!(json["kind"], "break");
        assert_eq!(json["arg"]["address"], 16);
    }

    #[tokio::test]
    async fn test_initialize_scenario() {
        let mut gdb = RecordingDebugger::new();
        let report = scenario().initialize(&mut gdb).await.unwrap();

        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.breakpoint_numbers(), vec![1, 2]);
        assert_eq!(
            gdb.primary().unwrap(),
            Path::new("/tmp/x/builds/opensbi/platform/generic/firmware/fw_jump.elf")
        );
        assert_eq!(gdb.symbol_files(), [PathBuf::from("/tmp/x/builds/linux/vmlinux")]);
        assert_eq!(gdb.breakpoint_addresses().into_iter().collect::<Vec<_>>(), vec![0x80000000, 0x80200000]);
    }

    #[tokio::test]
    async fn test_failure_stops_run() {
        let mut gdb = RecordingDebugger::new();
        gdb.reject_matching("add-symbol-file", "No such file or directory.");

        let err = scenario().initialize(&mut gdb).await.unwrap_err();
        match err {
            InitError::Debugger(DebuggerError::Rejected { message, .. }) => {
                assert_eq!(message, "No such file or directory.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // firmware loaded, nothing after the failing command
        assert_eq!(gdb.issued().len(), 2);
        assert!(gdb.breakpoints().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_keeps_breakpoint_set() {
        let init = scenario();
        let mut gdb = RecordingDebugger::new();

        init.initialize(&mut gdb).await.unwrap();
        let first = gdb.breakpoint_addresses();
        let report = init.initialize(&mut gdb).await.unwrap();

        assert_eq!(gdb.breakpoint_addresses(), first);
        // duplicates are left to the debugger
        assert_eq!(gdb.breakpoints().len(), 4);
        assert_eq!(report.breakpoint_numbers(), vec![3, 4]);
        assert_eq!(gdb.symbol_files().len(), 2);
    }
}
