//! Boot artifact layout
//!
//! Where the firmware and kernel images live under the work directory, and
//! which breakpoints a boot session starts with. Kept as plain data so that
//! adding another image or breakpoint never touches the initializer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::LayoutError;

/// OpenSBI firmware entry point
pub const FIRMWARE_ENTRY: u64 = 0x8000_0000;
/// Next-stage (kernel) entry after OpenSBI hands off
pub const KERNEL_ENTRY: u64 = 0x8020_0000;

/// Where a breakpoint is placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointLocation {
    /// Absolute instruction address
    Address(u64),
    /// Function or label name resolved by the debugger
    Symbol(String),
}

impl fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "*0x{addr:x}"),
            Self::Symbol(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakpointSpec {
    pub location: BreakpointLocation,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool { true }

impl BreakpointSpec {
    pub fn address(addr: u64) -> Self {
        Self { location: BreakpointLocation::Address(addr), enabled: true }
    }

    /// A symbolic breakpoint that stays off until explicitly enabled
    pub fn inactive_symbol(name: &str) -> Self {
        Self { location: BreakpointLocation::Symbol(name.to_string()), enabled: false }
    }
}

/// Layout of the build tree consumed by a boot debugging session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootLayout {
    /// Subdirectory of the root holding all build outputs
    pub builds_dir: PathBuf,
    /// Primary executable, relative to the builds directory
    pub firmware: PathBuf,
    /// Extra symbol files, relative to the builds directory, in load order
    pub symbol_files: Vec<PathBuf>,
    pub breakpoints: Vec<BreakpointSpec>,
}

impl Default for BootLayout {
    fn default() -> Self {
        Self {
            builds_dir: PathBuf::from("builds"),
            firmware: ["opensbi", "platform", "generic", "firmware", "fw_jump.elf"]
                .iter()
                .collect(),
            symbol_files: vec![["linux", "vmlinux"].iter().collect()],
            breakpoints: vec![
                BreakpointSpec::address(FIRMWARE_ENTRY),
                BreakpointSpec::address(KERNEL_ENTRY),
                BreakpointSpec::inactive_symbol("fw_main"),
            ],
        }
    }
}

impl BootLayout {
    /// Load a layout from a JSON file; omitted fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, LayoutError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn work_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.builds_dir)
    }

    pub fn firmware_path(&self, root: &Path) -> PathBuf {
        self.work_dir(root).join(&self.firmware)
    }

    /// Absolute symbol file paths in list order. Duplicates are kept.
    pub fn symbol_paths(&self, root: &Path) -> Vec<PathBuf> {
        let work_dir = self.work_dir(root);
        self.symbol_files.iter().map(|f| work_dir.join(f)).collect()
    }

    pub fn active_breakpoints(&self) -> impl Iterator<Item = &BreakpointLocation> {
        self.breakpoints.iter().filter(|b| b.enabled).map(|b| &b.location)
    }

    /// Turn on the symbolic breakpoints that ship disabled
    pub fn enable_symbolic_breakpoints(&mut self) {
        for bp in &mut self.breakpoints {
            if matches!(bp.location, BreakpointLocation::Symbol(_)) {
                bp.enabled = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_paths() {
        let layout = BootLayout::default();
        let root = Path::new("/tmp/x");
        assert_eq!(layout.work_dir(root), PathBuf::from("/tmp/x/builds"));
        assert_eq!(
            layout.firmware_path(root),
            PathBuf::from("/tmp/x/builds/opensbi/platform/generic/firmware/fw_jump.elf")
        );
        assert_eq!(layout.symbol_paths(root), vec![PathBuf::from("/tmp/x/builds/linux/vmlinux")]);
    }

    #[test]
    fn test_trailing_slash_root() {
        let layout = BootLayout::default();
        let path = layout.firmware_path(Path::new("/tmp/x/"));
        assert_eq!(path.to_str().unwrap(), "/tmp/x/builds/opensbi/platform/generic/firmware/fw_jump.elf");
    }

    #[test]
    fn test_symbol_paths_keep_order_and_duplicates() {
        let layout = BootLayout {
            symbol_files: vec!["b".into(), "a".into(), "b".into()],
            ..BootLayout::default()
        };
        let paths = layout.symbol_paths(Path::new("/w"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/w/builds/b"),
                PathBuf::from("/w/builds/a"),
                PathBuf::from("/w/builds/b"),
            ]
        );
    }

    #[test]
    fn test_default_breakpoints() {
        let layout = BootLayout::default();
        let active: Vec<_> = layout.active_breakpoints().cloned().collect();
        assert_eq!(
            active,
            vec![
                BreakpointLocation::Address(0x80000000),
                BreakpointLocation::Address(0x80200000),
            ]
        );
    }

    #[test]
    fn test_enable_symbolic_breakpoints() {
        let mut layout = BootLayout::default();
        layout.enable_symbolic_breakpoints();
        let active: Vec<_> = layout.active_breakpoints().cloned().collect();
        assert_eq!(active.len(), 3);
        assert_eq!(active[2], BreakpointLocation::Symbol("fw_main".to_string()));
    }

    #[test]
    fn test_location_display() {
        assert_eq!(BreakpointLocation::Address(0x80000000).to_string(), "*0x80000000");
        assert_eq!(BreakpointLocation::Symbol("fw_main".into()).to_string(), "fw_main");
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"symbol_files": ["linux/vmlinux", "u-boot/u-boot"]}}"#).unwrap();

        let layout = BootLayout::from_json_file(file.path()).unwrap();
        assert_eq!(layout.symbol_files.len(), 2);
        assert_eq!(layout.firmware, BootLayout::default().firmware);
        assert_eq!(layout.breakpoints, BootLayout::default().breakpoints);
    }

    #[test]
    fn test_from_json_file_breakpoints() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"breakpoints": [{{"location": {{"address": 4096}}}}, {{"location": {{"symbol": "start_kernel"}}, "enabled": false}}]}}"#
        )
        .unwrap();

        let layout = BootLayout::from_json_file(file.path()).unwrap();
        assert_eq!(layout.breakpoints[0], BreakpointSpec::address(0x1000));
        assert!(!layout.breakpoints[1].enabled);
    }

    #[test]
    fn test_from_json_file_misspelled_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"symbolfiles": ["u-boot/u-boot"]}}"#).unwrap();

        let err = BootLayout::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, LayoutError::Json(_)));
        assert!(err.to_string().contains("symbolfiles"));
    }

    #[test]
    fn test_from_json_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(BootLayout::from_json_file(file.path()), Err(LayoutError::Json(_))));
    }
}
