//! GDB command file rendering

use crate::session::DebuggerCommand;

/// Render commands as a GDB command file for `gdb -x` or `source`
pub fn render_script(commands: &[DebuggerCommand]) -> String {
    let mut script = String::from("# Generated by riscv-boot-gdb\n");
    for command in commands {
        script.push_str(&command.to_string());
        script.push('\n');
    }
    script
}

/// Command-line arguments that run `commands` at GDB startup.
///
/// `-ex` commands run as if typed at the terminal, so `file` and
/// `add-symbol-file` would stop on a y/n query. Confirmation is off while
/// they run and back on for the interactive session.
pub fn startup_args(commands: &[DebuggerCommand]) -> Vec<String> {
    let mut args = vec!["-ex".to_string(), "set confirm off".to_string()];
    for command in commands {
        args.push("-ex".to_string());
        args.push(command.to_string());
    }
    args.push("-ex".to_string());
    args.push("set confirm on".to_string());
    args
}
