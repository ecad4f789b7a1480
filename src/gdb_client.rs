//! GDB/MI client
//!
//! Drives GDB through its machine interface (`--interpreter=mi3`).
//! Each command goes out as `<token><mi-command>\n`. GDB answers with
//! stream records (`~"..."`, `&"..."`), an optional `^class,results` result
//! record carrying the same token, and finally a `(gdb)` prompt line.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::DebuggerError;
use crate::session::{CommandOutcome, Debugger, DebuggerCommand};

/// Default per-command deadline. Loading vmlinux symbols can take a while.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Output channel of an MI stream record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Console,
    Target,
    Log,
}

/// One line of GDB/MI output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiRecord {
    /// `[token]^class[,results]`
    Result { token: Option<u32>, class: String, results: String },
    /// `~"..."`, `@"..."` or `&"..."`, already unescaped
    Stream { kind: StreamKind, text: String },
    /// `*`, `+` or `=` async records, kept raw
    Async(String),
    Prompt,
    Other(String),
}

/// Parse a single line of MI output
pub fn parse_record(line: &str) -> MiRecord {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim_end() == "(gdb)" {
        return MiRecord::Prompt;
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let token = line[..digits].parse().ok();
    let rest = &line[digits..];

    match rest.chars().next() {
        Some('^') => {
            let body = &rest[1..];
            let (class, results) = body.split_once(',').unwrap_or((body, ""));
            MiRecord::Result { token, class: class.to_string(), results: results.to_string() }
        }
        Some(c @ ('~' | '@' | '&')) => {
            let kind = match c {
                '~' => StreamKind::Console,
                '@' => StreamKind::Target,
                _ => StreamKind::Log,
            };
            MiRecord::Stream { kind, text: unescape_c_string(&rest[1..]) }
        }
        Some('*' | '+' | '=') => MiRecord::Async(rest.to_string()),
        _ => MiRecord::Other(line.to_string()),
    }
}

/// Quote `s` as an MI C string
pub fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Decode an MI C string. Input without surrounding quotes is returned as-is.
pub fn unescape_c_string(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return s.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some('e') => bytes.push(0x1b),
            Some(d @ '0'..='7') => {
                // octal escape, up to three digits
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(v) => {
                            value = value * 8 + v;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extract the value of `name="..."` from MI result text
pub fn result_field(results: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    for (idx, _) in results.match_indices(&needle) {
        let at_boundary = idx == 0 || matches!(results.as_bytes()[idx - 1], b',' | b'{' | b'[');
        if !at_boundary {
            continue;
        }
        let start = idx + needle.len() - 1;
        let tail = &results[start..];
        let mut escaped = false;
        for (i, b) in tail.bytes().enumerate().skip(1) {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => return Some(unescape_c_string(&tail[..=i])),
                _ => {}
            }
        }
        return None;
    }
    None
}

/// Breakpoint number from a `-break-insert` result
pub fn breakpoint_number(results: &str) -> Option<u32> {
    result_field(results, "number")?.parse().ok()
}

/// Wrap a CLI command for `-interpreter-exec console`
fn console_command(cli: &str) -> String {
    format!("-interpreter-exec console {}", escape_c_string(cli))
}

/// A command that timed out before GDB finished answering it
#[derive(Debug, Clone, Copy)]
struct Abandoned {
    token: u32,
    result_seen: bool,
}

/// GDB session driven over MI
pub struct GdbClient {
    reader: Reader,
    writer: Writer,
    /// GDB child process (owned, killed on drop)
    process: Option<Child>,
    next_token: u32,
    timeout: Duration,
    /// Late reply still owed by a timed-out command
    abandoned: Option<Abandoned>,
    closed: bool,
}

impl GdbClient {
    /// Spawn GDB in MI mode and wait for its first prompt
    pub async fn start(
        gdb_path: &Path,
        extra_args: &[String],
        timeout: Duration,
    ) -> Result<Self, DebuggerError> {
        info!("Starting GDB: {} --interpreter=mi3", gdb_path.display());

        let mut cmd = Command::new(gdb_path);
        cmd.args(["-q", "-nx", "--interpreter=mi3"])
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|e| {
            DebuggerError::LaunchFailed(format!("Failed to spawn {}: {}", gdb_path.display(), e))
        })?;

        let stdin = process.stdin.take()
            .ok_or_else(|| DebuggerError::LaunchFailed("GDB stdin not captured".to_string()))?;
        let stdout = process.stdout.take()
            .ok_or_else(|| DebuggerError::LaunchFailed("GDB stdout not captured".to_string()))?;

        let mut client = Self::new(Box::new(stdout), Box::new(stdin), timeout);
        client.process = Some(process);
        client.wait_for_prompt().await?;

        info!("GDB ready");
        Ok(client)
    }

    /// Speak MI over an existing stream pair and wait for the first prompt
    pub async fn from_streams<R, W>(reader: R, writer: W, timeout: Duration) -> Result<Self, DebuggerError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut client = Self::new(Box::new(reader), Box::new(writer), timeout);
        client.wait_for_prompt().await?;
        Ok(client)
    }

    fn new(reader: Box<dyn AsyncRead + Send + Unpin>, writer: Writer, timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            process: None,
            next_token: 1,
            timeout,
            abandoned: None,
            closed: false,
        }
    }

    async fn wait_for_prompt(&mut self) -> Result<(), DebuggerError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let line = self.read_line(deadline).await?;
            if parse_record(&line) == MiRecord::Prompt {
                return Ok(());
            }
        }
    }

    async fn read_line(&mut self, deadline: Instant) -> Result<String, DebuggerError> {
        let mut line = String::new();
        match tokio::time::timeout_at(deadline, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => {
                self.closed = true;
                Err(DebuggerError::ConnectionClosed)
            }
            Ok(Ok(_)) => Ok(line),
            Ok(Err(e)) => Err(DebuggerError::Io(e)),
            Err(_) => Err(DebuggerError::Timeout),
        }
    }

    /// Send one MI command and collect its console output and result text.
    /// `label` is how the command is named in errors.
    async fn run(&mut self, label: &str, mi_command: &str) -> Result<(String, String), DebuggerError> {
        self.drain_abandoned().await?;

        let token = self.next_token;
        self.next_token += 1;

        debug!("GDB/MI command: {}{}", token, mi_command);
        self.writer.write_all(format!("{token}{mi_command}\n").as_bytes()).await?;
        self.writer.flush().await?;

        let deadline = Instant::now() + self.timeout;
        let mut console = String::new();
        let mut result: Option<(String, String)> = None;

        loop {
            let line = match self.read_line(deadline).await {
                Err(DebuggerError::Timeout) => {
                    self.abandoned = Some(Abandoned { token, result_seen: result.is_some() });
                    return Err(DebuggerError::Timeout);
                }
                line => line?,
            };
            match parse_record(&line) {
                MiRecord::Stream { kind: StreamKind::Console, text } => console.push_str(&text),
                MiRecord::Result { token: Some(t), class, results } if t == token => {
                    if class == "exit" {
                        return Ok((console, results));
                    }
                    result = Some((class, results));
                }
                MiRecord::Prompt if result.is_some() => break,
                record => debug!("GDB/MI: {:?}", record),
            }
        }

        let (class, results) = result.ok_or_else(|| DebuggerError::Protocol("missing result record".to_string()))?;
        debug!("GDB/MI result: ^{} {}", class, results);

        match class.as_str() {
            "done" | "running" | "connected" => Ok((console, results)),
            "error" => Err(DebuggerError::Rejected {
                command: label.to_string(),
                message: result_field(&results, "msg").unwrap_or(results),
            }),
            other => Err(DebuggerError::Protocol(format!("unexpected result class '{other}'"))),
        }
    }

    /// Discard the rest of a timed-out command's reply, up to its result
    /// record and the prompt after it
    async fn drain_abandoned(&mut self) -> Result<(), DebuggerError> {
        let Some(mut pending) = self.abandoned.take() else {
            return Ok(());
        };
        debug!("Draining late reply to GDB/MI command {}", pending.token);

        let deadline = Instant::now() + self.timeout;
        loop {
            let line = match self.read_line(deadline).await {
                Err(DebuggerError::Timeout) => {
                    self.abandoned = Some(pending);
                    return Err(DebuggerError::Timeout);
                }
                line => line?,
            };
            match parse_record(&line) {
                MiRecord::Result { token: Some(t), .. } if t == pending.token => pending.result_seen = true,
                MiRecord::Prompt if pending.result_seen => return Ok(()),
                record => debug!("GDB/MI (stale): {:?}", record),
            }
        }
    }

    /// Run a CLI command and return its console output
    pub async fn console(&mut self, cli: &str) -> Result<String, DebuggerError> {
        let (output, _) = self.run(cli, &console_command(cli)).await?;
        Ok(output)
    }

    /// Ask GDB to exit, then make sure the process is gone
    pub async fn shutdown(&mut self) -> Result<(), DebuggerError> {
        info!("Shutting down GDB");

        if let Err(e) = self.run("-gdb-exit", "-gdb-exit").await {
            debug!("gdb-exit: {}", e);
        }

        if let Some(process) = &mut self.process {
            if tokio::time::timeout(Duration::from_secs(2), process.wait()).await.is_err() {
                if let Err(e) = process.kill().await {
                    warn!("Kill after shutdown: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Check if GDB is still there: the process has not exited and its
    /// output has not reached EOF
    pub fn is_running(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match &mut self.process {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => true,
        }
    }
}

impl Debugger for GdbClient {
    async fn execute(&mut self, command: &DebuggerCommand) -> Result<CommandOutcome, DebuggerError> {
        let cli = command.to_string();
        match command {
            DebuggerCommand::Break(location) => {
                let (output, results) = self.run(&cli, &format!("-break-insert {location}")).await?;
                Ok(CommandOutcome { output, breakpoint: breakpoint_number(&results) })
            }
            DebuggerCommand::LoadExecutable(_) | DebuggerCommand::AddSymbolFile(_) => {
                let (output, _) = self.run(&cli, &console_command(&cli)).await?;
                Ok(CommandOutcome { output, breakpoint: None })
            }
        }
    }
}

/// Scripted GDB for tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use tokio::io::DuplexStream;

    /// Minimal scripted GDB: answers MI commands over a duplex stream
    pub(crate) async fn fake_gdb(stream: DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut next_bp = 1;

        write.write_all(b"=thread-group-added,id=\"i1\"\n(gdb) \n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            let digits = line.bytes().take_while(u8::is_ascii_digit).count();
            let (token, cmd) = line.split_at(digits);

            let reply = if cmd.starts_with("-break-insert") {
                let bp = next_bp;
                next_bp += 1;
                format!("=breakpoint-created,bkpt={{number=\"{bp}\"}}\n{token}^done,bkpt={{number=\"{bp}\",type=\"breakpoint\"}}\n(gdb) \n")
            } else if cmd.contains("missing") {
                format!("&\"{cmd}\\n\"\n{token}^error,msg=\"missing: No such file or directory.\"\n(gdb) \n")
            } else if cmd.starts_with("-interpreter-exec console") {
                format!("~\"Reading symbols...\\n\"\n~\"done.\\n\"\n{token}^done\n(gdb) \n")
            } else if cmd == "-gdb-exit" {
                write.write_all(format!("{token}^exit\n").as_bytes()).await.unwrap();
                return;
            } else {
                format!("{token}^error,msg=\"Undefined MI command\"\n(gdb) \n")
            };
            write.write_all(reply.as_bytes()).await.unwrap();
        }
    }

    /// Answers the first command only after `delay`, later ones at once
    pub(crate) async fn slow_first_reply(stream: DuplexStream, delay: Duration) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut first = true;

        write.write_all(b"(gdb) \n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            let digits = line.bytes().take_while(u8::is_ascii_digit).count();
            let token = &line[..digits];

            let reply = if first {
                first = false;
                tokio::time::sleep(delay).await;
                format!("~\"OUTPUT OF FIRST\\n\"\n{token}^done\n(gdb) \n")
            } else {
                format!("~\"second\\n\"\n{token}^done\n(gdb) \n")
            };
            if write.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    /// Prints the prompt, then exits on the first command
    pub(crate) async fn exiting_gdb(stream: DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"(gdb) \n").await.unwrap();
        let _ = lines.next_line().await;
    }

    pub(crate) async fn connect() -> GdbClient {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(fake_gdb(server));
        let (read, write) = tokio::io::split(client);
        GdbClient::from_streams(read, write, Duration::from_secs(5)).await.unwrap()
    }

    pub(crate) async fn connect_exiting() -> GdbClient {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(exiting_gdb(server));
        let (read, write) = tokio::io::split(client);
        GdbClient::from_streams(read, write, Duration::from_secs(5)).await.unwrap()
    }
}
