//! Managed Process - one supervised child with optional stdio capture
//!
//! A [`ProcessHandle`] owns exactly one spawned child:
//! - a waiter task owning the OS handle, publishing the exit through a watch channel
//! - one reader task per captured stream, forwarding lines to an [`OutputSink`]
//! - the stdin pipe for command injection when stdin is open

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command as TokioCommand};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::error::SupervisorError;
use super::launch::{AssembledCommand, LaunchSpec, OutputMode, StdinMode};
use super::process::{self, ProcessExit};
use super::state_machine::{State, StateMachine};

// ─── Log Types ───────────────────────────────────────────────

/// A single line of console output from the managed process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    pub source: LogSource,
    pub content: String,
    pub level: LogLevel,
}

impl LogLine {
    pub fn new(source: LogSource, content: String, level: LogLevel) -> Self {
        Self {
            timestamp: current_timestamp(),
            source,
            content,
            level,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// Lifecycle messages from the supervisor itself
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

// ─── Sinks ───────────────────────────────────────────────────

/// Receives captured output. Called from the reader tasks.
pub trait OutputSink: Send + Sync {
    fn accept(&self, line: LogLine);
}

impl OutputSink for mpsc::UnboundedSender<LogLine> {
    fn accept(&self, line: LogLine) {
        let _ = self.send(line);
    }
}

/// Routes child output through `tracing` under the `server` target.
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn accept(&self, line: LogLine) {
        let tag = match line.source {
            LogSource::Stderr => "[stderr] ",
            _ => "",
        };
        match line.level {
            LogLevel::Error => tracing::error!(target: "server", "{}{}", tag, line.content),
            LogLevel::Warn => tracing::warn!(target: "server", "{}{}", tag, line.content),
            LogLevel::Debug => tracing::debug!(target: "server", "{}{}", tag, line.content),
            LogLevel::Info => tracing::info!(target: "server", "{}{}", tag, line.content),
        }
    }
}

/// Prints child output verbatim; stderr lines go to stderr with an `[ERROR]` tag.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn accept(&self, line: LogLine) {
        match line.source {
            LogSource::Stdout => println!("{}", line.content),
            LogSource::Stderr => eprintln!("[ERROR] {}", line.content),
            LogSource::System => tracing::info!("{}", line.content),
        }
    }
}

// ─── Command injection ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Unavailable(Unavailable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    NotRunning,
    /// The launch spec disabled stdin
    InputDisabled,
    /// The child closed its end of the pipe
    StreamClosed,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Unavailable::NotRunning => "not available: process is not running",
            Unavailable::InputDisabled => "not available: stdin is disabled",
            Unavailable::StreamClosed => "not available: stdin is closed",
        };
        f.write_str(text)
    }
}

enum StopRequest {
    Terminate,
    Kill,
}

// ─── Process Handle ──────────────────────────────────────────

/// Live ownership record for one spawned child process.
pub struct ProcessHandle {
    pid: u32,
    stdin_mode: StdinMode,
    stdin: Option<ChildStdin>,
    stop_command: Option<String>,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    state_rx: watch::Receiver<State>,
    waiter: Option<JoinHandle<()>>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Spawn the assembled command. Nothing is left behind on failure.
    pub(crate) fn spawn(
        command: &AssembledCommand,
        spec: &LaunchSpec,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, SupervisorError> {
        if !command.working_dir().is_dir() {
            return Err(SupervisorError::InvalidWorkingDir(command.working_dir.clone()));
        }

        let captured = spec.output == OutputMode::Captured;

        let mut cmd = TokioCommand::new(&command.program);
        cmd.args(&command.args)
            .current_dir(command.working_dir())
            .kill_on_drop(true);

        match spec.stdin {
            StdinMode::Open => cmd.stdin(std::process::Stdio::piped()),
            StdinMode::Disabled => cmd.stdin(std::process::Stdio::null()),
        };
        if captured {
            cmd.stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
            // Windows: no console window when output is captured anyway
            crate::utils::apply_creation_flags(&mut cmd);
        } else {
            cmd.stdout(std::process::Stdio::inherit())
                .stderr(std::process::Stdio::inherit());
        }

        tracing::info!("Launching: {}", command.display());
        let mut child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailed {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        let mut machine = StateMachine::new();
        advance(&mut machine, State::Running);
        let (state_tx, state_rx) = watch::channel(machine.state());

        // Compile log pattern regex (shared read-only by both readers)
        let log_regex = spec.log_pattern.as_deref().and_then(|pat| match Regex::new(pat) {
            Ok(re) => Some(Arc::new(re)),
            Err(e) => {
                tracing::warn!("Invalid log_pattern '{}': {}, falling back to default", pat, e);
                None
            }
        });

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, LogSource::Stdout, sink.clone(), log_regex.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, LogSource::Stderr, sink.clone(), log_regex));
        }
        let stdin = child.stdin.take();

        // ── process waiter ───────────────────────────────────
        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<StopRequest>();
        let waiter_sink = sink.clone();
        let waiter = tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(request) = stop_rx.recv() => {
                        let force = matches!(request, StopRequest::Kill);
                        if let Err(e) = process::terminate(&mut child, force) {
                            tracing::warn!("{}", e);
                        }
                    }
                }
            };
            let exit = match status {
                Ok(status) => ProcessExit::from_status(status),
                Err(e) => {
                    tracing::error!("Failed to wait for process {}: {}", pid, e);
                    ProcessExit::Killed
                }
            };
            advance(&mut machine, terminal_state(exit));
            let _ = state_tx.send(machine.state());

            let msg = format!("Process {} ended ({})", pid, exit);
            tracing::info!("{}", msg);
            if captured {
                waiter_sink.accept(LogLine::new(LogSource::System, msg, LogLevel::Info));
            }
            let _ = exit_tx.send(Some(exit));
        });

        if captured {
            let msg = format!("Process started with PID {}", pid);
            sink.accept(LogLine::new(LogSource::System, msg, LogLevel::Info));
        }

        Ok(Self {
            pid,
            stdin_mode: spec.stdin,
            stdin,
            stop_command: spec.stop_command.clone(),
            stop_tx,
            exit_rx,
            state_rx,
            waiter: Some(waiter),
            readers,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Lifecycle state, as tracked by the waiter. Terminal before the exit
    /// is published on [`exit_watch`](Self::exit_watch).
    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// Observe the exit without owning the handle.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    /// Write `line` plus a single newline to the child's stdin.
    pub async fn send_line(&mut self, line: &str) -> SendOutcome {
        if !self.is_running() {
            return SendOutcome::Unavailable(Unavailable::NotRunning);
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return SendOutcome::Unavailable(match self.stdin_mode {
                StdinMode::Disabled => Unavailable::InputDisabled,
                StdinMode::Open => Unavailable::StreamClosed,
            });
        };

        let mut data = line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string();
        data.push('\n');

        let written = match stdin.write_all(data.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!("stdin of process {} closed: {}", self.pid, e);
            self.stdin = None;
            return SendOutcome::Unavailable(Unavailable::StreamClosed);
        }
        SendOutcome::Delivered
    }

    /// Ask the process to stop: the stop command when one is configured and
    /// stdin is usable, a termination signal otherwise. No-op once exited.
    pub async fn request_stop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Some(command) = self.stop_command.clone() {
            match self.send_line(&command).await {
                SendOutcome::Delivered => {
                    tracing::info!("Sent stop command '{}' to process {}", command, self.pid);
                    return;
                }
                SendOutcome::Unavailable(reason) => {
                    tracing::debug!("Stop command {}, signalling instead", reason);
                }
            }
        }
        let _ = self.stop_tx.send(StopRequest::Terminate);
    }

    /// Force termination. No-op once exited.
    pub fn kill(&self) {
        if self.is_running() {
            let _ = self.stop_tx.send(StopRequest::Kill);
        }
    }

    /// Wait until the process exits. Cancel safe.
    pub async fn wait_for_exit(&mut self) -> Result<ProcessExit, SupervisorError> {
        loop {
            if let Some(exit) = *self.exit_rx.borrow() {
                return Ok(exit);
            }
            if self.exit_rx.changed().await.is_err() {
                return (*self.exit_rx.borrow())
                    .ok_or_else(|| SupervisorError::Wait("process waiter ended unexpectedly".into()));
            }
        }
    }

    /// Wait for exit, then for the waiter and every reader to finish.
    pub(crate) async fn reap(mut self) -> Result<ProcessExit, SupervisorError> {
        let exit = self.wait_for_exit().await?;
        drop(self.stdin.take());
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.await;
        }
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
        tracing::debug!("Process {} reaped ({})", self.pid, exit);
        Ok(exit)
    }
}

fn spawn_reader<R>(
    stream: R,
    source: LogSource,
    sink: Arc<dyn OutputSink>,
    pattern: Option<Arc<Regex>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Reading {:?} of child failed: {}", source, e);
                    break;
                }
            }
            // not every server writes UTF-8
            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(|c: char| c == '\r' || c == '\n')
                .to_string();
            let level = parse_log_level(&line, pattern.as_deref());
            // stderr lines default to at least Warn
            let level = if source == LogSource::Stderr && level == LogLevel::Info {
                LogLevel::Warn
            } else {
                level
            };
            sink.accept(LogLine::new(source, line, level));
        }
    })
}

fn advance(machine: &mut StateMachine, to: State) {
    if let Err(e) = machine.transition(to) {
        tracing::warn!("{}", e);
    }
}

fn terminal_state(exit: ProcessExit) -> State {
    match exit {
        ProcessExit::Exited(code) => State::Exited(code),
        ProcessExit::Killed => State::Killed,
    }
}

// ─── Helpers ─────────────────────────────────────────────────

/// Parse the log level from a server log line using an optional regex pattern.
///
/// The pattern should contain a named capture group `level` matching level
/// keywords (INFO, WARN, ERROR, DEBUG, ...). Without a pattern, or without a
/// match, the level is Info.
///
/// Example patterns:
///   Minecraft: `/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]`
///   Generic:   `(?P<level>INFO|WARN|ERROR|DEBUG|TRACE|FATAL)`
pub fn parse_log_level(line: &str, pattern: Option<&Regex>) -> LogLevel {
    if let Some(re) = pattern {
        if let Some(caps) = re.captures(line) {
            if let Some(level_match) = caps.name("level") {
                return match level_match.as_str().to_uppercase().as_str() {
                    "ERROR" | "FATAL" => LogLevel::Error,
                    "WARN" | "WARNING" => LogLevel::Warn,
                    "DEBUG" | "TRACE" => LogLevel::Debug,
                    _ => LogLevel::Info,
                };
            }
        }
    }
    LogLevel::Info
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ─── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level_with_pattern() {
        let mc_pattern = Regex::new(r"/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]").unwrap();

        assert_eq!(
            parse_log_level("[12:00:00] [Server thread/INFO]: Done (5.123s)!", Some(&mc_pattern)),
            LogLevel::Info
        );
        assert_eq!(
            parse_log_level("[12:00:00] [Server thread/WARN]: Can't keep up!", Some(&mc_pattern)),
            LogLevel::Warn
        );
        assert_eq!(
            parse_log_level("[12:00:00] [Server thread/FATAL]: Crash", Some(&mc_pattern)),
            LogLevel::Error
        );
        assert_eq!(parse_log_level("Some random output", Some(&mc_pattern)), LogLevel::Info);
    }

    #[test]
    fn test_parse_log_level_without_pattern() {
        assert_eq!(parse_log_level("[12:00:00] [Server thread/ERROR]: err", None), LogLevel::Info);
    }

    #[test]
    fn test_unavailable_display() {
        assert!(Unavailable::InputDisabled.to_string().starts_with("not available"));
        assert!(!SendOutcome::Unavailable(Unavailable::NotRunning).is_delivered());
        assert!(SendOutcome::Delivered.is_delivered());
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.accept(LogLine::new(LogSource::Stderr, "boom".into(), LogLevel::Warn));
        let line = rx.try_recv().unwrap();
        assert_eq!(line.source, LogSource::Stderr);
        assert_eq!(line.content, "boom");
    }
}
