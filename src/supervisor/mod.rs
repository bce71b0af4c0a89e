pub mod error;
pub mod launch;
pub mod managed_process;
pub mod process;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::watch;

pub use error::SupervisorError;
pub use launch::{AssembledCommand, LaunchSpec, OutputMode, StdinMode, SupervisorConfig};
pub use managed_process::{
    ConsoleSink, LogLevel, LogLine, LogSource, OutputSink, ProcessHandle, SendOutcome,
    TracingSink, Unavailable,
};
pub use process::ProcessExit;
pub use state_machine::State;

/// Starts and owns at most one child process at a time.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    sink: Arc<dyn OutputSink>,
    current: Option<ProcessHandle>,
    /// Clone of the spec the current handle was started from
    last_spec: Option<LaunchSpec>,
}

impl ProcessSupervisor {
    /// Captured output goes through `tracing`.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: SupervisorConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            config,
            sink,
            current: None,
            last_spec: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start a process from `spec`.
    ///
    /// Fails with `Busy` while the owned process is still running. A handle
    /// whose process already exited is reaped first.
    pub async fn start(&mut self, spec: &LaunchSpec) -> Result<&ProcessHandle, SupervisorError> {
        if let Some(handle) = &self.current {
            if handle.is_running() {
                return Err(SupervisorError::Busy { pid: handle.pid() });
            }
        }
        if let Some(stale) = self.current.take() {
            let pid = stale.pid();
            match stale.reap().await {
                Ok(exit) => tracing::debug!("Reaped previous process {} ({})", pid, exit),
                Err(e) => tracing::warn!("Failed to reap previous process {}: {}", pid, e),
            }
        }

        let command = AssembledCommand::assemble(&self.config, spec);
        let handle = ProcessHandle::spawn(&command, spec, self.sink.clone())?;
        tracing::info!("Started process {} in {}", handle.pid(), command.working_dir().display());

        self.last_spec = Some(spec.clone());
        Ok(self.current.insert(handle))
    }

    /// Forward one line to the child's stdin.
    pub async fn send_line(&mut self, line: &str) -> SendOutcome {
        match self.current.as_mut() {
            Some(handle) => handle.send_line(line).await,
            None => SendOutcome::Unavailable(Unavailable::NotRunning),
        }
    }

    /// Request a graceful stop. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.current.as_mut() {
            handle.request_stop().await;
        }
    }

    /// Force termination. Idempotent.
    pub fn kill(&self) {
        if let Some(handle) = &self.current {
            handle.kill();
        }
    }

    /// Wait for the owned process to exit, join its readers and drop the handle.
    pub async fn await_exit(&mut self) -> Result<ProcessExit, SupervisorError> {
        let handle = self.current.as_mut().ok_or(SupervisorError::NoProcess)?;
        handle.wait_for_exit().await?;
        match self.current.take() {
            Some(handle) => handle.reap().await,
            None => Err(SupervisorError::NoProcess),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().map(|h| h.is_running()).unwrap_or(false)
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.current.as_ref()
    }

    pub fn exit_watch(&self) -> Option<watch::Receiver<Option<ProcessExit>>> {
        self.current.as_ref().map(|h| h.exit_watch())
    }

    /// The spec of the most recent successful start.
    pub fn last_spec(&self) -> Option<&LaunchSpec> {
        self.last_spec.as_ref()
    }
}
