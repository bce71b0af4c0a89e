//! Supervisor error types. Start failures never leave a partial handle behind;
//! runtime outcomes (exit codes) are not errors.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Supervisor busy: process {pid} is still running")]
    Busy { pid: u32 },

    #[error("No process is owned by the supervisor")]
    NoProcess,

    #[error("Working directory '{0}' does not exist")]
    InvalidWorkingDir(PathBuf),

    #[error("Failed to start '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for process: {0}")]
    Wait(String),
}

impl SupervisorError {
    /// Machine readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "BUSY",
            Self::NoProcess => "NO_PROCESS",
            Self::InvalidWorkingDir(_) => "INVALID_WORKING_DIR",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::Wait(_) => "WAIT_FAILED",
        }
    }

    /// Whether the failure happened before any process existed.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::InvalidWorkingDir(_) | Self::SpawnFailed { .. }
        )
    }
}
