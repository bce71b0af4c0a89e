//! OS-level helpers: termination signals and exit status mapping.

use std::fmt;
use thiserror::Error;
use tokio::process::Child;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("process has no pid (already reaped)")]
    NoPid,
    #[error("failed to terminate process: {reason}")]
    TerminationFailed { reason: String },
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Exited(i32),
    /// Ended by a signal without an exit code
    Killed,
}

impl ProcessExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ProcessExit::Exited(code),
            None => ProcessExit::Killed,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessExit::Exited(code) => Some(*code),
            ProcessExit::Killed => None,
        }
    }

    /// Exit code 0
    pub fn is_clean(&self) -> bool {
        matches!(self, ProcessExit::Exited(0))
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessExit::Exited(code) => write!(f, "exit code {}", code),
            ProcessExit::Killed => write!(f, "killed"),
        }
    }
}

/// Ask the child to terminate.
///
/// `force` kills immediately; otherwise unix children get SIGTERM so they can
/// run their shutdown hooks. Windows has no soft signal and always kills.
pub fn terminate(child: &mut Child, force: bool) -> Result<(), ProcessError> {
    #[cfg(unix)]
    {
        if !force {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = child.id().ok_or(ProcessError::NoPid)?;
            tracing::info!("Sending TERM signal to pid {}", pid);
            return signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
                ProcessError::TerminationFailed {
                    reason: format!("Failed to send signal: {}", e),
                }
            });
        }
    }

    let _ = force;
    tracing::info!("Killing pid {:?}", child.id());
    child
        .start_kill()
        .map_err(|e| ProcessError::TerminationFailed {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_exit_helpers() {
        assert!(ProcessExit::Exited(0).is_clean());
        assert!(!ProcessExit::Exited(1).is_clean());
        assert!(!ProcessExit::Killed.is_clean());
        assert_eq!(ProcessExit::Exited(3).code(), Some(3));
        assert_eq!(ProcessExit::Killed.code(), None);
        assert_eq!(ProcessExit::Exited(2).to_string(), "exit code 2");
    }

    #[cfg(unix)]
    #[test]
    fn test_from_status() {
        use std::os::unix::process::ExitStatusExt;
        let ok = std::process::ExitStatus::from_raw(0);
        assert_eq!(ProcessExit::from_status(ok), ProcessExit::Exited(0));
        // raw 9 = terminated by SIGKILL
        let killed = std::process::ExitStatus::from_raw(9);
        assert_eq!(ProcessExit::from_status(killed), ProcessExit::Killed);
    }
}
