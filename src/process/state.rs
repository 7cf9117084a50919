// src/process/state.rs

use std::fmt;
use std::str::FromStr;

/// Lifecycle of a [`super::ProcessHandle`].
///
/// `Running` is only entered by background launches; foreground runs go
/// straight from `NotStarted` to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Killed,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Succeeded
                | ProcessState::Failed
                | ProcessState::TimedOut
                | ProcessState::Killed
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::NotStarted => "not-started",
            ProcessState::Running => "running",
            ProcessState::Succeeded => "succeeded",
            ProcessState::Failed => "failed",
            ProcessState::TimedOut => "timed-out",
            ProcessState::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// How [`super::ProcessHandle::execute`] runs the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Block until done and return captured stdout.
    #[default]
    Sync,
    /// Detach and return the worker pid.
    Background,
    /// Stream output straight to our own stdio.
    Passthrough,
    /// Block until done and send each output line to the log.
    LogOnly,
    /// Block until done and discard output.
    NoReturn,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" => Ok(ExecutionMode::Sync),
            "background" => Ok(ExecutionMode::Background),
            "passthrough" => Ok(ExecutionMode::Passthrough),
            "log-only" | "log_only" => Ok(ExecutionMode::LogOnly),
            "no-return" | "no_return" => Ok(ExecutionMode::NoReturn),
            other => Err(format!(
                "invalid execution mode: {other} (expected sync, background, passthrough, log-only or no-return)"
            )),
        }
    }
}

/// What [`super::ProcessHandle::execute`] hands back, per mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Output(Vec<String>),
    Background { pid: u32 },
    Passthrough { success: bool },
    Logged,
    Completed,
}
