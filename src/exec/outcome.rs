// src/exec/outcome.rs

//! Results reported by the executor.

use std::time::{Duration, Instant};

/// Result of a foreground run.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Shell pid read back from the run file, when registration was requested.
    pub pid: Option<u32>,
    pub started_at: Instant,
    pub stopped_at: Instant,
}

impl ExecutionOutcome {
    pub fn elapsed(&self) -> Duration {
        self.stopped_at.saturating_duration_since(self.started_at)
    }
}

/// Result of a detached launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundLaunch {
    /// Pid of the detached worker, read from its run file.
    pub pid: u32,
    /// Process group the worker runs in (the launcher shell's pid).
    pub process_group: Option<u32>,
    pub started_at: Instant,
}
