// src/errors.rs

//! Crate-wide error type and result alias.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcpoolError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No command set; cannot render a command line")]
    NoCommand,

    #[error("Unresolved variable ${0}$ in command line")]
    UnresolvedVariable(String),

    #[error("Invalid redirect on channel {channel}: {reason}")]
    InvalidRedirect { channel: u8, reason: String },

    #[error("Failed to launch background process (exit code {exit_code:?}): {line}")]
    Launch {
        line: String,
        exit_code: Option<i32>,
        output: Vec<String>,
    },

    #[error("Run file {0:?} never appeared")]
    RunFileMissing(PathBuf),

    #[error("Run file {path:?} does not contain a valid pid: {content:?}")]
    RunFileCorrupt { path: PathBuf, content: String },

    #[error(transparent)]
    ProcessFailed(Box<ProcessFailure>),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command '{command}' requires package '{package}' but auto-install is disabled")]
    AutoInstallDenied { command: String, package: String },

    #[error("Invalid worker key {0:?}: expected ':' followed by uppercase letters, digits or dashes")]
    InvalidKey(String),

    #[error("Invalid worker value: {0}")]
    InvalidValue(String),

    #[error("Process is still running")]
    StillRunning,

    #[error("Process has not been started")]
    NotStarted,

    #[error("Unknown signal {0}")]
    UnknownSignal(i32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Most likely reason a process exited with an unaccepted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbableCause {
    Timeout,
    Unknown,
}

impl ProbableCause {
    /// Exit code reported by `timeout(1)` when the limit is hit.
    pub const TIMEOUT_EXIT_CODE: i32 = 124;

    pub fn from_exit_code(code: i32) -> Self {
        if code == Self::TIMEOUT_EXIT_CODE {
            ProbableCause::Timeout
        } else {
            ProbableCause::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbableCause::Timeout => "timeout",
            ProbableCause::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProbableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic payload carried by [`ProcpoolError::ProcessFailed`].
///
/// Holds everything a caller needs to retry, log or escalate without
/// re-deriving the context of the run.
#[derive(Debug, Clone)]
pub struct ProcessFailure {
    pub command: String,
    pub line: String,
    pub arguments: Vec<String>,
    pub timeout_seconds: u32,
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub probable_cause: ProbableCause,
    pub elapsed: Duration,
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "process '{}' failed with exit code {} (probable cause: {}, after {:?})",
            self.command, self.exit_code, self.probable_cause, self.elapsed
        )?;
        if let Some(last) = self.stderr.last().or_else(|| self.stdout.last()) {
            write!(f, ": {last}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProcessFailure {}

impl ProcpoolError {
    /// The failure payload, if this is a [`ProcpoolError::ProcessFailed`].
    pub fn failure(&self) -> Option<&ProcessFailure> {
        match self {
            ProcpoolError::ProcessFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcpoolError>;
