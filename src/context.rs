// src/context.rs

//! Process-wide execution context.
//!
//! Holds the run-directory root and the identifiers that namespace it. It is
//! built once at startup and shared by `Arc`; nothing in the crate keeps
//! this state in statics.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Environment variable overriding the default run-directory root.
pub const RUN_DIR_ENV: &str = "PROCPOOL_RUN_DIR";

#[derive(Debug)]
pub struct ExecutionContext {
    run_root: PathBuf,
    host_pid: u32,
    instance_id: String,
    command_log: Option<PathBuf>,
    sequence: AtomicU64,
}

impl ExecutionContext {
    pub fn new(run_root: impl Into<PathBuf>, instance_id: impl Into<String>) -> Self {
        Self {
            run_root: run_root.into(),
            host_pid: std::process::id(),
            instance_id: instance_id.into(),
            command_log: None,
            sequence: AtomicU64::new(0),
        }
    }

    /// Context rooted at `$PROCPOOL_RUN_DIR` (or `<tmp>/procpool`) with a
    /// random instance id.
    pub fn from_env() -> Self {
        let root = std::env::var_os(RUN_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("procpool"));
        Self::new(root, random_instance_id())
    }

    /// Append every launched command line to `path`.
    pub fn with_command_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.command_log = Some(path.into());
        self
    }

    pub fn host_pid(&self) -> u32 {
        self.host_pid
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn command_log(&self) -> Option<&Path> {
        self.command_log.as_deref()
    }

    /// Directory holding this invocation's run files.
    ///
    /// Scoped by host pid and instance id so unrelated invocations never
    /// share a directory.
    pub fn run_dir(&self) -> PathBuf {
        self.run_root
            .join(format!("{}-{}", self.host_pid, self.instance_id))
    }

    /// Next unique execution identifier for a command.
    pub fn next_identifier(&self, command: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", self.host_pid, slug(command), seq)
    }
}

pub fn random_instance_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

/// Filesystem-safe slug derived from a command's basename.
fn slug(command: &str) -> String {
    let base = command.rsplit('/').next().unwrap_or(command);
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= 32 {
            break;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "cmd".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_uses_basename() {
        assert_eq!(slug("/usr/bin/python3.12"), "python3-12");
        assert_eq!(slug("echo"), "echo");
        assert_eq!(slug("///"), "cmd");
    }

    #[test]
    fn run_dir_is_namespaced_by_pid_and_instance() {
        let ctx = ExecutionContext::new("/tmp/pp", "abc");
        let expected = PathBuf::from(format!("/tmp/pp/{}-abc", std::process::id()));
        assert_eq!(ctx.run_dir(), expected);
    }

    #[test]
    fn identifiers_are_unique() {
        let ctx = ExecutionContext::new("/tmp/pp", "abc");
        let a = ctx.next_identifier("sleep");
        let b = ctx.next_identifier("sleep");
        assert_ne!(a, b);
        assert!(a.contains("sleep"));
    }
}
