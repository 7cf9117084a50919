// src/runfile/mod.rs

//! On-disk PID bookkeeping for background launches.
//!
//! A detached worker is started by a wrapper shell, so the pid the executor
//! sees is not the worker's pid. The wrapper writes the real pid into a run
//! file; [`RunFileRegistry::await_and_consume`] waits for it, reads it and
//! deletes it. Each launch also gets a log file (combined output) and an
//! exit file (the worker's exit status, written when it finishes).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, trace};

use crate::context::ExecutionContext;
use crate::errors::{ProcpoolError, Result};
use crate::fs::FileSystem;

/// Paths belonging to one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFileSet {
    pub identifier: String,
    pub pid: PathBuf,
    pub log: PathBuf,
    pub exit: PathBuf,
}

/// Bounded polling used while waiting for a run file to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFilePolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RunFilePolicy {
    fn default() -> Self {
        Self {
            attempts: 40,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunFileRegistry {
    fs: Arc<dyn FileSystem>,
    ctx: Arc<ExecutionContext>,
    dir: PathBuf,
    policy: RunFilePolicy,
}

impl RunFileRegistry {
    /// Create the registry and its run directory (idempotent).
    pub fn new(fs: Arc<dyn FileSystem>, ctx: Arc<ExecutionContext>) -> Result<Self> {
        let dir = ctx.run_dir();
        fs.create_dir_all(&dir)?;
        fs.ensure_writable(&dir)?;
        debug!(dir = %dir.display(), "run directory ready");
        Ok(Self {
            fs,
            ctx,
            dir,
            policy: RunFilePolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: RunFilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Deterministic run-file path for `identifier`.
    pub fn path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{identifier}.pid"))
    }

    /// Allocate a fresh identifier and its file set for `command`.
    pub fn allocate(&self, command: &str) -> RunFileSet {
        let identifier = self.ctx.next_identifier(command);
        RunFileSet {
            pid: self.path(&identifier),
            log: self.dir.join(format!("{identifier}.log")),
            exit: self.dir.join(format!("{identifier}.exit")),
            identifier,
        }
    }

    /// Wait for the run file at `path`, read the pid, delete the file.
    ///
    /// A second call for the same path fails with
    /// [`ProcpoolError::RunFileMissing`] because the file is gone.
    pub async fn await_and_consume(&self, path: &Path) -> Result<u32> {
        let mut delay = self.policy.initial_delay;
        let mut last_content: Option<String> = None;

        for attempt in 0..self.policy.attempts.max(1) {
            if self.fs.exists(path) {
                let content = self.fs.read_to_string(path)?;
                let trimmed = content.trim();

                // The wrapper may not have finished writing yet.
                if !trimmed.is_empty() {
                    let pid = parse_pid(path, trimmed)?;
                    self.fs.remove_file(path)?;
                    debug!(path = %path.display(), pid, attempt, "consumed run file");
                    return Ok(pid);
                }
                last_content = Some(content);
            }

            trace!(path = %path.display(), attempt, ?delay, "run file not ready");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.policy.max_delay);
        }

        match last_content {
            Some(content) => Err(ProcpoolError::RunFileCorrupt {
                path: path.to_path_buf(),
                content,
            }),
            None => Err(ProcpoolError::RunFileMissing(path.to_path_buf())),
        }
    }

    /// Read and delete an exit file, if the worker has written one.
    pub fn read_exit_code(&self, path: &Path) -> Result<Option<i32>> {
        if !self.fs.exists(path) {
            return Ok(None);
        }
        let content = self.fs.read_to_string(path)?;
        let code = content
            .trim()
            .parse::<i32>()
            .with_context(|| format!("parsing exit code in {:?}", path))?;
        self.fs.remove_file(path)?;
        Ok(Some(code))
    }

    /// Lines of a worker's log file; empty if it was never written.
    pub fn read_log(&self, path: &Path) -> Result<Vec<String>> {
        if !self.fs.exists(path) {
            return Ok(Vec::new());
        }
        let content = self.fs.read_to_string(path)?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

fn parse_pid(path: &Path, content: &str) -> Result<u32> {
    match content.parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(ProcpoolError::RunFileCorrupt {
            path: path.to_path_buf(),
            content: content.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn registry(fs: &MockFileSystem) -> RunFileRegistry {
        let ctx = Arc::new(ExecutionContext::new("/run/procpool", "test"));
        RunFileRegistry::new(Arc::new(fs.clone()), ctx)
            .unwrap()
            .with_policy(RunFilePolicy {
                attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
    }

    #[test]
    fn creates_run_dir() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        assert!(fs.is_dir(reg.dir()));
    }

    #[test]
    fn allocate_uses_one_identifier_for_all_files() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let set = reg.allocate("/bin/sleep");
        assert_eq!(set.pid, reg.path(&set.identifier));
        assert!(set.log.to_string_lossy().ends_with(&format!("{}.log", set.identifier)));
        assert!(set.exit.to_string_lossy().ends_with(&format!("{}.exit", set.identifier)));
        assert_ne!(reg.allocate("/bin/sleep"), set);
    }

    #[tokio::test]
    async fn consumes_pid_once() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let path = reg.path("job");
        fs.add_file(&path, "4242\n");

        assert_eq!(reg.await_and_consume(&path).await.unwrap(), 4242);
        assert!(!fs.exists(&path));

        let second = reg.await_and_consume(&path).await;
        assert!(matches!(second, Err(ProcpoolError::RunFileMissing(p)) if p == path));
    }

    #[tokio::test]
    async fn corrupt_content_is_reported() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        for content in ["abc", "0", "-5"] {
            let path = reg.path(content);
            fs.add_file(&path, content);
            let err = reg.await_and_consume(&path).await.unwrap_err();
            assert!(matches!(err, ProcpoolError::RunFileCorrupt { .. }), "{content}");
        }
    }

    #[tokio::test]
    async fn empty_file_that_never_fills_is_corrupt() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let path = reg.path("empty");
        fs.add_file(&path, "");
        let err = reg.await_and_consume(&path).await.unwrap_err();
        assert!(matches!(err, ProcpoolError::RunFileCorrupt { .. }));
    }

    #[test]
    fn exit_code_is_consumed() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let path = reg.dir().join("w.exit");
        assert_eq!(reg.read_exit_code(&path).unwrap(), None);
        fs.add_file(&path, "124\n");
        assert_eq!(reg.read_exit_code(&path).unwrap(), Some(124));
        assert!(!fs.exists(&path));
    }

    #[test]
    fn log_lines() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let path = reg.dir().join("w.log");
        assert!(reg.read_log(&path).unwrap().is_empty());
        fs.add_file(&path, "one\ntwo\n");
        assert_eq!(reg.read_log(&path).unwrap(), vec!["one", "two"]);
    }
}
