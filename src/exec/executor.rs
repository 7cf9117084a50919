// src/exec/executor.rs

//! Runs rendered command lines through `sh -c`.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::{ProcessConfig, RenderedCommand};
use crate::context::ExecutionContext;
use crate::errors::{ProbableCause, ProcessFailure, ProcpoolError, Result};
use crate::exec::outcome::{BackgroundLaunch, ExecutionOutcome};
use crate::exec::resolve::CommandResolver;
use crate::fs::RealFileSystem;
use crate::os::Kill;
use crate::runfile::{RunFileRegistry, RunFileSet};

/// Executes commands and owns the collaborators they need: the run-file
/// registry, signal delivery and command resolution.
#[derive(Debug)]
pub struct ProcessExecutor {
    registry: RunFileRegistry,
    kill: Kill,
    resolver: CommandResolver,
}

impl ProcessExecutor {
    pub fn new(registry: RunFileRegistry, kill: Kill, resolver: CommandResolver) -> Self {
        Self {
            registry,
            kill,
            resolver,
        }
    }

    /// Executor wired to the real filesystem and `kill(2)`.
    pub fn system(ctx: Arc<ExecutionContext>) -> Result<Self> {
        let registry = RunFileRegistry::new(Arc::new(RealFileSystem), ctx)?;
        Ok(Self::new(registry, Kill::system(), CommandResolver::new()))
    }

    pub fn with_resolver(mut self, resolver: CommandResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn registry(&self) -> &RunFileRegistry {
        &self.registry
    }

    pub fn kill(&self) -> &Kill {
        &self.kill
    }

    pub fn resolver(&self) -> &CommandResolver {
        &self.resolver
    }

    /// Run in the foreground, capturing stdout and stderr line by line.
    ///
    /// Does not apply the exit-code policy; see [`check_exit`].
    pub async fn run_sync(
        &self,
        config: &ProcessConfig,
        rendered: &RenderedCommand,
        run_files: Option<&RunFileSet>,
    ) -> Result<ExecutionOutcome> {
        self.log_command(&rendered.line);
        debug!(line = %rendered.line, "running command");

        let mut cmd = shell(config, &rendered.line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started_at = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning shell for '{}'", config.command()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let registered = async {
            match run_files {
                Some(files) if config.register_run_file() => {
                    Some(self.registry.await_and_consume(&files.pid).await)
                }
                _ => None,
            }
        };

        let (status, stdout, stderr, registered) = tokio::join!(
            child.wait(),
            read_lines(stdout),
            read_lines(stderr),
            registered,
        );

        let status = status.with_context(|| format!("waiting for '{}'", config.command()))?;
        let stopped_at = Instant::now();

        let pid = match registered {
            Some(Ok(pid)) => Some(pid),
            Some(Err(err)) => {
                warn!(error = %err, "could not read registered pid");
                None
            }
            None => None,
        };

        let outcome = ExecutionOutcome {
            exit_code: exit_code(status),
            stdout: stdout.context("reading stdout")?,
            stderr: stderr.context("reading stderr")?,
            pid,
            started_at,
            stopped_at,
        };

        debug!(
            exit_code = outcome.exit_code,
            elapsed = ?outcome.elapsed(),
            "command finished"
        );
        Ok(outcome)
    }

    /// Launch detached and return the worker's real pid.
    ///
    /// The launcher shell exits as soon as the worker is backgrounded; a
    /// non-zero exit there is a [`ProcpoolError::Launch`]. The pid itself is
    /// read from the run file.
    pub async fn run_background(
        &self,
        config: &ProcessConfig,
        rendered: &RenderedCommand,
        run_files: &RunFileSet,
    ) -> Result<BackgroundLaunch> {
        self.log_command(&rendered.line);
        debug!(line = %rendered.line, "launching background command");

        let mut cmd = shell(config, &rendered.line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let started_at = Instant::now();
        let child = cmd
            .spawn()
            .with_context(|| format!("spawning launcher for '{}'", config.command()))?;
        let process_group = child.id();

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for launcher of '{}'", config.command()))?;

        if !output.status.success() {
            let mut lines = lines_of(&output.stdout);
            lines.extend(lines_of(&output.stderr));
            return Err(ProcpoolError::Launch {
                line: rendered.line.clone(),
                exit_code: output.status.code(),
                output: lines,
            });
        }

        let pid = self.registry.await_and_consume(&run_files.pid).await?;
        info!(pid, command = %config.command(), "background process started");

        Ok(BackgroundLaunch {
            pid,
            process_group,
            started_at,
        })
    }

    /// Run with the caller's stdio attached; nothing is captured.
    pub async fn run_passthrough(
        &self,
        config: &ProcessConfig,
        rendered: &RenderedCommand,
    ) -> Result<ExecutionOutcome> {
        self.log_command(&rendered.line);
        debug!(line = %rendered.line, "running passthrough command");

        let mut cmd = shell(config, &rendered.line);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let started_at = Instant::now();
        let status = cmd
            .status()
            .await
            .with_context(|| format!("running '{}'", config.command()))?;

        Ok(ExecutionOutcome {
            exit_code: exit_code(status),
            stdout: Vec::new(),
            stderr: Vec::new(),
            pid: None,
            started_at,
            stopped_at: Instant::now(),
        })
    }

    fn log_command(&self, line: &str) {
        let Some(path) = self.registry.context().command_log() else {
            return;
        };
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let entry = format!("{ts} {line}\n");
        if let Err(err) = self.registry.filesystem().append(path, entry.as_bytes()) {
            warn!(path = %path.display(), error = %err, "failed to write command log");
        }
    }
}

/// Apply the accepted-exit-code policy to a finished run.
pub fn check_exit(
    config: &ProcessConfig,
    rendered: &RenderedCommand,
    outcome: &ExecutionOutcome,
) -> Result<()> {
    if config.accepts(outcome.exit_code) {
        return Ok(());
    }

    Err(ProcpoolError::ProcessFailed(Box::new(ProcessFailure {
        command: config.command().to_string(),
        line: rendered.line.clone(),
        arguments: config.argument_values(),
        timeout_seconds: config.timeout_seconds(),
        exit_code: outcome.exit_code,
        stdout: outcome.stdout.clone(),
        stderr: outcome.stderr.clone(),
        probable_cause: ProbableCause::from_exit_code(outcome.exit_code),
        elapsed: outcome.elapsed(),
    })))
}

fn shell(config: &ProcessConfig, line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line).envs(config.environment());
    cmd
}

/// Exit code, or `128 + signal` when the process was killed.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

async fn read_lines<R>(reader: Option<R>) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    if let Some(reader) = reader {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            out.push(line);
        }
    }
    Ok(out)
}

fn lines_of(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
