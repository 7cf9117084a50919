// src/process/handle.rs

//! `ProcessHandle`: one command's configuration plus its runtime state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::{render, ProcessConfig, RenderMode, RenderedCommand};
use crate::errors::{ProbableCause, ProcpoolError, Result};
use crate::exec::{check_exit, ExecutionOutcome, ProcessExecutor};
use crate::os::Signal;
use crate::process::state::{ExecutionMode, ExecutionResult, ProcessState};
use crate::runfile::RunFileSet;

#[derive(Debug)]
pub struct ProcessHandle {
    executor: Arc<ProcessExecutor>,
    config: ProcessConfig,
    state: ProcessState,
    pid: Option<u32>,
    process_group: Option<u32>,
    exit_code: Option<i32>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    cached: Option<(RenderMode, RenderedCommand)>,
    run_files: Option<RunFileSet>,
    launched_script: Option<String>,
    launcher: Option<String>,
    last_signal: Option<i32>,
}

impl ProcessHandle {
    pub fn new(executor: Arc<ProcessExecutor>, config: ProcessConfig) -> Self {
        Self {
            executor,
            config,
            state: ProcessState::NotStarted,
            pid: None,
            process_group: None,
            exit_code: None,
            started_at: None,
            stopped_at: None,
            cached: None,
            run_files: None,
            launched_script: None,
            launcher: None,
            last_signal: None,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Mutable access to the config. Drops the cached command line.
    pub fn config_mut(&mut self) -> &mut ProcessConfig {
        self.cached = None;
        &mut self.config
    }

    /// The rendered line for `mode`, memoized until the config changes.
    pub fn command_line(&mut self, mode: RenderMode) -> Result<String> {
        Ok(self.rendered(mode)?.line)
    }

    fn rendered(&mut self, mode: RenderMode) -> Result<RenderedCommand> {
        if let Some((cached_mode, rendered)) = &self.cached {
            if *cached_mode == mode {
                return Ok(rendered.clone());
            }
        }

        let needs_files = match mode {
            RenderMode::Background => true,
            RenderMode::Foreground => self.config.register_run_file(),
        };
        if needs_files && self.run_files.is_none() {
            self.run_files = Some(self.executor.registry().allocate(self.config.raw_command()));
        }

        let rendered = render(&self.config, mode, self.run_files.as_ref())?;
        self.cached = Some((mode, rendered.clone()));
        Ok(rendered)
    }

    /// Run the command in the given mode.
    ///
    /// Foreground modes apply the accepted-exit-code policy and fail with
    /// [`ProcpoolError::ProcessFailed`]; the handle's state is updated first.
    pub async fn execute(&mut self, mode: ExecutionMode) -> Result<ExecutionResult> {
        if self.state == ProcessState::Running {
            return Err(ProcpoolError::StillRunning);
        }
        if self.state != ProcessState::NotStarted {
            self.reset();
        }

        if self.config.resolve_command() {
            let resolved = self
                .executor
                .resolver()
                .resolve(self.config.raw_command(), self.config.working_directory())
                .await?;
            self.config_mut().set_resolved_command(resolved);
        }

        match mode {
            ExecutionMode::Background => self.execute_background().await,
            ExecutionMode::Passthrough => {
                let rendered = self.rendered(RenderMode::Foreground)?;
                self.started_at = Some(Instant::now());
                let executor = Arc::clone(&self.executor);
                let outcome = match executor.run_passthrough(&self.config, &rendered).await {
                    Ok(outcome) => outcome,
                    Err(err) => return Err(self.fail_launch(err)),
                };
                self.finish(&outcome);
                Ok(ExecutionResult::Passthrough {
                    success: self.config.accepts(outcome.exit_code),
                })
            }
            ExecutionMode::Sync | ExecutionMode::LogOnly | ExecutionMode::NoReturn => {
                let rendered = self.rendered(RenderMode::Foreground)?;
                self.started_at = Some(Instant::now());
                let executor = Arc::clone(&self.executor);
                let outcome = match executor
                    .run_sync(&self.config, &rendered, self.run_files.as_ref())
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(err) => return Err(self.fail_launch(err)),
                };
                self.finish(&outcome);

                if mode == ExecutionMode::LogOnly {
                    for line in &outcome.stdout {
                        info!(command = %self.config.command(), "{line}");
                    }
                    for line in &outcome.stderr {
                        warn!(command = %self.config.command(), "{line}");
                    }
                }

                check_exit(&self.config, &rendered, &outcome)?;

                Ok(match mode {
                    ExecutionMode::LogOnly => ExecutionResult::Logged,
                    ExecutionMode::NoReturn => ExecutionResult::Completed,
                    _ => ExecutionResult::Output(outcome.stdout),
                })
            }
        }
    }

    async fn execute_background(&mut self) -> Result<ExecutionResult> {
        let rendered = self.rendered(RenderMode::Background)?;
        let Some(files) = self.run_files.clone() else {
            return Err(ProcpoolError::ConfigError(
                "run files missing for background launch".to_string(),
            ));
        };

        self.started_at = Some(Instant::now());
        let executor = Arc::clone(&self.executor);
        let launch = match executor.run_background(&self.config, &rendered, &files).await {
            Ok(launch) => launch,
            Err(err) => return Err(self.fail_launch(err)),
        };

        self.started_at = Some(launch.started_at);
        self.pid = Some(launch.pid);
        self.process_group = launch.process_group;
        self.launched_script = Some(rendered.script);
        self.launcher = Some(rendered.launcher);
        self.state = ProcessState::Running;

        Ok(ExecutionResult::Background { pid: launch.pid })
    }

    fn fail_launch(&mut self, err: ProcpoolError) -> ProcpoolError {
        self.stopped_at = Some(Instant::now());
        self.state = ProcessState::Failed;
        err
    }

    fn finish(&mut self, outcome: &ExecutionOutcome) {
        self.started_at = Some(outcome.started_at);
        self.stopped_at = Some(outcome.stopped_at);
        self.exit_code = Some(outcome.exit_code);
        if outcome.pid.is_some() {
            self.pid = outcome.pid;
        }
        self.state = self.classify(outcome.exit_code);
    }

    fn classify(&self, exit_code: i32) -> ProcessState {
        if self.config.accepts(exit_code) {
            ProcessState::Succeeded
        } else if ProbableCause::from_exit_code(exit_code) == ProbableCause::Timeout {
            ProcessState::TimedOut
        } else {
            ProcessState::Failed
        }
    }

    fn reset(&mut self) {
        self.state = ProcessState::NotStarted;
        self.pid = None;
        self.process_group = None;
        self.exit_code = None;
        self.started_at = None;
        self.stopped_at = None;
        self.cached = None;
        self.run_files = None;
        self.launched_script = None;
        self.launcher = None;
        self.last_signal = None;
    }

    /// Record that a background process is gone and settle its final state.
    ///
    /// Reads the exit file the worker wrapper writes on completion. Without
    /// one the worker was killed if we signalled it, and failed otherwise.
    pub fn mark_terminated(&mut self) -> ProcessState {
        if self.state != ProcessState::Running {
            return self.state;
        }
        self.stopped_at = Some(Instant::now());

        let code = match &self.run_files {
            Some(files) => match self.executor.registry().read_exit_code(&files.exit) {
                Ok(code) => code,
                Err(err) => {
                    warn!(pid = ?self.pid, error = %err, "could not read exit file");
                    None
                }
            },
            None => None,
        };

        self.state = match code {
            Some(code) => {
                self.exit_code = Some(code);
                self.classify(code)
            }
            None => match self.last_signal {
                Some(sig) => {
                    self.exit_code = Some(128 + sig);
                    ProcessState::Killed
                }
                // Died before the wrapper could record anything.
                None => ProcessState::Failed,
            },
        };
        debug!(pid = ?self.pid, state = %self.state, exit_code = ?self.exit_code, "process terminated");
        self.state
    }

    /// Send `signal` to a running background process.
    ///
    /// The signal number is validated first. Returns `Ok(false)` without
    /// doing anything if the process was never started or has already
    /// terminated. Does not wait for the process to exit.
    pub fn kill(&mut self, signal: i32) -> Result<bool> {
        Signal::new(signal)?;

        if self.state != ProcessState::Running {
            return Ok(false);
        }
        let Some(pid) = self.pid else {
            return Ok(false);
        };

        let kill = self.executor.kill();
        let delivered = match self.process_group {
            Some(pgid) => kill.kill_group(pgid, signal)? || kill.kill(pid, signal)?,
            None => kill.kill(pid, signal)?,
        };

        self.last_signal = Some(signal);
        info!(pid, signal, delivered, "signal sent to process");
        Ok(delivered)
    }

    /// Whether the process has finished and its result was observed.
    pub fn has_executed(&self) -> bool {
        self.exit_code.is_some() || self.state.is_terminal()
    }

    /// Whether a background process was launched and not yet reaped.
    pub fn is_executing(&self) -> bool {
        self.pid.is_some() && self.state == ProcessState::Running
    }

    /// Time between start and stop (or now, unless `require_stop`).
    pub fn execution_time(&self, require_stop: bool) -> Result<Duration> {
        let Some(started) = self.started_at else {
            return Err(ProcpoolError::NotStarted);
        };
        match self.stopped_at {
            Some(stopped) => Ok(stopped.saturating_duration_since(started)),
            None if require_stop => Err(ProcpoolError::StillRunning),
            None => Ok(started.elapsed()),
        }
    }

    /// Combined output of a background process, read from its log file.
    pub fn output(&self) -> Result<Vec<String>> {
        match &self.run_files {
            Some(files) => self.executor.registry().read_log(&files.log),
            None => Ok(Vec::new()),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn process_group(&self) -> Option<u32> {
        self.process_group
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.stopped_at
    }

    pub fn run_files(&self) -> Option<&RunFileSet> {
        self.run_files.as_ref()
    }

    /// Script the detached worker runs; what its process-table entry shows.
    pub fn launched_script(&self) -> Option<&str> {
        self.launched_script.as_deref()
    }

    /// Invocation of the launcher shell, which the worker keeps until it
    /// detaches.
    pub fn launcher(&self) -> Option<&str> {
        self.launcher.as_deref()
    }
}
