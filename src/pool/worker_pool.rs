// src/pool/worker_pool.rs

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::ProcessConfig;
use crate::errors::{ProcpoolError, Result};
use crate::exec::ProcessExecutor;
use crate::os::{normalize_invocation, ProcessTable, Signal};
use crate::pool::values::{scalar_to_string, validate_key, variable_name};
use crate::process::{ExecutionMode, ExecutionResult, ProcessHandle};

pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_CYCLE_SLEEP: Duration = Duration::from_millis(100);
pub const DEFAULT_WAIT_SLEEP: Duration = Duration::from_millis(250);

/// Concurrency and pacing for a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Below this many active workers, launches happen back to back.
    pub min_workers: usize,
    pub max_workers: usize,
    /// Pause between launch cycles.
    pub cycle_sleep: Duration,
    /// Pause between liveness polls while waiting for completion.
    pub wait_sleep: Duration,
    pub wait_for_finish: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_workers: 0,
            max_workers: DEFAULT_MAX_WORKERS,
            cycle_sleep: DEFAULT_CYCLE_SLEEP,
            wait_sleep: DEFAULT_WAIT_SLEEP,
            wait_for_finish: true,
        }
    }
}

impl PoolSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(ProcpoolError::ConfigError(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(ProcpoolError::ConfigError(format!(
                "min_workers ({}) exceeds max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Draining,
    WaitingForCompletion,
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolState::Idle => "idle",
            PoolState::Draining => "draining",
            PoolState::WaitingForCompletion => "waiting-for-completion",
            PoolState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Launches one background worker per queued value, at most `max_workers`
/// at a time, and reaps them by polling the process table.
///
/// Workers are tracked by pid. A pid whose process-table entry no longer
/// matches the worker's script is treated as finished, since the OS may
/// have recycled it.
pub struct WorkerPool {
    executor: Arc<ProcessExecutor>,
    table: Arc<dyn ProcessTable>,
    template: ProcessConfig,
    settings: PoolSettings,
    key: Option<String>,
    queue: VecDeque<String>,
    active: BTreeMap<u32, ProcessHandle>,
    finished: Vec<ProcessHandle>,
    state: PoolState,
    workers_executed: usize,
    failed_launches: usize,
    peak_workers: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.state)
            .field("key", &self.key)
            .field("queued", &self.queue.len())
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(
        executor: Arc<ProcessExecutor>,
        table: Arc<dyn ProcessTable>,
        template: ProcessConfig,
    ) -> Self {
        Self {
            executor,
            table,
            template,
            settings: PoolSettings::default(),
            key: None,
            queue: VecDeque::new(),
            active: BTreeMap::new(),
            finished: Vec::new(),
            state: PoolState::Idle,
            workers_executed: 0,
            failed_launches: 0,
            peak_workers: 0,
        }
    }

    pub fn with_settings(mut self, settings: PoolSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Set the substitution key and the values to queue, replacing any
    /// previous queue.
    ///
    /// Nothing changes unless both the key and every value are valid.
    pub fn set_key_and_values(&mut self, key: &str, values: &[toml::Value]) -> Result<()> {
        validate_key(key)?;
        let queue = values
            .iter()
            .map(scalar_to_string)
            .collect::<Result<VecDeque<_>>>()?;

        debug!(key, queued = queue.len(), "worker pool values set");
        self.key = Some(key.to_string());
        self.queue = queue;
        Ok(())
    }

    /// Drain the queue, then optionally wait for every worker to finish.
    ///
    /// Individual launch failures are logged and skipped. Only a template
    /// without a command aborts the run.
    pub async fn start(&mut self) -> Result<()> {
        if self.template.command().trim().is_empty() {
            return Err(ProcpoolError::NoCommand);
        }

        self.state = PoolState::Draining;
        info!(
            queued = self.queue.len(),
            max_workers = self.settings.max_workers,
            min_workers = self.settings.min_workers,
            "worker pool draining"
        );

        loop {
            let active = self.current().await;
            let Some(value) = self.queue.pop_front() else {
                info!(launched = self.workers_executed, "worker queue drained");
                break;
            };

            if active < self.settings.max_workers {
                self.launch(value).await;
                if self.active.len() < self.settings.min_workers || self.queue.is_empty() {
                    continue;
                }
            } else {
                self.queue.push_front(value);
                warn!(
                    active,
                    max_workers = self.settings.max_workers,
                    "worker ceiling reached; throttling"
                );
            }

            tokio::time::sleep(self.settings.cycle_sleep).await;
        }

        if self.settings.wait_for_finish {
            self.state = PoolState::WaitingForCompletion;
            loop {
                let active = self.current().await;
                if active == 0 {
                    break;
                }
                debug!(active, "waiting for workers to finish");
                tokio::time::sleep(self.settings.wait_sleep).await;
            }
        }

        self.state = PoolState::Stopped;
        info!(
            executed = self.workers_executed,
            failed_launches = self.failed_launches,
            still_active = self.active.len(),
            "worker pool finished"
        );
        Ok(())
    }

    async fn launch(&mut self, value: String) {
        let mut config = self.template.clone();
        if let Some(key) = &self.key {
            config.bind_variable(variable_name(key), value.clone());
        }

        let mut handle = ProcessHandle::new(Arc::clone(&self.executor), config);
        match handle.execute(ExecutionMode::Background).await {
            Ok(ExecutionResult::Background { pid }) => {
                self.workers_executed += 1;
                self.active.insert(pid, handle);
                self.peak_workers = self.peak_workers.max(self.active.len());
                info!(
                    pid,
                    worker = self.workers_executed,
                    value = %value,
                    active = self.active.len(),
                    "worker started"
                );
            }
            Ok(other) => {
                self.failed_launches += 1;
                warn!(value = %value, result = ?other, "unexpected result from background launch");
            }
            Err(err) => {
                self.failed_launches += 1;
                warn!(value = %value, error = %err, "worker launch failed");
            }
        }
    }

    /// Drop workers that are no longer running and return how many were
    /// pruned.
    ///
    /// A worker is alive when its pid is in the process table, is not a
    /// zombie, and its invocation matches the script it was launched with.
    /// Lookup errors keep the worker; it is checked again next time.
    pub async fn clean_workers(&mut self) -> usize {
        let pids: Vec<u32> = self.active.keys().copied().collect();
        let mut pruned = 0;

        for pid in pids {
            let alive = match self.table.lookup(pid).await {
                Ok(Some(entry)) if !entry.is_zombie() => {
                    let same = self
                        .active
                        .get(&pid)
                        .is_some_and(|handle| same_invocation(&entry.args, handle));
                    if !same {
                        debug!(pid, args = %entry.args, "pid now belongs to another process");
                    }
                    same
                }
                Ok(_) => false,
                Err(err) => {
                    warn!(pid, error = %err, "process table lookup failed");
                    true
                }
            };

            if alive {
                continue;
            }

            if let Some(mut handle) = self.active.remove(&pid) {
                let state = handle.mark_terminated();
                info!(
                    pid,
                    state = %state,
                    exit_code = ?handle.exit_code(),
                    "worker finished"
                );
                self.finished.push(handle);
                pruned += 1;
            }
        }

        pruned
    }

    /// Number of live workers. Always prunes first.
    pub async fn current(&mut self) -> usize {
        self.clean_workers().await;
        self.active.len()
    }

    /// Send SIGTERM to every tracked worker.
    pub fn stop(&mut self) -> usize {
        self.stop_with(Signal::TERM)
    }

    /// Send `signal` to every tracked worker and return how many were
    /// reached.
    ///
    /// Does not wait for exit and keeps the workers tracked; call
    /// [`WorkerPool::current`] to observe them going away.
    pub fn stop_with(&mut self, signal: Signal) -> usize {
        self.state = PoolState::Stopped;
        let mut delivered = 0;
        for (pid, handle) in self.active.iter_mut() {
            match handle.kill(signal.number()) {
                Ok(true) => delivered += 1,
                Ok(false) => debug!(pid, "worker already gone"),
                Err(err) => warn!(pid, error = %err, "failed to signal worker"),
            }
        }
        info!(signal = %signal, delivered, tracked = self.active.len(), "worker pool stop requested");
        delivered
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active_pids(&self) -> Vec<u32> {
        self.active.keys().copied().collect()
    }

    pub fn worker(&self, pid: u32) -> Option<&ProcessHandle> {
        self.active.get(&pid)
    }

    /// Total number of workers successfully launched.
    pub fn workers_executed(&self) -> usize {
        self.workers_executed
    }

    pub fn failed_launches(&self) -> usize {
        self.failed_launches
    }

    /// Highest number of workers tracked at once.
    pub fn peak_workers(&self) -> usize {
        self.peak_workers
    }

    /// Workers that have been pruned, in the order they were observed gone.
    pub fn finished(&self) -> &[ProcessHandle] {
        &self.finished
    }
}

/// A freshly forked worker still shows the launcher's invocation until it
/// execs `nohup`, so either form identifies it.
fn same_invocation(args: &str, handle: &ProcessHandle) -> bool {
    let Some(script) = handle.launched_script() else {
        return true;
    };
    let seen = normalize_invocation(args);
    seen == normalize_invocation(script)
        || handle
            .launcher()
            .is_some_and(|launcher| seen == normalize_invocation(launcher))
}
