// src/config/build.rs

//! Turning a validated [`ConfigFile`] into runtime objects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{IoNice, ProcessConfig, Sudo};
use crate::config::model::ConfigFile;
use crate::config::validate::parse_channel;
use crate::context::{random_instance_id, ExecutionContext, RUN_DIR_ENV};
use crate::errors::Result;
use crate::exec::{CommandInstaller, CommandResolver, ProcessExecutor};
use crate::os::ProcessTable;
use crate::pool::{PoolSettings, WorkerPool};

/// Default `ionice` level when only a class is given.
const DEFAULT_IONICE_LEVEL: u8 = 4;

impl ConfigFile {
    pub fn execution_context(&self) -> ExecutionContext {
        let root = self
            .context
            .run_dir
            .clone()
            .or_else(|| std::env::var_os(RUN_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| std::env::temp_dir().join("procpool"));
        let instance = self
            .context
            .instance
            .clone()
            .unwrap_or_else(random_instance_id);

        let ctx = ExecutionContext::new(root, instance);
        match &self.context.command_log {
            Some(path) => ctx.with_command_log(path),
            None => ctx,
        }
    }

    pub fn process_config(&self) -> Result<ProcessConfig> {
        let cmd = &self.command;
        let mut config = ProcessConfig::new(cmd.cmd.trim());

        config
            .add_arguments(cmd.args.iter().cloned())
            .set_timeout(cmd.timeout)
            .set_wait(cmd.wait_ms)
            .set_nice(cmd.nice)
            .set_resolve_command(cmd.resolve)
            .set_accepted_exit_codes(cmd.accepted_exit_codes.iter().copied());

        for raw in &cmd.raw_args {
            config.add_raw_argument(raw.clone());
        }
        for (name, value) in &cmd.vars {
            config.set_variable(name.clone(), value.clone());
        }
        for (name, value) in &cmd.env {
            config.set_environment_variable(name.clone(), value.clone());
        }
        if let Some(dir) = &cmd.working_dir {
            config.set_working_directory(dir.clone());
        }
        if let Some(class) = cmd.ionice_class {
            config.set_ionice(Some(IoNice {
                class,
                level: cmd.ionice_level.unwrap_or(DEFAULT_IONICE_LEVEL),
            }));
        }
        if let Some(user) = &cmd.sudo {
            let sudo = match user.trim() {
                "root" => Sudo::Root,
                other => Sudo::User(other.to_string()),
            };
            config.set_sudo(Some(sudo));
        }
        if let Some(term) = &cmd.terminal {
            config.set_terminal(term.clone());
        }
        for (channel, target) in &cmd.redirects.output {
            config.add_output_redirect(parse_channel(channel)?, target.clone());
        }
        for (channel, target) in &cmd.redirects.input {
            config.add_input_redirect(parse_channel(channel)?, target.clone());
        }

        Ok(config)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            min_workers: self.pool.min_workers,
            max_workers: self.pool.max_workers,
            cycle_sleep: Duration::from_millis(self.pool.cycle_sleep_ms),
            wait_sleep: Duration::from_millis(self.pool.wait_sleep_ms),
            wait_for_finish: self.pool.wait_for_finish,
        }
    }

    pub fn resolver(&self) -> CommandResolver {
        if self.install.packages.is_empty() {
            return CommandResolver::new();
        }
        let packages = self.install.packages.clone();
        let installer = match &self.install.command {
            Some(program) => CommandInstaller::new(program.clone(), packages),
            None => CommandInstaller::apt(packages),
        };
        CommandResolver::with_installer(Arc::new(installer), self.install.auto)
    }

    /// Executor wired to the real system, using this config's context and
    /// installer settings.
    pub fn executor(&self) -> Result<ProcessExecutor> {
        let ctx = Arc::new(self.execution_context());
        Ok(ProcessExecutor::system(ctx)?.with_resolver(self.resolver()))
    }

    /// Pool with this config's command as template and its queue loaded.
    pub fn worker_pool(
        &self,
        executor: Arc<ProcessExecutor>,
        table: Arc<dyn ProcessTable>,
    ) -> Result<WorkerPool> {
        let mut pool = WorkerPool::new(executor, table, self.process_config()?)
            .with_settings(self.pool_settings())?;
        if let (Some(key), Some(values)) = (&self.pool.key, &self.pool.values) {
            pool.set_key_and_values(key, values)?;
        }
        Ok(pool)
    }
}
