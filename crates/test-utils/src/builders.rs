#![allow(dead_code)]

use std::path::Path;

use procpool::config::{ConfigFile, RawConfigFile};
use procpool::errors::Result;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(cmd: &str) -> Self {
        let mut config = RawConfigFile::default();
        config.command.cmd = cmd.to_string();
        Self { config }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.config.command.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.config.command.timeout = seconds;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .command
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_resolve(mut self) -> Self {
        self.config.command.resolve = false;
        self
    }

    pub fn with_run_dir(mut self, dir: &Path) -> Self {
        self.config.context.run_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_pool<V: Into<toml::Value>>(mut self, key: &str, values: Vec<V>) -> Self {
        self.config.pool.key = Some(key.to_string());
        self.config.pool.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_workers(mut self, min: usize, max: usize) -> Self {
        self.config.pool.min_workers = min;
        self.config.pool.max_workers = max;
        self
    }

    pub fn with_sleeps(mut self, cycle_ms: u64, wait_ms: u64) -> Self {
        self.config.pool.cycle_sleep_ms = cycle_ms;
        self.config.pool.wait_sleep_ms = wait_ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}
