// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::command::DEFAULT_TIMEOUT_SECONDS;
use crate::pool::DEFAULT_MAX_WORKERS;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [context]
/// run_dir = "/tmp/procpool"
///
/// [command]
/// cmd = "curl"
/// args = ["-sf", "https://$HOST$/health"]
/// timeout = 10
///
/// [pool]
/// key = ":HOST"
/// values = ["a.example", "b.example"]
/// max_workers = 4
/// ```
///
/// Every section except `[command]` is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub context: ContextSection,

    #[serde(default)]
    pub command: CommandSection,

    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub install: InstallSection,
}

/// Validated configuration. Built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub context: ContextSection,
    pub command: CommandSection,
    pub pool: PoolSection,
    pub install: InstallSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            context: raw.context,
            command: raw.command,
            pool: raw.pool,
            install: raw.install,
        }
    }

    /// Whether a `[pool]` queue is configured.
    pub fn has_pool(&self) -> bool {
        self.pool.key.is_some()
    }
}

/// `[context]` section: where run files live and what gets logged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextSection {
    /// Root of the run-file directory. Defaults to `$PROCPOOL_RUN_DIR` or
    /// `<tmp>/procpool`.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,

    /// Fixed instance id; random when unset.
    #[serde(default)]
    pub instance: Option<String>,

    /// File that receives every launched command line.
    #[serde(default)]
    pub command_log: Option<PathBuf>,
}

/// `[command]` section: the command every run (or pool worker) executes.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSection {
    #[serde(default)]
    pub cmd: String,

    /// Arguments, shell-quoted when rendered.
    #[serde(default)]
    pub args: Vec<String>,

    /// Arguments inserted verbatim after `args`.
    #[serde(default)]
    pub raw_args: Vec<String>,

    /// Substitution variables referenced as `$NAME$`.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Environment passed to the shell.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// `timeout(1)` limit in seconds; `0` disables it.
    #[serde(default = "default_timeout")]
    pub timeout: u32,

    /// Delay before the command starts, in milliseconds.
    #[serde(default)]
    pub wait_ms: u32,

    #[serde(default)]
    pub nice: Option<i8>,

    #[serde(default)]
    pub ionice_class: Option<u8>,

    #[serde(default)]
    pub ionice_level: Option<u8>,

    /// `"root"` or a user name to run as via `sudo`.
    #[serde(default)]
    pub sudo: Option<String>,

    /// Value exported as `TERM`.
    #[serde(default)]
    pub terminal: Option<String>,

    #[serde(default = "default_accepted_exit_codes")]
    pub accepted_exit_codes: Vec<i32>,

    /// Resolve the command on `PATH` before running it.
    #[serde(default = "default_true")]
    pub resolve: bool,

    #[serde(default)]
    pub redirects: RedirectSection,
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_accepted_exit_codes() -> Vec<i32> {
    vec![0]
}

fn default_true() -> bool {
    true
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            cmd: String::new(),
            args: Vec::new(),
            raw_args: Vec::new(),
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout: default_timeout(),
            wait_ms: 0,
            nice: None,
            ionice_class: None,
            ionice_level: None,
            sudo: None,
            terminal: None,
            accepted_exit_codes: default_accepted_exit_codes(),
            resolve: true,
            redirects: RedirectSection::default(),
        }
    }
}

/// `[command.redirects]`: channel number to target.
///
/// ```toml
/// [command.redirects.output]
/// "1" = ">> out.log"
/// "2" = ">&1"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectSection {
    #[serde(default)]
    pub output: BTreeMap<String, String>,

    #[serde(default)]
    pub input: BTreeMap<String, String>,
}

/// `[pool]` section. `key` and `values` must be given together.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSection {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub values: Option<Vec<toml::Value>>,

    #[serde(default)]
    pub min_workers: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_cycle_sleep_ms")]
    pub cycle_sleep_ms: u64,

    #[serde(default = "default_wait_sleep_ms")]
    pub wait_sleep_ms: u64,

    #[serde(default = "default_true")]
    pub wait_for_finish: bool,
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_cycle_sleep_ms() -> u64 {
    100
}

fn default_wait_sleep_ms() -> u64 {
    250
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            key: None,
            values: None,
            min_workers: 0,
            max_workers: default_max_workers(),
            cycle_sleep_ms: default_cycle_sleep_ms(),
            wait_sleep_ms: default_wait_sleep_ms(),
            wait_for_finish: true,
        }
    }
}

/// `[install]` section: packages to install when a command is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallSection {
    /// Install without asking. When false a missing command with a known
    /// package fails with `AutoInstallDenied`.
    #[serde(default)]
    pub auto: bool,

    /// Installer invocation; the package name is appended. Defaults to
    /// `sudo -n apt-get install -y`.
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Command name to package name.
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
}
