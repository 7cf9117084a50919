// src/command/config.rs

//! `ProcessConfig`: everything needed to render and launch one command.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::shell::quote;

/// Default `timeout(1)` limit applied to every command.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// A positional argument, escaped at render time unless `escape` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub value: String,
    pub escape: bool,
}

/// Privilege elevation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sudo {
    Root,
    User(String),
}

/// `ionice` scheduling class and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoNice {
    pub class: u8,
    pub level: u8,
}

/// Wraps a fully assembled line in some remote-execution syntax.
pub trait RemoteHost: Send + Sync + Debug {
    fn wrap(&self, line: &str) -> String;
}

/// Run the line on another machine over `ssh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshHost {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl SshHost {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
        }
    }
}

impl RemoteHost for SshHost {
    fn wrap(&self, line: &str) -> String {
        let target = match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        };
        let port = match self.port {
            Some(port) => format!(" -p {port}"),
            None => String::new(),
        };
        format!("ssh{port} {} {}", quote(&target), quote(line))
    }
}

/// Builder state for a single command.
///
/// Setters return `&mut Self` so calls can be chained. A `ProcessHandle`
/// drops its cached command line whenever its config is borrowed mutably,
/// so there is no need to track changes here.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    command: String,
    raw_command: String,
    arguments: Vec<Argument>,
    variables: BTreeMap<String, String>,
    environment: BTreeMap<String, String>,
    working_directory: Option<PathBuf>,
    timeout_seconds: u32,
    wait_millis: u32,
    nice: Option<i8>,
    ionice: Option<IoNice>,
    sudo: Option<Sudo>,
    terminal: Option<String>,
    input_redirects: BTreeMap<u8, String>,
    output_redirects: BTreeMap<u8, String>,
    pipe_to: Option<Box<ProcessConfig>>,
    remote: Option<Arc<dyn RemoteHost>>,
    use_run_file: bool,
    register_run_file: bool,
    accepted_exit_codes: BTreeSet<i32>,
    resolve_command: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            raw_command: String::new(),
            arguments: Vec::new(),
            variables: BTreeMap::new(),
            environment: BTreeMap::new(),
            working_directory: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            wait_millis: 0,
            nice: None,
            ionice: None,
            sudo: None,
            terminal: None,
            input_redirects: BTreeMap::new(),
            output_redirects: BTreeMap::new(),
            pipe_to: None,
            remote: None,
            use_run_file: true,
            register_run_file: false,
            accepted_exit_codes: BTreeSet::from([0]),
            resolve_command: true,
        }
    }
}

impl ProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.set_command(command);
        config
    }

    // -- setters ---------------------------------------------------------

    pub fn set_command(&mut self, command: impl Into<String>) -> &mut Self {
        let command = command.into();
        self.raw_command = command.clone();
        self.command = command;
        self
    }

    /// Replace the command with its resolved path, keeping `raw_command`.
    pub fn set_resolved_command(&mut self, path: impl Into<String>) -> &mut Self {
        self.command = path.into();
        self.resolve_command = false;
        self
    }

    pub fn add_argument(&mut self, value: impl Into<String>) -> &mut Self {
        self.arguments.push(Argument {
            value: value.into(),
            escape: true,
        });
        self
    }

    /// Add an argument that is inserted into the line without escaping.
    pub fn add_raw_argument(&mut self, value: impl Into<String>) -> &mut Self {
        self.arguments.push(Argument {
            value: value.into(),
            escape: false,
        });
        self
    }

    pub fn add_arguments<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.add_argument(value);
        }
        self
    }

    pub fn clear_arguments(&mut self) -> &mut Self {
        self.arguments.clear();
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Set a variable on this command and on every command it pipes into.
    pub fn bind_variable(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let (name, value) = (name.into(), value.into());
        let mut stage = Some(&mut *self);
        while let Some(cfg) = stage {
            cfg.variables.insert(name.clone(), value.clone());
            stage = cfg.pipe_to.as_deref_mut();
        }
        self
    }

    pub fn set_environment_variable(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    pub fn set_working_directory(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn clear_working_directory(&mut self) -> &mut Self {
        self.working_directory = None;
        self
    }

    /// `0` disables the `timeout(1)` wrapper.
    pub fn set_timeout(&mut self, seconds: u32) -> &mut Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn set_wait(&mut self, millis: u32) -> &mut Self {
        self.wait_millis = millis;
        self
    }

    pub fn set_nice(&mut self, nice: Option<i8>) -> &mut Self {
        self.nice = nice;
        self
    }

    pub fn set_ionice(&mut self, ionice: Option<IoNice>) -> &mut Self {
        self.ionice = ionice;
        self
    }

    pub fn set_sudo(&mut self, sudo: Option<Sudo>) -> &mut Self {
        self.sudo = sudo;
        self
    }

    /// Force a pseudo-terminal type by exporting `TERM`.
    pub fn set_terminal(&mut self, terminal: impl Into<String>) -> &mut Self {
        self.terminal = Some(terminal.into());
        self
    }

    /// Redirect output channel `channel` to `target` (`>file`, `>>file`, `>&N`).
    ///
    /// The target is validated when the line is rendered.
    pub fn add_output_redirect(&mut self, channel: u8, target: impl Into<String>) -> &mut Self {
        self.output_redirects.insert(channel, target.into());
        self
    }

    /// Redirect input channel `channel` from `target` (`<file`, `<&N`).
    pub fn add_input_redirect(&mut self, channel: u8, target: impl Into<String>) -> &mut Self {
        self.input_redirects.insert(channel, target.into());
        self
    }

    pub fn clear_redirects(&mut self) -> &mut Self {
        self.input_redirects.clear();
        self.output_redirects.clear();
        self
    }

    pub fn set_pipe_to(&mut self, target: Option<ProcessConfig>) -> &mut Self {
        self.pipe_to = target.map(Box::new);
        self
    }

    pub fn pipe_to_mut(&mut self) -> Option<&mut ProcessConfig> {
        self.pipe_to.as_deref_mut()
    }

    pub fn set_remote(&mut self, remote: Option<Arc<dyn RemoteHost>>) -> &mut Self {
        self.remote = remote;
        self
    }

    pub fn set_use_run_file(&mut self, enabled: bool) -> &mut Self {
        self.use_run_file = enabled;
        self
    }

    pub fn set_register_run_file(&mut self, enabled: bool) -> &mut Self {
        self.register_run_file = enabled;
        self
    }

    pub fn set_accepted_exit_codes(&mut self, codes: impl IntoIterator<Item = i32>) -> &mut Self {
        self.accepted_exit_codes = codes.into_iter().collect();
        self
    }

    pub fn add_accepted_exit_code(&mut self, code: i32) -> &mut Self {
        self.accepted_exit_codes.insert(code);
        self
    }

    pub fn set_resolve_command(&mut self, enabled: bool) -> &mut Self {
        self.resolve_command = enabled;
        self
    }

    // -- getters ---------------------------------------------------------

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn raw_command(&self) -> &str {
        &self.raw_command
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Argument values in order, without escaping.
    pub fn argument_values(&self) -> Vec<String> {
        self.arguments.iter().map(|a| a.value.clone()).collect()
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    pub fn wait_millis(&self) -> u32 {
        self.wait_millis
    }

    pub fn nice(&self) -> Option<i8> {
        self.nice
    }

    pub fn ionice(&self) -> Option<IoNice> {
        self.ionice
    }

    pub fn sudo(&self) -> Option<&Sudo> {
        self.sudo.as_ref()
    }

    pub fn terminal(&self) -> Option<&str> {
        self.terminal.as_deref()
    }

    pub fn input_redirects(&self) -> &BTreeMap<u8, String> {
        &self.input_redirects
    }

    pub fn output_redirects(&self) -> &BTreeMap<u8, String> {
        &self.output_redirects
    }

    pub fn pipe_to(&self) -> Option<&ProcessConfig> {
        self.pipe_to.as_deref()
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteHost>> {
        self.remote.as_ref()
    }

    pub fn use_run_file(&self) -> bool {
        self.use_run_file
    }

    pub fn register_run_file(&self) -> bool {
        self.register_run_file
    }

    pub fn accepted_exit_codes(&self) -> &BTreeSet<i32> {
        &self.accepted_exit_codes
    }

    pub fn accepts(&self, exit_code: i32) -> bool {
        self.accepted_exit_codes.contains(&exit_code)
    }

    pub fn resolve_command(&self) -> bool {
        self.resolve_command
    }
}
