// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `procpool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procpool",
    version,
    about = "Run shell commands in the foreground, detached, or as a bounded worker pool.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCPOOL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a single command.
    Run(RunArgs),
    /// Run the `[pool]` of a config file.
    Pool(PoolArgs),
    /// Send a signal to a process.
    Kill(KillArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = RunMode::Sync)]
    pub mode: RunMode,

    /// `timeout(1)` limit in seconds; 0 disables it.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u32>,

    /// Working directory for the command.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Environment variables, `KEY=VALUE`. May be repeated.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Substitution variables for `$NAME$` placeholders, `NAME=VALUE`.
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,

    /// Accept these exit codes in addition to 0.
    #[arg(long = "accept", value_name = "CODE")]
    pub accept: Vec<i32>,

    /// Command and its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct PoolArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$PROCPOOL_CONFIG`, else `Procpool.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Parse + validate, print the rendered template and queue, but don't
    /// launch anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct KillArgs {
    /// Signal number (1-31 or 34-64).
    #[arg(long, short = 's', default_value_t = 15)]
    pub signal: i32,

    /// Signal the process group `PID` instead of a single process.
    #[arg(long)]
    pub group: bool,

    pub pid: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    Sync,
    Passthrough,
    Background,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
