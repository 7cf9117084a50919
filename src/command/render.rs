// src/command/render.rs

//! Command-line assembly.
//!
//! [`render`] turns a [`ProcessConfig`] into the string handed to `sh -c`.
//! The steps run in a fixed order so that each wrapper covers everything
//! added before it:
//!
//! 1. `[ionice] [nice] command args`, with `$NAME$` substituted into each
//!    piece before it is quoted
//! 2. `timeout --foreground N …`
//! 3. `sleep S; …`
//! 4. `cd DIR; …`
//! 5. remote wrap
//! 6. `export TERM=T; …`
//! 7. `… | <pipe target>`
//! 8. output and input redirections
//! 9. run-file wrapper (detached, or foreground pid registration)
//! 10. `sudo … sh -c '…'`
//!
//! Environment variables are not part of the line; the executor passes them
//! through the OS process API. They are only written into the line where
//! that API cannot reach (remote hosts, `sudo` preservation).

use crate::command::config::{ProcessConfig, Sudo};
use crate::command::redirect::{self, Direction};
use crate::command::shell::{quote, substitute_variables};
use crate::errors::{ProcpoolError, Result};
use crate::runfile::RunFileSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Foreground,
    Background,
}

/// A rendered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    /// The full line passed to `sh -c`.
    pub line: String,
    /// What the long-running process itself executes. For background
    /// launches this is the detached worker's script, which is what shows up
    /// in the process table.
    pub script: String,
    /// The line before privilege elevation. A detached worker carries this
    /// invocation between its fork and the `exec` of `nohup`.
    pub launcher: String,
}

/// Render `config` for the given mode.
///
/// `run_files` must be provided for background launches and for foreground
/// pid registration.
pub fn render(
    config: &ProcessConfig,
    mode: RenderMode,
    run_files: Option<&RunFileSet>,
) -> Result<RenderedCommand> {
    let core = render_core(config)?;

    let (line, script) = match mode {
        RenderMode::Background => {
            if !config.use_run_file() {
                return Err(ProcpoolError::ConfigError(
                    "background execution requires a run file".to_string(),
                ));
            }
            let files = require_run_files(run_files)?;
            let script = format!("{core}; echo $? > {}", quote(&path_str(&files.exit)));
            let line = format!(
                "nohup sh -c {} > {} 2>&1 < /dev/null & echo $! > {}",
                quote(&script),
                quote(&path_str(&files.log)),
                quote(&path_str(&files.pid)),
            );
            (line, script)
        }
        RenderMode::Foreground if config.register_run_file() => {
            let files = require_run_files(run_files)?;
            let line = format!("echo $$ > {}; {core}", quote(&path_str(&files.pid)));
            (line, core)
        }
        RenderMode::Foreground => (core.clone(), core),
    };

    let launcher = line.clone();
    let line = match config.sudo() {
        Some(sudo) => wrap_sudo(config, sudo, &line),
        None => line,
    };

    Ok(RenderedCommand {
        line,
        script,
        launcher,
    })
}

/// Steps 1–8: everything except the run-file wrapper and `sudo`.
///
/// Pipe targets are rendered through this function too, so they never get a
/// run file or privilege elevation of their own.
pub fn render_core(config: &ProcessConfig) -> Result<String> {
    if config.command().trim().is_empty() {
        return Err(ProcpoolError::NoCommand);
    }

    let mut line = render_base(config)?;

    if config.timeout_seconds() > 0 {
        line = format!("timeout --foreground {} {line}", config.timeout_seconds());
    }

    if config.wait_millis() > 0 {
        line = format!("sleep {}; {line}", format_seconds(config.wait_millis()));
    }

    if let Some(dir) = config.working_directory() {
        line = format!("cd {}; {line}", quote(&dir.to_string_lossy()));
    }

    if let Some(remote) = config.remote() {
        let exports: String = config
            .environment()
            .iter()
            .map(|(k, v)| format!("export {k}={}; ", quote(v)))
            .collect();
        line = remote.wrap(&format!("{exports}{line}"));
    }

    if let Some(term) = config.terminal() {
        line = format!("export TERM={}; {line}", quote(term));
    }

    if let Some(target) = config.pipe_to() {
        line = format!("{line} | {}", render_core(target)?);
    }

    for (channel, raw) in config.output_redirects() {
        let target = redirect::parse(Direction::Output, *channel, raw)?;
        line = format!("{line} {}", redirect::render(Direction::Output, *channel, &target));
    }
    for (channel, raw) in config.input_redirects() {
        let target = redirect::parse(Direction::Input, *channel, raw)?;
        line = format!("{line} {}", redirect::render(Direction::Input, *channel, &target));
    }

    Ok(line)
}

fn render_base(config: &ProcessConfig) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(io) = config.ionice() {
        if io.class > 3 || io.level > 7 {
            return Err(ProcpoolError::ConfigError(format!(
                "ionice class {} / level {} out of range",
                io.class, io.level
            )));
        }
        parts.push(format!("ionice -c {} -n {}", io.class, io.level));
    }

    if let Some(nice) = config.nice() {
        if !(-20..=19).contains(&nice) {
            return Err(ProcpoolError::ConfigError(format!(
                "nice value {nice} out of range [-20,19]"
            )));
        }
        parts.push(format!("nice -n {nice}"));
    }

    let vars = config.variables();
    let command = substitute_variables(config.command(), vars)?;
    parts.push(quote(&command).into_owned());

    for arg in config.arguments() {
        let value = substitute_variables(&arg.value, vars)?;
        if arg.escape {
            parts.push(quote(&value).into_owned());
        } else {
            parts.push(value);
        }
    }

    Ok(parts.join(" "))
}

fn wrap_sudo(config: &ProcessConfig, sudo: &Sudo, line: &str) -> String {
    let mut out = String::from("sudo");
    if let Sudo::User(user) = sudo {
        out.push_str(&format!(" -u {}", quote(user)));
    }
    if !config.environment().is_empty() {
        let names: Vec<&str> = config.environment().keys().map(String::as_str).collect();
        out.push_str(&format!(" --preserve-env={}", names.join(",")));
    }
    out.push_str(&format!(" -- sh -c {}", quote(line)));
    out
}

fn require_run_files(run_files: Option<&RunFileSet>) -> Result<&RunFileSet> {
    run_files.ok_or_else(|| {
        ProcpoolError::ConfigError("run-file paths were not allocated for this launch".to_string())
    })
}

fn path_str(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn format_seconds(millis: u32) -> String {
    if millis % 1000 == 0 {
        (millis / 1000).to_string()
    } else {
        format!("{}.{:03}", millis / 1000, millis % 1000)
    }
}
