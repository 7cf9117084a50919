// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod os;
pub mod pool;
pub mod process;
pub mod runfile;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command, KillArgs, PoolArgs, RunArgs, RunMode};
use crate::command::{render_core, ProcessConfig};
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::context::ExecutionContext;
use crate::errors::ProcpoolError;
use crate::exec::ProcessExecutor;
use crate::os::{Kill, PsProcessTable};
use crate::pool::WorkerPool;
use crate::process::{ExecutionMode, ExecutionResult, ProcessHandle, ProcessState};

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Run(run_args) => run_command(run_args).await,
        Command::Pool(pool_args) => run_pool(pool_args).await,
        Command::Kill(kill_args) => run_kill(kill_args),
    }
}

async fn run_command(args: RunArgs) -> Result<i32> {
    let ctx = Arc::new(ExecutionContext::from_env());
    let executor = Arc::new(ProcessExecutor::system(ctx)?);

    let (program, rest) = args
        .command
        .split_first()
        .context("no command given")?;

    let mut config = ProcessConfig::new(program.clone());
    config.add_arguments(rest.iter().cloned());
    if let Some(timeout) = args.timeout {
        config.set_timeout(timeout);
    }
    if let Some(dir) = &args.cwd {
        config.set_working_directory(dir.clone());
    }
    for (k, v) in args.env {
        config.set_environment_variable(k, v);
    }
    for (k, v) in args.vars {
        config.set_variable(k, v);
    }
    for code in args.accept {
        config.add_accepted_exit_code(code);
    }

    let mode = match args.mode {
        RunMode::Sync => ExecutionMode::Sync,
        RunMode::Passthrough => ExecutionMode::Passthrough,
        RunMode::Background => ExecutionMode::Background,
    };

    let mut handle = ProcessHandle::new(executor, config);
    match handle.execute(mode).await {
        Ok(ExecutionResult::Output(lines)) => {
            for line in lines {
                println!("{line}");
            }
            Ok(0)
        }
        Ok(ExecutionResult::Background { pid }) => {
            println!("{pid}");
            Ok(0)
        }
        Ok(ExecutionResult::Passthrough { success }) => {
            Ok(if success { 0 } else { handle.exit_code().unwrap_or(1) })
        }
        Ok(ExecutionResult::Logged | ExecutionResult::Completed) => Ok(0),
        Err(ProcpoolError::ProcessFailed(failure)) => {
            for line in &failure.stdout {
                println!("{line}");
            }
            for line in &failure.stderr {
                eprintln!("{line}");
            }
            warn!(
                exit_code = failure.exit_code,
                cause = failure.probable_cause.as_str(),
                "command failed"
            );
            Ok(failure.exit_code)
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_pool(args: PoolArgs) -> Result<i32> {
    let path = args.config.unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&path)
        .with_context(|| format!("loading config {}", path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(0);
    }

    let executor = Arc::new(cfg.executor()?);
    let mut pool = cfg.worker_pool(executor, Arc::new(PsProcessTable))?;

    let interrupted = tokio::select! {
        res = pool.start() => {
            res?;
            false
        }
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl+C")?;
            true
        }
    };

    if interrupted {
        warn!("interrupted; stopping workers");
        pool.stop();
        return Ok(130);
    }

    Ok(summarize(&pool))
}

fn summarize(pool: &WorkerPool) -> i32 {
    let failed = pool
        .finished()
        .iter()
        .filter(|h| h.state() != ProcessState::Succeeded)
        .count();
    info!(
        executed = pool.workers_executed(),
        failed,
        failed_launches = pool.failed_launches(),
        peak = pool.peak_workers(),
        "pool summary"
    );
    if failed > 0 || pool.failed_launches() > 0 {
        1
    } else {
        0
    }
}

fn run_kill(args: KillArgs) -> Result<i32> {
    let kill = Kill::system();
    let delivered = if args.group {
        kill.kill_group(args.pid, args.signal)?
    } else {
        kill.kill(args.pid, args.signal)?
    };
    if delivered {
        Ok(0)
    } else {
        eprintln!("no such process: {}", args.pid);
        Ok(1)
    }
}

/// Print the command template and the queue without launching anything.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let template = cfg.process_config()?;
    println!("procpool dry-run");
    println!("  cmd: {}", cfg.command.cmd);
    match render_core(&template) {
        Ok(line) => println!("  line: {line}"),
        Err(ProcpoolError::UnresolvedVariable(name)) => {
            println!("  line: (depends on ${name}$, filled per worker)")
        }
        Err(err) => return Err(err.into()),
    }

    if let (Some(key), Some(values)) = (&cfg.pool.key, &cfg.pool.values) {
        println!(
            "  pool: key={key} values={} min={} max={}",
            values.len(),
            cfg.pool.min_workers,
            cfg.pool.max_workers
        );
    } else {
        println!("  pool: (no queue)");
    }
    Ok(())
}
