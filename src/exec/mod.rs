// src/exec/mod.rs

//! Process execution layer.
//!
//! This module actually runs rendered command lines, using
//! `tokio::process::Command` with `sh -c`.
//!
//! - [`executor`] owns `ProcessExecutor` (foreground, background and
//!   passthrough runs) and the accepted-exit-code check.
//! - [`outcome`] holds the result types the executor reports.
//! - [`resolve`] maps command names to executables and falls back to a
//!   `PackageInstaller` when one is missing.

pub mod executor;
pub mod outcome;
pub mod resolve;

pub use executor::{check_exit, ProcessExecutor};
pub use outcome::{BackgroundLaunch, ExecutionOutcome};
pub use resolve::{CommandInstaller, CommandResolver, PackageInstaller};
