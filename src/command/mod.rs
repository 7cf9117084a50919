// src/command/mod.rs

//! Command configuration and command-line assembly.
//!
//! - [`config`] holds `ProcessConfig`, the mutable builder state of a command.
//! - [`render`] assembles the final shell line from a config.
//! - [`redirect`] parses and renders channel redirections.
//! - [`shell`] has quoting and `$NAME$` substitution helpers.

pub mod config;
pub mod redirect;
pub mod render;
pub mod shell;

pub use config::{
    Argument, IoNice, ProcessConfig, RemoteHost, SshHost, Sudo, DEFAULT_TIMEOUT_SECONDS,
};
pub use render::{render, render_core, RenderMode, RenderedCommand};
