// src/config/mod.rs

//! Configuration loading and validation for procpool.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it (`validate.rs`).
//! - Build the executor, command template and pool from it (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    CommandSection, ConfigFile, ContextSection, InstallSection, PoolSection, RawConfigFile,
    RedirectSection,
};
