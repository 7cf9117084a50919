// src/pool/mod.rs

//! Worker pool.
//!
//! - [`values`] validates the substitution key and converts queued TOML
//!   scalars to text.
//! - [`worker_pool`] owns the launch loop, liveness pruning and shutdown.

pub mod values;
pub mod worker_pool;

pub use values::{scalar_to_string, validate_key, variable_name};
pub use worker_pool::{
    PoolSettings, PoolState, WorkerPool, DEFAULT_CYCLE_SLEEP, DEFAULT_MAX_WORKERS,
    DEFAULT_WAIT_SLEEP,
};
