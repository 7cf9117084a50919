// src/process/mod.rs

//! User-facing process handles.

pub mod handle;
pub mod state;

pub use handle::ProcessHandle;
pub use state::{ExecutionMode, ExecutionResult, ProcessState};
