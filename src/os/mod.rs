// src/os/mod.rs

//! OS collaborators: signal delivery and process-table inspection.

pub mod ps;
pub mod signal;

pub use ps::{normalize_invocation, ProcessEntry, ProcessTable, PsProcessTable};
pub use signal::{Kill, NixSignalSender, Signal, SignalSender};
