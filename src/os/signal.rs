// src/os/signal.rs

//! Signal delivery.
//!
//! [`Kill`] validates signal numbers against the POSIX table before any OS
//! call is made, then hands off to a [`SignalSender`]. Production code uses
//! [`NixSignalSender`]; tests swap in a recording fake.

use std::fmt::{self, Debug};
use std::sync::Arc;

use nix::errno::Errno;
use nix::unistd::Pid;

use crate::errors::{ProcpoolError, Result};

/// A validated signal number (1–31 or the real-time range 34–64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(i32);

impl Signal {
    pub const HUP: Signal = Signal(1);
    pub const INT: Signal = Signal(2);
    pub const KILL: Signal = Signal(9);
    pub const TERM: Signal = Signal(15);

    pub fn new(number: i32) -> Result<Self> {
        match number {
            1..=31 | 34..=64 => Ok(Signal(number)),
            other => Err(ProcpoolError::UnknownSignal(other)),
        }
    }

    pub fn number(&self) -> i32 {
        self.0
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::TERM
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match nix::sys::signal::Signal::try_from(self.0) {
            Ok(sig) => f.write_str(sig.as_str()),
            Err(_) => write!(f, "SIGRT{}", self.0),
        }
    }
}

/// Delivers signals to processes or process groups.
///
/// Both methods return `Ok(false)` when the target no longer exists.
pub trait SignalSender: Send + Sync + Debug {
    fn send(&self, pid: u32, signal: Signal) -> Result<bool>;
    fn send_group(&self, pgid: u32, signal: Signal) -> Result<bool>;
}

/// Real signal delivery through `kill(2)`.
#[derive(Debug, Clone, Default)]
pub struct NixSignalSender;

impl SignalSender for NixSignalSender {
    fn send(&self, pid: u32, signal: Signal) -> Result<bool> {
        deliver(Pid::from_raw(raw_pid(pid)?), signal)
    }

    fn send_group(&self, pgid: u32, signal: Signal) -> Result<bool> {
        deliver(Pid::from_raw(-raw_pid(pgid)?), signal)
    }
}

fn raw_pid(pid: u32) -> Result<i32> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(raw),
        _ => Err(ProcpoolError::ConfigError(format!(
            "refusing to signal invalid pid {pid}"
        ))),
    }
}

fn deliver(target: Pid, signal: Signal) -> Result<bool> {
    let res = match nix::sys::signal::Signal::try_from(signal.number()) {
        Ok(sig) => nix::sys::signal::kill(target, sig),
        // Real-time signals have no `nix::Signal` variant.
        Err(_) => {
            // SAFETY: kill(2) takes plain integers and touches no memory we
            // own; `signal` was range-checked by `Signal::new`.
            let rc = unsafe { nix::libc::kill(target.as_raw(), signal.number()) };
            Errno::result(rc).map(drop)
        }
    };

    match res {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(std::io::Error::from(errno).into()),
    }
}

/// Signal-delivery collaborator used by process handles.
#[derive(Debug, Clone)]
pub struct Kill {
    sender: Arc<dyn SignalSender>,
}

impl Kill {
    pub fn new(sender: Arc<dyn SignalSender>) -> Self {
        Self { sender }
    }

    /// Kill collaborator backed by the real `kill(2)`.
    pub fn system() -> Self {
        Self::new(Arc::new(NixSignalSender))
    }

    /// Send signal number `signal` to `pid`.
    ///
    /// Fails with [`ProcpoolError::UnknownSignal`] before touching the OS if
    /// the number is not a valid signal.
    pub fn kill(&self, pid: u32, signal: i32) -> Result<bool> {
        let signal = Signal::new(signal)?;
        self.sender.send(pid, signal)
    }

    /// Like [`Kill::kill`] but targets a whole process group.
    pub fn kill_group(&self, pgid: u32, signal: i32) -> Result<bool> {
        let signal = Signal::new(signal)?;
        self.sender.send_group(pgid, signal)
    }
}

impl Default for Kill {
    fn default() -> Self {
        Self::system()
    }
}
