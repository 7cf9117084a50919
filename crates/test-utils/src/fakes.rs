#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use procpool::errors::Result;
use procpool::os::{ProcessEntry, ProcessTable, Signal, SignalSender};

/// In-memory process table.
///
/// Pids not added are reported as gone, or looked up in the wrapped table
/// when built with [`FakeProcessTable::over`].
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    entries: Arc<Mutex<HashMap<u32, ProcessEntry>>>,
    fallback: Option<Arc<dyn ProcessTable>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay on top of another table; added entries take precedence.
    pub fn over(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            entries: Arc::default(),
            fallback: Some(table),
        }
    }

    pub fn insert(&self, pid: u32, state: &str, args: &str) {
        self.entries.lock().unwrap().insert(
            pid,
            ProcessEntry {
                pid,
                state: state.to_string(),
                args: args.to_string(),
            },
        );
    }

    pub fn remove(&self, pid: u32) {
        self.entries.lock().unwrap().remove(&pid);
    }
}

impl ProcessTable for FakeProcessTable {
    fn lookup(
        &self,
        pid: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProcessEntry>>> + Send + '_>> {
        let entry = self.entries.lock().unwrap().get(&pid).cloned();
        Box::pin(async move {
            match (entry, &self.fallback) {
                (Some(entry), _) => Ok(Some(entry)),
                (None, Some(table)) => table.lookup(pid).await,
                (None, None) => Ok(None),
            }
        })
    }
}

/// A signal delivery recorded by [`RecordingSignalSender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentSignal {
    pub target: u32,
    pub signal: i32,
    pub group: bool,
}

/// Records signals instead of delivering them.
#[derive(Debug, Clone)]
pub struct RecordingSignalSender {
    sent: Arc<Mutex<Vec<SentSignal>>>,
    target_exists: bool,
}

impl Default for RecordingSignalSender {
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            target_exists: true,
        }
    }
}

impl RecordingSignalSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery report that the target no longer exists.
    pub fn targets_gone(mut self) -> Self {
        self.target_exists = false;
        self
    }

    pub fn sent(&self) -> Vec<SentSignal> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, target: u32, signal: Signal, group: bool) -> Result<bool> {
        self.sent.lock().unwrap().push(SentSignal {
            target,
            signal: signal.number(),
            group,
        });
        Ok(self.target_exists)
    }
}

impl SignalSender for RecordingSignalSender {
    fn send(&self, pid: u32, signal: Signal) -> Result<bool> {
        self.record(pid, signal, false)
    }

    fn send_group(&self, pgid: u32, signal: Signal) -> Result<bool> {
        self.record(pgid, signal, true)
    }
}
