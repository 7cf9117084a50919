// src/os/ps.rs

//! Process-table inspection.
//!
//! The worker pool asks a [`ProcessTable`] whether a pid is still alive and
//! what its invocation arguments are. [`PsProcessTable`] is the production
//! implementation (it shells out to `ps`, or reads `/proc` when `ps` is not
//! installed); tests can provide a fake table.

use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;

use crate::errors::Result;

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// `ps` state code, e.g. `S`, `R`, `Z`.
    pub state: String,
    /// Full invocation arguments joined by spaces.
    pub args: String,
}

impl ProcessEntry {
    pub fn is_zombie(&self) -> bool {
        self.state.starts_with('Z')
    }
}

pub trait ProcessTable: Send + Sync + Debug {
    /// Look up `pid`. Returns `None` when no such process exists.
    fn lookup(
        &self,
        pid: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProcessEntry>>> + Send + '_>>;
}

/// Process table backed by `ps -ww -o stat=,args= -p PID`.
#[derive(Debug, Clone, Default)]
pub struct PsProcessTable;

impl ProcessTable for PsProcessTable {
    fn lookup(
        &self,
        pid: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProcessEntry>>> + Send + '_>> {
        Box::pin(async move {
            let output = match Command::new("ps")
                .args(["-ww", "-o", "stat=,args=", "-p"])
                .arg(pid.to_string())
                .stdin(Stdio::null())
                .output()
                .await
            {
                Ok(output) => output,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return proc_lookup(pid).await;
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("running ps for pid {pid}"))
                        .into());
                }
            };

            // `ps` exits non-zero with empty output when nothing matches.
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(parse_ps_line(pid, &stdout))
        })
    }
}

/// Read `/proc/<pid>` directly, for hosts without `ps`.
async fn proc_lookup(pid: u32) -> Result<Option<ProcessEntry>> {
    let dir = PathBuf::from(format!("/proc/{pid}"));
    let stat = match tokio::fs::read_to_string(dir.join("stat")).await {
        Ok(stat) => stat,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("reading /proc/{pid}/stat"))
                .into());
        }
    };
    let cmdline = tokio::fs::read(dir.join("cmdline"))
        .await
        .with_context(|| format!("reading /proc/{pid}/cmdline"))?;
    Ok(parse_proc_entry(pid, &stat, &cmdline))
}

fn parse_proc_entry(pid: u32, stat: &str, cmdline: &[u8]) -> Option<ProcessEntry> {
    // The state follows the parenthesised command name, which may itself
    // contain spaces or parentheses.
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let state = after_comm.split_whitespace().next()?.to_string();
    let args = cmdline
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    Some(ProcessEntry { pid, state, args })
}

fn parse_ps_line(pid: u32, stdout: &str) -> Option<ProcessEntry> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (state, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    Some(ProcessEntry {
        pid,
        state: state.to_string(),
        args: args.trim().to_string(),
    })
}

const SHELLS: &[&str] = &["sh", "bash", "dash", "zsh", "ksh"];

/// Reduce an invocation string to a comparable form.
///
/// Strips quoting and the wrapper boilerplate added around worker scripts
/// (`nohup`, `sh -c`, `sudo` and its options) and collapses whitespace, so
/// a `ps` row and a rendered script compare equal when they describe the
/// same invocation.
pub fn normalize_invocation(invocation: &str) -> String {
    let cleaned: String = invocation
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\\'))
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let mut i = 0;
    loop {
        let Some(&head) = tokens.get(i) else { break };
        let base = head.rsplit('/').next().unwrap_or(head);

        if base == "nohup" {
            i += 1;
        } else if SHELLS.contains(&base) && tokens.get(i + 1) == Some(&"-c") {
            i += 2;
        } else if base == "sudo" {
            i += 1;
            while let Some(&opt) = tokens.get(i) {
                if opt == "--" {
                    i += 1;
                    break;
                } else if opt == "-u" {
                    i += 2;
                } else if opt.starts_with('-') {
                    i += 1;
                } else {
                    break;
                }
            }
        } else {
            break;
        }
    }

    tokens[i.min(tokens.len())..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ps_row() {
        let entry = parse_ps_line(42, "S    sh -c sleep 5; echo $? > /tmp/x.exit\n").unwrap();
        assert_eq!(entry.pid, 42);
        assert_eq!(entry.state, "S");
        assert_eq!(entry.args, "sh -c sleep 5; echo $? > /tmp/x.exit");
        assert!(!entry.is_zombie());
    }

    #[test]
    fn empty_output_means_gone() {
        assert!(parse_ps_line(42, "").is_none());
        assert!(parse_ps_line(42, "\n  \n").is_none());
    }

    #[test]
    fn parses_proc_entries() {
        let entry = parse_proc_entry(
            9,
            "9 (sh (x)) S 1 9 9 0 -1",
            b"sh\0-c\0sleep 5; echo $? > /x.exit\0",
        )
        .unwrap();
        assert_eq!(entry.state, "S");
        assert_eq!(entry.args, "sh -c sleep 5; echo $? > /x.exit");

        let zombie = parse_proc_entry(9, "9 (sh) Z 1 9", b"").unwrap();
        assert!(zombie.is_zombie());
    }

    #[test]
    fn zombie_state_detected() {
        let entry = parse_ps_line(7, "Z+ [sh] <defunct>").unwrap();
        assert!(entry.is_zombie());
    }

    #[test]
    fn normalize_strips_wrappers_and_quotes() {
        let ps_row = "/bin/sh -c timeout --foreground 30 echo 'a'; echo $? > /run/x.exit";
        let script = "timeout --foreground 30 echo a; echo $? > /run/x.exit";
        assert_eq!(normalize_invocation(ps_row), normalize_invocation(script));
    }

    #[test]
    fn normalize_strips_sudo_options() {
        assert_eq!(
            normalize_invocation("sudo -n -u www --preserve-env=A,B -- sh -c 'ls  -l'"),
            "ls -l"
        );
        assert_eq!(normalize_invocation("nohup bash -c \"x\""), "x");
    }

    #[test]
    fn normalize_keeps_unrelated_commands() {
        assert_eq!(normalize_invocation("python3 worker.py"), "python3 worker.py");
        assert_eq!(normalize_invocation(""), "");
    }
}
