// src/command/redirect.rs

//! Parsing and rendering of channel redirections.

use crate::command::shell::quote;
use crate::errors::{ProcpoolError, Result};

/// Highest channel number a redirect may name.
pub const MAX_CHANNEL: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    File { path: String, append: bool },
    Channel(u8),
}

/// Parse a raw target such as `>out.log`, `>> out.log`, `>&2`, `<in.txt`.
pub fn parse(direction: Direction, channel: u8, raw: &str) -> Result<RedirectTarget> {
    let min_channel = match direction {
        Direction::Input => 0,
        Direction::Output => 1,
    };
    if channel < min_channel || channel > MAX_CHANNEL {
        return Err(invalid(
            channel,
            format!("channel must be in [{min_channel},{MAX_CHANNEL}]"),
        ));
    }

    let raw = raw.trim();
    let (op, rest) = match direction {
        Direction::Output => {
            if let Some(rest) = raw.strip_prefix(">>") {
                (">>", rest)
            } else if let Some(rest) = raw.strip_prefix('>') {
                (">", rest)
            } else {
                return Err(invalid(channel, format!("output target {raw:?} must start with '>' or '>>'")));
            }
        }
        Direction::Input => match raw.strip_prefix('<') {
            Some(rest) => ("<", rest),
            None => return Err(invalid(channel, format!("input target {raw:?} must start with '<'"))),
        },
    };

    if let Some(fd) = rest.strip_prefix('&') {
        if op == ">>" {
            return Err(invalid(channel, "cannot append to a channel".to_string()));
        }
        let fd: u8 = fd
            .trim()
            .parse()
            .map_err(|_| invalid(channel, format!("{fd:?} is not a channel number")))?;
        if fd > MAX_CHANNEL {
            return Err(invalid(channel, format!("target channel {fd} out of range")));
        }
        return Ok(RedirectTarget::Channel(fd));
    }

    let path = rest.trim();
    if path.is_empty() {
        return Err(invalid(channel, "missing redirect path".to_string()));
    }

    Ok(RedirectTarget::File {
        path: path.to_string(),
        append: op == ">>",
    })
}

/// Render a parsed redirect as shell syntax, e.g. `2>&1` or `1>>'a b.log'`.
pub fn render(direction: Direction, channel: u8, target: &RedirectTarget) -> String {
    match (direction, target) {
        (Direction::Output, RedirectTarget::File { path, append }) => {
            let op = if *append { ">>" } else { ">" };
            format!("{channel}{op}{}", quote(path))
        }
        (Direction::Output, RedirectTarget::Channel(fd)) => format!("{channel}>&{fd}"),
        (Direction::Input, RedirectTarget::File { path, .. }) => {
            format!("{channel}<{}", quote(path))
        }
        (Direction::Input, RedirectTarget::Channel(fd)) => format!("{channel}<&{fd}"),
    }
}

fn invalid(channel: u8, reason: String) -> ProcpoolError {
    ProcpoolError::InvalidRedirect { channel, reason }
}
