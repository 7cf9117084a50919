// src/config/validate.rs

use crate::command::redirect::{self, Direction};
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProcpoolError, Result};
use crate::pool::{scalar_to_string, validate_key};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcpoolError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_command(cfg)?;
    validate_priorities(cfg)?;
    validate_redirects(cfg)?;
    validate_pool(cfg)?;
    validate_install(cfg)?;
    Ok(())
}

fn ensure_has_command(cfg: &RawConfigFile) -> Result<()> {
    if cfg.command.cmd.trim().is_empty() {
        return Err(ProcpoolError::ConfigError(
            "[command].cmd must be set".to_string(),
        ));
    }
    if cfg.command.accepted_exit_codes.is_empty() {
        return Err(ProcpoolError::ConfigError(
            "[command].accepted_exit_codes must not be empty".to_string(),
        ));
    }
    if matches!(cfg.command.sudo.as_deref(), Some(user) if user.trim().is_empty()) {
        return Err(ProcpoolError::ConfigError(
            "[command].sudo must name a user".to_string(),
        ));
    }
    Ok(())
}

fn validate_priorities(cfg: &RawConfigFile) -> Result<()> {
    let command = &cfg.command;

    if let Some(nice) = command.nice {
        if !(-20..=19).contains(&nice) {
            return Err(ProcpoolError::ConfigError(format!(
                "[command].nice must be in -20..=19 (got {nice})"
            )));
        }
    }

    match (command.ionice_class, command.ionice_level) {
        (None, None) => Ok(()),
        (Some(class), level) => {
            if class > 3 {
                return Err(ProcpoolError::ConfigError(format!(
                    "[command].ionice_class must be in 0..=3 (got {class})"
                )));
            }
            match level {
                Some(level) if level > 7 => Err(ProcpoolError::ConfigError(format!(
                    "[command].ionice_level must be in 0..=7 (got {level})"
                ))),
                _ => Ok(()),
            }
        }
        (None, Some(_)) => Err(ProcpoolError::ConfigError(
            "[command].ionice_level requires ionice_class".to_string(),
        )),
    }
}

fn validate_redirects(cfg: &RawConfigFile) -> Result<()> {
    let redirects = &cfg.command.redirects;
    for (channel, target) in &redirects.output {
        redirect::parse(Direction::Output, parse_channel(channel)?, target)?;
    }
    for (channel, target) in &redirects.input {
        redirect::parse(Direction::Input, parse_channel(channel)?, target)?;
    }
    Ok(())
}

/// Redirect tables are keyed by channel number written as a string.
pub(crate) fn parse_channel(key: &str) -> Result<u8> {
    key.trim().parse().map_err(|_| {
        ProcpoolError::ConfigError(format!("redirect channel {key:?} is not a number"))
    })
}

fn validate_pool(cfg: &RawConfigFile) -> Result<()> {
    let pool = &cfg.pool;

    match (&pool.key, &pool.values) {
        (Some(key), Some(values)) => {
            validate_key(key)?;
            for value in values {
                scalar_to_string(value)?;
            }
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(ProcpoolError::ConfigError(
                "[pool].key is set but [pool].values is missing".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(ProcpoolError::ConfigError(
                "[pool].values is set but [pool].key is missing".to_string(),
            ));
        }
    }

    if pool.max_workers == 0 {
        return Err(ProcpoolError::ConfigError(
            "[pool].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if pool.min_workers > pool.max_workers {
        return Err(ProcpoolError::ConfigError(format!(
            "[pool].min_workers ({}) must not exceed max_workers ({})",
            pool.min_workers, pool.max_workers
        )));
    }
    Ok(())
}

fn validate_install(cfg: &RawConfigFile) -> Result<()> {
    if matches!(&cfg.install.command, Some(program) if program.is_empty()) {
        return Err(ProcpoolError::ConfigError(
            "[install].command must not be empty".to_string(),
        ));
    }
    Ok(())
}
