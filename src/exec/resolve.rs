// src/exec/resolve.rs

//! Executable resolution, with an optional package-install fallback.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{ProcpoolError, Result};

/// Names `sh` handles itself; these are never looked up on `PATH`.
const SHELL_BUILTINS: &[&str] = &[
    ".", ":", "[", "alias", "break", "cd", "command", "continue", "echo", "eval", "exec", "exit",
    "export", "false", "getopts", "hash", "kill", "printf", "pwd", "read", "return", "set",
    "shift", "source", "test", "times", "trap", "true", "type", "ulimit", "umask", "unset",
    "wait",
];

/// Maps commands to the packages that provide them and installs packages.
pub trait PackageInstaller: Send + Sync + Debug {
    fn package_for(&self, command: &str) -> Option<String>;

    fn install(&self, package: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Installs packages by running an installer program with the package name
/// appended, e.g. `sudo -n apt-get install -y <package>`.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: Vec<String>,
    packages: BTreeMap<String, String>,
}

impl CommandInstaller {
    pub fn new(program: Vec<String>, packages: BTreeMap<String, String>) -> Self {
        Self { program, packages }
    }

    pub fn apt(packages: BTreeMap<String, String>) -> Self {
        let program = ["sudo", "-n", "apt-get", "install", "-y"]
            .into_iter()
            .map(String::from)
            .collect();
        Self::new(program, packages)
    }
}

impl PackageInstaller for CommandInstaller {
    fn package_for(&self, command: &str) -> Option<String> {
        self.packages.get(command).cloned()
    }

    fn install(&self, package: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let package = package.to_string();
        Box::pin(async move {
            let (program, args) = self
                .program
                .split_first()
                .ok_or_else(|| ProcpoolError::ConfigError("empty installer command".to_string()))?;

            info!(%package, installer = %program, "installing package");
            let status = Command::new(program)
                .args(args)
                .arg(&package)
                .stdin(Stdio::null())
                .status()
                .await
                .with_context(|| format!("running installer for package '{package}'"))?;

            if status.success() {
                Ok(())
            } else {
                Err(anyhow!("installing package '{package}' failed: {status}").into())
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandResolver {
    installer: Option<Arc<dyn PackageInstaller>>,
    auto_install: bool,
}

impl CommandResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installer(installer: Arc<dyn PackageInstaller>, auto_install: bool) -> Self {
        Self {
            installer: Some(installer),
            auto_install,
        }
    }

    /// Resolve `command` to something `sh` can run.
    ///
    /// Builtins are returned unchanged, paths must point at an existing file,
    /// bare names are searched on `PATH`. A missing command with a known
    /// package is installed (once) when auto-install is allowed.
    pub async fn resolve(&self, command: &str, working_dir: Option<&Path>) -> Result<String> {
        if SHELL_BUILTINS.contains(&command) {
            return Ok(command.to_string());
        }

        if command.contains('/') {
            let path = Path::new(command);
            let candidate = match working_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.to_path_buf(),
            };
            return if candidate.is_file() {
                Ok(command.to_string())
            } else {
                Err(ProcpoolError::CommandNotFound(command.to_string()))
            };
        }

        let mut installed = false;
        loop {
            match which::which(command) {
                Ok(path) => {
                    let resolved = path.to_string_lossy().into_owned();
                    debug!(command, %resolved, "resolved command");
                    return Ok(resolved);
                }
                Err(_) if installed => {
                    return Err(ProcpoolError::CommandNotFound(command.to_string()));
                }
                Err(_) => {}
            }

            let Some(installer) = &self.installer else {
                return Err(ProcpoolError::CommandNotFound(command.to_string()));
            };
            let Some(package) = installer.package_for(command) else {
                return Err(ProcpoolError::CommandNotFound(command.to_string()));
            };
            if !self.auto_install {
                return Err(ProcpoolError::AutoInstallDenied {
                    command: command.to_string(),
                    package,
                });
            }

            warn!(command, %package, "command not found; attempting install");
            installer.install(&package).await?;
            installed = true;
        }
    }
}
