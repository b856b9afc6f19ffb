//! `tlmgr` adapter: search, self-update, install and the permission check.
//!
//! The [`Repository`] trait keeps the resolver and installer independent of the real
//! TeX Live manager so they can be driven by scripted repositories in tests.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::PermissionMode;
use crate::io::process::{SpawnError, run_command_inherited, run_command_with_timeout};

/// Executable name of the TeX Live manager on this platform.
pub const TLMGR: &str = if cfg!(windows) { "tlmgr.bat" } else { "tlmgr" };

/// Marker `tlmgr` prints on stderr when the user may not modify the installation.
const NO_PERMISSION_MARKER: &str = "don't have permission";

/// The TeX Live manager could not be started at all.
#[derive(Debug, Error)]
#[error("it appears {} is not installed.{}", .path.display(), version_hint(.suggest_version))]
pub struct RepositoryMissing {
    pub path: PathBuf,
    /// No custom bin directory was given, so the distribution is probably too old.
    pub suggest_version: bool,
}

fn version_hint(suggest: &bool) -> &'static str {
    if *suggest {
        " Are you sure you have TeX Live 2010 or later?"
    } else {
        ""
    }
}

/// Operations the loop needs from a package repository.
pub trait Repository {
    /// Raw output of a global file search for `term`.
    fn search(&self, term: &str) -> Result<String>;
    /// Update the repository tool itself, as the current user.
    fn self_update(&self) -> Result<()>;
    /// Install `packages`, as the current user.
    fn install(&self, packages: &[String]) -> Result<()>;
    /// Command line equivalent of [`Repository::self_update`], for escalated runs.
    fn self_update_command(&self) -> Vec<String>;
    /// Command line equivalent of [`Repository::install`], for escalated runs.
    fn install_command(&self, packages: &[String]) -> Vec<String>;
}

/// The TeX Live manager.
#[derive(Debug, Clone)]
pub struct Tlmgr {
    pub program: PathBuf,
    /// Maximum time to wait for any `tlmgr` run; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

impl Tlmgr {
    /// `tlmgr` inside `bin_dir`, or on `PATH` when no directory is given.
    pub fn locate(bin_dir: Option<&Path>) -> PathBuf {
        match bin_dir {
            Some(dir) => dir.join(TLMGR),
            None => PathBuf::from(TLMGR),
        }
    }

    /// Check that `tlmgr` runs and whether the current user may modify the installation.
    ///
    /// Runs `tlmgr remove` with no packages, which fails harmlessly but reports missing
    /// permissions before complaining about arguments.
    #[instrument(skip_all, fields(program = %self.program.display()))]
    pub fn detect_permission(&self) -> Result<PermissionMode> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("remove");
        let output = match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) if err.downcast_ref::<SpawnError>().is_some() => {
                return Err(RepositoryMissing {
                    path: self.program.clone(),
                    suggest_version: self.program == Path::new(TLMGR),
                }
                .into());
            }
            Err(err) => return Err(err.context("check tlmgr permissions")),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mode = permission_from_remove(&stderr);
        info!(?mode, "detected tlmgr permissions");
        Ok(mode)
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).stdin(Stdio::null());
        let outcome = run_command_inherited(cmd, self.timeout)
            .with_context(|| format!("run tlmgr {}", args.join(" ")))?;
        if outcome.timed_out {
            warn!(args = ?args, "tlmgr timed out");
        } else if !outcome.status.success() {
            // A failed install is detected by the next compile, not here.
            warn!(args = ?args, exit_code = ?outcome.status.code(), "tlmgr failed");
        }
        Ok(())
    }

    fn command_line(&self, args: Vec<String>) -> Vec<String> {
        let mut line = vec![self.program.to_string_lossy().into_owned()];
        line.extend(args);
        line
    }
}

impl Repository for Tlmgr {
    #[instrument(skip(self))]
    fn search(&self, term: &str) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(search_args(term));
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("tlmgr search for {term}"))?;
        if output.timed_out {
            warn!(term, "tlmgr search timed out");
        }
        debug!(
            exit_code = ?output.status.code(),
            bytes = output.stdout.len(),
            "tlmgr search finished"
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn self_update(&self) -> Result<()> {
        self.run(&self_update_args())
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        self.run(&install_args(packages))
    }

    fn self_update_command(&self) -> Vec<String> {
        self.command_line(self_update_args())
    }

    fn install_command(&self, packages: &[String]) -> Vec<String> {
        self.command_line(install_args(packages))
    }
}

/// Permission mode implied by the stderr of `tlmgr remove`.
pub fn permission_from_remove(stderr: &str) -> PermissionMode {
    if stderr.contains(NO_PERMISSION_MARKER) {
        PermissionMode::Escalate
    } else {
        PermissionMode::Direct
    }
}

fn search_args(term: &str) -> Vec<String> {
    ["search", "--global", "--file", term]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

fn self_update_args() -> Vec<String> {
    vec!["update".to_string(), "--self".to_string()]
}

fn install_args(packages: &[String]) -> Vec<String> {
    let mut args = vec!["install".to_string()];
    args.extend(packages.iter().cloned());
    args
}
