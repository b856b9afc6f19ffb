//! Package installation with one-time `tlmgr` self-update and privilege escalation.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::console::{self, PROGRAM};
use crate::core::types::PermissionMode;
use crate::io::escalation::Escalator;
use crate::io::repository::Repository;
use crate::io::speech::Speaker;
use crate::resolve::join;

const UPDATE_NOTICE: &str = "Updating tlmgr prior to installing packages \
                             (tlmgr refuses to install into an outdated installation).";

/// Installs packages, escalating when the current user may not modify TeX Live.
///
/// Owns the installation state: the repository is self-updated before the first
/// non-empty install of a run and never again.
pub struct Installer<'a, R: Repository, E: Escalator> {
    repository: &'a R,
    escalator: &'a E,
    speaker: &'a Speaker,
    permission: PermissionMode,
    initialized: bool,
}

impl<'a, R: Repository, E: Escalator> Installer<'a, R, E> {
    pub fn new(
        repository: &'a R,
        escalator: &'a E,
        speaker: &'a Speaker,
        permission: PermissionMode,
    ) -> Self {
        Self {
            repository,
            escalator,
            speaker,
            permission,
            initialized: false,
        }
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Install `packages`; a no-op for an empty set.
    ///
    /// Escalation failures surface as
    /// [`EscalationError`](crate::io::escalation::EscalationError).
    #[instrument(skip_all, fields(packages = packages.len(), permission = ?self.permission))]
    pub fn install(&mut self, packages: &BTreeSet<String>) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        if !self.initialized {
            self.initialize()?;
            self.initialized = true;
        }

        let names: Vec<String> = packages.iter().cloned().collect();
        let listed = join(packages);
        console::notice(format!("Attempting to install LaTeX package(s): {listed}"));
        self.speaker.installing("Installing.");

        match self.permission {
            PermissionMode::Direct => self.repository.install(&names),
            PermissionMode::Escalate => {
                let justification = format!(
                    "This is {PROGRAM}'s 'install packages on the fly' feature.\n\n\
                     Attempting to install LaTeX package(s): {listed}\n\
                     (Some of them might not be real.)"
                );
                self.escalator
                    .run_elevated(&self.repository.install_command(&names), &justification)
            }
        }
    }

    fn initialize(&self) -> Result<()> {
        info!("initializing repository before first install");
        console::notice(UPDATE_NOTICE);
        match self.permission {
            PermissionMode::Direct => self.repository.self_update(),
            PermissionMode::Escalate => {
                console::banner(
                    "You don't have permission to modify the TeX Live distribution; \
                     requesting administrator rights for installation.",
                );
                let justification = format!(
                    "This is {PROGRAM}'s 'install packages on the fly' feature.\n\n{UPDATE_NOTICE}"
                );
                debug!("self-update through escalation");
                self.escalator
                    .run_elevated(&self.repository.self_update_command(), &justification)
            }
        }
    }
}
