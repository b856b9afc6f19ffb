//! The convergence loop: compile, scan, resolve, install, and compile again.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::memory::IterationMemory;
use crate::core::scanner::scan;
use crate::core::types::Candidate;
use crate::install::Installer;
use crate::io::compiler::Compiler;
use crate::io::escalation::{EscalationError, Escalator};
use crate::io::repository::Repository;
use crate::resolve::Resolver;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// No category yielded a candidate that had not already been acted on.
    Converged,
    /// Nothing more can be installed; the last compile result stands.
    Aborted(AbortReason),
}

/// Why installing could not continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Every privilege escalation attempt failed.
    EscalationFailed,
    /// The compiler exceeded the configured timeout and was killed.
    CompileTimedOut,
    /// Searching or installing failed outright (e.g. `tlmgr` vanished mid-run).
    RepositoryFailed(String),
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Number of compiler invocations.
    pub compiles: u32,
    /// Candidates whose packages were installed, in order.
    pub installed: Vec<Candidate>,
    /// Exit status of the most recent compile.
    pub exit_code: i32,
    pub stop: LoopStop,
}

/// Compile `document` repeatedly, installing packages for missing resources in between.
///
/// Each iteration acts on at most one candidate: the highest-priority category whose
/// first candidate differs from the last one acted on in that category. The candidate
/// is remembered whether or not it resolved to any package, so other categories get
/// their turn on the next iteration. The loop converges when no category has a new
/// candidate.
///
/// Only a compiler launch failure is returned as an error; every other failure ends
/// the loop as [`LoopStop::Aborted`] with the last compile status preserved.
#[instrument(skip_all, fields(document))]
pub fn run_loop<C: Compiler, R: Repository, E: Escalator>(
    compiler: &C,
    resolver: &Resolver<'_, R>,
    installer: &mut Installer<'_, R, E>,
    document: &str,
) -> Result<LoopOutcome> {
    let mut memory = IterationMemory::default();
    let mut compiles = 0u32;
    let mut installed = Vec::new();

    loop {
        let output = compiler.compile()?;
        compiles += 1;
        let exit_code = output.exit_code;
        debug!(compiles, exit_code, "compile finished");

        let finish = move |installed: Vec<Candidate>, stop: LoopStop| LoopOutcome {
            compiles,
            installed,
            exit_code,
            stop,
        };

        if output.timed_out {
            warn!("compiler timed out");
            return Ok(finish(installed, LoopStop::Aborted(AbortReason::CompileTimedOut)));
        }

        let diagnostics = scan(&output.text, document);
        debug!(?diagnostics, "scanned compiler output");

        let Some(candidate) = memory.pending(&diagnostics).into_iter().next() else {
            info!(compiles, "converged");
            return Ok(finish(installed, LoopStop::Converged));
        };

        info!(kind = %candidate.kind, name = %candidate.name, "resolving candidate");
        let packages = match resolver.resolve(&candidate) {
            Ok(packages) => packages,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "search failed");
                let reason = AbortReason::RepositoryFailed(format!("{err:#}"));
                return Ok(finish(installed, LoopStop::Aborted(reason)));
            }
        };
        if let Err(err) = installer.install(&packages) {
            warn!(err = %format!("{err:#}"), "install failed");
            let reason = if err.downcast_ref::<EscalationError>().is_some() {
                AbortReason::EscalationFailed
            } else {
                AbortReason::RepositoryFailed(format!("{err:#}"))
            };
            return Ok(finish(installed, LoopStop::Aborted(reason)));
        }
        // Unresolvable candidates are remembered too, so they are never searched twice.
        memory.record(&candidate);
        if !packages.is_empty() {
            installed.push(candidate);
        }
    }
}
