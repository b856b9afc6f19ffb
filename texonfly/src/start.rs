//! Startup: build the collaborators, check `tlmgr`, run the loop and report the result.
//!
//! Returns the process exit status. A missing `tlmgr` is returned as
//! [`RepositoryMissing`] unless the configuration asks to fail silently, in which case
//! the document is compiled exactly once.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::console::{self, PROGRAM};
use crate::exit_codes;
use crate::install::Installer;
use crate::io::compiler::{Compiler, TexCompiler};
use crate::io::config::TexonflyConfig;
use crate::io::escalation::SystemEscalator;
use crate::io::process::SpawnError;
use crate::io::repository::{RepositoryMissing, Tlmgr};
use crate::io::speech::Speaker;
use crate::looping::{AbortReason, LoopOutcome, LoopStop, run_loop};
use crate::resolve::Resolver;

/// Compile `document` with on-the-fly package installation.
#[instrument(skip_all, fields(document))]
pub fn run(config: &TexonflyConfig, document: &str) -> Result<i32> {
    let speaker = Speaker::new(config.speech()?);
    let compiler = TexCompiler {
        program: config.compiler_path(),
        arguments: config.compiler_arguments()?,
        document: document.to_string(),
        timeout: config.timeout(),
        output_limit_bytes: config.compile_output_limit_bytes,
    };
    let tlmgr = Tlmgr {
        program: Tlmgr::locate(config.texlive_bin.as_deref()),
        timeout: config.timeout(),
        output_limit_bytes: config.search_output_limit_bytes,
    };

    let permission = match tlmgr.detect_permission() {
        Ok(mode) => mode,
        Err(err) if config.fail_silently && err.downcast_ref::<RepositoryMissing>().is_some() => {
            warn!(err = %err, "tlmgr missing, compiling once");
            return compile_once(&compiler, config, &speaker);
        }
        Err(err) => return Err(err),
    };

    let escalator = SystemEscalator::detect(config.terminal_only, config.timeout());
    let resolver = Resolver::new(&tlmgr, &speaker);
    let mut installer = Installer::new(&tlmgr, &escalator, &speaker, permission);

    let outcome = match run_loop(&compiler, &resolver, &mut installer, document) {
        Ok(outcome) => outcome,
        Err(err) if err.downcast_ref::<SpawnError>().is_some() => {
            report_unstartable(config);
            return Ok(exit_codes::FATAL);
        }
        Err(err) => return Err(err),
    };
    report(&outcome);
    Ok(finish(outcome.exit_code, &speaker))
}

fn compile_once<C: Compiler>(
    compiler: &C,
    config: &TexonflyConfig,
    speaker: &Speaker,
) -> Result<i32> {
    match compiler.compile() {
        Ok(output) => Ok(finish(output.exit_code, speaker)),
        Err(err) if err.downcast_ref::<SpawnError>().is_some() => {
            report_unstartable(config);
            Ok(exit_codes::FATAL)
        }
        Err(err) => Err(err),
    }
}

fn finish(exit_code: i32, speaker: &Speaker) -> i32 {
    if exit_code != exit_codes::OK {
        speaker.failed("Compilation failed.");
    }
    exit_code
}

fn report_unstartable(config: &TexonflyConfig) {
    console::notice(format!(
        "Unable to start {}; are you sure it is installed?",
        config.compiler_path().display()
    ));
    if config.uses_default_compiler() {
        console::notice(format!(
            "Or, if you meant to use a different compiler, run '{PROGRAM} --help' for usage."
        ));
    }
}

fn report(outcome: &LoopOutcome) {
    info!(
        compiles = outcome.compiles,
        installed = outcome.installed.len(),
        exit_code = outcome.exit_code,
        stop = ?outcome.stop,
        "loop finished"
    );
    let LoopStop::Aborted(reason) = &outcome.stop else {
        return;
    };
    match reason {
        AbortReason::EscalationFailed => {
            console::banner("Unable to update; all privilege escalation attempts have failed!");
            console::notice(
                "We've already compiled the document at least once, so there's nothing else to do.",
            );
        }
        AbortReason::CompileTimedOut => {
            console::notice("The compiler timed out; giving up on installing packages.");
        }
        AbortReason::RepositoryFailed(message) => {
            console::notice(format!(
                "tlmgr failed ({message}); giving up on installing packages."
            ));
        }
    }
}
