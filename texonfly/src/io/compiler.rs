//! Compiler abstraction for TeX engine invocation.
//!
//! The [`Compiler`] trait decouples the compile loop from the actual engine
//! (`pdflatex` by default). Tests use scripted compilers that return predetermined
//! output without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::io::process::{exit_code, run_command_streaming};

/// Result of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    /// Everything the compiler wrote to stdout.
    pub text: String,
    /// Compiler exit status.
    pub exit_code: i32,
    /// The compiler was killed after exceeding the configured timeout.
    pub timed_out: bool,
}

/// Abstraction over compiler backends.
pub trait Compiler {
    /// Compile the document once. Launch failures surface as
    /// [`SpawnError`](crate::io::process::SpawnError).
    fn compile(&self) -> Result<CompileOutput>;
}

/// Compiler that spawns a TeX engine on one document.
#[derive(Debug, Clone)]
pub struct TexCompiler {
    /// Engine executable, possibly inside a custom TeX Live bin directory.
    pub program: PathBuf,
    /// Arguments placed before the document path.
    pub arguments: Vec<String>,
    /// Document to compile.
    pub document: String,
    /// Maximum time to wait for one compile; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Cap on the amount of output kept for scanning.
    pub output_limit_bytes: usize,
}

impl TexCompiler {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.arguments).arg(&self.document);
        cmd
    }
}

impl Compiler for TexCompiler {
    #[instrument(skip_all, fields(program = %self.program.display(), document = %self.document))]
    fn compile(&self) -> Result<CompileOutput> {
        info!("compiling document");
        let output = run_command_streaming(self.command(), self.timeout, self.output_limit_bytes)
            .context("run compiler")?;
        Ok(CompileOutput {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: exit_code(&output.status),
            timed_out: output.timed_out,
        })
    }
}
