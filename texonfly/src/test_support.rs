//! Test-only helpers: scripted collaborators and a fake TeX Live bin directory.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::compiler::{CompileOutput, Compiler};
use crate::io::escalation::{EscalationError, Escalator};
use crate::io::repository::Repository;

/// Compiler output with the given text and status.
pub fn compile_output(text: &str, exit_code: i32) -> CompileOutput {
    CompileOutput {
        text: text.to_string(),
        exit_code,
        timed_out: false,
    }
}

/// The LaTeX error reported for a missing `\usepackage` / `\input` file.
pub fn missing_file(name: &str) -> String {
    format!("! LaTeX Error: File `{name}' not found.\n\nType X to quit or <RETURN> to proceed,\n")
}

/// The error reported when a font's metric file cannot be loaded.
pub fn missing_font(metric: &str) -> String {
    format!(
        "! Font \\T1/cmr/m/n/10={metric} at 10.0pt not loadable: Metric (TFM) file not found.\n"
    )
}

/// Compiler that replays queued outputs, repeating the last one once the queue is empty.
pub struct ScriptedCompiler {
    outputs: RefCell<VecDeque<CompileOutput>>,
    last: RefCell<Option<CompileOutput>>,
    calls: Cell<u32>,
}

impl ScriptedCompiler {
    pub fn new(outputs: Vec<CompileOutput>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            last: RefCell::new(None),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl Compiler for ScriptedCompiler {
    fn compile(&self) -> Result<CompileOutput> {
        self.calls.set(self.calls.get() + 1);
        let next = self.outputs.borrow_mut().pop_front();
        let output = match next {
            Some(output) => output,
            None => self
                .last
                .borrow()
                .clone()
                .ok_or_else(|| anyhow!("scripted compiler has no outputs"))?,
        };
        *self.last.borrow_mut() = Some(output.clone());
        Ok(output)
    }
}

/// Side effects recorded by [`ScriptedRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryCall {
    SelfUpdate,
    Install(Vec<String>),
}

/// Repository with canned search output per term. Unknown terms find nothing.
#[derive(Default)]
pub struct ScriptedRepository {
    results: HashMap<String, String>,
    fail_search: bool,
    searches: RefCell<Vec<String>>,
    calls: RefCell<Vec<RepositoryCall>>,
}

impl ScriptedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, term: &str, output: &str) -> Self {
        self.results.insert(term.to_string(), output.to_string());
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Search terms in the order they were requested.
    pub fn searches(&self) -> Vec<String> {
        self.searches.borrow().clone()
    }

    pub fn calls(&self) -> Vec<RepositoryCall> {
        self.calls.borrow().clone()
    }

    /// Package lists passed to direct installs.
    pub fn installs(&self) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                RepositoryCall::Install(packages) => Some(packages.clone()),
                RepositoryCall::SelfUpdate => None,
            })
            .collect()
    }
}

impl Repository for ScriptedRepository {
    fn search(&self, term: &str) -> Result<String> {
        self.searches.borrow_mut().push(term.to_string());
        if self.fail_search {
            return Err(anyhow!("scripted search failure"));
        }
        Ok(self.results.get(term).cloned().unwrap_or_default())
    }

    fn self_update(&self) -> Result<()> {
        self.calls.borrow_mut().push(RepositoryCall::SelfUpdate);
        Ok(())
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(RepositoryCall::Install(packages.to_vec()));
        Ok(())
    }

    fn self_update_command(&self) -> Vec<String> {
        vec!["tlmgr".to_string(), "update".to_string(), "--self".to_string()]
    }

    fn install_command(&self, packages: &[String]) -> Vec<String> {
        let mut command = vec!["tlmgr".to_string(), "install".to_string()];
        command.extend(packages.iter().cloned());
        command
    }
}

/// Escalator that records requests and either always succeeds or always fails.
pub struct ScriptedEscalator {
    succeed: bool,
    commands: RefCell<Vec<Vec<String>>>,
    justifications: RefCell<Vec<String>>,
}

impl ScriptedEscalator {
    pub fn succeeding() -> Self {
        Self::with_result(true)
    }

    pub fn failing() -> Self {
        Self::with_result(false)
    }

    fn with_result(succeed: bool) -> Self {
        Self {
            succeed,
            commands: RefCell::new(Vec::new()),
            justifications: RefCell::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }

    pub fn justifications(&self) -> Vec<String> {
        self.justifications.borrow().clone()
    }
}

impl Escalator for ScriptedEscalator {
    fn run_elevated(&self, command: &[String], justification: &str) -> Result<()> {
        self.commands.borrow_mut().push(command.to_vec());
        self.justifications
            .borrow_mut()
            .push(justification.to_string());
        if self.succeed {
            Ok(())
        } else {
            Err(EscalationError::AllAttemptsFailed {
                attempts: vec!["scripted: refused".to_string()],
            }
            .into())
        }
    }
}

/// A missing file and the package that provides it, for [`FakeTexLive`].
#[derive(Debug, Clone)]
pub struct FakePackage {
    pub file: String,
    pub package: String,
}

impl FakePackage {
    pub fn new(file: &str, package: &str) -> Self {
        Self {
            file: file.to_string(),
            package: package.to_string(),
        }
    }
}

/// Temporary TeX Live bin directory populated with shell-script stand-ins.
///
/// The fake compiler reports the first [`FakePackage`] whose marker file is absent as a
/// missing file and exits with `failure_code`; the fake `tlmgr` answers searches for
/// those files and creates the marker files on install. Each run is appended to
/// `compiles.log` / `tlmgr.log` in the directory.
pub struct FakeTexLive {
    dir: TempDir,
}

impl FakeTexLive {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create fake texlive dir")?,
        })
    }

    pub fn bin(&self) -> &Path {
        self.dir.path()
    }

    /// Install a fake compiler named `name`.
    pub fn with_compiler(
        self,
        name: &str,
        packages: &[FakePackage],
        failure_code: i32,
    ) -> Result<Self> {
        let dir = self.bin().display().to_string();
        let mut script = format!("#!/bin/sh\necho run >> '{dir}/compiles.log'\n");
        for fake in packages {
            script.push_str(&format!(
                "if [ ! -f '{dir}/installed-{package}' ]; then\n  \
                 printf '%s\\n' \"! LaTeX Error: File \\`{file}' not found.\"\n  \
                 exit {failure_code}\nfi\n",
                package = fake.package,
                file = fake.file,
            ));
        }
        script.push_str("printf '%s\\n' 'Output written on document.pdf (1 page).'\nexit 0\n");
        self.write_executable(name, &script)?;
        Ok(self)
    }

    /// Install a fake `tlmgr` that knows `packages`.
    pub fn with_tlmgr(self, packages: &[FakePackage]) -> Result<Self> {
        let dir = self.bin().display().to_string();
        let mut cases = String::new();
        for fake in packages {
            cases.push_str(&format!(
                "      '{file}') printf '%s:\\n\\ttexmf-dist/tex/latex/{package}/{file}\\n' '{package}' ;;\n",
                file = fake.file,
                package = fake.package,
            ));
        }
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> '{dir}/tlmgr.log'\n\
             case \"$1\" in\n\
             \x20 remove) echo 'tlmgr: missing arguments to remove' >&2; exit 1 ;;\n\
             \x20 search)\n\
             \x20   case \"$4\" in\n\
             {cases}\
             \x20   esac\n\
             \x20   exit 0 ;;\n\
             \x20 update) exit 0 ;;\n\
             \x20 install)\n\
             \x20   shift\n\
             \x20   for p in \"$@\"; do touch '{dir}/installed-'\"$p\"; done\n\
             \x20   exit 0 ;;\n\
             esac\n\
             exit 1\n"
        );
        self.write_executable(crate::io::repository::TLMGR, &script)?;
        Ok(self)
    }

    /// Lines in `compiles.log`, one per compiler run.
    pub fn compile_count(&self) -> usize {
        self.read_log("compiles.log").lines().count()
    }

    /// Argument lists `tlmgr` was invoked with.
    pub fn tlmgr_invocations(&self) -> Vec<String> {
        self.read_log("tlmgr.log")
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn read_log(&self, name: &str) -> String {
        fs::read_to_string(self.bin().join(name)).unwrap_or_default()
    }

    fn write_executable(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.bin().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("chmod {}", path.display()))?;
        }
        Ok(path)
    }
}
