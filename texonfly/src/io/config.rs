//! Configuration: optional `texonfly.toml` plus command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::speech::SpeechWhen;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "texonfly.toml";

pub const DEFAULT_COMPILER: &str = "pdflatex";
pub const DEFAULT_ARGUMENTS: &str = "-synctex=1 -interaction=nonstopmode";
pub const DEFAULT_SPEECH_WHEN: &str = "never";

/// Tool configuration (TOML).
///
/// Missing fields take the defaults the command line documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TexonflyConfig {
    /// Compiler executable, relative to `texlive_bin` when that is set.
    pub compiler: String,

    /// Shell-style argument string placed before the document path.
    pub arguments: String,

    /// TeX Live bin directory holding both the compiler and `tlmgr`.
    pub texlive_bin: Option<PathBuf>,

    /// Escalate privileges in the current terminal only.
    pub terminal_only: bool,

    /// When to speak notifications (`always`, `never`, `installing`, `failed`, combinations).
    pub speech_when: String,

    /// If `tlmgr` is missing, compile once without installing anything.
    pub fail_silently: bool,

    /// Kill any external process that runs longer than this. Unset waits forever.
    pub process_timeout_secs: Option<u64>,

    /// Keep at most this many bytes of compiler output for scanning.
    pub compile_output_limit_bytes: usize,

    /// Keep at most this many bytes of `tlmgr search` output.
    pub search_output_limit_bytes: usize,
}

impl Default for TexonflyConfig {
    fn default() -> Self {
        Self {
            compiler: DEFAULT_COMPILER.to_string(),
            arguments: DEFAULT_ARGUMENTS.to_string(),
            texlive_bin: None,
            terminal_only: false,
            speech_when: DEFAULT_SPEECH_WHEN.to_string(),
            fail_silently: false,
            process_timeout_secs: None,
            compile_output_limit_bytes: 64 * 1024 * 1024,
            search_output_limit_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Values given on the command line; `None`/`false` keep the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub compiler: Option<String>,
    pub arguments: Option<String>,
    pub texlive_bin: Option<PathBuf>,
    pub terminal_only: bool,
    pub speech_when: Option<String>,
    pub fail_silently: bool,
    pub process_timeout_secs: Option<u64>,
}

impl TexonflyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.compiler.trim().is_empty() {
            return Err(anyhow!("compiler must not be empty"));
        }
        self.compiler_arguments()?;
        self.speech()?;
        if self.process_timeout_secs == Some(0) {
            return Err(anyhow!("process_timeout_secs must be > 0"));
        }
        if self.compile_output_limit_bytes == 0 {
            return Err(anyhow!("compile_output_limit_bytes must be > 0"));
        }
        if self.search_output_limit_bytes == 0 {
            return Err(anyhow!("search_output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// `arguments` split the way a POSIX shell would.
    pub fn compiler_arguments(&self) -> Result<Vec<String>> {
        shlex::split(&self.arguments)
            .ok_or_else(|| anyhow!("arguments are not valid shell words: {}", self.arguments))
    }

    pub fn speech(&self) -> Result<SpeechWhen> {
        self.speech_when.parse()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Compiler path, inside `texlive_bin` when one is configured.
    pub fn compiler_path(&self) -> PathBuf {
        match &self.texlive_bin {
            Some(dir) => dir.join(&self.compiler),
            None => PathBuf::from(&self.compiler),
        }
    }

    pub fn uses_default_compiler(&self) -> bool {
        self.compiler == DEFAULT_COMPILER
    }
}

/// Apply command-line overrides to the loaded configuration.
pub fn apply_overrides(mut base: TexonflyConfig, overrides: &Overrides) -> Result<TexonflyConfig> {
    if let Some(compiler) = &overrides.compiler {
        base.compiler = compiler.clone();
    }
    if let Some(arguments) = &overrides.arguments {
        base.arguments = arguments.clone();
    }
    if let Some(dir) = &overrides.texlive_bin {
        base.texlive_bin = Some(dir.clone());
    }
    if overrides.terminal_only {
        base.terminal_only = true;
    }
    if let Some(speech_when) = &overrides.speech_when {
        base.speech_when = speech_when.clone();
    }
    if overrides.fail_silently {
        base.fail_silently = true;
    }
    if let Some(secs) = overrides.process_timeout_secs {
        base.process_timeout_secs = Some(secs);
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TexonflyConfig::default()`.
pub fn load_config(path: &Path) -> Result<TexonflyConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = TexonflyConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TexonflyConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
