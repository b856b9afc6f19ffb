//! `texonfly`: compile a TeX document, installing missing TeX Live packages on the fly.

use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use texonfly::exit_codes;
use texonfly::io::config::{DEFAULT_CONFIG_FILE, Overrides, apply_overrides, load_config};
use texonfly::io::repository::RepositoryMissing;
use texonfly::{logging, start};

#[derive(Parser, Debug)]
#[command(
    name = "texonfly",
    version,
    about = "Compile a TeX document, installing missing TeX Live packages on the fly"
)]
struct Cli {
    /// Document to compile.
    document: String,

    /// TeX engine to run [default: pdflatex].
    #[arg(short, long)]
    compiler: Option<String>,

    /// Arguments passed to the compiler before the document
    /// [default: "-synctex=1 -interaction=nonstopmode"].
    #[arg(short, long, allow_hyphen_values = true)]
    arguments: Option<String>,

    /// Custom TeX Live bin directory holding the compiler and tlmgr.
    #[arg(long, alias = "texlive_bin", value_name = "DIR")]
    texlive_bin: Option<PathBuf>,

    /// Only escalate privileges from this terminal (no graphical prompts or new windows).
    #[arg(long)]
    terminal_only: bool,

    /// When to speak notifications: always, never, installing, failed, or a combination.
    #[arg(short, long, value_name = "WHEN")]
    speech_when: Option<String>,

    /// If tlmgr cannot be found, compile once without installing anything.
    #[arg(short, long)]
    fail_silently: bool,

    /// Kill any external process that runs longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Configuration file.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            compiler: self.compiler.clone(),
            arguments: self.arguments.clone(),
            texlive_bin: self.texlive_bin.clone(),
            terminal_only: self.terminal_only,
            speech_when: self.speech_when.clone(),
            fail_silently: self.fail_silently,
            process_timeout_secs: self.timeout_secs,
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if let Some(missing) = err.downcast_ref::<RepositoryMissing>() {
                Cli::command().error(ErrorKind::Io, missing).exit();
            }
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FATAL);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let config = apply_overrides(load_config(&cli.config)?, &cli.overrides())?;
    start::run(&config, &cli.document)
}
