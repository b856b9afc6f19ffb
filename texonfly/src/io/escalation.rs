//! Privilege escalation: run a command with elevated rights, given a justification.
//!
//! Environment detection is kept pure ([`plan`]) so the choice of methods can be tested
//! without a desktop session. [`SystemEscalator`] tries each planned method in turn and
//! reports [`EscalationError`] only when none of them could run the command.
//!
//! Credentials are never seen by this process: every method prompts on its own surface
//! (an authentication agent, a terminal owned by `sudo`, or a freshly spawned terminal).
//! Methods that run outside our terminal record the elevated command's exit status in a
//! private temp file; an empty file means authorization was refused.

use std::fmt;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::console;
use crate::io::process::run_command_inherited;

/// Graphical authentication front-ends, in order of preference.
const GRAPHICAL_TOOLS: &[&str] = &["pkexec", "gksudo", "kdesudo"];

/// Name of the file elevated scripts write their exit status to.
const STATUS_FILE: &str = "status";

/// Exit status of the terminal script when `sudo` refuses to authenticate.
const REFUSED_STATUS: i32 = 126;

/// Known terminal emulators in order of preference.
const KNOWN_TERMINALS: &[TerminalKind] = &[
    TerminalKind::Kitty,
    TerminalKind::Alacritty,
    TerminalKind::WezTerm,
    TerminalKind::Foot,
    TerminalKind::Konsole,
    TerminalKind::GnomeTerminal,
    TerminalKind::Xterm,
];

/// Escalation could not run the command by any method.
#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("no privilege escalation method is available")]
    NoMethod,
    #[error("all privilege escalation attempts have failed ({})", .attempts.join("; "))]
    AllAttemptsFailed { attempts: Vec<String> },
}

/// Capability to run a command with elevated rights.
pub trait Escalator {
    /// Run `command` elevated after showing `justification` to the user.
    ///
    /// Returns an [`EscalationError`] (inside `anyhow::Error`) when no method could run
    /// the command. A command that ran but exited non-zero is not an escalation failure.
    fn run_elevated(&self, command: &[String], justification: &str) -> Result<()>;
}

/// Supported terminal emulators with their spawn conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Kitty,
    Alacritty,
    WezTerm,
    Foot,
    GnomeTerminal,
    Konsole,
    Xterm,
    /// Generic terminal using -e flag convention.
    Generic,
}

impl TerminalKind {
    pub fn executable(&self) -> &'static str {
        match self {
            TerminalKind::Kitty => "kitty",
            TerminalKind::Alacritty => "alacritty",
            TerminalKind::WezTerm => "wezterm",
            TerminalKind::Foot => "foot",
            TerminalKind::GnomeTerminal => "gnome-terminal",
            TerminalKind::Konsole => "konsole",
            TerminalKind::Xterm => "xterm",
            TerminalKind::Generic => "x-terminal-emulator",
        }
    }

    fn from_name(name: &str) -> Self {
        KNOWN_TERMINALS
            .iter()
            .copied()
            .find(|kind| name.contains(kind.executable()))
            .unwrap_or(TerminalKind::Generic)
    }

    /// Build a command that opens this terminal running `program` with `args`.
    pub fn build_command(&self, executable: &str, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(executable);
        match self {
            TerminalKind::Kitty
            | TerminalKind::Alacritty
            | TerminalKind::Konsole
            | TerminalKind::Xterm
            | TerminalKind::Generic => {
                cmd.arg("-e").arg(program).args(args);
            }
            TerminalKind::WezTerm => {
                cmd.arg("start").arg("--").arg(program).args(args);
            }
            TerminalKind::Foot => {
                cmd.arg(program).args(args);
            }
            TerminalKind::GnomeTerminal => {
                // Block until the tab closes so the install finishes before we recompile.
                cmd.arg("--wait").arg("--").arg(program).args(args);
            }
        }
        cmd
    }
}

/// One way of obtaining elevated rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Graphical authentication agent such as `pkexec`.
    Graphical(PathBuf),
    /// `sudo` in the current terminal.
    Sudo,
    /// `sudo` inside a newly spawned terminal emulator.
    NewTerminal { kind: TerminalKind, executable: String },
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Graphical(tool) => write!(f, "{}", tool.display()),
            Method::Sudo => write!(f, "sudo"),
            Method::NewTerminal { executable, .. } => write!(f, "sudo in {executable}"),
        }
    }
}

/// Facts about the session that decide which methods can work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Escalation must happen in the current terminal.
    pub terminal_only: bool,
    /// A graphical session is available (`DISPLAY` or `WAYLAND_DISPLAY`).
    pub graphical: bool,
    /// Stdin is a terminal, so `sudo` can prompt here.
    pub interactive: bool,
    /// Preferred terminal from `$TERMINAL`.
    pub preferred_terminal: Option<String>,
}

impl Environment {
    pub fn detect(terminal_only: bool) -> Self {
        let set = |name: &str| std::env::var_os(name).is_some_and(|value| !value.is_empty());
        Self {
            terminal_only,
            graphical: set("DISPLAY") || set("WAYLAND_DISPLAY"),
            interactive: std::io::stdin().is_terminal(),
            preferred_terminal: std::env::var("TERMINAL").ok().filter(|t| !t.is_empty()),
        }
    }
}

/// Choose escalation methods for `env`, most preferred first.
///
/// `available` resolves an executable name to its path, or `None` if it is not installed.
pub fn plan(env: &Environment, available: impl Fn(&str) -> Option<PathBuf>) -> Vec<Method> {
    let mut methods = Vec::new();
    let desktop = env.graphical && !env.terminal_only;

    if desktop {
        methods.extend(
            GRAPHICAL_TOOLS
                .iter()
                .filter_map(|tool| available(*tool))
                .map(Method::Graphical),
        );
    }
    if (env.interactive || env.terminal_only) && available("sudo").is_some() {
        methods.push(Method::Sudo);
    }
    if desktop
        && !env.interactive
        && available("sudo").is_some()
        && let Some(method) = detect_terminal(env, &available)
    {
        methods.push(method);
    }
    methods
}

/// Checks `$TERMINAL` first, then known terminals on PATH.
fn detect_terminal(
    env: &Environment,
    available: &impl Fn(&str) -> Option<PathBuf>,
) -> Option<Method> {
    if let Some(name) = &env.preferred_terminal
        && available(name.as_str()).is_some()
    {
        return Some(Method::NewTerminal {
            kind: TerminalKind::from_name(name),
            executable: name.clone(),
        });
    }
    KNOWN_TERMINALS
        .iter()
        .find(|kind| available(kind.executable()).is_some())
        .map(|kind| Method::NewTerminal {
            kind: *kind,
            executable: kind.executable().to_string(),
        })
}

/// Escalator backed by the host's `pkexec`/`sudo`/terminal emulators.
#[derive(Debug, Clone)]
pub struct SystemEscalator {
    pub methods: Vec<Method>,
    /// Maximum time to wait for one attempt; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl SystemEscalator {
    /// Plan methods for the current session using executables found on `PATH`.
    pub fn detect(terminal_only: bool, timeout: Option<Duration>) -> Self {
        let env = Environment::detect(terminal_only);
        let methods = plan(&env, |name| which::which(name).ok());
        debug!(?env, ?methods, "planned privilege escalation");
        Self { methods, timeout }
    }

    fn attempt(&self, method: &Method, command: &[String], justification: &str) -> Result<()> {
        match method {
            Method::Graphical(tool) => {
                let status_dir = tempfile::tempdir().context("create escalation status dir")?;
                let status_file = status_dir.path().join(STATUS_FILE);
                let mut cmd = Command::new(tool);
                // pkexec takes the program directly; the sudo front-ends parse options.
                if !tool.ends_with("pkexec") {
                    cmd.arg("--");
                }
                cmd.arg("sh")
                    .arg("-c")
                    .arg(recording_script(command, &status_file)?);
                let outcome = run_command_inherited(cmd, self.timeout)?;
                if outcome.timed_out {
                    bail!("timed out");
                }
                let code = read_elevated_status(&status_file)?;
                report_command_status(Some(code));
                Ok(())
            }
            Method::Sudo => {
                let mut validate = Command::new("sudo");
                validate.arg("-v");
                let outcome = run_command_inherited(validate, self.timeout)?;
                if outcome.timed_out || !outcome.status.success() {
                    bail!("authentication failed");
                }
                let mut cmd = Command::new("sudo");
                cmd.arg("--").args(command);
                let outcome = run_command_inherited(cmd, self.timeout)?;
                if outcome.timed_out {
                    bail!("timed out");
                }
                report_command_status(outcome.status.code());
                Ok(())
            }
            Method::NewTerminal { kind, executable } => {
                let status_dir = tempfile::tempdir().context("create escalation status dir")?;
                let status_file = status_dir.path().join(STATUS_FILE);
                let script = terminal_script(command, justification, &status_file)?;
                let cmd = kind.build_command(executable, "sh", &["-c", script.as_str()]);
                let outcome = run_command_inherited(cmd, self.timeout)?;
                if outcome.timed_out {
                    bail!("timed out");
                }
                // Terminal emulators do not reliably pass on the exit status of their child.
                let code = read_elevated_status(&status_file)?;
                report_command_status(Some(code));
                Ok(())
            }
        }
    }
}

impl Escalator for SystemEscalator {
    #[instrument(skip_all, fields(methods = self.methods.len()))]
    fn run_elevated(&self, command: &[String], justification: &str) -> Result<()> {
        if self.methods.is_empty() {
            return Err(EscalationError::NoMethod.into());
        }
        console::banner(justification);
        debug!(command = ?command, "running elevated");

        let mut attempts = Vec::new();
        for method in &self.methods {
            info!(%method, "attempting privilege escalation");
            match self.attempt(method, command, justification) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        %method,
                        err = %format!("{err:#}"),
                        "privilege escalation attempt failed"
                    );
                    attempts.push(format!("{method}: {err:#}"));
                }
            }
        }
        Err(EscalationError::AllAttemptsFailed { attempts }.into())
    }
}

/// `command` followed by writing its exit status to `status_file`.
///
/// Runs under the graphical front-end, so the file stays empty when authorization is
/// refused or cancelled.
fn recording_script(command: &[String], status_file: &Path) -> Result<String> {
    let command = shlex::try_join(command.iter().map(String::as_str)).context("quote command")?;
    let file = quote_path(status_file)?;
    Ok(format!("{command}; printf '%s\\n' \"$?\" > {file}"))
}

/// Shell script run inside a new terminal: explain, escalate, record the status and wait
/// before closing. Exits 126 without touching `status_file` when `sudo` refuses.
fn terminal_script(
    command: &[String],
    justification: &str,
    status_file: &Path,
) -> Result<String> {
    let message = shlex::try_quote(justification).context("quote justification")?;
    let command = shlex::try_join(command.iter().map(String::as_str)).context("quote command")?;
    let file = quote_path(status_file)?;
    Ok(format!(
        "printf '%s\\n\\n' {message}; status={REFUSED_STATUS}; \
         if sudo -v; then sudo -- {command}; status=$?; \
         printf '%s\\n' \"$status\" > {file}; fi; \
         printf '\\nPress Enter to close. '; read _; exit \"$status\""
    ))
}

fn quote_path(path: &Path) -> Result<String> {
    let path = path.to_string_lossy();
    Ok(shlex::try_quote(&path)
        .context("quote status file")?
        .into_owned())
}

fn read_elevated_status(status_file: &Path) -> Result<i32> {
    // A missing file means the elevated command never ran.
    let contents = fs::read_to_string(status_file).unwrap_or_default();
    parse_elevated_status(&contents)
}

/// Exit status of the elevated command as recorded in the status file.
fn parse_elevated_status(contents: &str) -> Result<i32> {
    let status = contents.trim();
    if status.is_empty() {
        bail!("authorization refused or cancelled");
    }
    status
        .parse()
        .with_context(|| format!("unexpected elevated status {status:?}"))
}

fn report_command_status(code: Option<i32>) {
    if code != Some(0) {
        warn!(exit_code = ?code, "elevated command failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(terminal_only: bool, graphical: bool, interactive: bool) -> Environment {
        Environment {
            terminal_only,
            graphical,
            interactive,
            preferred_terminal: None,
        }
    }

    fn installed(names: &'static [&'static str]) -> impl Fn(&str) -> Option<PathBuf> {
        move |name: &str| {
            names
                .iter()
                .any(|installed| *installed == name)
                .then(|| PathBuf::from(format!("/usr/bin/{name}")))
        }
    }

    #[test]
    fn desktop_prefers_graphical_then_sudo() {
        let methods = plan(&env(false, true, true), installed(&["pkexec", "sudo", "xterm"]));
        assert_eq!(
            methods,
            vec![Method::Graphical(PathBuf::from("/usr/bin/pkexec")), Method::Sudo]
        );
    }

    #[test]
    fn terminal_only_never_leaves_the_terminal() {
        let methods = plan(&env(true, true, false), installed(&["pkexec", "sudo", "xterm"]));
        assert_eq!(methods, vec![Method::Sudo]);
    }

    #[test]
    fn non_interactive_desktop_falls_back_to_new_terminal() {
        let methods = plan(&env(false, true, false), installed(&["sudo", "xterm", "kitty"]));
        assert_eq!(
            methods,
            vec![Method::NewTerminal {
                kind: TerminalKind::Kitty,
                executable: "kitty".to_string(),
            }]
        );
    }

    #[test]
    fn preferred_terminal_wins() {
        let mut session = env(false, true, false);
        session.preferred_terminal = Some("wezterm".to_string());
        let methods = plan(&session, installed(&["sudo", "wezterm", "xterm"]));
        assert_eq!(
            methods,
            vec![Method::NewTerminal {
                kind: TerminalKind::WezTerm,
                executable: "wezterm".to_string(),
            }]
        );
    }

    #[test]
    fn headless_without_tty_has_no_method() {
        assert!(plan(&env(false, false, false), installed(&["sudo", "pkexec"])).is_empty());
    }

    #[test]
    fn no_method_is_an_escalation_error() {
        let escalator = SystemEscalator {
            methods: Vec::new(),
            timeout: None,
        };
        let err = escalator
            .run_elevated(&["tlmgr".to_string()], "why")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EscalationError>(),
            Some(EscalationError::NoMethod)
        ));
    }

    #[test]
    fn terminal_script_quotes_everything() {
        let command = vec!["/opt/tex live/tlmgr".to_string(), "install".to_string()];
        let script = terminal_script(&command, "Installing 'foo'", Path::new("/tmp/a b/status"))
            .expect("script");
        let quoted = script
            .split_once("sudo -- ")
            .and_then(|(_, rest)| rest.split_once("; status="))
            .map(|(quoted, _)| quoted)
            .expect("sudo invocation");
        assert_eq!(shlex::split(quoted), Some(command));
        assert!(script.contains("Installing"));
        assert!(script.contains("a b/status"));
    }

    #[test]
    fn empty_status_means_refused() {
        assert!(parse_elevated_status("").is_err());
        assert!(parse_elevated_status("\n").is_err());
        assert_eq!(parse_elevated_status("0\n").expect("status"), 0);
        assert_eq!(parse_elevated_status("3\n").expect("status"), 3);
        assert!(parse_elevated_status("garbage").is_err());
    }

    #[cfg(unix)]
    mod scripts {
        use std::os::unix::fs::PermissionsExt;
        use std::process::Stdio;

        use super::*;

        /// Directory holding a fake `sudo` with the given body, to put first on `PATH`.
        fn fake_sudo(body: &str) -> tempfile::TempDir {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("sudo");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write sudo");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
            dir
        }

        fn run_script(script: &str, sudo_dir: &Path) -> Option<i32> {
            let path = std::env::var("PATH").unwrap_or_default();
            Command::new("sh")
                .arg("-c")
                .arg(script)
                .env("PATH", format!("{}:{path}", sudo_dir.display()))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .status()
                .expect("run script")
                .code()
        }

        #[test]
        fn refused_sudo_fails_the_terminal_script() {
            let sudo = fake_sudo("exit 1");
            let status_dir = tempfile::tempdir().expect("tempdir");
            let status_file = status_dir.path().join(STATUS_FILE);
            let script =
                terminal_script(&["true".to_string()], "why", &status_file).expect("script");

            assert_eq!(run_script(&script, sudo.path()), Some(REFUSED_STATUS));
            assert!(read_elevated_status(&status_file).is_err());
        }

        #[test]
        fn terminal_script_records_command_status() {
            let sudo = fake_sudo("if [ \"$1\" = -v ]; then exit 0; fi\nshift\nexec \"$@\"");
            let status_dir = tempfile::tempdir().expect("tempdir");
            let status_file = status_dir.path().join(STATUS_FILE);
            let command = ["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
            let script = terminal_script(&command, "why", &status_file).expect("script");

            assert_eq!(run_script(&script, sudo.path()), Some(3));
            assert_eq!(read_elevated_status(&status_file).expect("status"), 3);
        }

        #[test]
        fn recording_script_writes_status() {
            let status_dir = tempfile::tempdir().expect("tempdir");
            let status_file = status_dir.path().join(STATUS_FILE);
            let script = recording_script(&["false".to_string()], &status_file).expect("script");

            let status = Command::new("sh")
                .arg("-c")
                .arg(&script)
                .status()
                .expect("run script");
            assert!(status.success());
            assert_eq!(read_elevated_status(&status_file).expect("status"), 1);
        }
    }

    #[test]
    fn terminal_commands_follow_each_convention() {
        let cmd = TerminalKind::WezTerm.build_command("wezterm", "sh", &["-c", "true"]);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["start", "--", "sh", "-c", "true"]);

        let cmd = TerminalKind::Xterm.build_command("xterm", "sh", &["-c", "true"]);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["-e", "sh", "-c", "true"]);
    }
}
