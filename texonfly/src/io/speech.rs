//! Optional spoken notifications.
//!
//! Purely advisory: a missing speech synthesizer or a failed utterance never affects the
//! compile loop.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;

use anyhow::{Result, bail};
use tracing::debug;

/// Synthesizers tried in order; the first one found on `PATH` is used.
const SYNTHESIZERS: &[&str] = &["say", "spd-say", "espeak-ng", "espeak"];

/// When to speak, parsed from `always`, `never`, `installing`, `failed` or a combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeechWhen {
    /// Announce searches and installs.
    pub installing: bool,
    /// Announce unresolvable resources and a failed final compile.
    pub failed: bool,
}

impl SpeechWhen {
    pub const NEVER: SpeechWhen = SpeechWhen {
        installing: false,
        failed: false,
    };

    pub fn any(&self) -> bool {
        self.installing || self.failed
    }
}

impl FromStr for SpeechWhen {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let mut when = SpeechWhen::NEVER;
        for word in value
            .split(|c: char| c == ',' || c == '+' || c.is_whitespace())
            .filter(|word| !word.is_empty())
        {
            match word.to_ascii_lowercase().as_str() {
                "always" => {
                    when.installing = true;
                    when.failed = true;
                }
                "never" => {}
                "installing" => when.installing = true,
                "failed" => when.failed = true,
                other => bail!(
                    "invalid speech setting {other:?} (expected always, never, installing, failed)"
                ),
            }
        }
        Ok(when)
    }
}

/// Speaks short notifications through a system synthesizer.
#[derive(Debug, Clone)]
pub struct Speaker {
    when: SpeechWhen,
    synthesizer: Option<PathBuf>,
}

impl Speaker {
    /// Speaker that locates a synthesizer only if `when` enables any speech.
    pub fn new(when: SpeechWhen) -> Self {
        let synthesizer = if when.any() {
            SYNTHESIZERS.iter().find_map(|name| which::which(name).ok())
        } else {
            None
        };
        debug!(?when, synthesizer = ?synthesizer, "speech configured");
        Self { when, synthesizer }
    }

    pub fn silent() -> Self {
        Self {
            when: SpeechWhen::NEVER,
            synthesizer: None,
        }
    }

    /// Progress while searching for and installing packages.
    pub fn installing(&self, text: &str) {
        if self.when.installing {
            self.say(text);
        }
    }

    /// Something could not be resolved, or the final compile failed.
    pub fn failed(&self, text: &str) {
        if self.when.failed {
            self.say(text);
        }
    }

    fn say(&self, text: &str) {
        let Some(synthesizer) = &self.synthesizer else {
            return;
        };
        let spawned = Command::new(synthesizer)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            // Reap in the background so speech never delays the loop.
            Ok(mut child) => {
                thread::spawn(move || child.wait());
            }
            Err(err) => debug!(err = %err, "speech synthesizer failed to start"),
        }
    }
}
