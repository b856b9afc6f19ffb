//! User-facing progress output.
//!
//! Everything the user is meant to read goes to stdout, interleaved with the compiler's
//! own output, and carries the program name as a prefix. Developer diagnostics go through
//! `tracing` instead (see [`crate::logging`]).

use std::fmt::Display;

/// Prefix for every line printed by this tool.
pub const PROGRAM: &str = "texonfly";

/// Print a progress line.
pub fn notice(message: impl Display) {
    println!("{PROGRAM}: {message}");
}

/// Print a progress line set off by blank lines, for messages that precede a prompt.
pub fn banner(message: impl Display) {
    println!("\n{PROGRAM}: {message}\n");
}
