//! Compile TeX documents while installing missing TeX Live packages on the fly.
//!
//! The compiler is invoked repeatedly. After each run its diagnostics are scanned for
//! missing files and fonts, the first new candidate is resolved to TeX Live packages
//! through `tlmgr search`, those packages are installed (escalating privileges when the
//! current user cannot write to the distribution), and the document is compiled again.
//! The loop stops once no category yields a candidate that has not already been acted on.
//!
//! - **[`core`]**: Pure, deterministic logic (diagnostic scanning, search-result parsing,
//!   iteration memory). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, `tlmgr`, privilege
//!   escalation, speech, configuration). Traits at the seams enable scripted doubles.
//!
//! Orchestration modules ([`resolve`], [`install`], [`looping`], [`start`]) coordinate
//! core logic with I/O to implement the command.

pub mod console;
pub mod core;
pub mod exit_codes;
pub mod install;
pub mod io;
pub mod logging;
pub mod looping;
pub mod resolve;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
