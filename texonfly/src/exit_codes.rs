//! Stable exit codes used when no compiler status is available.
//!
//! Once the compiler has run at least once, its last exit status is propagated instead.

/// Command succeeded.
pub const OK: i32 = 0;
/// Startup failed (compiler could not be launched, invalid configuration) or the
/// compiler was terminated without an exit code.
pub const FATAL: i32 = 1;
