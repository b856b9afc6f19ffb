//! Deterministic, pure logic shared by the compile loop.
//!
//! Core modules must be free of I/O side effects. They operate on captured text and
//! in-memory state and return deterministic outputs suitable for tests.

pub mod memory;
pub mod scanner;
pub mod search;
pub mod types;
