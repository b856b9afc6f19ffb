//! I/O adapters for the compile loop.

pub mod compiler;
pub mod config;
pub mod escalation;
pub mod process;
pub mod repository;
pub mod speech;
