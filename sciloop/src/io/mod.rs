//! I/O helpers: configuration, input, artifacts, and command execution.

pub mod config;
pub mod history;
pub mod init;
pub mod input;
pub mod iteration_log;
pub mod process;
pub mod runner;
pub mod storage;
