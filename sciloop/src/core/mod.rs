//! Deterministic, pure logic shared by the loop agents.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod ids;
pub mod keywords;
pub mod signals;
pub mod state;
pub mod types;
