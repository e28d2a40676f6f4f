//! Stable exit codes for sciloop CLI commands.

/// Command succeeded; for `run`, every detected problem was fixed.
pub const OK: i32 = 0;
/// Command failed due to invalid config/input or other errors.
pub const INVALID: i32 = 1;
/// `sciloop run` finished but escalated at least one problem.
pub const ESCALATED: i32 = 2;
