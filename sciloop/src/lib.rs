//! Scientific debugging loop: DETECT → HYPOTHESIZE → TEST → FIX → VERIFY → EVOLVE.
//!
//! Six deterministic agents turn failure signals into verified fixes and new
//! benchmark tests. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic types and helpers (problems, hypotheses,
//!   fixes, loop state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, input files, artifacts,
//!   process execution). Isolated behind [`io::runner::CommandRunner`] so agents
//!   can be driven by scripted runners in tests.
//!
//! [`orchestrator`] wires the [`agents`] together; [`tracker`] aggregates loop
//! results into improvement history.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tracker;
