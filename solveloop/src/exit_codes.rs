//! Stable exit codes for solveloop CLI commands.

/// Command succeeded; every snippet bound its result.
pub const OK: i32 = 0;
/// Invalid usage, config, or invocation.
pub const INVALID: i32 = 1;
/// A snippet failed, or a problem ran out of attempts.
pub const FAILED: i32 = 2;
/// `solveloop exec` hit its deadline.
pub const TIMED_OUT: i32 = 3;
/// The solver command itself failed.
pub const SOLVER_FAILED: i32 = 4;
