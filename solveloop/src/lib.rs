//! Self-correcting solve loop.
//!
//! A solver proposes a [`Solution`](core::types::Solution) whose code snippet
//! is run under a hard deadline. Failures and timeouts are fed back to the
//! solver as repair context until a snippet binds its result or the attempt
//! budget runs out. Many problems can be solved at once on a bounded pool.
//!
//! - **[`core`]**: Pure logic (outcome types, repair context, the script
//!   language). No I/O.
//! - **[`io`]**: Side effects (config, processes, prompts, runtimes, the
//!   external solver command).
//!
//! [`executor`], [`repair`], and [`batch`] compose the two into the loop the
//! CLI drives.

pub mod batch;
pub mod core;
pub mod error;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
