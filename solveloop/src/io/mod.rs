//! I/O helpers: configuration, child processes, snippet runtimes, and the solver boundary.

pub mod config;
pub mod process;
pub mod prompt;
pub mod runtime;
pub mod solver;
