//! Deterministic, pure logic shared by the solve loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod cancel;
pub mod repair_context;
pub mod script;
pub mod types;
