//! Restricted arithmetic scripting language for in-process snippets.
//!
//! Programs are small statement lists: assignments, `if`/`else`, `while`,
//! and `raise`. The interpreter has no access to the filesystem, network, or
//! host environment; its only output is the final variable environment.

mod eval;
mod lexer;
mod parser;
mod value;

pub use eval::{Environment, ScriptError};
pub use value::ScriptValue;

/// Parse and run `source`, returning the final environment.
///
/// `should_stop` is polled before every loop iteration; when it returns true
/// execution stops with [`ScriptError::Cancelled`].
pub fn execute(source: &str, should_stop: &dyn Fn() -> bool) -> Result<Environment, ScriptError> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse(&tokens)?;
    eval::run(&program, should_stop)
}
