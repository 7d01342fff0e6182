//! Solver prompt rendering.

use minijinja::{Environment, context};

use crate::core::types::ProblemStatement;

const SOLVER_TEMPLATE: &str = include_str!("prompts/solver.md");

/// Inputs for the solver prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub problem: &'a ProblemStatement,
    pub result_variable: &'a str,
    pub language: &'a str,
    pub guidelines: &'a str,
}

/// Render the solver prompt for one attempt.
pub fn render_solver_prompt(input: &PromptInputs<'_>) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("solver", SOLVER_TEMPLATE)?;
    let template = env.get_template("solver")?;
    template.render(context! {
        problem => input.problem.text().trim(),
        result_variable => input.result_variable,
        language => input.language,
        guidelines => input.guidelines.trim(),
    })
}
