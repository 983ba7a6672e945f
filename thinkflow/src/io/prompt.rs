//! Prompt rendering for the generator and evaluator.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const GENERATOR_SYSTEM: &str = include_str!("prompts/generator_system.md");
const GENERATOR_USER: &str = include_str!("prompts/generator_user.md");
const EVALUATOR_SYSTEM: &str = include_str!("prompts/evaluator_system.md");
const EVALUATOR_USER: &str = include_str!("prompts/evaluator_user.md");

/// A rendered system/user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("generator_user", GENERATOR_USER)
            .expect("generator template should be valid");
        env.add_template("evaluator_user", EVALUATOR_USER)
            .expect("evaluator template should be valid");
        Self { env }
    }

    pub fn render_generator(&self, problem: &str, k: usize) -> Result<Prompt> {
        let user = self
            .env
            .get_template("generator_user")?
            .render(context! { problem => problem.trim(), k => k })
            .context("render generator prompt")?;
        Ok(Prompt {
            system: GENERATOR_SYSTEM.trim().to_string(),
            user,
        })
    }

    pub fn render_evaluator(&self, problem: &str, thought: &str) -> Result<Prompt> {
        let user = self
            .env
            .get_template("evaluator_user")?
            .render(context! { problem => problem.trim(), thought => thought.trim() })
            .context("render evaluator prompt")?;
        Ok(Prompt {
            system: EVALUATOR_SYSTEM.trim().to_string(),
            user,
        })
    }
}
