//! Prompt templates for every model call the engine makes.
//!
//! Templates are embedded from `prompts/*.md` and rendered with minijinja in
//! strict mode, so a missing variable is an error rather than empty text.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

const DECOMPOSE_TEMPLATE: &str = include_str!("../prompts/decompose.md");
const EXECUTE_TEMPLATE: &str = include_str!("../prompts/execute.md");
const VALIDATE_TEMPLATE: &str = include_str!("../prompts/validate.md");
const AGGREGATE_TEMPLATE: &str = include_str!("../prompts/aggregate.md");
const SELECT_URLS_TEMPLATE: &str = include_str!("../prompts/select_urls.md");
const CHAIN_OF_THOUGHT_TEMPLATE: &str = include_str!("../prompts/chain_of_thought.md");
const CHAIN_ANSWER_TEMPLATE: &str = include_str!("../prompts/chain_answer.md");

pub type PromptResult = Result<String, minijinja::Error>;

fn render_prompt_template<S: Serialize>(name: &str, template: &str, vars: &S) -> PromptResult {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template(name, template)?;
    let output = env.get_template(name)?.render(vars)?;
    Ok(output.replace("\r\n", "\n").trim().to_string())
}

#[derive(Debug, Serialize)]
pub struct DecomposeVars<'a> {
    pub task: &'a str,
    pub context: Option<&'a str>,
    pub max_steps: usize,
    /// Count proposed by the previous attempt; set only on retries.
    pub previous_count: Option<usize>,
}

pub fn decompose(vars: &DecomposeVars<'_>) -> PromptResult {
    render_prompt_template("decompose", DECOMPOSE_TEMPLATE, vars)
}

/// An earlier subtask result shown to later prompts. `index` is 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct PriorResult<'a> {
    pub index: usize,
    pub subtask: &'a str,
    pub response: &'a str,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecuteVars<'a> {
    pub task: &'a str,
    pub subtask: &'a str,
    /// 1-based position of the subtask.
    pub index: usize,
    pub total: usize,
    pub context: Option<&'a str>,
    pub previous: Vec<PriorResult<'a>>,
}

pub fn execute(vars: &ExecuteVars<'_>) -> PromptResult {
    render_prompt_template("execute", EXECUTE_TEMPLATE, vars)
}

#[derive(Debug, Serialize)]
pub struct ValidateVars<'a> {
    pub task: &'a str,
    pub subtask: &'a str,
    pub response: &'a str,
}

pub fn validate(vars: &ValidateVars<'_>) -> PromptResult {
    render_prompt_template("validate", VALIDATE_TEMPLATE, vars)
}

#[derive(Debug, Serialize)]
pub struct AggregateVars<'a> {
    pub task: &'a str,
    pub results: Vec<PriorResult<'a>>,
}

pub fn aggregate(vars: &AggregateVars<'_>) -> PromptResult {
    render_prompt_template("aggregate", AGGREGATE_TEMPLATE, vars)
}

#[derive(Debug, Serialize)]
pub struct SelectUrlsVars<'a> {
    pub query: &'a str,
    pub listing: &'a str,
    pub max_urls: usize,
}

pub fn select_urls(vars: &SelectUrlsVars<'_>) -> PromptResult {
    render_prompt_template("select_urls", SELECT_URLS_TEMPLATE, vars)
}

#[derive(Debug, Serialize)]
pub struct ChainOfThoughtVars<'a> {
    pub question: &'a str,
    pub context: Option<&'a str>,
}

pub fn chain_of_thought(vars: &ChainOfThoughtVars<'_>) -> PromptResult {
    render_prompt_template("chain_of_thought", CHAIN_OF_THOUGHT_TEMPLATE, vars)
}

#[derive(Debug, Serialize)]
pub struct ChainAnswerVars<'a> {
    pub question: &'a str,
    pub reasoning: &'a str,
}

pub fn chain_answer(vars: &ChainAnswerVars<'_>) -> PromptResult {
    render_prompt_template("chain_answer", CHAIN_ANSWER_TEMPLATE, vars)
}
