//! LLM-backed worker adapters (spec §4.4). Each wraps a `rig-core` Gemini
//! agent with a fixed preamble and turns free-text completions into the
//! typed request/response contracts in `planner_core::contracts`, retrying
//! once against a repair prompt when the model's output doesn't parse.

pub mod classifier;
pub mod narrator;
pub mod projector;
pub mod quality_judge;
pub mod visualizer;

use planner_core::error::PlannerError;
use rig::completion::Prompt;
use shared::output_validator::{validate_json_output, ValidationResult};

/// Runs `prompt` through `agent`, parsing the completion as `T`. On a parse
/// failure, retries once with the model's own repair prompt appended.
pub(crate) async fn prompt_for_json<T: serde::de::DeserializeOwned>(
    agent: &rig::agent::Agent<impl rig::completion::CompletionModel>,
    prompt: String,
) -> Result<T, PlannerError> {
    let first = agent
        .prompt(prompt.as_str())
        .await
        .map_err(|e| PlannerError::transient(format!("worker completion failed: {e}")))?;

    match validate_json_output::<T>(&first) {
        ValidationResult::Valid(parsed) => Ok(parsed),
        ValidationResult::Invalid { repair_prompt, .. } => {
            let repaired = agent
                .prompt(repair_prompt.as_str())
                .await
                .map_err(|e| PlannerError::transient(format!("worker repair completion failed: {e}")))?;

            match validate_json_output::<T>(&repaired) {
                ValidationResult::Valid(parsed) => Ok(parsed),
                ValidationResult::Invalid { error_message, .. } => Err(PlannerError::validation(format!(
                    "worker output did not parse after repair attempt: {error_message}"
                ))),
            }
        }
    }
}
