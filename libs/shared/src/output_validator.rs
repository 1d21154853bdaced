//! Validates worker LLM output against its expected Rust type.
//!
//! Workers are expected to return JSON; when a response fails to
//! deserialize, this builds a repair prompt the caller can feed back to the
//! same model for a self-correcting retry rather than failing the attempt
//! outright.

use serde::de::DeserializeOwned;

#[derive(Debug)]
pub enum ValidationResult<T> {
    Valid(T),
    Invalid {
        raw_output: String,
        error_message: String,
        repair_prompt: String,
    },
}

/// Extracts a JSON block from `raw_output` and deserializes it into `T`. On
/// failure, returns a repair prompt describing what went wrong.
pub fn validate_json_output<T: DeserializeOwned>(raw_output: &str) -> ValidationResult<T> {
    let json_str = extract_json_block(raw_output);

    match serde_json::from_str::<T>(&json_str) {
        Ok(parsed) => ValidationResult::Valid(parsed),
        Err(e) => {
            let error_msg = format!("{}", e);
            let repair_prompt = build_repair_prompt(&json_str, &error_msg);
            ValidationResult::Invalid {
                raw_output: raw_output.to_string(),
                error_message: error_msg,
                repair_prompt,
            }
        }
    }
}

/// Pulls a JSON payload out of LLM prose: a fenced ```json block, a bare
/// fenced block, or the first balanced `{...}`/`[...]` span in that order.
fn extract_json_block(raw: &str) -> String {
    if let Some(start) = raw.find("```json") {
        let content_start = start + 7;
        if let Some(end) = raw[content_start..].find("```") {
            return raw[content_start..content_start + end].trim().to_string();
        }
    }

    if let Some(start) = raw.find("```") {
        let content_start = start + 3;
        if let Some(end) = raw[content_start..].find("```") {
            let block = raw[content_start..content_start + end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return block.to_string();
            }
        }
    }

    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }

    if let Some(start) = raw.find('[') {
        if let Some(end) = raw.rfind(']') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }

    raw.trim().to_string()
}

/// Escapes backticks in the offending output before embedding it in a new
/// prompt, so injected fences can't break out of the repair prompt's own
/// code block.
fn build_repair_prompt(invalid_json: &str, error: &str) -> String {
    let safe_json = invalid_json.replace("```", "'''");

    format!(
        "Your previous output failed to parse as JSON. Regenerate it using the \
         information below.\n\
         \n\
         ## Error\n\
         {}\n\
         \n\
         ## Your previous output (invalid)\n\
         ```json\n\
         {}\n\
         ```\n\
         \n\
         ## Rules\n\
         - Output valid JSON **only** — no surrounding prose.\n\
         - Do not put a string in a numeric field.\n\
         - Do not omit required fields.\n\
         - Do not put an object where an array is expected.",
        error, safe_json
    )
}

pub const DEFAULT_MAX_RETRIES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestStruct {
        name: String,
        count: u32,
    }

    #[test]
    fn test_valid_json_parses() {
        let input = r#"{"name": "test", "count": 42}"#;
        match validate_json_output::<TestStruct>(input) {
            ValidationResult::Valid(v) => {
                assert_eq!(v.name, "test");
                assert_eq!(v.count, 42);
            }
            ValidationResult::Invalid { .. } => panic!("Expected Valid"),
        }
    }

    #[test]
    fn test_extracts_json_from_markdown() {
        let input = "Here is the result:\n```json\n{\"name\": \"hello\", \"count\": 10}\n```\nDone!";
        match validate_json_output::<TestStruct>(input) {
            ValidationResult::Valid(v) => {
                assert_eq!(v.name, "hello");
                assert_eq!(v.count, 10);
            }
            ValidationResult::Invalid { .. } => panic!("Expected Valid"),
        }
    }

    #[test]
    fn test_invalid_json_returns_repair_prompt() {
        let input = r#"{"name": "test", "count": "not_a_number"}"#;
        match validate_json_output::<TestStruct>(input) {
            ValidationResult::Invalid { repair_prompt, error_message, .. } => {
                assert!(!repair_prompt.is_empty());
                assert!(!error_message.is_empty());
                assert!(repair_prompt.contains("Regenerate"));
            }
            ValidationResult::Valid(_) => panic!("Expected Invalid"),
        }
    }

    #[test]
    fn test_missing_field_returns_repair_prompt() {
        let input = r#"{"name": "test"}"#;
        match validate_json_output::<TestStruct>(input) {
            ValidationResult::Invalid { error_message, .. } => {
                assert!(error_message.contains("count"));
            }
            ValidationResult::Valid(_) => panic!("Expected Invalid"),
        }
    }

    #[test]
    fn test_extracts_json_from_prose() {
        let input = "The answer is {\"name\": \"embedded\", \"count\": 5} and that's it.";
        match validate_json_output::<TestStruct>(input) {
            ValidationResult::Valid(v) => {
                assert_eq!(v.name, "embedded");
                assert_eq!(v.count, 5);
            }
            ValidationResult::Invalid { .. } => panic!("Expected Valid"),
        }
    }

    #[test]
    fn test_completely_invalid_input() {
        let input = "This is just plain text with no JSON";
        let result = validate_json_output::<TestStruct>(input);
        assert!(matches!(result, ValidationResult::Invalid { .. }));
    }
}
