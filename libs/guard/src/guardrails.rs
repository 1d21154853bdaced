//! Thin convenience wrappers over `text_guard::Guard` for call sites that
//! don't need to configure it further.

use crate::text_guard::{Guard, ValidationResult};

pub fn validate_input(input: &str) -> ValidationResult {
    Guard::new().analyze(input)
}

pub fn validate_input_with_max_len(input: &str, max_len: usize) -> ValidationResult {
    Guard::new().max_len(max_len).analyze(input)
}
