//! Free-text validation and sanitization for boundaries where untrusted
//! text reaches an LLM-backed worker: user-profile notes and
//! embedding-derived narrative context.

pub mod guardrails;
pub mod text_guard;
