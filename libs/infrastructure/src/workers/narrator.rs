use guard::text_guard::{Guard, ValidationResult as GuardResult};
use planner_core::contracts::{NarratorRequest, NarratorResponse};
use planner_core::error::PlannerError;
use planner_core::traits::Narrator;
use rig::providers::gemini;

const PREAMBLE: &str = "You are a financial planning narrator. Given a portfolio snapshot \
and an optional risk profile, write a plain-language narrative covering the portfolio's \
current allocation, concentration risks, and concrete recommendations. The narrative must \
contain three headings, in order: 'Executive Summary', 'Risks', and 'Recommendations'. \
Respond with JSON only, matching this shape: {\"text\": \"...\"}";

pub struct LlmNarrator {
    agent: rig::agent::Agent<gemini::completion::CompletionModel>,
    guard: Guard,
}

impl LlmNarrator {
    pub fn new(api_key: &str, model_name: &str) -> Self {
        let client = gemini::Client::new(api_key);
        let agent = client.agent(model_name).preamble(PREAMBLE).build();
        Self { agent, guard: Guard::new() }
    }
}

#[async_trait::async_trait]
impl Narrator for LlmNarrator {
    async fn narrate(&self, request: NarratorRequest) -> Result<NarratorResponse, PlannerError> {
        let mut sanitized_notes = Vec::with_capacity(request.profile.context_notes.len());
        for note in &request.profile.context_notes {
            match self.guard.analyze(note) {
                GuardResult::Valid => sanitized_notes.push(self.guard.sanitize(note)),
                GuardResult::Blocked(reason) => {
                    tracing::warn!(%reason, "dropped context note flagged by the text guard");
                }
            }
        }

        let snapshot_json = serde_json::to_string(&request.snapshot)
            .map_err(|e| PlannerError::internal(format!("failed to serialize snapshot: {e}")))?;
        let prompt = format!(
            "Portfolio snapshot:\n{snapshot_json}\n\nRisk profile: {}\n\nContext notes:\n{}",
            request.profile.risk_profile.as_deref().unwrap_or("unspecified"),
            sanitized_notes.join("\n"),
        );

        crate::workers::prompt_for_json(&self.agent, prompt).await
    }
}
