use planner_core::contracts::{QualityJudgeRequest, QualityJudgeResponse};
use planner_core::error::PlannerError;
use planner_core::traits::QualityJudge;
use rig::providers::gemini;

const PREAMBLE: &str = "You are a quality judge for financial narratives. Score the given \
text from 0 to 100 on clarity, factual coherence with a typical portfolio review, and \
actionability of its recommendations. Respond with JSON only, matching this shape: \
{\"score\": 0, \"rationale\": \"...\"}";

pub struct LlmQualityJudge {
    agent: rig::agent::Agent<gemini::completion::CompletionModel>,
}

impl LlmQualityJudge {
    pub fn new(api_key: &str, model_name: &str) -> Self {
        let client = gemini::Client::new(api_key);
        let agent = client.agent(model_name).preamble(PREAMBLE).build();
        Self { agent }
    }
}

#[async_trait::async_trait]
impl QualityJudge for LlmQualityJudge {
    async fn judge(&self, request: QualityJudgeRequest) -> Result<QualityJudgeResponse, PlannerError> {
        let prompt = format!("Narrative to score:\n{}", request.text);
        crate::workers::prompt_for_json(&self.agent, prompt).await
    }
}
