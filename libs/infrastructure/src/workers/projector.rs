use planner_core::contracts::{ProjectorRequest, ProjectorResponse};
use planner_core::error::PlannerError;
use planner_core::traits::Projector;
use rig::providers::gemini;

const PREAMBLE: &str = "You are a retirement projection engine. Given a portfolio snapshot, \
a retirement horizon in years, and an annual income target, estimate a success probability \
(0.0-1.0), a milestone schedule (label, year, projected value), and a short narrative \
explaining the projection. Respond with JSON only, matching this shape: \
{\"success_probability\": 0.0, \"milestones\": [{\"label\": \"...\", \"year\": 2030, \
\"projected_value\": 0.0}], \"narrative\": \"...\"}";

pub struct LlmProjector {
    agent: rig::agent::Agent<gemini::completion::CompletionModel>,
}

impl LlmProjector {
    pub fn new(api_key: &str, model_name: &str) -> Self {
        let client = gemini::Client::new(api_key);
        let agent = client.agent(model_name).preamble(PREAMBLE).build();
        Self { agent }
    }
}

#[async_trait::async_trait]
impl Projector for LlmProjector {
    async fn project(&self, request: ProjectorRequest) -> Result<ProjectorResponse, PlannerError> {
        let snapshot_json = serde_json::to_string(&request.snapshot)
            .map_err(|e| PlannerError::internal(format!("failed to serialize snapshot: {e}")))?;
        let prompt = format!(
            "Portfolio snapshot:\n{snapshot_json}\n\nRetirement horizon (years): {}\nAnnual income target: {}",
            request.retirement_horizon_years, request.annual_income_target,
        );

        crate::workers::prompt_for_json(&self.agent, prompt).await
    }
}
