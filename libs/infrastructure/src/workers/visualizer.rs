use planner_core::contracts::{VisualizerRequest, VisualizerResponse};
use planner_core::error::PlannerError;
use planner_core::traits::Visualizer;
use rig::providers::gemini;

const PREAMBLE: &str = "You are a portfolio chart planner. Given a portfolio snapshot, \
propose between 4 and 8 charts that best illustrate its composition and risk. Each chart \
has a title, a chart_type from {pie, donut, bar, horizontal_bar, line}, and a data series \
of (label, value) pairs drawn from the snapshot's weight maps. Respond with JSON only, \
matching this shape: {\"charts\": [{\"title\": \"...\", \"chart_type\": \"pie\", \"data\": \
[[\"Equity\", 60.0]]}]}";

pub struct LlmVisualizer {
    agent: rig::agent::Agent<gemini::completion::CompletionModel>,
}

impl LlmVisualizer {
    pub fn new(api_key: &str, model_name: &str) -> Self {
        let client = gemini::Client::new(api_key);
        let agent = client.agent(model_name).preamble(PREAMBLE).build();
        Self { agent }
    }
}

#[async_trait::async_trait]
impl Visualizer for LlmVisualizer {
    async fn visualize(&self, request: VisualizerRequest) -> Result<VisualizerResponse, PlannerError> {
        let snapshot_json = serde_json::to_string(&request.snapshot)
            .map_err(|e| PlannerError::internal(format!("failed to serialize snapshot: {e}")))?;
        let prompt = format!("Portfolio snapshot:\n{snapshot_json}");

        crate::workers::prompt_for_json(&self.agent, prompt).await
    }
}
