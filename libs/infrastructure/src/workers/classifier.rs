use planner_core::contracts::{ClassifierRequest, ClassifierResponse};
use planner_core::error::PlannerError;
use planner_core::traits::Classifier;
use rig::providers::gemini;

const PREAMBLE: &str = "You are a financial instrument classifier. Given a list of \
instruments (symbol, display name, and a coarse kind hint), return an asset-class, \
region, and sector breakdown for each. Each breakdown is a map from category name to \
a percentage; percentages for a given instrument must sum to 100, or the map may be \
empty if you cannot classify that instrument with confidence. Respond with JSON only, \
matching this shape: {\"items\": [{\"symbol\": \"...\", \"asset_class_map\": {...}, \
\"region_map\": {...}, \"sector_map\": {...}}]}";

pub struct LlmClassifier {
    agent: rig::agent::Agent<gemini::completion::CompletionModel>,
}

impl LlmClassifier {
    pub fn new(api_key: &str, model_name: &str) -> Self {
        let client = gemini::Client::new(api_key);
        let agent = client.agent(model_name).preamble(PREAMBLE).build();
        Self { agent }
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, request: ClassifierRequest) -> Result<ClassifierResponse, PlannerError> {
        if request.items.is_empty() {
            return Ok(ClassifierResponse::default());
        }

        let body = serde_json::to_string(&request)
            .map_err(|e| PlannerError::internal(format!("failed to serialize classifier request: {e}")))?;
        let prompt = format!("Classify these instruments:\n{body}");

        crate::workers::prompt_for_json(&self.agent, prompt).await
    }
}
