use serde::{Deserialize, Serialize};

/// Process-wide configuration for the orchestrator core (spec §6). Resolved
/// once at process start and passed by value/`Arc` into the Orchestrator —
/// no singletons.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Wall-clock budget per `handle` call, in milliseconds.
    pub job_timeout_ms: u64,
    /// Per-attempt deadline for a worker call, in milliseconds.
    pub worker_timeout_ms: u64,
    /// Cap on attempts for a required worker.
    pub worker_max_attempts: u32,

    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub backoff_cap_ms: u64,
    pub backoff_jitter: f64,

    /// Minimum Narrator quality score; one regeneration is attempted below
    /// threshold, then the result is accepted regardless.
    pub judge_threshold: u8,
    pub chart_count_min: usize,
    pub chart_count_max: usize,

    /// Redelivery count beyond which a message is treated as poison.
    pub poison_attempt_threshold: u32,

    pub price_batch_size: usize,
    pub price_budget_ms: u64,

    /// Case-insensitively matched section headings the Narrator's output
    /// must contain (left as configuration rather than a hard-coded
    /// constant, per the Narrator validation open question).
    pub narrator_required_headings: Vec<String>,

    pub database_url: String,
    pub market_oracle_url: String,

    /// How often the queue consumer loop polls for new messages.
    pub queue_poll_interval_ms: u64,
    /// In-flight messages whose heartbeat is older than this are reclaimed.
    pub zombie_reclaim_minutes: i64,

    pub gemini_api_key: String,
}

impl std::fmt::Debug for PlannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerConfig")
            .field("job_timeout_ms", &self.job_timeout_ms)
            .field("worker_timeout_ms", &self.worker_timeout_ms)
            .field("worker_max_attempts", &self.worker_max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_factor", &self.backoff_factor)
            .field("backoff_cap_ms", &self.backoff_cap_ms)
            .field("backoff_jitter", &self.backoff_jitter)
            .field("judge_threshold", &self.judge_threshold)
            .field("chart_count_min", &self.chart_count_min)
            .field("chart_count_max", &self.chart_count_max)
            .field("poison_attempt_threshold", &self.poison_attempt_threshold)
            .field("price_batch_size", &self.price_batch_size)
            .field("price_budget_ms", &self.price_budget_ms)
            .field("narrator_required_headings", &self.narrator_required_headings)
            .field("database_url", &self.database_url)
            .field("market_oracle_url", &self.market_oracle_url)
            .field("queue_poll_interval_ms", &self.queue_poll_interval_ms)
            .field("zombie_reclaim_minutes", &self.zombie_reclaim_minutes)
            .field("gemini_api_key", if self.gemini_api_key.is_empty() { &"" } else { &"***" })
            .finish()
    }
}

impl PlannerConfig {
    /// Loads configuration from defaults, then an optional `config.toml`,
    /// then `PLANNER_`-prefixed environment variables, in that order.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("job_timeout_ms", 300_000)?
            .set_default("worker_timeout_ms", 60_000)?
            .set_default("worker_max_attempts", 3)?
            .set_default("backoff_base_ms", 500)?
            .set_default("backoff_factor", 2.0)?
            .set_default("backoff_cap_ms", 8_000)?
            .set_default("backoff_jitter", 0.2)?
            .set_default("judge_threshold", 60)?
            .set_default("chart_count_min", 4)?
            .set_default("chart_count_max", 8)?
            .set_default("poison_attempt_threshold", 5)?
            .set_default("price_batch_size", 100)?
            .set_default("price_budget_ms", 20_000)?
            .set_default(
                "narrator_required_headings",
                vec!["Executive Summary", "Risks", "Recommendations"],
            )?
            .set_default(
                "database_url",
                std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://planner.db".to_string()),
            )?
            .set_default(
                "market_oracle_url",
                std::env::var("MARKET_ORACLE_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:9001".to_string()),
            )?
            .set_default("queue_poll_interval_ms", 500)?
            .set_default("zombie_reclaim_minutes", 5)?
            .set_default(
                "gemini_api_key",
                std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            )?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("PLANNER"))
            .build()?;

        settings.try_deserialize()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::load().unwrap_or_else(|_| Self {
            job_timeout_ms: 300_000,
            worker_timeout_ms: 60_000,
            worker_max_attempts: 3,
            backoff_base_ms: 500,
            backoff_factor: 2.0,
            backoff_cap_ms: 8_000,
            backoff_jitter: 0.2,
            judge_threshold: 60,
            chart_count_min: 4,
            chart_count_max: 8,
            poison_attempt_threshold: 5,
            price_batch_size: 100,
            price_budget_ms: 20_000,
            narrator_required_headings: vec![
                "Executive Summary".to_string(),
                "Risks".to_string(),
                "Recommendations".to_string(),
            ],
            database_url: "sqlite://planner.db".to_string(),
            market_oracle_url: "http://127.0.0.1:9001".to_string(),
            queue_poll_interval_ms: 500,
            zombie_reclaim_minutes: 5,
            gemini_api_key: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_load_defaults() {
        let config = PlannerConfig::default();
        assert_eq!(config.job_timeout_ms, 300_000);
        assert_eq!(config.worker_max_attempts, 3);
        assert_eq!(
            config.narrator_required_headings,
            vec!["Executive Summary", "Risks", "Recommendations"]
        );
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "job_timeout_ms = 120000").unwrap();
        writeln!(file, "worker_timeout_ms = 30000").unwrap();
        writeln!(file, "worker_max_attempts = 5").unwrap();
        writeln!(file, "backoff_base_ms = 500").unwrap();
        writeln!(file, "backoff_factor = 2.0").unwrap();
        writeln!(file, "backoff_cap_ms = 8000").unwrap();
        writeln!(file, "backoff_jitter = 0.2").unwrap();
        writeln!(file, "judge_threshold = 60").unwrap();
        writeln!(file, "chart_count_min = 4").unwrap();
        writeln!(file, "chart_count_max = 8").unwrap();
        writeln!(file, "poison_attempt_threshold = 5").unwrap();
        writeln!(file, "price_batch_size = 100").unwrap();
        writeln!(file, "price_budget_ms = 20000").unwrap();
        writeln!(file, "narrator_required_headings = [\"Executive Summary\", \"Risks\", \"Recommendations\"]").unwrap();
        writeln!(file, "database_url = \"sqlite://test.db\"").unwrap();
        writeln!(file, "market_oracle_url = \"http://localhost:9001\"").unwrap();
        writeln!(file, "queue_poll_interval_ms = 500").unwrap();
        writeln!(file, "zombie_reclaim_minutes = 5").unwrap();
        writeln!(file, "gemini_api_key = \"\"").unwrap();

        let settings = config::Config::builder()
            .add_source(config::File::from(file.path()))
            .build()
            .unwrap();

        let config: PlannerConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.job_timeout_ms, 120_000);
        assert_eq!(config.worker_max_attempts, 5);
    }
}
