use std::sync::{Arc, Mutex};

use axum::{routing::get, Json, Router};
use infrastructure::market_oracle::HttpMarketOracle;
use infrastructure::queue::SqliteQueue;
use infrastructure::store::SqliteStore;
use infrastructure::workers::classifier::LlmClassifier;
use infrastructure::workers::narrator::LlmNarrator;
use infrastructure::workers::projector::LlmProjector;
use infrastructure::workers::quality_judge::LlmQualityJudge;
use infrastructure::workers::visualizer::LlmVisualizer;
use orchestrator::orchestrator::Orchestrator;
use orchestrator::sink::TracingEventSink;
use planner_core::traits::Queue;
use shared::config::PlannerConfig;
use shared::health::HealthMonitor;

const GEMINI_MODEL: &str = "gemini-1.5-flash";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PlannerConfig::load()?;
    tracing::info!(?config, "starting orchestrator");

    let pool = infrastructure::db::connect(&config.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()).await?);
    let queue = Arc::new(SqliteQueue::new(pool).await?);

    let orchestrator = Arc::new(Orchestrator {
        store: store.clone(),
        oracle: Arc::new(HttpMarketOracle::new(&config.market_oracle_url, config.price_batch_size)),
        classifier: Arc::new(LlmClassifier::new(&config.gemini_api_key, GEMINI_MODEL)),
        narrator: Arc::new(LlmNarrator::new(&config.gemini_api_key, GEMINI_MODEL)),
        quality_judge: Arc::new(LlmQualityJudge::new(&config.gemini_api_key, GEMINI_MODEL)),
        visualizer: Arc::new(LlmVisualizer::new(&config.gemini_api_key, GEMINI_MODEL)),
        projector: Arc::new(LlmProjector::new(&config.gemini_api_key, GEMINI_MODEL)),
        sink: Arc::new(TracingEventSink),
        config: config.clone(),
    });

    let health_router = build_health_router();
    let health_listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    let health_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(health_listener, health_router).await {
            tracing::error!(%err, "health server exited");
        }
    });

    let consumer = tokio::spawn(run_consumer_loop(orchestrator, queue, config));

    tokio::select! {
        _ = health_server => {}
        _ = consumer => {}
    }

    Ok(())
}

async fn run_consumer_loop(
    orchestrator: Arc<Orchestrator>,
    queue: Arc<SqliteQueue>,
    config: PlannerConfig,
) {
    let poll_interval = std::time::Duration::from_millis(config.queue_poll_interval_ms);
    let mut since_reclaim = std::time::Instant::now();
    let reclaim_interval = std::time::Duration::from_secs(60);

    loop {
        if since_reclaim.elapsed() > reclaim_interval {
            match queue.reclaim_stale(config.zombie_reclaim_minutes).await {
                Ok(n) if n > 0 => tracing::info!(reclaimed = n, "reclaimed stale queue messages"),
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "failed to reclaim stale messages"),
            }
            since_reclaim = std::time::Instant::now();
        }

        match queue.dequeue().await {
            Ok(Some(message)) => {
                let result = orchestrator.handle(message.job_id, message.delivery_attempts).await;
                match result {
                    Ok(()) => {
                        if let Err(err) = queue.ack(message.job_id).await {
                            tracing::error!(job_id = %message.job_id, %err, "failed to ack job");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(job_id = %message.job_id, %err, "job handling failed, nacking for redelivery");
                        if let Err(err) = queue.nack(message.job_id).await {
                            tracing::error!(job_id = %message.job_id, %err, "failed to nack job");
                        }
                    }
                }
            }
            Ok(None) => tokio::time::sleep(poll_interval).await,
            Err(err) => {
                tracing::error!(%err, "failed to dequeue");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

fn build_health_router() -> Router {
    let monitor = Arc::new(Mutex::new(HealthMonitor::new()));
    Router::new().route(
        "/healthz",
        get(move || {
            let monitor = monitor.clone();
            async move {
                let status = monitor.lock().expect("health monitor lock poisoned").check();
                Json(status)
            }
        }),
    )
}
