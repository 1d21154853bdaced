//! HTTP `MarketOracle` adapter: a thin `reqwest` client over an external
//! pricing service, batched per spec §4.2's `price_batch_size`.

use planner_core::error::PlannerError;
use planner_core::traits::MarketOracle;
use serde::Deserialize;

pub struct HttpMarketOracle {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
}

impl HttpMarketOracle {
    pub fn new(base_url: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            batch_size: batch_size.max(1),
        }
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<(String, f64)>, PlannerError> {
        #[derive(Deserialize)]
        struct PriceEntry {
            symbol: String,
            price: f64,
        }

        let url = format!("{}/prices", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("symbols", symbols.join(","))])
            .send()
            .await
            .map_err(|e| PlannerError::transient(format!("market oracle request failed: {e}")))?;

        if response.status().is_server_error() || response.status().as_u16() == 429 {
            return Err(PlannerError::transient(format!(
                "market oracle returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(PlannerError::permanent(format!(
                "market oracle returned {}",
                response.status()
            )));
        }

        let entries: Vec<PriceEntry> = response
            .json()
            .await
            .map_err(|e| PlannerError::transient(format!("market oracle returned malformed json: {e}")))?;

        Ok(entries.into_iter().map(|e| (e.symbol, e.price)).collect())
    }
}

#[async_trait::async_trait]
impl MarketOracle for HttpMarketOracle {
    async fn current_prices(&self, symbols: &[String]) -> Result<Vec<(String, f64)>, PlannerError> {
        let mut prices = Vec::with_capacity(symbols.len());
        for batch in symbols.chunks(self.batch_size) {
            prices.extend(self.fetch_batch(batch).await?);
        }
        Ok(prices)
    }
}
