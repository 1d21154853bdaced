//! Pre-processing pass (spec §4.2): refresh instrument prices, then fill
//! classification gaps for instruments the store has no allocation maps
//! for yet. Both steps run under the same backoff policy and report their
//! counts through the event sink before the worker dispatch fan-out.

use std::sync::Arc;
use std::time::Instant;

use planner_core::contracts::{ClassifierItemRequest, ClassifierRequest};
use planner_core::domain::{Account, Instrument, JobId, Position};
use planner_core::error::PlannerError;
use planner_core::events::{Event, EventSink};
use planner_core::traits::{Classifier, MarketOracle, Store};
use shared::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;

use crate::validation::validate_classification;

pub struct Preprocessor {
    pub store: Arc<dyn Store>,
    pub oracle: Arc<dyn MarketOracle>,
    pub classifier: Arc<dyn Classifier>,
    pub retry: RetryPolicy,
    pub sink: Arc<dyn EventSink>,
    pub price_budget_ms: u64,
}

impl Preprocessor {
    /// Refreshes prices for every symbol held across `accounts`/`positions`,
    /// then classifies any instrument still missing an asset-class map.
    /// Returns the accounts/positions/instruments the dispatcher will build
    /// a snapshot from.
    pub async fn run(
        &self,
        job_id: JobId,
        accounts: &[Account],
        positions: &[Position],
        cancel: &CancellationToken,
    ) -> Result<Vec<Instrument>, PlannerError> {
        let symbols: Vec<String> = {
            let mut syms: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
            syms.sort();
            syms.dedup();
            syms
        };

        let price_start = Instant::now();
        let mut instruments = self.store.get_instruments(&symbols).await?;
        for symbol in &symbols {
            if !instruments.iter().any(|i| &i.symbol == symbol) {
                instruments.push(Instrument {
                    symbol: symbol.clone(),
                    display_name: symbol.clone(),
                    kind_hint: "unknown".to_string(),
                    current_price: None,
                    asset_class_map: planner_core::domain::AllocationMap::default(),
                    region_map: planner_core::domain::AllocationMap::default(),
                    sector_map: planner_core::domain::AllocationMap::default(),
                });
            }
        }
        self.refresh_prices(&symbols, &mut instruments, cancel).await?;
        self.sink.emit(Event::PreprocessDone {
            job_id,
            stage: "prices",
            counts: symbols.len(),
            duration_ms: price_start.elapsed().as_millis() as u64,
        });

        let classify_start = Instant::now();
        let classified_count = self.fill_classification_gaps(&mut instruments, cancel).await?;
        self.sink.emit(Event::PreprocessDone {
            job_id,
            stage: "classification",
            counts: classified_count,
            duration_ms: classify_start.elapsed().as_millis() as u64,
        });

        self.store.upsert_instruments(&instruments).await?;
        let _ = accounts;
        Ok(instruments)
    }

    async fn refresh_prices(
        &self,
        symbols: &[String],
        instruments: &mut [Instrument],
        cancel: &CancellationToken,
    ) -> Result<(), PlannerError> {
        if symbols.is_empty() {
            return Ok(());
        }

        let budget = std::time::Duration::from_millis(self.price_budget_ms);
        let prices = tokio::time::timeout(
            budget,
            self.retry.run(3, PlannerError::is_retryable, cancel, |_attempt| {
                self.oracle.current_prices(symbols)
            }),
        )
        .await
        .map_err(|_| PlannerError::Timeout { elapsed_ms: budget.as_millis() as u64 })??;

        for (symbol, price) in prices {
            if let Some(instrument) = instruments.iter_mut().find(|i| i.symbol == symbol) {
                instrument.current_price = Some(price);
            }
        }
        Ok(())
    }

    async fn fill_classification_gaps(
        &self,
        instruments: &mut Vec<Instrument>,
        cancel: &CancellationToken,
    ) -> Result<usize, PlannerError> {
        let gap_indices: Vec<usize> = instruments
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_classified())
            .map(|(idx, _)| idx)
            .collect();

        if gap_indices.is_empty() {
            return Ok(0);
        }

        let request = ClassifierRequest {
            items: gap_indices
                .iter()
                .map(|&idx| ClassifierItemRequest {
                    symbol: instruments[idx].symbol.clone(),
                    display_name: instruments[idx].display_name.clone(),
                    kind_hint: instruments[idx].kind_hint.clone(),
                })
                .collect(),
        };

        let response = self
            .retry
            .run(3, PlannerError::is_retryable, cancel, |_attempt| {
                let request = request.clone();
                async {
                    let response = self.classifier.classify(request).await?;
                    validate_classification(&response)?;
                    Ok(response)
                }
            })
            .await?;

        for item in response.items {
            if let Some(instrument) = instruments.iter_mut().find(|i| i.symbol == item.symbol) {
                instrument.asset_class_map = planner_core::domain::AllocationMap::new(item.asset_class_map);
                instrument.region_map = planner_core::domain::AllocationMap::new(item.region_map);
                instrument.sector_map = planner_core::domain::AllocationMap::new(item.sector_map);
            }
        }

        Ok(gap_indices.len())
    }
}
