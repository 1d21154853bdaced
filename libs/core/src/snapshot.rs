//! Builds the transient `PortfolioSnapshot` workers consume from the
//! accounts, positions and instruments a `Store` returns (spec §4.1).
//!
//! Pure domain logic, deliberately kept free of any `Store`/I/O dependency
//! so it is exercised directly in unit tests rather than through fakes.

use std::collections::HashMap;

use crate::domain::{
    Account, Instrument, PortfolioSnapshot, Position, UNCLASSIFIED_BUCKET,
};

/// Folds accounts, positions and their instruments into one snapshot.
///
/// Positions whose instrument carries no classification (`Instrument::
/// is_classified() == false`) contribute their full market value to the
/// `"other"` bucket of every weight map, per spec §4.1.
pub fn build_snapshot(
    accounts: &[Account],
    positions: &[Position],
    instruments: &[Instrument],
) -> PortfolioSnapshot {
    let instruments_by_symbol: HashMap<&str, &Instrument> =
        instruments.iter().map(|i| (i.symbol.as_str(), i)).collect();

    let cash_value: f64 = accounts.iter().map(|a| a.cash_balance).sum();

    let mut asset_class_value: HashMap<String, f64> = HashMap::new();
    let mut region_value: HashMap<String, f64> = HashMap::new();
    let mut sector_value: HashMap<String, f64> = HashMap::new();
    let mut position_value_total = 0.0_f64;

    for position in positions {
        let Some(instrument) = instruments_by_symbol.get(position.symbol.as_str()) else {
            continue;
        };
        let Some(price) = instrument.current_price else {
            continue;
        };
        let market_value = position.quantity * price;
        position_value_total += market_value;

        if instrument.is_classified() {
            distribute(&mut asset_class_value, &instrument.asset_class_map.0, market_value);
            distribute(&mut region_value, &instrument.region_map.0, market_value);
            distribute(&mut sector_value, &instrument.sector_map.0, market_value);
        } else {
            *asset_class_value.entry(UNCLASSIFIED_BUCKET.to_string()).or_default() += market_value;
            *region_value.entry(UNCLASSIFIED_BUCKET.to_string()).or_default() += market_value;
            *sector_value.entry(UNCLASSIFIED_BUCKET.to_string()).or_default() += market_value;
        }
    }

    let total_value = cash_value + position_value_total;

    PortfolioSnapshot {
        total_value,
        cash_value,
        asset_class_weights: to_weights(asset_class_value, total_value),
        region_weights: to_weights(region_value, total_value),
        sector_weights: to_weights(sector_value, total_value),
        position_count: positions.len(),
    }
}

/// Spreads `market_value` across `map`'s weighted buckets proportionally
/// into `target`, accumulating dollar value (not yet a percentage).
fn distribute(target: &mut HashMap<String, f64>, map: &HashMap<String, f64>, market_value: f64) {
    for (bucket, weight_pct) in map {
        *target.entry(bucket.clone()).or_default() += market_value * (weight_pct / 100.0);
    }
}

fn to_weights(value_by_bucket: HashMap<String, f64>, total_value: f64) -> HashMap<String, f64> {
    if total_value <= 0.0 {
        return HashMap::new();
    }
    value_by_bucket
        .into_iter()
        .map(|(bucket, value)| (bucket, value / total_value * 100.0))
        .collect()
}
