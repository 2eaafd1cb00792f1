//! Primary option-contract selector (C9): deterministic ATM/DTE/liquidity
//! ranking over a chain + per-symbol quote snapshots. Pure function, no
//! network access — snapshots are supplied by the caller.

use super::models::{OptionContract, OptionRight, QuoteMetrics, SelectedOptionContract};
use crate::error::{PlatformError, Result};
use chrono::NaiveDate;
use std::collections::HashMap;

const ATM_TOLERANCE: f64 = 1e-9;

fn otm_bias(right: OptionRight, strike: f64, underlying_price: f64) -> i32 {
    let preferred = match right {
        OptionRight::Call => strike >= underlying_price,
        OptionRight::Put => strike <= underlying_price,
    };
    if preferred {
        0
    } else {
        1
    }
}

/// `(atm_distance, rel_spread|inf, -total_size, -volume, -open_interest, dte, otm_bias, symbol)`
/// ascending — lower sorts first, symbol is the final tiebreak for reproducibility.
type SortKey = (f64, f64, f64, f64, f64, i64, i32, String);

fn sort_key(
    contract: &OptionContract,
    dte: i64,
    underlying_price: f64,
    quote: &QuoteMetrics,
) -> SortKey {
    let atm_distance = (contract.strike - underlying_price).abs();
    let rel_spread = quote.rel_spread().unwrap_or(f64::INFINITY);
    (
        atm_distance,
        rel_spread,
        -quote.total_size(),
        -quote.volume.unwrap_or(0.0),
        -quote.open_interest.unwrap_or(0.0),
        dte,
        otm_bias(contract.right, contract.strike, underlying_price),
        contract.symbol.clone(),
    )
}

fn cmp_sort_keys(a: &SortKey, b: &SortKey) -> std::cmp::Ordering {
    a.0.total_cmp(&b.0)
        .then_with(|| a.1.total_cmp(&b.1))
        .then_with(|| a.2.total_cmp(&b.2))
        .then_with(|| a.3.total_cmp(&b.3))
        .then_with(|| a.4.total_cmp(&b.4))
        .then(a.5.cmp(&b.5))
        .then(a.6.cmp(&b.6))
        .then_with(|| a.7.cmp(&b.7))
}

/// Selects the best contract for `underlying`/`right` among `contracts`,
/// restricted to `0 <= dte <= dte_max`, nearest-ATM first, then the
/// deterministic liquidity sort key. `snapshots_by_symbol` supplies quote
/// metrics; a contract without a snapshot is excluded from the ATM
/// candidate set used for sorting.
pub fn select_scalper_contract(
    underlying: &str,
    right: OptionRight,
    today: NaiveDate,
    underlying_price: f64,
    contracts: &[OptionContract],
    snapshots_by_symbol: &HashMap<String, QuoteMetrics>,
    dte_max: i64,
) -> Result<SelectedOptionContract> {
    let matching: Vec<&OptionContract> = contracts
        .iter()
        .filter(|c| {
            c.underlying == underlying
                && c.right == right
                && (c.expiration_date - today).num_days() >= 0
                && (c.expiration_date - today).num_days() <= dte_max
        })
        .collect();

    if matching.is_empty() {
        return Err(PlatformError::NotFound(format!(
            "no contracts for {underlying} {right:?} within dte_max={dte_max}"
        )));
    }

    let best_distance = matching
        .iter()
        .map(|c| (c.strike - underlying_price).abs())
        .fold(f64::INFINITY, f64::min);

    let atm_candidates: Vec<&OptionContract> = matching
        .into_iter()
        .filter(|c| (c.strike - underlying_price).abs() <= best_distance + ATM_TOLERANCE)
        .collect();

    let mut enriched: Vec<(&OptionContract, i64, QuoteMetrics)> = Vec::new();
    for c in &atm_candidates {
        if let Some(quote) = snapshots_by_symbol.get(&c.symbol) {
            let dte = (c.expiration_date - today).num_days();
            enriched.push((c, dte, quote.clone()));
        }
    }

    if enriched.is_empty() {
        return Err(PlatformError::NotFound(
            "no snapshot rows available for ATM candidates".to_string(),
        ));
    }

    enriched.sort_by(|(ca, da, qa), (cb, db, qb)| {
        cmp_sort_keys(
            &sort_key(ca, *da, underlying_price, qa),
            &sort_key(cb, *db, underlying_price, qb),
        )
    });

    let (contract, dte, quote) = enriched.into_iter().next().expect("checked non-empty above");
    Ok(SelectedOptionContract {
        contract_symbol: contract.symbol.clone(),
        underlying: contract.underlying.clone(),
        right: contract.right,
        strike: contract.strike,
        expiration_date: contract.expiration_date,
        dte,
        underlying_price,
        quote,
    })
}
