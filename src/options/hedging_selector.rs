//! Alternative option-contract selector for hedging intents (C9 variant):
//! hard liquidity gates, HOLD with a specific reason code on failure
//! instead of best-effort ranking.

use super::models::OptionRight;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// DTE eligibility rule. `allowed_dtes`, when present, is the sole
/// criterion; otherwise `min_dte`/`max_dte` bound the window.
#[derive(Debug, Clone)]
pub struct DteRules {
    pub allowed_dtes: Option<Vec<i64>>,
    pub target_dte: i64,
    pub min_dte: Option<i64>,
    pub max_dte: Option<i64>,
}

impl Default for DteRules {
    fn default() -> Self {
        Self {
            allowed_dtes: None,
            target_dte: 0,
            min_dte: None,
            max_dte: None,
        }
    }
}

impl DteRules {
    pub fn allows(&self, dte: i64) -> bool {
        if let Some(allowed) = &self.allowed_dtes {
            return allowed.contains(&dte);
        }
        if let Some(min) = self.min_dte {
            if dte < min {
                return false;
            }
        }
        if let Some(max) = self.max_dte {
            if dte > max {
                return false;
            }
        }
        true
    }
}

/// A candidate contract as reported by an upstream feed. Fields are
/// `Option` because upstream snapshots are frequently incomplete — that
/// incompleteness is itself a liquidity-gate failure, not a parse error.
#[derive(Debug, Clone, Default)]
pub struct CandidateContract {
    pub contract_symbol: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub strike: Option<f64>,
    pub right: Option<OptionRight>,
    pub quote_ts: Option<DateTime<Utc>>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub volume: Option<f64>,
    pub open_interest: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidityMetrics {
    pub quote_age_seconds: f64,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub spread: f64,
    pub spread_pct: f64,
    pub open_interest: Option<f64>,
    pub volume: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision")]
pub enum HedgeSelection {
    #[serde(rename = "SELECT")]
    Select {
        contract_symbol: String,
        metadata: LiquidityMetrics,
    },
    #[serde(rename = "HOLD")]
    Hold {
        reason_code: String,
        rejections_sample: Vec<(String, String)>,
    },
}

pub struct HedgeSelectionRules {
    pub dte_rules: DteRules,
    pub as_of_utc: DateTime<Utc>,
    pub max_quote_age_seconds: i64,
    pub min_open_interest: f64,
    pub min_volume: f64,
    pub max_spread_pct: f64,
}

impl Default for HedgeSelectionRules {
    fn default() -> Self {
        Self {
            dte_rules: DteRules::default(),
            as_of_utc: Utc::now(),
            max_quote_age_seconds: 120,
            min_open_interest: 10.0,
            min_volume: 1.0,
            max_spread_pct: 0.35,
        }
    }
}

fn check_contract_shape(
    candidate: &CandidateContract,
    desired_right: OptionRight,
    dte_rules: &DteRules,
    as_of_utc: DateTime<Utc>,
) -> Result<i64, &'static str> {
    let Some(symbol) = &candidate.contract_symbol else {
        return Err("missing_contract_symbol");
    };
    if symbol.trim().is_empty() {
        return Err("missing_contract_symbol");
    }
    let Some(expiration) = candidate.expiration else {
        return Err("missing_expiration");
    };
    if candidate.strike.is_none() {
        return Err("missing_strike");
    }
    let Some(right) = candidate.right else {
        return Err("missing_right");
    };
    if right != desired_right {
        return Err("wrong_right");
    }
    let dte = (expiration - as_of_utc.date_naive()).num_days();
    if !dte_rules.allows(dte) {
        return Err("dte_not_allowed");
    }
    Ok(dte)
}

fn check_liquidity(
    candidate: &CandidateContract,
    rules: &HedgeSelectionRules,
) -> Result<LiquidityMetrics, &'static str> {
    let Some(quote_ts) = candidate.quote_ts else {
        return Err("missing_quote_ts");
    };
    let age_s = (rules.as_of_utc - quote_ts).num_milliseconds() as f64 / 1000.0;
    if age_s < -5.0 {
        return Err("quote_from_future");
    }
    if age_s > rules.max_quote_age_seconds as f64 {
        return Err("stale_quote");
    }
    let (Some(bid), Some(ask)) = (candidate.bid, candidate.ask) else {
        return Err("missing_bid_ask");
    };
    if !bid.is_finite() || !ask.is_finite() {
        return Err("invalid_bid_ask");
    }
    if !(bid > 0.0 && ask > 0.0 && ask >= bid) {
        return Err("non_marketable_bid_ask");
    }
    let mid = (bid + ask) / 2.0;
    if mid <= 0.0 {
        return Err("invalid_mid");
    }
    let spread = ask - bid;
    let spread_pct = spread / mid;
    if spread_pct > rules.max_spread_pct {
        return Err("wide_spread");
    }
    let has_oi = candidate.open_interest.is_some();
    let has_vol = candidate.volume.is_some();
    if has_oi && candidate.open_interest.unwrap() < rules.min_open_interest {
        return Err("low_open_interest");
    }
    if has_vol && candidate.volume.unwrap() < rules.min_volume {
        return Err("low_volume");
    }
    if !has_oi
        && !has_vol
        && candidate.bid_size.is_none()
        && candidate.ask_size.is_none()
    {
        return Err("unknown_liquidity");
    }

    Ok(LiquidityMetrics {
        quote_age_seconds: age_s,
        bid,
        ask,
        mid,
        spread,
        spread_pct,
        open_interest: candidate.open_interest,
        volume: candidate.volume,
        bid_size: candidate.bid_size,
        ask_size: candidate.ask_size,
    })
}

/// `desired_delta_hedge > 0` selects a CALL, `< 0` a PUT. `0` is not a
/// hedge request at all, so it HOLDs with `no_hedge_needed` before any
/// candidate is even examined.
pub fn select_hedge_contract(
    desired_delta_hedge: f64,
    candidates: &[CandidateContract],
    rules: &HedgeSelectionRules,
) -> HedgeSelection {
    if desired_delta_hedge == 0.0 {
        return HedgeSelection::Hold {
            reason_code: "no_hedge_needed".to_string(),
            rejections_sample: vec![],
        };
    }
    let desired_right = if desired_delta_hedge > 0.0 {
        OptionRight::Call
    } else {
        OptionRight::Put
    };

    let mut rejections = Vec::new();
    let mut survivors: Vec<(&CandidateContract, i64, LiquidityMetrics)> = Vec::new();

    for candidate in candidates {
        let dte = match check_contract_shape(candidate, desired_right, &rules.dte_rules, rules.as_of_utc) {
            Ok(dte) => dte,
            Err(reason) => {
                push_rejection(&mut rejections, candidate, reason);
                continue;
            }
        };
        match check_liquidity(candidate, rules) {
            Ok(metrics) => survivors.push((candidate, dte, metrics)),
            Err(reason) => push_rejection(&mut rejections, candidate, reason),
        }
    }

    if survivors.is_empty() {
        rejections.truncate(10);
        return HedgeSelection::Hold {
            reason_code: "no_eligible_contracts".to_string(),
            rejections_sample: rejections,
        };
    }

    survivors.sort_by(|(ca, da, qa), (cb, db, qb)| {
        let strike_a = ca.strike.unwrap_or(f64::INFINITY);
        let strike_b = cb.strike.unwrap_or(f64::INFINITY);
        strike_a
            .total_cmp(&strike_b)
            .then(da.cmp(db))
            .then_with(|| qa.spread_pct.total_cmp(&qb.spread_pct))
            .then_with(|| ca.contract_symbol.cmp(&cb.contract_symbol))
    });

    let (contract, _dte, metrics) = survivors.into_iter().next().expect("checked non-empty above");
    HedgeSelection::Select {
        contract_symbol: contract.contract_symbol.clone().unwrap_or_default(),
        metadata: metrics,
    }
}

fn push_rejection(rejections: &mut Vec<(String, String)>, candidate: &CandidateContract, reason: &str) {
    let symbol = candidate
        .contract_symbol
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    rejections.push((symbol, reason.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_candidate(symbol: &str, right: OptionRight, as_of: DateTime<Utc>) -> CandidateContract {
        CandidateContract {
            contract_symbol: Some(symbol.to_string()),
            expiration: Some(as_of.date_naive()),
            strike: Some(500.0),
            right: Some(right),
            quote_ts: Some(as_of),
            bid: Some(1.0),
            ask: Some(1.1),
            bid_size: Some(10.0),
            ask_size: Some(10.0),
            volume: Some(50.0),
            open_interest: Some(100.0),
        }
    }

    #[test]
    fn zero_delta_holds_without_examining_candidates() {
        let rules = HedgeSelectionRules::default();
        let result = select_hedge_contract(0.0, &[], &rules);
        assert!(matches!(result, HedgeSelection::Hold { reason_code, .. } if reason_code == "no_hedge_needed"));
    }

    #[test]
    fn positive_delta_selects_a_call() {
        let as_of = Utc::now();
        let rules = HedgeSelectionRules {
            as_of_utc: as_of,
            ..Default::default()
        };
        let candidates = vec![base_candidate("SPY_C", OptionRight::Call, as_of)];
        let result = select_hedge_contract(1.0, &candidates, &rules);
        assert!(matches!(result, HedgeSelection::Select { contract_symbol, .. } if contract_symbol == "SPY_C"));
    }

    #[test]
    fn wrong_right_is_rejected_with_reason() {
        let as_of = Utc::now();
        let rules = HedgeSelectionRules {
            as_of_utc: as_of,
            ..Default::default()
        };
        let candidates = vec![base_candidate("SPY_P", OptionRight::Put, as_of)];
        let result = select_hedge_contract(1.0, &candidates, &rules);
        match result {
            HedgeSelection::Hold { reason_code, rejections_sample } => {
                assert_eq!(reason_code, "no_eligible_contracts");
                assert!(rejections_sample.iter().any(|(_, r)| r == "wrong_right"));
            }
            _ => panic!("expected hold"),
        }
    }

    #[test]
    fn stale_quote_is_rejected() {
        let as_of = Utc::now();
        let mut candidate = base_candidate("SPY_C", OptionRight::Call, as_of);
        candidate.quote_ts = Some(as_of - Duration::seconds(300));
        let rules = HedgeSelectionRules {
            as_of_utc: as_of,
            ..Default::default()
        };
        let result = select_hedge_contract(1.0, &[candidate], &rules);
        match result {
            HedgeSelection::Hold { rejections_sample, .. } => {
                assert!(rejections_sample.iter().any(|(_, r)| r == "stale_quote"));
            }
            _ => panic!("expected hold"),
        }
    }

    #[test]
    fn wide_spread_is_rejected() {
        let as_of = Utc::now();
        let mut candidate = base_candidate("SPY_C", OptionRight::Call, as_of);
        candidate.bid = Some(1.0);
        candidate.ask = Some(3.0);
        let rules = HedgeSelectionRules {
            as_of_utc: as_of,
            ..Default::default()
        };
        let result = select_hedge_contract(1.0, &[candidate], &rules);
        match result {
            HedgeSelection::Hold { rejections_sample, .. } => {
                assert!(rejections_sample.iter().any(|(_, r)| r == "wide_spread"));
            }
            _ => panic!("expected hold"),
        }
    }

    #[test]
    fn unknown_liquidity_when_no_size_or_volume_evidence() {
        let as_of = Utc::now();
        let mut candidate = base_candidate("SPY_C", OptionRight::Call, as_of);
        candidate.open_interest = None;
        candidate.volume = None;
        candidate.bid_size = None;
        candidate.ask_size = None;
        let rules = HedgeSelectionRules {
            as_of_utc: as_of,
            ..Default::default()
        };
        let result = select_hedge_contract(1.0, &[candidate], &rules);
        match result {
            HedgeSelection::Hold { rejections_sample, .. } => {
                assert!(rejections_sample.iter().any(|(_, r)| r == "unknown_liquidity"));
            }
            _ => panic!("expected hold"),
        }
    }
}
