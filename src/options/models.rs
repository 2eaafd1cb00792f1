use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub underlying: String,
    pub expiration_date: chrono::NaiveDate,
    pub strike: f64,
    pub right: OptionRight,
}

/// Quote-derived liquidity metrics. Missing inputs stay `None` rather than
/// being coerced to zero, so sorting and gating can distinguish "bad" from
/// "absent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteMetrics {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub volume: Option<f64>,
    pub open_interest: Option<f64>,
    pub snapshot_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl QuoteMetrics {
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 => Some((b + a) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 => Some(a - b),
            _ => None,
        }
    }

    pub fn rel_spread(&self) -> Option<f64> {
        match (self.mid(), self.spread()) {
            (Some(mid), Some(spread)) if mid > 0.0 => Some(spread / mid),
            _ => None,
        }
    }

    pub fn total_size(&self) -> f64 {
        self.bid_size.unwrap_or(0.0) + self.ask_size.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedOptionContract {
    pub contract_symbol: String,
    pub underlying: String,
    pub right: OptionRight,
    pub strike: f64,
    pub expiration_date: chrono::NaiveDate,
    pub dte: i64,
    pub underlying_price: f64,
    pub quote: QuoteMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_is_none_without_both_sides() {
        let quote = QuoteMetrics {
            bid: Some(1.0),
            ..Default::default()
        };
        assert_eq!(quote.mid(), None);
    }

    #[test]
    fn rel_spread_computed_from_mid_and_spread() {
        let quote = QuoteMetrics {
            bid: Some(1.0),
            ask: Some(1.2),
            ..Default::default()
        };
        assert!((quote.rel_spread().unwrap() - (0.2 / 1.1)).abs() < 1e-9);
    }

    #[test]
    fn total_size_defaults_missing_sides_to_zero() {
        let quote = QuoteMetrics {
            bid_size: Some(5.0),
            ..Default::default()
        };
        assert_eq!(quote.total_size(), 5.0);
    }
}
