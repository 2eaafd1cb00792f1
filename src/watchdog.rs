//! Trading anomaly watchdog (C13): scans recent shadow trades for
//! dangerous patterns and trips a kill-switch when one is found. Grounded
//! on `original_source/functions/utils/watchdog.py`'s three detectors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::Result;
use crate::persistence::document_store::DocumentStore;

pub const LOSING_STREAK_THRESHOLD: u32 = 5;
pub const MIN_LOSS_PERCENT: f64 = 0.5;
pub const RAPID_DRAWDOWN_THRESHOLD_PERCENT: f64 = 5.0;
pub const MARKET_MISMATCH_BUY_COUNT: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct ShadowTrade {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub pnl_percent: f64,
    #[serde(default)]
    pub current_pnl: f64,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
}

impl ShadowTrade {
    fn is_buy(&self) -> bool {
        self.action.as_deref() == Some("BUY") || self.side.as_deref() == Some("BUY")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyResult {
    pub anomaly_type: &'static str,
    pub severity: Severity,
    pub description: String,
    pub metadata: Value,
    pub should_halt_trading: bool,
}

/// Walks trades newest-first and looks for an unbroken run of losses at
/// least `threshold` long. Stops at the first winning/neutral trade —
/// this checks the *current* streak, not the best historical one.
pub fn detect_losing_streak(trades: &[ShadowTrade], threshold: u32, min_loss_percent: f64) -> Option<AnomalyResult> {
    if trades.len() < threshold as usize {
        return None;
    }

    let mut consecutive = 0u32;
    let mut losing_ids = Vec::new();
    let mut total_loss = 0.0;

    for trade in trades {
        if trade.pnl_percent < -min_loss_percent {
            consecutive += 1;
            losing_ids.push(trade.id.clone());
            total_loss += trade.current_pnl;
            if consecutive >= threshold {
                return Some(AnomalyResult {
                    anomaly_type: "LOSING_STREAK",
                    severity: Severity::Critical,
                    description: format!(
                        "Detected {consecutive} consecutive losing trades. Total loss: ${:.2}",
                        total_loss.abs()
                    ),
                    metadata: json!({
                        "consecutive_losses": consecutive,
                        "losing_trade_ids": losing_ids,
                        "total_loss_usd": format!("{:.2}", total_loss.abs()),
                    }),
                    should_halt_trading: true,
                });
            }
        } else {
            break;
        }
    }
    None
}

/// Aggregates P&L across `trades` and flags a loss whose magnitude, as a
/// percentage of aggregate cost basis, meets `drawdown_threshold`.
pub fn detect_rapid_drawdown(trades: &[ShadowTrade], drawdown_threshold: f64) -> Option<AnomalyResult> {
    if trades.is_empty() {
        return None;
    }

    let mut total_pnl = 0.0;
    let mut total_cost_basis = 0.0;
    let mut losing = Vec::new();

    for trade in trades {
        total_pnl += trade.current_pnl;
        total_cost_basis += trade.entry_price * trade.quantity;
        if trade.current_pnl < 0.0 {
            losing.push(json!({
                "id": trade.id,
                "symbol": trade.symbol,
                "pnl": trade.current_pnl,
                "pnl_percent": trade.pnl_percent,
            }));
        }
    }

    let drawdown_percent = if total_cost_basis > 0.0 {
        (total_pnl.abs() / total_cost_basis) * 100.0
    } else {
        0.0
    };

    if total_pnl < 0.0 && drawdown_percent >= drawdown_threshold {
        let losing_trades_count = losing.len();
        return Some(AnomalyResult {
            anomaly_type: "RAPID_DRAWDOWN",
            severity: Severity::High,
            description: format!(
                "Rapid drawdown detected: {drawdown_percent:.2}% loss (${:.2}) across {} trades",
                total_pnl.abs(),
                trades.len()
            ),
            metadata: json!({
                "total_pnl_usd": total_pnl,
                "drawdown_percent": drawdown_percent,
                "total_cost_basis": total_cost_basis,
                "losing_trades_count": losing_trades_count,
                "losing_trades": losing.into_iter().take(10).collect::<Vec<_>>(),
            }),
            should_halt_trading: true,
        });
    }
    None
}

/// Flags a strategy buying repeatedly into a bearish gamma regime —
/// warning only, `should_halt_trading` is always `false` here.
pub fn detect_market_condition_mismatch(trades: &[ShadowTrade], spy_net_gex: f64, market_bias: &str) -> Option<AnomalyResult> {
    if trades.is_empty() || spy_net_gex >= 0.0 {
        return None;
    }

    let window = &trades[..trades.len().min(10)];
    let buy_trades: Vec<&ShadowTrade> = window.iter().filter(|t| t.is_buy()).collect();
    if buy_trades.len() as u32 >= MARKET_MISMATCH_BUY_COUNT {
        let buy_count = buy_trades.len();
        return Some(AnomalyResult {
            anomaly_type: "MARKET_CONDITION_MISMATCH",
            severity: Severity::Medium,
            description: format!(
                "Strategy executing {buy_count} BUY trades during bearish market (net GEX = {spy_net_gex:.0}, bias={market_bias}). This may indicate strategy is fighting market conditions."
            ),
            metadata: json!({
                "buy_count": buy_count,
                "buy_trades": buy_trades.iter().map(|t| json!({"id": t.id, "symbol": t.symbol})).collect::<Vec<_>>(),
                "spy_net_gex": spy_net_gex,
                "market_bias": market_bias,
            }),
            should_halt_trading: false,
        });
    }
    None
}

/// Runs all three detectors, in order of severity, and trips the
/// kill-switch document the first time a halting anomaly is found.
pub async fn run_watchdog_check(
    store: &dyn DocumentStore,
    tenant_id: &str,
    trades: &[ShadowTrade],
    spy_net_gex: f64,
    market_bias: &str,
    now: DateTime<Utc>,
) -> Result<Vec<AnomalyResult>> {
    let detections: Vec<AnomalyResult> = [
        detect_losing_streak(trades, LOSING_STREAK_THRESHOLD, MIN_LOSS_PERCENT),
        detect_rapid_drawdown(trades, RAPID_DRAWDOWN_THRESHOLD_PERCENT),
        detect_market_condition_mismatch(trades, spy_net_gex, market_bias),
    ]
    .into_iter()
    .flatten()
    .collect();

    for anomaly in &detections {
        let alert_doc = json!({
            "tenantId": tenant_id,
            "anomalyType": anomaly.anomaly_type,
            "severity": anomaly.severity,
            "description": anomaly.description,
            "metadata": anomaly.metadata,
            "createdAt": now.to_rfc3339(),
        });
        let alert_id = format!("{tenant_id}:{}:{}", anomaly.anomaly_type, now.timestamp_millis());
        if let Err(e) = store.create("watchdog_alerts", &alert_id, alert_doc).await {
            warn!(error = %e, "watchdog.alert_write_failed");
        }

        if anomaly.should_halt_trading {
            let status_doc = json!({
                "tenantId": tenant_id,
                "tradingEnabled": false,
                "reason": anomaly.anomaly_type,
                "haltedAt": now.to_rfc3339(),
            });
            store
                .run_transaction(
                    "trading_status",
                    tenant_id,
                    Box::new(move |_existing| Ok(status_doc)),
                )
                .await?;
        }
    }

    Ok(detections)
}

impl crate::explain::Explainable for AnomalyResult {
    fn severity_label(&self) -> &'static str {
        match self.severity {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    fn key_factors(&self) -> Vec<String> {
        vec![self.description.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(id: &str, pnl_percent: f64, current_pnl: f64) -> ShadowTrade {
        ShadowTrade {
            id: id.to_string(),
            symbol: "SPY".to_string(),
            action: Some("SELL".to_string()),
            side: None,
            pnl_percent,
            current_pnl,
            entry_price: 100.0,
            quantity: 1.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn losing_streak_detected_at_threshold() {
        let trades: Vec<ShadowTrade> = (0..5).map(|i| trade(&format!("t{i}"), -1.0, -10.0)).collect();
        let result = detect_losing_streak(&trades, 5, 0.5).unwrap();
        assert_eq!(result.anomaly_type, "LOSING_STREAK");
        assert!(result.should_halt_trading);
    }

    #[test]
    fn losing_streak_not_detected_when_broken_by_win() {
        let mut trades: Vec<ShadowTrade> = (0..4).map(|i| trade(&format!("t{i}"), -1.0, -10.0)).collect();
        trades.push(trade("t4", 2.0, 50.0));
        trades.push(trade("t5", -1.0, -10.0));
        assert!(detect_losing_streak(&trades, 5, 0.5).is_none());
    }

    #[test]
    fn rapid_drawdown_detected_above_threshold() {
        let trades = vec![
            ShadowTrade {
                entry_price: 100.0,
                quantity: 10.0,
                current_pnl: -60.0,
                pnl_percent: -6.0,
                ..trade("t1", -6.0, -60.0)
            },
        ];
        let result = detect_rapid_drawdown(&trades, 5.0).unwrap();
        assert_eq!(result.anomaly_type, "RAPID_DRAWDOWN");
    }

    #[test]
    fn market_mismatch_requires_negative_gex_and_buy_count() {
        let trades: Vec<ShadowTrade> = (0..3)
            .map(|i| ShadowTrade {
                action: Some("BUY".to_string()),
                ..trade(&format!("t{i}"), 0.1, 1.0)
            })
            .collect();
        assert!(detect_market_condition_mismatch(&trades, -1_000_000.0, "bearish").is_some());
        assert!(detect_market_condition_mismatch(&trades, 1_000_000.0, "bullish").is_none());
    }

    #[tokio::test]
    async fn run_watchdog_check_halts_on_losing_streak() {
        use crate::persistence::document_store::InMemoryDocumentStore;
        let store = InMemoryDocumentStore::new();
        let trades: Vec<ShadowTrade> = (0..5).map(|i| trade(&format!("t{i}"), -1.0, -10.0)).collect();
        let now = Utc::now();
        let results = run_watchdog_check(&store, "acme", &trades, 0.0, "neutral", now).await.unwrap();
        assert_eq!(results.len(), 1);
        let status = store.get("trading_status", "acme").await.unwrap().unwrap();
        assert_eq!(status["tradingEnabled"], json!(false));
    }
}
