//! Market-data freshness evaluation. Pure, dependency-free beyond `chrono`.
//!
//! Freshness is fail-closed: a missing timestamp is always STALE, never FRESH.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FreshnessReason {
    Fresh,
    StaleData,
    MissingTimestamp,
}

impl FreshnessReason {
    pub fn as_code(&self) -> &'static str {
        match self {
            FreshnessReason::Fresh => "FRESH",
            FreshnessReason::StaleData => "STALE_DATA",
            FreshnessReason::MissingTimestamp => "MISSING_TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FreshnessCheck {
    pub ok: bool,
    pub reason: FreshnessReason,
    pub latest_ts_utc: Option<DateTime<Utc>>,
    pub now_utc: DateTime<Utc>,
    pub age: Option<Duration>,
    pub stale_after: Duration,
    pub source: String,
}

/// Recommended staleness threshold for bar-based strategies: `multiplier * bar_interval`.
/// Non-positive multipliers fall back to the default of 2.0.
pub fn stale_after_for_bar_interval(bar_interval: Duration, multiplier: f64) -> Duration {
    let multiplier = if multiplier <= 0.0 { 2.0 } else { multiplier };
    let seconds = (bar_interval.num_milliseconds() as f64 / 1000.0 * multiplier).max(0.0);
    Duration::milliseconds((seconds * 1000.0) as i64)
}

/// Evaluate freshness from a latest event timestamp. `ok == true` means the
/// timestamp is present and its age is within `stale_after`.
pub fn check_freshness(
    latest_ts: Option<DateTime<Utc>>,
    stale_after: Duration,
    now: Option<DateTime<Utc>>,
    source: &str,
) -> FreshnessCheck {
    let now_utc = now.unwrap_or_else(Utc::now);
    let Some(latest_utc) = latest_ts else {
        return FreshnessCheck {
            ok: false,
            reason: FreshnessReason::MissingTimestamp,
            latest_ts_utc: None,
            now_utc,
            age: None,
            stale_after,
            source: source.to_string(),
        };
    };

    let age = now_utc - latest_utc;
    let ok = age <= stale_after;
    FreshnessCheck {
        ok,
        reason: if ok {
            FreshnessReason::Fresh
        } else {
            FreshnessReason::StaleData
        },
        latest_ts_utc: Some(latest_utc),
        now_utc,
        age: Some(age),
        stale_after,
        source: source.to_string(),
    }
}

/// Latest `.ts` across a set of timestamped items, or `None` if empty.
pub fn latest_timestamp<I: IntoIterator<Item = DateTime<Utc>>>(
    items: I,
) -> Option<DateTime<Utc>> {
    items.into_iter().max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamp_is_stale() {
        let check = check_freshness(None, Duration::seconds(60), None, "test");
        assert!(!check.ok);
        assert_eq!(check.reason, FreshnessReason::MissingTimestamp);
    }

    #[test]
    fn fresh_within_threshold() {
        let now = Utc::now();
        let ts = now - Duration::seconds(10);
        let check = check_freshness(Some(ts), Duration::seconds(60), Some(now), "test");
        assert!(check.ok);
        assert_eq!(check.reason, FreshnessReason::Fresh);
    }

    #[test]
    fn stale_past_threshold() {
        let now = Utc::now();
        let ts = now - Duration::seconds(120);
        let check = check_freshness(Some(ts), Duration::seconds(60), Some(now), "test");
        assert!(!check.ok);
        assert_eq!(check.reason, FreshnessReason::StaleData);
    }

    #[test]
    fn bar_interval_threshold_defaults_multiplier() {
        let interval = Duration::seconds(30);
        assert_eq!(
            stale_after_for_bar_interval(interval, 0.0),
            Duration::seconds(60)
        );
        assert_eq!(
            stale_after_for_bar_interval(interval, 3.0),
            Duration::seconds(90)
        );
    }

    #[test]
    fn latest_timestamp_of_empty_is_none() {
        assert_eq!(latest_timestamp(Vec::<DateTime<Utc>>::new()), None);
    }
}
