//! Canonical pub/sub subject builders. Pure string logic, no IO.

use crate::error::{PlatformError, Result};

const FORBIDDEN_TOKEN_CHARS: [char; 3] = ['.', '*', '>'];

fn token(value: &str, name: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(PlatformError::Subject(format!("{name} is required")));
    }
    if v.chars().any(|c| FORBIDDEN_TOKEN_CHARS.contains(&c)) {
        return Err(PlatformError::Subject(format!(
            "{name} token contains forbidden characters (.,*,>): {value:?}"
        )));
    }
    Ok(v.to_string())
}

pub fn market_subject(tenant_id: &str, symbol: &str) -> Result<String> {
    Ok(format!(
        "market.{}.{}",
        token(tenant_id, "tenant_id")?,
        token(symbol, "symbol")?
    ))
}

/// Subscribe to all market subjects for a tenant.
pub fn market_wildcard_subject(tenant_id: &str) -> Result<String> {
    Ok(format!("market.{}.>", token(tenant_id, "tenant_id")?))
}

pub fn signals_subject(tenant_id: &str, strategy_id: &str, symbol: &str) -> Result<String> {
    Ok(format!(
        "signals.{}.{}.{}",
        token(tenant_id, "tenant_id")?,
        token(strategy_id, "strategy_id")?,
        token(symbol, "symbol")?
    ))
}

/// Canonical subject for v2 TradingSignal messages. Intentionally distinct from
/// legacy `signals.*` subjects so consumers never accidentally decode the wrong
/// schema version.
pub fn signals_v2_subject(tenant_id: &str, strategy_id: &str, symbol: &str) -> Result<String> {
    Ok(format!(
        "signals_v2.{}.{}.{}",
        token(tenant_id, "tenant_id")?,
        token(strategy_id, "strategy_id")?,
        token(symbol, "symbol")?
    ))
}

pub fn orders_subject(tenant_id: &str, account_id: &str) -> Result<String> {
    Ok(format!(
        "orders.{}.{}",
        token(tenant_id, "tenant_id")?,
        token(account_id, "account_id")?
    ))
}

pub fn fills_subject(tenant_id: &str, account_id: &str) -> Result<String> {
    Ok(format!(
        "fills.{}.{}",
        token(tenant_id, "tenant_id")?,
        token(account_id, "account_id")?
    ))
}

pub fn ops_subject(tenant_id: &str, service: &str) -> Result<String> {
    Ok(format!(
        "ops.{}.{}",
        token(tenant_id, "tenant_id")?,
        token(service, "service")?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_market_subject() {
        assert_eq!(
            market_subject("acme", "SPY").unwrap(),
            "market.acme.SPY"
        );
    }

    #[test]
    fn rejects_empty_token() {
        assert!(market_subject("", "SPY").is_err());
        assert!(market_subject("acme", "  ").is_err());
    }

    #[test]
    fn rejects_wildcard_characters_in_token() {
        assert!(market_subject("acme", "SPY.*").is_err());
        assert!(signals_subject("acme", "s1", "SPY>").is_err());
    }

    #[test]
    fn wildcard_subject_appends_greater_than() {
        assert_eq!(market_wildcard_subject("acme").unwrap(), "market.acme.>");
    }

    #[test]
    fn v2_and_legacy_signal_subjects_are_distinct() {
        let legacy = signals_subject("acme", "s1", "SPY").unwrap();
        let v2 = signals_v2_subject("acme", "s1", "SPY").unwrap();
        assert_ne!(legacy, v2);
        assert!(v2.starts_with("signals_v2."));
    }
}
