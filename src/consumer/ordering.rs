//! Event ordering and document id derivation shared by every consumer
//! handler (C11.1/C11.2).

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Parses a timestamp field that may be an RFC3339 string, a numeric string,
/// or a bare epoch number (seconds or milliseconds, inferred by magnitude).
pub fn parse_ts(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_ts_str(s),
        Value::Number(n) => parse_ts_epoch(n.as_f64()?),
        _ => None,
    }
}

fn parse_ts_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<f64>().ok().and_then(parse_ts_epoch)
}

fn parse_ts_epoch(value: f64) -> Option<DateTime<Utc>> {
    let secs = if value.abs() > 1e12 { value / 1000.0 } else { value };
    DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract().abs() * 1e9) as u32)
}

/// Event time priority chain: `producedAt` / `publishedAt` embedded in the
/// payload, then a generic `timestamp`/`ts`/`time` field, finally the
/// transport-level Pub/Sub publish time as the last resort.
pub fn ordering_ts(payload: &Value, pubsub_published_at: DateTime<Utc>) -> DateTime<Utc> {
    for key in ["producedAt", "publishedAt"] {
        if let Some(dt) = parse_ts(payload.get(key)) {
            return dt;
        }
    }
    for key in ["timestamp", "ts", "time"] {
        if let Some(dt) = parse_ts(payload.get(key)) {
            return dt;
        }
    }
    pubsub_published_at
}

/// Picks the doc id candidate: the payload's `eventId` if present and
/// non-empty, else the transport `messageId`.
pub fn choose_doc_id(payload: &Value, message_id: &str) -> String {
    let candidate = payload
        .get("eventId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(message_id);
    normalize_doc_id(candidate)
}

/// Makes a string safe to use as a document id: collapses every run of
/// characters outside `[A-Za-z0-9_\-:.]` into a single `_`, strips leading
/// and trailing `_`, and truncates to 256 chars.
pub fn normalize_doc_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | ':' | '.') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    let trimmed = out.trim_matches('_');
    let mut result = if trimmed.is_empty() { "_" } else { trimmed }.to_string();
    if result.len() > 256 {
        result.truncate(256);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordering_prefers_produced_at_over_published_at() {
        let payload = json!({"producedAt": "2024-01-01T00:00:00Z", "publishedAt": "2024-01-02T00:00:00Z"});
        let fallback = Utc::now();
        let dt = ordering_ts(&payload, fallback);
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn ordering_falls_back_to_pubsub_publish_time() {
        let payload = json!({});
        let fallback = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ordering_ts(&payload, fallback), fallback);
    }

    #[test]
    fn choose_doc_id_prefers_event_id() {
        let payload = json!({"eventId": "evt/1 2"});
        assert_eq!(choose_doc_id(&payload, "msg-1"), "evt_1_2");
    }

    #[test]
    fn choose_doc_id_falls_back_to_message_id() {
        let payload = json!({});
        assert_eq!(choose_doc_id(&payload, "msg-1"), "msg-1");
    }

    #[test]
    fn normalize_doc_id_collapses_and_trims() {
        assert_eq!(normalize_doc_id("a//b  c"), "a_b_c");
        assert_eq!(normalize_doc_id("///leading"), "leading");
        assert_eq!(normalize_doc_id(""), "_");
    }

    #[test]
    fn normalize_doc_id_truncates_to_256() {
        let long = "a".repeat(300);
        assert_eq!(normalize_doc_id(&long).len(), 256);
    }
}
