//! Startup safety gate (C6). The execution agent refuses to run unless
//! every required environment variable matches its expected literal
//! exactly, case-sensitive. Any deviation refuses startup.

use serde_json::json;
use std::collections::HashMap;

/// Deployment identity the gate checks exact matches against. The four
/// mode/enablement flags below are not configurable — they carry their
/// spec-mandated literal values regardless of `GateExpectations`.
#[derive(Debug, Clone)]
pub struct GateExpectations {
    pub repo_id: String,
    pub agent_name: String,
    pub agent_role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupGateResult {
    pub ok: bool,
    pub reason_codes: Vec<String>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Evaluates the startup gate against `env` (a map so tests can supply a
/// fixture instead of mutating process environment).
pub fn evaluate_startup_gate(env: &HashMap<String, String>, expected: &GateExpectations) -> StartupGateResult {
    let mut reason_codes = Vec::new();

    let required_exact: [(&str, &str); 5] = [
        ("REPO_ID", expected.repo_id.as_str()),
        ("AGENT_NAME", expected.agent_name.as_str()),
        ("AGENT_ROLE", expected.agent_role.as_str()),
        ("AGENT_MODE", "OBSERVE"),
        ("EXECUTION_AGENT_ENABLED", "true"),
    ];

    for (key, expected_value) in required_exact {
        match env.get(key) {
            None => reason_codes.push(format!("{key}_missing")),
            Some(actual) if actual != expected_value => reason_codes.push(format!("{key}_mismatch")),
            Some(_) => {}
        }
    }

    for key in ["BROKER_EXECUTION_ENABLED", "EXECUTION_ENABLED"] {
        match env.get(key) {
            None => reason_codes.push(format!("{key}_missing")),
            Some(actual) if actual != "false" => reason_codes.push(format!("{key}_not_false")),
            Some(_) => {}
        }
    }

    StartupGateResult {
        ok: reason_codes.is_empty(),
        reason_codes,
    }
}

/// Reads the gate inputs from the real process environment.
pub fn evaluate_startup_gate_from_process_env(expected: &GateExpectations) -> StartupGateResult {
    let mut env = HashMap::new();
    for key in [
        "REPO_ID",
        "AGENT_NAME",
        "AGENT_ROLE",
        "AGENT_MODE",
        "EXECUTION_AGENT_ENABLED",
        "BROKER_EXECUTION_ENABLED",
        "EXECUTION_ENABLED",
    ] {
        if let Some(v) = env_var(key) {
            env.insert(key.to_string(), v);
        }
    }
    evaluate_startup_gate(&env, expected)
}

/// Emits one structured refusal line to stdout and returns the process
/// exit code the caller should use (always non-zero).
pub fn refuse_startup(result: &StartupGateResult, expected: &GateExpectations) -> i32 {
    let service = env_var("SERVICE_NAME")
        .or_else(|| env_var("K_SERVICE"))
        .or_else(|| env_var("AGENT_NAME"))
        .unwrap_or_else(|| "execution-agent".to_string());
    let environment = env_var("ENVIRONMENT")
        .or_else(|| env_var("ENV"))
        .or_else(|| env_var("APP_ENV"))
        .or_else(|| env_var("DEPLOY_ENV"))
        .unwrap_or_else(|| "unknown".to_string());

    let line = json!({
        "ts": chrono::Utc::now().to_rfc3339(),
        "intent_type": "execution_agent_startup_refused",
        "severity": "ERROR",
        "service": service,
        "env": environment,
        "reason_codes": result.reason_codes,
        "required_gate": {
            "REPO_ID": expected.repo_id,
            "AGENT_NAME": expected.agent_name,
            "AGENT_ROLE": expected.agent_role,
            "AGENT_MODE": "OBSERVE",
            "EXECUTION_AGENT_ENABLED": "true",
            "BROKER_EXECUTION_ENABLED": "false",
            "EXECUTION_ENABLED": "false",
        },
    });
    println!("{line}");
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expectations() -> GateExpectations {
        GateExpectations {
            repo_id: "trading-platform".into(),
            agent_name: "execution-agent".into(),
            agent_role: "execution".into(),
        }
    }

    fn valid_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("REPO_ID".into(), "trading-platform".into());
        env.insert("AGENT_NAME".into(), "execution-agent".into());
        env.insert("AGENT_ROLE".into(), "execution".into());
        env.insert("AGENT_MODE".into(), "OBSERVE".into());
        env.insert("EXECUTION_AGENT_ENABLED".into(), "true".into());
        env.insert("BROKER_EXECUTION_ENABLED".into(), "false".into());
        env.insert("EXECUTION_ENABLED".into(), "false".into());
        env
    }

    #[test]
    fn passes_with_exact_expected_values() {
        let result = evaluate_startup_gate(&valid_env(), &expectations());
        assert!(result.ok);
        assert!(result.reason_codes.is_empty());
    }

    #[test]
    fn fails_when_execution_enabled_is_true() {
        let mut env = valid_env();
        env.insert("EXECUTION_ENABLED".into(), "true".into());
        let result = evaluate_startup_gate(&env, &expectations());
        assert!(!result.ok);
        assert!(result.reason_codes.contains(&"EXECUTION_ENABLED_not_false".to_string()));
    }

    #[test]
    fn fails_when_agent_mode_missing() {
        let mut env = valid_env();
        env.remove("AGENT_MODE");
        let result = evaluate_startup_gate(&env, &expectations());
        assert!(result.reason_codes.contains(&"AGENT_MODE_missing".to_string()));
    }

    #[test]
    fn fails_on_case_mismatch() {
        let mut env = valid_env();
        env.insert("AGENT_MODE".into(), "observe".into());
        let result = evaluate_startup_gate(&env, &expectations());
        assert!(result.reason_codes.contains(&"AGENT_MODE_mismatch".to_string()));
    }

    #[test]
    fn accumulates_all_failing_reasons() {
        let env = HashMap::new();
        let result = evaluate_startup_gate(&env, &expectations());
        assert_eq!(result.reason_codes.len(), 7);
    }
}
