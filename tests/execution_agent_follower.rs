//! S4 — execution agent follower: start at beginning, process the backlog,
//! restart tailing from the end, and pick up only newly appended lines.

use std::io::Write;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::broadcast;
use uuid::Uuid;

use tradeguard::coordination::ShutdownSignal;
use tradeguard::execution::ExecutionAgentConfig;
use tradeguard::proposals::models::{
    OrderProposal, ProposalAssetType, ProposalConstraints, ProposalRationale, ProposalRisk,
    ProposalSide, ProposalStatus, ProposalTimeInForce,
};

fn proposal(symbol: &str) -> OrderProposal {
    OrderProposal {
        proposal_id: Uuid::new_v4(),
        created_at_utc: Utc::now(),
        repo_id: "trading-platform".into(),
        agent_name: "momentum".into(),
        strategy_name: "momentum-v1".into(),
        strategy_version: None,
        correlation_id: None,
        symbol: symbol.to_string(),
        asset_type: ProposalAssetType::Equity,
        option: None,
        side: ProposalSide::Buy,
        quantity: 10,
        limit_price: Some(500.0),
        time_in_force: ProposalTimeInForce::Day,
        rationale: ProposalRationale {
            short_reason: "breakout".into(),
            indicators: json!({"rsi": 70}),
        },
        risk: ProposalRisk::default(),
        constraints: ProposalConstraints {
            valid_until_utc: Utc::now() + ChronoDuration::hours(1),
            requires_human_approval: false,
        },
        status: ProposalStatus::Proposed,
    }
}

fn append_line(path: &std::path::Path, proposal: &OrderProposal) {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
    writeln!(file, "{}", serde_json::to_string(proposal).unwrap()).unwrap();
}

fn decisions_today(decisions_base_dir: &std::path::Path) -> Vec<serde_json::Value> {
    let path = decisions_base_dir.join(Utc::now().format("%Y-%m-%d").to_string()).join("decisions.ndjson");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    contents.lines().filter(|l| !l.trim().is_empty()).map(|l| serde_json::from_str(l).unwrap()).collect()
}

#[tokio::test]
async fn follower_processes_backlog_then_only_new_lines_on_restart() {
    std::env::remove_var("KILL_SWITCH_ENABLED");
    std::env::remove_var("MARKETDATA_STALE_THRESHOLD_S");
    std::env::remove_var("MARKETDATA_LAST_TS_UTC");
    std::env::remove_var("AGENT_MODE");

    let dir = tempdir().unwrap();
    let proposals_path = dir.path().join("proposals.ndjson");
    std::fs::write(&proposals_path, "").unwrap();
    let decisions_base_dir = dir.path().join("decisions");

    for sym in ["AAA", "BBB", "CCC"] {
        append_line(&proposals_path, &proposal(sym));
    }

    let (tx, _rx) = broadcast::channel::<ShutdownSignal>(4);

    let config = ExecutionAgentConfig {
        proposals_path: proposals_path.clone(),
        decisions_base_dir: decisions_base_dir.clone(),
        poll_interval: tokio::time::Duration::from_millis(20),
        start_at_beginning: true,
        agent_name: "momentum".into(),
        agent_role: "execution-agent".into(),
    };
    let handle = tokio::spawn(tradeguard::execution::run(config, tx.subscribe()));
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    tx.send(ShutdownSignal::Graceful).unwrap();
    handle.await.unwrap().unwrap();

    let first_run_decisions = decisions_today(&decisions_base_dir);
    assert_eq!(first_run_decisions.len(), 3);

    // Re-run tailing from the end: no new decisions until a new proposal arrives.
    let config2 = ExecutionAgentConfig {
        proposals_path: proposals_path.clone(),
        decisions_base_dir: decisions_base_dir.clone(),
        poll_interval: tokio::time::Duration::from_millis(20),
        start_at_beginning: false,
        agent_name: "momentum".into(),
        agent_role: "execution-agent".into(),
    };
    let handle2 = tokio::spawn(tradeguard::execution::run(config2, tx.subscribe()));
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    assert_eq!(decisions_today(&decisions_base_dir).len(), 3, "no new decisions before a new proposal arrives");

    append_line(&proposals_path, &proposal("DDD"));
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    tx.send(ShutdownSignal::Graceful).unwrap();
    handle2.await.unwrap().unwrap();

    let final_decisions = decisions_today(&decisions_base_dir);
    assert_eq!(final_decisions.len(), 4, "original 3 plus the newly appended proposal");
    let symbols: Vec<String> = first_run_decisions.iter().map(|d| d["proposal_id"].as_str().unwrap().to_string()).collect();
    for d in &final_decisions[..3] {
        assert!(symbols.contains(&d["proposal_id"].as_str().unwrap().to_string()), "original decisions unchanged");
    }
}
