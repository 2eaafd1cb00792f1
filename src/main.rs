use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tradeguard::config::AppConfig;
use tradeguard::coordination::shutdown::install_signal_handlers;
use tradeguard::coordination::GracefulShutdown;
use tradeguard::persistence::document_store::InMemoryDocumentStore;
use tradeguard::services::{HealthServer, HealthState};
use tradeguard::{execution, observer, safety, sandbox, watchdog, DocumentStore};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    init_tracing(&config.logging.level, config.logging.json);

    match cli.command {
        Commands::GateCheck => run_gate_check(&config),
        Commands::ExecutionAgent { proposals_path, from_start } => {
            run_execution_agent(&config, proposals_path, from_start).await
        }
        Commands::ConsumerRun { messages_path } => run_consumer(&config, messages_path).await,
        Commands::WatchdogCheck {
            trades_path,
            tenant_id,
            spy_net_gex,
            market_bias,
        } => run_watchdog_check(trades_path, tenant_id, spy_net_gex, market_bias).await,
        Commands::SandboxRun {
            strategy_source,
            events_path,
            entrypoint,
            guest_program,
            guest_arg,
        } => run_sandbox(strategy_source, events_path, entrypoint, guest_program, guest_arg, &config).await,
        Commands::ObserverExplain {
            audit_dir,
            decisions_dir,
            json,
        } => run_observer_explain(audit_dir, decisions_dir, json),
        Commands::Serve { port } => run_serve(&config, port).await,
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn run_gate_check(config: &AppConfig) -> anyhow::Result<()> {
    let expected = safety::gate::GateExpectations {
        repo_id: config.gate.repo_id.clone(),
        agent_name: config.gate.agent_name.clone(),
        agent_role: config.gate.agent_role.clone(),
    };
    let result = safety::gate::evaluate_startup_gate_from_process_env(&expected);
    if !result.ok {
        let code = safety::gate::refuse_startup(&result, &expected);
        std::process::exit(code);
    }
    info!("gate_check.passed");
    Ok(())
}

async fn run_execution_agent(
    config: &AppConfig,
    proposals_path_override: Option<std::path::PathBuf>,
    from_start: bool,
) -> anyhow::Result<()> {
    let expected = safety::gate::GateExpectations {
        repo_id: config.gate.repo_id.clone(),
        agent_name: config.gate.agent_name.clone(),
        agent_role: config.gate.agent_role.clone(),
    };
    let gate_result = safety::gate::evaluate_startup_gate_from_process_env(&expected);
    if !gate_result.ok {
        let code = safety::gate::refuse_startup(&gate_result, &expected);
        std::process::exit(code);
    }

    let agent_config = execution::ExecutionAgentConfig {
        proposals_path: proposals_path_override
            .unwrap_or_else(|| config.execution_agent.proposals_path.clone().into()),
        decisions_base_dir: config.execution_agent.decisions_base_dir.clone().into(),
        poll_interval: tokio::time::Duration::from_millis(config.execution_agent.poll_interval_ms),
        start_at_beginning: from_start,
        agent_name: config.gate.agent_name.clone(),
        agent_role: config.gate.agent_role.clone(),
    };

    let shutdown = Arc::new(GracefulShutdown::with_defaults());
    install_signal_handlers(shutdown.clone()).await;

    info!("execution_agent.starting");
    execution::run(agent_config, shutdown.subscribe()).await?;
    Ok(())
}

async fn run_consumer(config: &AppConfig, messages_path: std::path::PathBuf) -> anyhow::Result<()> {
    use tradeguard::consumer::{ConsumerService, SchemaRouter, WireMessage};

    let contents = std::fs::read_to_string(&messages_path)?;
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let router = SchemaRouter::new(vec!["1".to_string()], std::collections::HashMap::new(), "unknown".to_string());
    let service = ConsumerService::new(
        store,
        router,
        chrono::Duration::hours(24),
        config.consumer.dlq_sample_rate,
        None,
    );

    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let msg: WireMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                warn!(line = line_no, error = %e, "consumer.malformed_fixture_line");
                continue;
            }
        };
        let now = Utc::now();
        match service.handle_message(&msg, now).await {
            Ok(outcome) => info!(message_id = %msg.message_id, outcome = ?outcome, "consumer.handled"),
            Err(e) => error!(message_id = %msg.message_id, error = %e, "consumer.handle_failed"),
        }
    }
    Ok(())
}

async fn run_watchdog_check(
    trades_path: std::path::PathBuf,
    tenant_id: String,
    spy_net_gex: f64,
    market_bias: String,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(&trades_path)?;
    let trades: Vec<watchdog::ShadowTrade> = serde_json::from_str(&contents)?;
    let store = InMemoryDocumentStore::new();
    let results = watchdog::run_watchdog_check(&store, &tenant_id, &trades, spy_net_gex, &market_bias, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn run_sandbox(
    strategy_source: std::path::PathBuf,
    events_path: std::path::PathBuf,
    entrypoint: String,
    guest_program: String,
    guest_args: Vec<String>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    use sandbox::{create_strategy_bundle, run_batch, MarketEvent, SandboxConfig, SubprocessTransport};

    let out_dir = std::env::temp_dir().join("tradeguard-sandbox-bundles");
    let bundle = create_strategy_bundle(&strategy_source, &entrypoint, "cli-run", &out_dir)?;
    info!(bundle = %bundle.bundle_path.display(), sha256 = %bundle.sha256, "sandbox.bundle_created");

    let events_raw = std::fs::read_to_string(&events_path)?;
    let events: Vec<MarketEvent> = serde_json::from_str(&events_raw)?;

    let sandbox_config = SandboxConfig {
        boot_timeout: tokio::time::Duration::from_millis(config.sandbox.boot_timeout_ms),
        call_timeout: tokio::time::Duration::from_millis(config.sandbox.call_timeout_ms),
    };

    let mut transport = SubprocessTransport::new(guest_program, guest_args);
    let intents = run_batch(&mut transport, &sandbox_config, &events).await?;
    println!("{}", serde_json::to_string_pretty(&intents)?);
    Ok(())
}

async fn run_serve(config: &AppConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    let port = port_override.or(config.health_port).unwrap_or(8080);
    let shutdown = Arc::new(GracefulShutdown::with_defaults());
    install_signal_handlers(shutdown.clone()).await;
    let mut signal = shutdown.subscribe();

    let server = HealthServer::new(Arc::new(HealthState::new()), port);
    tokio::select! {
        result = server.run() => result?,
        _ = signal.recv() => info!("serve.shutdown_signal_received"),
    }
    Ok(())
}

fn run_observer_explain(
    audit_dir: std::path::PathBuf,
    decisions_dir: std::path::PathBuf,
    json: bool,
) -> anyhow::Result<()> {
    let record = observer::explain_last_option_trade(&audit_dir, &decisions_dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record.to_json())?);
    } else {
        println!("{}", record.to_text());
    }
    Ok(())
}
