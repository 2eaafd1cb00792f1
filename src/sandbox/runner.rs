//! Host-side lifecycle orchestrator: bundle, boot, stream, shut down
//! (C12.4). The host never imports or executes the packaged strategy code
//! directly — it only talks to the guest process over the NDJSON protocol.

use chrono::Utc;
use serde_json::Value;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::error::{PlatformError, Result};

use super::protocol::{self, MarketEvent, OrderIntent, ShutdownMessage, PROTOCOL_VERSION};
use super::transport::SandboxTransport;

pub struct SandboxConfig {
    pub boot_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            boot_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(2),
        }
    }
}

/// Runs one batch of market events through a booted guest, collecting the
/// order intents it emits. Malformed guest output is logged and dropped,
/// never propagated as a platform order — a bad strategy can waste its own
/// turn, not corrupt the host.
pub async fn run_batch(
    transport: &mut dyn SandboxTransport,
    config: &SandboxConfig,
    events: &[MarketEvent],
) -> Result<Vec<OrderIntent>> {
    transport.boot(config.boot_timeout).await?;

    for event in events {
        let value = serde_json::to_value(event)?;
        transport.send_line(&value).await?;
    }
    let shutdown = ShutdownMessage::default();
    transport.send_line(&serde_json::to_value(&shutdown)?).await?;

    let mut intents = Vec::new();
    loop {
        match transport.recv_line(config.call_timeout).await {
            Ok(Some(msg)) => {
                if let Err(e) = handle_guest_message(&msg, &mut intents) {
                    warn!(error = %e, "sandbox.guest_message_rejected");
                }
            }
            Ok(None) => break,
            Err(PlatformError::Sandbox(ref reason)) if reason.contains("timed out") => {
                info!("sandbox.recv_idle");
                break;
            }
            Err(e) => {
                transport.shutdown().await.ok();
                return Err(e);
            }
        }
    }

    transport.shutdown().await?;
    Ok(intents)
}

fn handle_guest_message(msg: &Value, intents: &mut Vec<OrderIntent>) -> Result<()> {
    let kind = msg
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PlatformError::Sandbox("guest message missing type".to_string()))?;
    match kind {
        "order_intent" => {
            let intent = protocol::parse_order_intent(msg).map_err(|e| PlatformError::Sandbox(e.to_string()))?;
            intents.push(intent);
            Ok(())
        }
        "log" => {
            let level = msg.get("level").and_then(Value::as_str).unwrap_or("info");
            let message = msg.get("message").and_then(Value::as_str).unwrap_or("");
            match level {
                "error" => warn!(sandbox_log = message, "sandbox.guest_log_error"),
                _ => info!(sandbox_log = message, level, "sandbox.guest_log"),
            }
            Ok(())
        }
        other => Err(PlatformError::Sandbox(format!("unsupported guest message type: {other}"))),
    }
}

pub fn market_event_now(event_id: &str, symbol: &str, source: &str, payload: Value) -> MarketEvent {
    MarketEvent::new(event_id, Utc::now().to_rfc3339(), symbol, source, payload)
}

pub fn protocol_version() -> &'static str {
    PROTOCOL_VERSION
}
