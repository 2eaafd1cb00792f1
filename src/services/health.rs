//! Read-only health/metrics HTTP surface for process supervision, grounded
//! on the teacher's `services/health.rs` liveness/readiness/metrics shape,
//! simplified to this platform's own components: kill-switch state and
//! marketdata freshness (the same inputs `execution::build_safety_snapshot`
//! reads), not a websocket/database/risk-manager stack.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::execution::build_safety_snapshot;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub kill_switch: bool,
    pub marketdata_fresh: bool,
    pub agent_mode: String,
}

/// Process-wide state shared across handlers; `started_at` is the only
/// thing this server tracks itself, the rest comes from the environment
/// snapshot the execution agent already reads on every loop iteration.
pub struct HealthState {
    pub started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new() -> Self {
        Self { started_at: Utc::now() }
    }

    pub fn snapshot(&self) -> HealthResponse {
        let safety = build_safety_snapshot();
        let status = if safety.kill_switch {
            HealthStatus::Unhealthy
        } else if !safety.marketdata_fresh {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        HealthResponse {
            status,
            timestamp: Utc::now(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            kill_switch: safety.kill_switch,
            marketdata_fresh: safety.marketdata_fresh,
            agent_mode: safety.agent_mode,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HealthServer {
    state: Arc<HealthState>,
    port: u16,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    pub async fn run(&self) -> Result<()> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!(%addr, "health.server_starting");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::PlatformError::Internal(format!("health server error: {e}")))?;
        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.snapshot();
    let code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(health))
}

async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match state.snapshot().status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.snapshot();
    let body = format!(
        "# HELP tradeguard_kill_switch 1 if the kill switch is engaged\n\
         # TYPE tradeguard_kill_switch gauge\n\
         tradeguard_kill_switch {}\n\
         # HELP tradeguard_marketdata_fresh 1 if marketdata is within the staleness threshold\n\
         # TYPE tradeguard_marketdata_fresh gauge\n\
         tradeguard_marketdata_fresh {}\n\
         # HELP tradeguard_uptime_seconds seconds since the health server started\n\
         # TYPE tradeguard_uptime_seconds counter\n\
         tradeguard_uptime_seconds {}\n",
        health.kill_switch as u8, health.marketdata_fresh as u8, health.uptime_seconds,
    );
    (StatusCode::OK, [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
