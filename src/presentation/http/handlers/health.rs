//! Health Check Handlers
//!
//! - `GET /health` - process is up
//! - `GET /health/live` - liveness probe
//! - `GET /health/ready` - store and queue reachable; 503 otherwise

use std::fmt::Display;
use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::application::pipeline::PipelineMode;
use crate::infrastructure::database;
use crate::startup::AppState;

static STARTED: Lazy<(Instant, DateTime<Utc>)> = Lazy::new(|| (Instant::now(), Utc::now()));

/// Probes slower than this report `degraded`.
const STORE_SLOW: Duration = Duration::from_millis(100);
const QUEUE_SLOW: Duration = Duration::from_millis(50);

/// Pin the uptime origin to process start
pub fn init_server_start() {
    Lazy::force(&STARTED);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Result of probing one backing service
#[derive(Debug, Serialize)]
pub struct Probe {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Probe {
    fn skipped(message: &str) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: None,
            message: Some(message.to_string()),
        }
    }

    fn measure<E: Display>(result: Result<(), E>, started: Instant, slow: Duration) -> Self {
        let elapsed = started.elapsed();
        match result {
            Ok(()) => Self {
                status: if elapsed < slow {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                },
                latency_ms: Some(elapsed.as_millis() as u64),
                message: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                message: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GatewayProbe {
    pub status: HealthStatus,
    pub active_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub store: Probe,
    pub queue: Probe,
    pub websocket: GatewayProbe,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub pipeline_mode: &'static str,
    pub checks: ReadinessChecks,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// Readiness probe over the store, the queue and the gateway
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let store = match &state.db {
        Some(pool) => {
            let started = Instant::now();
            Probe::measure(database::ping(pool).await, started, STORE_SLOW)
        }
        None => Probe::skipped("in-memory"),
    };

    let started = Instant::now();
    let queue = Probe::measure(state.queue.ping().await, started, QUEUE_SLOW);

    let status = overall(&[&store, &queue]);
    let (since, started_at) = *STARTED;
    let response = ReadinessResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: since.elapsed().as_secs(),
        started_at: started_at.to_rfc3339(),
        pipeline_mode: match state.settings.pipeline.mode {
            PipelineMode::Fanout => "fanout",
            PipelineMode::Sequential => "sequential",
        },
        checks: ReadinessChecks {
            store,
            queue,
            websocket: GatewayProbe {
                status: HealthStatus::Healthy,
                active_connections: state.gateway.connection_count(),
            },
        },
    };

    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(response))
}

/// Worst status among the probes.
fn overall(probes: &[&Probe]) -> HealthStatus {
    probes
        .iter()
        .map(|p| p.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn probe(status: HealthStatus) -> Probe {
        Probe {
            status,
            latency_ms: None,
            message: None,
        }
    }

    #[test_case(HealthStatus::Healthy, HealthStatus::Healthy, HealthStatus::Healthy ; "all healthy")]
    #[test_case(HealthStatus::Degraded, HealthStatus::Healthy, HealthStatus::Degraded ; "slow store")]
    #[test_case(HealthStatus::Healthy, HealthStatus::Unhealthy, HealthStatus::Unhealthy ; "queue down")]
    #[test_case(HealthStatus::Unhealthy, HealthStatus::Degraded, HealthStatus::Unhealthy ; "store down")]
    fn test_overall_is_worst(store: HealthStatus, queue: HealthStatus, expected: HealthStatus) {
        assert_eq!(overall(&[&probe(store), &probe(queue)]), expected);
    }

    #[test]
    fn test_failed_probe_keeps_error() {
        let p = Probe::measure(Err("connection refused"), Instant::now(), QUEUE_SLOW);
        assert_eq!(p.status, HealthStatus::Unhealthy);
        assert_eq!(p.message.as_deref(), Some("connection refused"));
        assert_eq!(serde_json::to_value(&p).unwrap()["status"], "unhealthy");
    }

    #[test]
    fn test_slow_probe_is_degraded() {
        let started = Instant::now() - Duration::from_millis(80);
        let p = Probe::measure(Ok::<(), String>(()), started, QUEUE_SLOW);
        assert_eq!(p.status, HealthStatus::Degraded);
    }
}
