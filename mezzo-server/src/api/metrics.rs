//! Metrics endpoint

use crate::monitoring::MetricsSnapshot;
use crate::queue::QueueDepth;
use crate::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// Metrics document: aggregated counters plus live queue depths.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub queues: Vec<QueueDepth>,
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        counters: state.monitoring.snapshot(),
        queues: state.queue.depths(),
    })
}

/// Build metrics routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}
