// src/api.rs
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::error::ErrorKind;
use crate::history::RunHistory;
use crate::pipeline::{Pipeline, RunReport, RunState};

const DEFAULT_RUNS_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub history: Arc<RunHistory>,
    pub metrics: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/runs", get(runs))
        .route("/run", post(trigger_run))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[derive(serde::Serialize)]
struct StatusOut {
    state: RunState,
    last_run: Option<RunReport>,
}

async fn status(State(state): State<AppState>) -> Json<StatusOut> {
    Json(StatusOut {
        state: state.pipeline.state(),
        last_run: state.history.last(),
    })
}

async fn runs(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<RunReport>> {
    let limit = q
        .get("limit")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RUNS_LIMIT);
    Json(state.history.snapshot_last_n(limit))
}

async fn trigger_run(State(state): State<AppState>) -> (StatusCode, Json<RunReport>) {
    let report = state.pipeline.run_once().await;
    state.history.push(report.clone());
    let code = match report.error_kind() {
        None => StatusCode::OK,
        Some(ErrorKind::RunInProgress) => StatusCode::CONFLICT,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(report))
}
