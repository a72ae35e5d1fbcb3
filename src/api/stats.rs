//! Observability endpoints.
//!
//! These serve the same snapshots the broadcaster pushes, for observers that
//! poll instead of subscribing. They sit on the pipeline skip list.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::AppState;
use crate::engine::{DEFAULT_LEADERBOARD_LIMIT, GraphData, RequestLogEntry, RiskyAddress, StatsSnapshot};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "riskyIPs")]
    pub risky_ips: Vec<RiskyAddress>,
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub distribution: BTreeMap<i64, u64>,
}

/// GET /dashboard - full stats snapshot.
pub async fn dashboard(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.engine.stats().await)
}

/// GET /logs?ip= - the request log, optionally filtered by exact address.
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<RequestLogEntry>> {
    Json(state.engine.logs(query.ip.as_deref()).await)
}

/// GET /risky-ips?limit=N - top-N leaderboard by score.
pub async fn risky_ips(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<LeaderboardResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    Json(LeaderboardResponse {
        risky_ips: state.engine.leaderboard(limit).await,
    })
}

/// GET /risk-distribution - score histogram by integer floor.
pub async fn risk_distribution(State(state): State<AppState>) -> Json<DistributionResponse> {
    Json(DistributionResponse {
        distribution: state.engine.distribution().await,
    })
}

/// GET /graph-data - both timelines verbatim.
pub async fn graph_data(State(state): State<AppState>) -> Json<GraphData> {
    Json(state.engine.graph_data().await)
}
