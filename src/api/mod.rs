//! HTTP surface of the gateway.
//!
//! Management and observability endpoints, the realtime observer channel,
//! the mitigation-gate middleware, and the fallback forwarder to the origin.

pub mod admin;
pub mod gate;
pub mod proxy;
pub mod realtime;
pub mod stats;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::engine::RiskEngine;
use crate::limiter::RateLimiterSet;
use crate::metadata::MetadataService;

pub use proxy::OriginForwarder;

/// Shared state handed to every handler and the gate middleware.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RiskEngine>,
    pub metadata: MetadataService,
    pub limiters: Arc<RateLimiterSet>,
    pub forwarder: OriginForwarder,
}

/// Demo route protected by the `/login` rate rule.
async fn demo_login() -> Json<Value> {
    Json(json!({ "message": "Login successful" }))
}

/// Demo route protected by the `/data` rate rule.
async fn demo_data() -> Json<Value> {
    Json(json!({ "data": "Here is some data" }))
}

async fn health() -> &'static str {
    "OK"
}

/// Assemble the full application router. Every route and the fallback sit
/// behind the mitigation gate; the gate itself decides which paths skip the
/// pipeline.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Observability (pipeline-exempt, see gate::PIPELINE_SKIP_PATHS)
        .route("/dashboard", get(stats::dashboard))
        .route("/logs", get(stats::logs))
        .route("/risky-ips", get(stats::risky_ips))
        .route("/risk-distribution", get(stats::risk_distribution))
        .route("/graph-data", get(stats::graph_data))
        .route("/ws", get(realtime::ws_handler))
        .route("/health", get(health))
        // Management
        .route("/ban", post(admin::ban))
        .route("/unban", post(admin::unban))
        .route("/banned-ips", get(admin::banned_ips))
        .route("/clear-logs", post(admin::clear_logs))
        // Demo routes behind the default rate rules
        .route("/login", post(demo_login))
        .route("/data", get(demo_data))
        // Everything else is forwarded to the origin
        .fallback(proxy::forward_to_origin)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::mitigation_gate,
        ))
        .with_state(state)
}
