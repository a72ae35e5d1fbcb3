//! Management endpoints: manual ban/unban, the ban list, log clearing.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::AppState;

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub ip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BanListResponse {
    #[serde(rename = "bannedIPs")]
    pub banned_ips: Vec<String>,
    #[serde(rename = "ipReputation")]
    pub ip_reputation: HashMap<String, f64>,
}

fn missing_ip(action: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("Provide an IP to {}", action),
        }),
    )
}

/// POST /ban - install a fixed-duration manual ban.
pub async fn ban(
    State(state): State<AppState>,
    Json(payload): Json<AddressRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let ip = match payload.ip {
        Some(ip) if !ip.is_empty() => ip,
        _ => return Err(missing_ip("ban")),
    };

    state.engine.manual_ban(&ip).await;

    let minutes = state.engine.thresholds().manual_ban_secs / 60;
    Ok(Json(MessageResponse {
        message: format!("Banned IP: {} for {} minutes", ip, minutes),
    }))
}

/// POST /unban - clear both the ban and the score.
pub async fn unban(
    State(state): State<AppState>,
    Json(payload): Json<AddressRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let ip = match payload.ip {
        Some(ip) if !ip.is_empty() => ip,
        _ => return Err(missing_ip("unban")),
    };

    state.engine.unban(&ip).await;

    Ok(Json(MessageResponse {
        message: format!("Unbanned IP: {}", ip),
    }))
}

/// GET /banned-ips - current ban list plus the score map.
pub async fn banned_ips(State(state): State<AppState>) -> Json<BanListResponse> {
    let (banned_ips, ip_reputation) = state.engine.ban_list().await;
    Json(BanListResponse {
        banned_ips,
        ip_reputation,
    })
}

/// POST /clear-logs - empty the request log.
pub async fn clear_logs(State(state): State<AppState>) -> Json<MessageResponse> {
    state.engine.clear_logs().await;
    Json(MessageResponse {
        message: "Logs cleared successfully".to_string(),
    })
}
