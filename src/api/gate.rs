//! The mitigation gate.
//!
//! Every inbound request runs this fixed pipeline, short-circuiting on the
//! first denial: honeypot detection, then the ban check (with lazy eviction),
//! then the route-scoped rate limiter. Requests that pass are forwarded and
//! then recorded: metadata lookup, log entry, timeline bucket, broadcast.
//!
//! The engine's own observability endpoints and the realtime channel skip the
//! pipeline entirely; serving a stats page must not itself count as traffic
//! and recursively re-trigger a broadcast.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::warn;

use crate::api::AppState;
use crate::engine::{BanCheck, RequestLogEntry, UNKNOWN, is_decoy_path};
use crate::limiter::RateDecision;

/// Paths exempt from the pipeline (prefix match).
pub const PIPELINE_SKIP_PATHS: &[&str] = &[
    "/dashboard",
    "/logs",
    "/risky-ips",
    "/risk-distribution",
    "/graph-data",
    "/ws",
    "/health",
];

fn skips_pipeline(path: &str) -> bool {
    PIPELINE_SKIP_PATHS.iter().any(|p| path.starts_with(p))
}

/// Extract the client address, handling proxies. The forwarding headers are
/// client-supplied and spoofable; that trust boundary is accepted as-is.
pub fn client_address(headers: &HeaderMap, addr: Option<&SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            // Take the first address (original client)
            if let Some(ip) = value.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Mitigation gate middleware.
pub async fn mitigation_gate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if skips_pipeline(&path) {
        return next.run(request).await;
    }

    let client_ip = client_address(request.headers(), Some(&addr));
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    // Decoy paths deny before anything else, including the ban lookup.
    if is_decoy_path(&path) {
        state.engine.trip_honeypot(&client_ip, &method, &uri).await;
        return (
            StatusCode::FORBIDDEN,
            "Suspicious activity detected and blocked.",
        )
            .into_response();
    }

    if let BanCheck::Banned { .. } = state.engine.check_ban(&client_ip).await {
        warn!(ip = %client_ip, path = %path, "Blocked request from banned address");
        return (StatusCode::FORBIDDEN, "Your IP is temporarily banned.").into_response();
    }

    if let Some(limiter) = state.limiters.match_route(&path) {
        if let RateDecision::Limited { retry_after_secs } = limiter.check_request(&client_ip) {
            warn!(ip = %client_ip, path = %path, "Rate limit exceeded");
            state
                .engine
                .adjust_risk_score(&client_ip, state.engine.thresholds().rate_penalty)
                .await;

            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests. Try again later.")
                    .into_response();
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
            return response;
        }
    }

    let response = next.run(request).await;

    // The metadata call can suspend while other requests mutate shared state;
    // recording below re-acquires the lock and accepts that this address may
    // have been banned in the meantime.
    let info = state.metadata.lookup(&client_ip).await;
    let (location, isp) = match info {
        Some(ref info) => (info.location(), info.isp_or_unknown()),
        None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    };
    state
        .engine
        .record_request(RequestLogEntry::new(&client_ip, &method, &uri, location, isp))
        .await;

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_list_covers_observability_surface() {
        assert!(skips_pipeline("/dashboard"));
        assert!(skips_pipeline("/logs"));
        assert!(skips_pipeline("/risky-ips"));
        assert!(skips_pipeline("/risk-distribution"));
        assert!(skips_pipeline("/graph-data"));
        assert!(skips_pipeline("/ws"));

        assert!(!skips_pipeline("/login"));
        assert!(!skips_pipeline("/ban"));
        assert!(!skips_pipeline("/anything-else"));
    }

    #[test]
    fn test_client_address_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.9, 10.0.0.1".parse().unwrap());
        let socket: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(client_address(&headers, Some(&socket)), "198.51.100.9");
    }

    #[test]
    fn test_client_address_falls_back_to_real_ip_then_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.5".parse().unwrap());
        let socket: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(client_address(&headers, Some(&socket)), "203.0.113.5");
        assert_eq!(client_address(&HeaderMap::new(), Some(&socket)), "127.0.0.1");
        assert_eq!(client_address(&HeaderMap::new(), None), "unknown");
    }
}
