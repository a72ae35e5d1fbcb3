//! Origin forwarder.
//!
//! Every path not claimed by the gateway's own surface is forwarded verbatim
//! to the configured origin. Upstream failures surface as a plain 502 without
//! leaking internals.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::{debug, error};

use crate::api::AppState;
use crate::config::UpstreamConfig;

/// Largest request body the forwarder will buffer.
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// HTTP client bound to the proxied origin.
#[derive(Clone)]
pub struct OriginForwarder {
    client: reqwest::Client,
    target: String,
}

impl OriginForwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("vigil-gate/0.3")
            .build()
            .context("Failed to create upstream HTTP client")?;

        Ok(Self {
            client,
            target: config.target_url.trim_end_matches('/').to_string(),
        })
    }

    /// Forward one request and map the upstream reply back.
    pub async fn forward(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.target, path_and_query);

        let body = match axum::body::to_bytes(body, MAX_FORWARD_BODY).await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(error = %err, "Failed to read request body for forwarding");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request too large").into_response();
            }
        };

        debug!(method = %parts.method, url = %url, "Forwarding request to origin");

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let mut upstream_request = self.client.request(method, &url);
        if let Some(content_type) = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            upstream_request = upstream_request.header("content-type", content_type);
        }

        let upstream = match upstream_request.body(body).send().await {
            Ok(upstream) => upstream,
            Err(err) => {
                error!(url = %url, error = %err, "Proxy error");
                return (StatusCode::BAD_GATEWAY, "Proxy error").into_response();
            }
        };

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = upstream
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(url = %url, error = %err, "Failed to read origin response");
                return (StatusCode::BAD_GATEWAY, "Proxy error").into_response();
            }
        };

        let mut builder = Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder
            .body(Body::from(bytes))
            .unwrap_or_else(|_| (StatusCode::BAD_GATEWAY, "Proxy error").into_response())
    }
}

/// Fallback handler: everything unmatched goes to the origin.
pub async fn forward_to_origin(State(state): State<AppState>, request: Request) -> Response {
    state.forwarder.forward(request).await
}
