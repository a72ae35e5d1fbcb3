//! Configuration management.
//!
//! All settings come from `VIGIL_*` environment variables layered over
//! defaults. The risk-policy defaults are the engine's documented contract;
//! overriding them is for tuning and tests, not something deployments
//! normally do.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::engine::RiskThresholds;
use crate::limiter::RouteRule;
use crate::metadata::MetadataConfig;

/// Top-level configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub risk: RiskConfig,
    pub rate_rules: Vec<RateRuleConfig>,
    pub metadata: MetadataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// The proxied origin behind the gate.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL all unmatched paths are forwarded to
    pub target_url: String,
    /// Timeout for one forwarded request
    pub timeout_secs: u64,
}

/// Risk-policy settings; see [`RiskThresholds`] for field semantics.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub risk_threshold: f64,
    pub base_ban_secs: u64,
    pub max_ban_secs: u64,
    pub honeypot_penalty: f64,
    pub honeypot_ban_secs: u64,
    pub manual_ban_secs: u64,
    pub manual_ban_score: f64,
    pub rate_penalty: f64,
    pub decay_amount: f64,
    /// Cadence of the background decay task
    pub decay_interval_secs: u64,
    pub log_capacity: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let thresholds = RiskThresholds::default();
        Self {
            risk_threshold: thresholds.risk_threshold,
            base_ban_secs: thresholds.base_ban_secs,
            max_ban_secs: thresholds.max_ban_secs,
            honeypot_penalty: thresholds.honeypot_penalty,
            honeypot_ban_secs: thresholds.honeypot_ban_secs,
            manual_ban_secs: thresholds.manual_ban_secs,
            manual_ban_score: thresholds.manual_ban_score,
            rate_penalty: thresholds.rate_penalty,
            decay_amount: thresholds.decay_amount,
            decay_interval_secs: 60,
            log_capacity: thresholds.log_capacity,
        }
    }
}

impl RiskConfig {
    /// Convert to the thresholds consumed by the engine.
    pub fn to_thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            risk_threshold: self.risk_threshold,
            base_ban_secs: self.base_ban_secs,
            max_ban_secs: self.max_ban_secs,
            honeypot_penalty: self.honeypot_penalty,
            honeypot_ban_secs: self.honeypot_ban_secs,
            manual_ban_secs: self.manual_ban_secs,
            manual_ban_score: self.manual_ban_score,
            rate_penalty: self.rate_penalty,
            decay_amount: self.decay_amount,
            log_capacity: self.log_capacity,
        }
    }
}

/// One protected route group.
#[derive(Debug, Clone)]
pub struct RateRuleConfig {
    pub prefix: String,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateRuleConfig {
    pub fn to_rule(&self) -> RouteRule {
        RouteRule::new(
            self.prefix.clone(),
            self.max_requests,
            Duration::from_secs(self.window_secs),
        )
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span open/close events for request tracing
    pub log_requests: bool,
    /// Also write daily-rotated log files
    pub log_to_file: bool,
    /// Directory for rotated log files
    pub log_dir: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            upstream: UpstreamConfig {
                target_url: "http://localhost:6000".to_string(),
                timeout_secs: 30,
            },
            risk: RiskConfig::default(),
            rate_rules: vec![
                RateRuleConfig {
                    prefix: "/login".to_string(),
                    max_requests: 5,
                    window_secs: 60,
                },
                RateRuleConfig {
                    prefix: "/data".to_string(),
                    max_requests: 100,
                    window_secs: 60,
                },
            ],
            metadata: MetadataConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
                log_to_file: false,
                log_dir: PathBuf::from("logs"),
            },
        }
    }
}

impl GateConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("VIGIL_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("VIGIL_PORT") {
            config.server.port = port.parse().context("Invalid VIGIL_PORT value")?;
        }

        if let Ok(target) = env::var("VIGIL_UPSTREAM_URL") {
            config.upstream.target_url = target;
        }
        if let Ok(timeout) = env::var("VIGIL_UPSTREAM_TIMEOUT_SECS") {
            config.upstream.timeout_secs = timeout
                .parse()
                .context("Invalid VIGIL_UPSTREAM_TIMEOUT_SECS value")?;
        }

        let url = Url::parse(&config.upstream.target_url)
            .context("Invalid upstream URL in VIGIL_UPSTREAM_URL")?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("Upstream URL must be http or https, got {}", url.scheme());
        }

        if let Ok(threshold) = env::var("VIGIL_RISK_THRESHOLD") {
            config.risk.risk_threshold = threshold
                .parse()
                .context("Invalid VIGIL_RISK_THRESHOLD value")?;
        }
        if let Ok(interval) = env::var("VIGIL_DECAY_INTERVAL_SECS") {
            config.risk.decay_interval_secs = interval
                .parse()
                .context("Invalid VIGIL_DECAY_INTERVAL_SECS value")?;
        }
        if let Ok(amount) = env::var("VIGIL_DECAY_AMOUNT") {
            config.risk.decay_amount = amount
                .parse()
                .context("Invalid VIGIL_DECAY_AMOUNT value")?;
        }

        if let Ok(limit) = env::var("VIGIL_LOGIN_RATE_LIMIT") {
            if let Some(rule) = config.rate_rules.iter_mut().find(|r| r.prefix == "/login") {
                rule.max_requests =
                    limit.parse().context("Invalid VIGIL_LOGIN_RATE_LIMIT value")?;
            }
        }
        if let Ok(limit) = env::var("VIGIL_DATA_RATE_LIMIT") {
            if let Some(rule) = config.rate_rules.iter_mut().find(|r| r.prefix == "/data") {
                rule.max_requests =
                    limit.parse().context("Invalid VIGIL_DATA_RATE_LIMIT value")?;
            }
        }

        if let Ok(api_url) = env::var("VIGIL_METADATA_API_URL") {
            config.metadata.api_url = api_url;
        }
        if let Ok(path) = env::var("VIGIL_METADATA_CACHE_PATH") {
            config.metadata.cache_path = PathBuf::from(path);
        }

        if let Ok(level) = env::var("VIGIL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(log_requests) = env::var("VIGIL_LOG_REQUESTS") {
            config.logging.log_requests = log_requests
                .parse()
                .context("Invalid VIGIL_LOG_REQUESTS value")?;
        }
        if let Ok(to_file) = env::var("VIGIL_LOG_TO_FILE") {
            config.logging.log_to_file =
                to_file.parse().context("Invalid VIGIL_LOG_TO_FILE value")?;
        }
        if let Ok(dir) = env::var("VIGIL_LOG_DIR") {
            config.logging.log_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy_contract() {
        let config = GateConfig::default();
        assert_eq!(config.risk.risk_threshold, 5.0);
        assert_eq!(config.risk.base_ban_secs, 300);
        assert_eq!(config.risk.max_ban_secs, 1800);
        assert_eq!(config.risk.decay_interval_secs, 60);
        assert_eq!(config.risk.log_capacity, 10_000);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_default_rate_rules() {
        let config = GateConfig::default();
        assert_eq!(config.rate_rules.len(), 2);

        let login = config
            .rate_rules
            .iter()
            .find(|r| r.prefix == "/login")
            .unwrap();
        assert_eq!(login.max_requests, 5);
        assert_eq!(login.window_secs, 60);

        let data = config
            .rate_rules
            .iter()
            .find(|r| r.prefix == "/data")
            .unwrap();
        assert_eq!(data.max_requests, 100);
    }

    #[test]
    fn test_rule_conversion() {
        let rule = RateRuleConfig {
            prefix: "/login".to_string(),
            max_requests: 5,
            window_secs: 60,
        }
        .to_rule();

        assert_eq!(rule.prefix, "/login");
        assert_eq!(rule.window, Duration::from_secs(60));
    }

    #[test]
    fn test_thresholds_conversion_round_trips() {
        let config = RiskConfig::default();
        let thresholds = config.to_thresholds();
        assert_eq!(thresholds.risk_threshold, config.risk_threshold);
        assert_eq!(thresholds.honeypot_ban_secs, config.honeypot_ban_secs);
        assert_eq!(thresholds.manual_ban_score, config.manual_ban_score);
    }
}
