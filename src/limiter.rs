//! Per-route rate limiting.
//!
//! One independent fixed-window limiter per protected route group. Window
//! state is a per-address counter with its window start; the externally
//! visible contract is only that no more than `max_requests` are admitted per
//! `window` per address. Exceeding the quota is reported to the risk engine
//! by the mitigation gate as a standard penalty.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// A protected route group.
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// Path prefix this rule covers.
    pub prefix: String,
    /// Requests admitted per window per address.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            max_requests,
            window,
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted; `remaining` requests left in the current window.
    Allowed { remaining: u32, reset_after_secs: u64 },
    /// Over quota; retry after the window resets.
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateDecision::Limited { .. })
    }
}

/// Fixed-window limiter for one route group.
#[derive(Debug)]
pub struct RouteLimiter {
    rule: RouteRule,
    /// Map of address -> (request count, window start).
    windows: DashMap<String, (u32, Instant)>,
}

impl RouteLimiter {
    pub fn new(rule: RouteRule) -> Self {
        Self {
            rule,
            windows: DashMap::new(),
        }
    }

    pub fn rule(&self) -> &RouteRule {
        &self.rule
    }

    /// Check whether a request from `addr` is admitted and update the counter.
    pub fn check_request(&self, addr: &str) -> RateDecision {
        let now = Instant::now();

        let mut entry = self.windows.entry(addr.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset window if expired
        if now.duration_since(*window_start) >= self.rule.window {
            *count = 0;
            *window_start = now;
        }

        let reset_after_secs = self
            .rule
            .window
            .checked_sub(now.duration_since(*window_start))
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if *count >= self.rule.max_requests {
            return RateDecision::Limited {
                retry_after_secs: reset_after_secs,
            };
        }

        *count += 1;
        RateDecision::Allowed {
            remaining: self.rule.max_requests - *count,
            reset_after_secs,
        }
    }

    /// Drop stale windows. Call periodically.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.rule.window;
        self.windows
            .retain(|_, (_, window_start)| now.duration_since(*window_start) < window * 2);
    }
}

/// The full set of route limiters, matched by path prefix.
#[derive(Debug)]
pub struct RateLimiterSet {
    limiters: Vec<RouteLimiter>,
}

impl RateLimiterSet {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            limiters: rules.into_iter().map(RouteLimiter::new).collect(),
        }
    }

    /// The limiter whose prefix covers `path`, if any. First match wins.
    pub fn match_route(&self, path: &str) -> Option<&RouteLimiter> {
        self.limiters
            .iter()
            .find(|limiter| path.starts_with(&limiter.rule.prefix))
    }

    pub fn cleanup(&self) {
        for limiter in &self.limiters {
            limiter.cleanup();
        }
    }
}
