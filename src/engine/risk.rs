//! Adaptive risk engine.
//!
//! Owns the per-address reputation scores, the active-ban map, both event
//! timelines and the bounded request log, and applies the scoring and ban
//! policies. All of that state lives behind a single lock so every mutating
//! operation is one critical section: request handling and the decay task
//! both read-modify-write the same maps and must never interleave.
//!
//! Scores and bans are process-lifetime state. Nothing here is persisted;
//! a restart starts clean.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::broadcast::{
    EVENT_GRAPH_DATA, EVENT_LOGS, EVENT_RISK_DISTRIBUTION, EVENT_RISKY_IPS, EVENT_STATS,
    StateBroadcaster,
};
use crate::engine::honeypot::{HONEYPOT_ISP, HONEYPOT_LOCATION};
use crate::engine::request_log::{RequestLog, RequestLogEntry};
use crate::engine::timeline::{Timeline, minute_label};
use crate::metadata::{AddressMetadata, MetadataCache};

/// Default leaderboard size.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

/// Tunable policy constants. The defaults are the engine's contract; the
/// configuration layer only overrides them for testing and tuning.
#[derive(Debug, Clone, Serialize)]
pub struct RiskThresholds {
    /// Score at which an address is auto-banned.
    pub risk_threshold: f64,
    /// Ban duration scales linearly with the tripping score, in units of this.
    pub base_ban_secs: u64,
    /// Cap on the scaled auto-ban duration.
    pub max_ban_secs: u64,
    /// Penalty applied when a decoy path is hit.
    pub honeypot_penalty: f64,
    /// Hard-ban duration for decoy hits, deliberately far past the cap.
    pub honeypot_ban_secs: u64,
    /// Fixed duration of an operator-issued ban.
    pub manual_ban_secs: u64,
    /// Score forced onto a manually banned address.
    pub manual_ban_score: f64,
    /// Penalty reported by the rate limiter per quota violation.
    pub rate_penalty: f64,
    /// Amount subtracted from every score per decay tick.
    pub decay_amount: f64,
    /// Request log capacity.
    pub log_capacity: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            risk_threshold: 5.0,
            base_ban_secs: 5 * 60,
            max_ban_secs: 30 * 60,
            honeypot_penalty: 5.0,
            honeypot_ban_secs: 24 * 60 * 60,
            manual_ban_secs: 10 * 60,
            manual_ban_score: 5.0,
            rate_penalty: 1.0,
            decay_amount: 1.0,
            log_capacity: 10_000,
        }
    }
}

/// Outcome of the ban check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanCheck {
    /// Not banned (or the ban just expired and was cleared).
    Allowed,
    /// Actively banned until the given instant.
    Banned { expires_at: DateTime<Utc> },
}

/// One entry of the enriched ban list.
#[derive(Debug, Clone, Serialize)]
pub struct BannedAddress {
    pub ip: String,
    pub info: Option<AddressMetadata>,
    #[serde(rename = "riskScore")]
    pub risk_score: f64,
}

/// Aggregate dashboard stats.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(rename = "totalRequests")]
    pub total_requests: u64,
    #[serde(rename = "bannedIPs")]
    pub banned_ips: Vec<BannedAddress>,
    #[serde(rename = "activeRiskScores")]
    pub active_risk_scores: HashMap<String, f64>,
}

/// One leaderboard entry.
#[derive(Debug, Clone, Serialize)]
pub struct RiskyAddress {
    pub ip: String,
    pub score: f64,
    pub info: Option<AddressMetadata>,
}

/// Both timelines, verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct GraphData {
    pub requests: Timeline,
    pub bans: Timeline,
}

/// Everything the engine mutates, as one critical section.
#[derive(Debug)]
struct EngineState {
    scores: HashMap<String, f64>,
    bans: HashMap<String, DateTime<Utc>>,
    request_timeline: Timeline,
    ban_timeline: Timeline,
    log: RequestLog,
    total_requests: u64,
}

/// The adaptive risk & mitigation engine.
pub struct RiskEngine {
    thresholds: RiskThresholds,
    inner: RwLock<EngineState>,
    broadcaster: StateBroadcaster,
    metadata: Arc<MetadataCache>,
}

impl RiskEngine {
    pub fn new(
        thresholds: RiskThresholds,
        broadcaster: StateBroadcaster,
        metadata: Arc<MetadataCache>,
    ) -> Self {
        let log_capacity = thresholds.log_capacity;
        Self {
            thresholds,
            inner: RwLock::new(EngineState {
                scores: HashMap::new(),
                bans: HashMap::new(),
                request_timeline: Timeline::new(),
                ban_timeline: Timeline::new(),
                log: RequestLog::with_capacity(log_capacity),
                total_requests: 0,
            }),
            broadcaster,
            metadata,
        }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    pub fn broadcaster(&self) -> &StateBroadcaster {
        &self.broadcaster
    }

    /// Current score for an address; absence reads as zero.
    pub async fn score(&self, addr: &str) -> f64 {
        self.inner.read().await.scores.get(addr).copied().unwrap_or(0.0)
    }

    /// Whether an address holds a live ban right now. Does not evict.
    pub async fn is_banned(&self, addr: &str) -> bool {
        let inner = self.inner.read().await;
        inner
            .bans
            .get(addr)
            .is_some_and(|expires| Utc::now() < *expires)
    }

    /// Ban expiry for an address, expired or not.
    pub async fn ban_expiry(&self, addr: &str) -> Option<DateTime<Utc>> {
        self.inner.read().await.bans.get(addr).copied()
    }

    /// Raise an address's risk score. Crossing the threshold installs a ban
    /// whose duration scales linearly with the tripping score, capped; the
    /// score itself is only persisted while it stays below the threshold, so
    /// a banned address keeps displaying its last sub-threshold value.
    pub async fn adjust_risk_score(&self, addr: &str, delta: f64) {
        if delta <= 0.0 {
            warn!(ip = %addr, delta, "Ignoring non-positive risk adjustment");
            return;
        }

        let now = Utc::now();
        let banned_until = {
            let mut inner = self.inner.write().await;
            let score = inner.scores.get(addr).copied().unwrap_or(0.0) + delta;

            if score >= self.thresholds.risk_threshold {
                let ban_secs =
                    (self.thresholds.base_ban_secs as f64 * score).min(self.thresholds.max_ban_secs as f64);
                let expires = now + ChronoDuration::milliseconds((ban_secs * 1000.0) as i64);
                inner.bans.insert(addr.to_string(), expires);
                inner.ban_timeline.record(now);
                Some((score, expires, ban_secs))
            } else {
                inner.scores.insert(addr.to_string(), score);
                info!(ip = %addr, score, "Risk score adjusted");
                None
            }
        };

        if let Some((score, expires, ban_secs)) = banned_until {
            warn!(
                ip = %addr,
                score,
                duration_mins = ban_secs / 60.0,
                expires = %expires,
                "Auto-banned address"
            );
            self.broadcast_update().await;
        }
    }

    /// Ban check with lazy eviction: an expired ban is removed on observation
    /// and the address's score is cleared with it (full reset, not decay).
    pub async fn check_ban(&self, addr: &str) -> BanCheck {
        let now = Utc::now();

        {
            let inner = self.inner.read().await;
            match inner.bans.get(addr) {
                None => return BanCheck::Allowed,
                Some(expires) if now < *expires => {
                    return BanCheck::Banned { expires_at: *expires };
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, the state may have moved.
        let evicted = {
            let mut inner = self.inner.write().await;
            match inner.bans.get(addr).copied() {
                Some(expires) if now >= expires => {
                    inner.bans.remove(addr);
                    inner.scores.remove(addr);
                    true
                }
                Some(expires) => return BanCheck::Banned { expires_at: expires },
                None => false,
            }
        };

        if evicted {
            info!(ip = %addr, "Ban expired, address reset");
            self.broadcast_update().await;
        }
        BanCheck::Allowed
    }

    /// Decoy-path hit: full penalty through the scoring path, then a fixed
    /// hard ban far past the graduated cap, plus a synthetic log entry.
    pub async fn trip_honeypot(&self, addr: &str, method: &str, path: &str) {
        self.adjust_risk_score(addr, self.thresholds.honeypot_penalty).await;

        let now = Utc::now();
        {
            let mut inner = self.inner.write().await;
            let expires = now + ChronoDuration::seconds(self.thresholds.honeypot_ban_secs as i64);
            inner.bans.insert(addr.to_string(), expires);
            inner.log.push(RequestLogEntry::new(
                addr,
                method,
                path,
                HONEYPOT_LOCATION,
                HONEYPOT_ISP,
            ));
        }

        warn!(ip = %addr, path = %path, "Honeypot triggered");
        self.broadcast_update().await;
    }

    /// Operator-issued ban: fixed duration, forced score.
    pub async fn manual_ban(&self, addr: &str) {
        let now = Utc::now();
        {
            let mut inner = self.inner.write().await;
            let expires = now + ChronoDuration::seconds(self.thresholds.manual_ban_secs as i64);
            inner.bans.insert(addr.to_string(), expires);
            inner
                .scores
                .insert(addr.to_string(), self.thresholds.manual_ban_score);
            inner.ban_timeline.record(now);
        }

        warn!(ip = %addr, "Manually banned address");
        self.broadcast_update().await;
    }

    /// Clear both the ban and the score for an address.
    pub async fn unban(&self, addr: &str) {
        {
            let mut inner = self.inner.write().await;
            inner.bans.remove(addr);
            inner.scores.remove(addr);
        }

        info!(ip = %addr, "Unbanned address");
        self.broadcast_update().await;
    }

    /// One decay tick: relax every score toward zero, dropping records that
    /// reach it. Never touches the ban map, so a banned address's score keeps
    /// decaying underneath the ban.
    pub async fn decay_tick(&self) {
        let decay = self.thresholds.decay_amount;
        let (remaining, removed) = {
            let mut inner = self.inner.write().await;
            let before = inner.scores.len();
            inner.scores.retain(|_, score| {
                *score -= decay;
                *score > 0.0
            });
            (inner.scores.len(), before - inner.scores.len())
        };

        if removed > 0 || remaining > 0 {
            debug!(remaining, removed, "Risk decay tick");
        }
    }

    /// Record one admitted request: log entry, timeline bucket, counter.
    pub async fn record_request(&self, entry: RequestLogEntry) {
        {
            let mut inner = self.inner.write().await;
            inner.total_requests += 1;
            inner.request_timeline.record(entry.timestamp);
            inner.log.push(entry);
        }

        self.broadcast_update().await;
    }

    /// Empty the request log.
    pub async fn clear_logs(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.log.clear();
        }

        info!("Request log cleared");
        self.broadcast_update().await;
    }

    pub async fn total_requests(&self) -> u64 {
        self.inner.read().await.total_requests
    }

    pub async fn ban_timeline_count(&self, label: &str) -> u64 {
        self.inner.read().await.ban_timeline.count(label)
    }

    pub async fn request_timeline_count(&self, label: &str) -> u64 {
        self.inner.read().await.request_timeline.count(label)
    }

    /// The log, optionally filtered to one address (exact match).
    pub async fn logs(&self, addr: Option<&str>) -> Vec<RequestLogEntry> {
        let inner = self.inner.read().await;
        match addr {
            Some(addr) => inner.log.entries_for(addr),
            None => inner.log.entries(),
        }
    }

    /// Aggregate stats: counters plus the ban list enriched with cached
    /// metadata and current scores, plus the full score map.
    pub async fn stats(&self) -> StatsSnapshot {
        let all_info = self.metadata.get_all().await;
        let inner = self.inner.read().await;

        let banned_ips = inner
            .bans
            .keys()
            .map(|ip| BannedAddress {
                ip: ip.clone(),
                info: all_info.get(ip).cloned(),
                risk_score: inner.scores.get(ip).copied().unwrap_or(0.0),
            })
            .collect();

        StatsSnapshot {
            total_requests: inner.total_requests,
            banned_ips,
            active_risk_scores: inner.scores.clone(),
        }
    }

    /// Plain ban list and score map.
    pub async fn ban_list(&self) -> (Vec<String>, HashMap<String, f64>) {
        let inner = self.inner.read().await;
        (inner.bans.keys().cloned().collect(), inner.scores.clone())
    }

    /// Top-N addresses by score, descending. Ties keep an arbitrary stable
    /// order.
    pub async fn leaderboard(&self, limit: usize) -> Vec<RiskyAddress> {
        let all_info = self.metadata.get_all().await;
        let inner = self.inner.read().await;

        let mut entries: Vec<RiskyAddress> = inner
            .scores
            .iter()
            .map(|(ip, score)| RiskyAddress {
                ip: ip.clone(),
                score: *score,
                info: all_info.get(ip).cloned(),
            })
            .collect();

        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(limit);
        entries
    }

    /// Histogram of scores bucketed by integer floor.
    pub async fn distribution(&self) -> BTreeMap<i64, u64> {
        let inner = self.inner.read().await;
        let mut distribution = BTreeMap::new();
        for score in inner.scores.values() {
            *distribution.entry(score.floor() as i64).or_insert(0) += 1;
        }
        distribution
    }

    /// Both timelines, verbatim.
    pub async fn graph_data(&self) -> GraphData {
        let inner = self.inner.read().await;
        GraphData {
            requests: inner.request_timeline.clone(),
            bans: inner.ban_timeline.clone(),
        }
    }

    /// Recompute every dashboard feed and push it to all observers. Runs
    /// after every state-mutating event, one broadcast per mutation.
    pub async fn broadcast_update(&self) {
        let stats = self.stats().await;
        let logs = self.logs(None).await;
        let graph = self.graph_data().await;
        let risky = self.leaderboard(DEFAULT_LEADERBOARD_LIMIT).await;
        let distribution = self.distribution().await;

        self.broadcaster
            .publish(EVENT_STATS, serde_json::to_value(&stats).unwrap_or_default());
        self.broadcaster
            .publish(EVENT_LOGS, serde_json::to_value(&logs).unwrap_or_default());
        self.broadcaster
            .publish(EVENT_GRAPH_DATA, serde_json::to_value(&graph).unwrap_or_default());
        self.broadcaster
            .publish(EVENT_RISKY_IPS, json!({ "riskyIPs": risky }));
        self.broadcaster
            .publish(EVENT_RISK_DISTRIBUTION, json!({ "distribution": distribution }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RiskEngine {
        RiskEngine::new(
            RiskThresholds::default(),
            StateBroadcaster::new(),
            Arc::new(MetadataCache::in_memory()),
        )
    }

    fn engine_with(thresholds: RiskThresholds) -> RiskEngine {
        RiskEngine::new(
            thresholds,
            StateBroadcaster::new(),
            Arc::new(MetadataCache::in_memory()),
        )
    }

    #[tokio::test]
    async fn test_unobserved_address_scores_zero() {
        let engine = engine();
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
        assert!(!engine.is_banned("203.0.113.7").await);
    }

    #[tokio::test]
    async fn test_sub_threshold_adjustment_persists() {
        let engine = engine();
        engine.adjust_risk_score("203.0.113.7", 2.0).await;
        engine.adjust_risk_score("203.0.113.7", 1.5).await;

        assert_eq!(engine.score("203.0.113.7").await, 3.5);
        assert!(!engine.is_banned("203.0.113.7").await);
    }

    #[tokio::test]
    async fn test_threshold_installs_scaled_ban() {
        let engine = engine();
        engine.adjust_risk_score("203.0.113.7", 3.0).await;

        let before = Utc::now();
        engine.adjust_risk_score("203.0.113.7", 3.0).await;
        let after = Utc::now();

        // Sum reached 6.0 >= 5.0: duration = min(300s * 6, 1800s) = 1800s
        let expires = engine.ban_expiry("203.0.113.7").await.unwrap();
        assert!(expires >= before + ChronoDuration::seconds(1800));
        assert!(expires <= after + ChronoDuration::seconds(1800));

        // The tripping score is not written back; the last sub-threshold
        // value keeps being displayed.
        assert_eq!(engine.score("203.0.113.7").await, 3.0);
    }

    #[tokio::test]
    async fn test_ban_duration_scales_below_cap() {
        let engine = engine();

        let before = Utc::now();
        engine.adjust_risk_score("203.0.113.7", 5.0).await;
        let after = Utc::now();

        // Tripping score 5.0: duration = min(300s * 5, 1800s) = 1500s
        let expires = engine.ban_expiry("203.0.113.7").await.unwrap();
        assert!(expires >= before + ChronoDuration::seconds(1500));
        assert!(expires <= after + ChronoDuration::seconds(1500));
    }

    #[tokio::test]
    async fn test_ban_increments_ban_timeline() {
        let engine = engine();
        let label = minute_label(Utc::now());
        engine.adjust_risk_score("203.0.113.7", 5.0).await;
        assert_eq!(engine.ban_timeline_count(&label).await, 1);
    }

    #[tokio::test]
    async fn test_non_positive_delta_is_a_noop() {
        let engine = engine();
        engine.adjust_risk_score("203.0.113.7", 0.0).await;
        engine.adjust_risk_score("203.0.113.7", -3.0).await;
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
    }

    #[tokio::test]
    async fn test_decay_converges_to_absence() {
        let engine = engine();
        engine.adjust_risk_score("203.0.113.7", 2.0).await;

        engine.decay_tick().await;
        assert_eq!(engine.score("203.0.113.7").await, 1.0);

        engine.decay_tick().await;
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
        assert!(engine.distribution().await.is_empty());

        // Further ticks on an empty store are harmless
        engine.decay_tick().await;
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
    }

    #[tokio::test]
    async fn test_decay_never_touches_bans() {
        let engine = engine();
        engine.manual_ban("203.0.113.7").await;

        for _ in 0..10 {
            engine.decay_tick().await;
        }

        assert!(engine.is_banned("203.0.113.7").await);
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
    }

    #[tokio::test]
    async fn test_active_ban_denies() {
        let engine = engine();
        engine.manual_ban("203.0.113.7").await;

        match engine.check_ban("203.0.113.7").await {
            BanCheck::Banned { expires_at } => assert!(expires_at > Utc::now()),
            BanCheck::Allowed => panic!("freshly banned address must be denied"),
        }
        assert_eq!(engine.score("203.0.113.7").await, 5.0);
    }

    #[tokio::test]
    async fn test_expired_ban_is_lazily_evicted_with_score() {
        let engine = engine_with(RiskThresholds {
            manual_ban_secs: 0,
            ..RiskThresholds::default()
        });
        engine.manual_ban("203.0.113.7").await;

        assert_eq!(engine.check_ban("203.0.113.7").await, BanCheck::Allowed);
        assert!(engine.ban_expiry("203.0.113.7").await.is_none());
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
    }

    #[tokio::test]
    async fn test_unban_clears_both_maps() {
        let engine = engine();
        engine.manual_ban("203.0.113.7").await;
        engine.unban("203.0.113.7").await;

        assert!(engine.ban_expiry("203.0.113.7").await.is_none());
        assert_eq!(engine.score("203.0.113.7").await, 0.0);
        assert_eq!(engine.check_ban("203.0.113.7").await, BanCheck::Allowed);
    }

    #[tokio::test]
    async fn test_honeypot_hard_ban_and_synthetic_entry() {
        let engine = engine();
        let label = minute_label(Utc::now());

        let before = Utc::now();
        engine.trip_honeypot("203.0.113.7", "GET", "/wp-login.php").await;

        // Hard ban overrides the graduated duration entirely
        let expires = engine.ban_expiry("203.0.113.7").await.unwrap();
        assert!(expires >= before + ChronoDuration::hours(24) - ChronoDuration::seconds(5));

        assert_eq!(engine.ban_timeline_count(&label).await, 1);

        let logs = engine.logs(Some("203.0.113.7")).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].location, HONEYPOT_LOCATION);
        assert_eq!(logs[0].isp, HONEYPOT_ISP);
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_score_descending() {
        // High threshold so large scores stay in the map
        let engine = engine_with(RiskThresholds {
            risk_threshold: 100.0,
            ..RiskThresholds::default()
        });
        engine.adjust_risk_score("x.x.x.x", 3.0).await;
        engine.adjust_risk_score("y.y.y.y", 7.0).await;
        engine.adjust_risk_score("z.z.z.z", 1.0).await;

        let top = engine.leaderboard(2).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].ip, "y.y.y.y");
        assert_eq!(top[1].ip, "x.x.x.x");
    }

    #[tokio::test]
    async fn test_distribution_buckets_by_floor() {
        let engine = engine_with(RiskThresholds {
            risk_threshold: 100.0,
            ..RiskThresholds::default()
        });
        engine.adjust_risk_score("a", 1.2).await;
        engine.adjust_risk_score("b", 1.9).await;
        engine.adjust_risk_score("c", 3.0).await;

        let distribution = engine.distribution().await;
        assert_eq!(distribution.get(&1), Some(&2));
        assert_eq!(distribution.get(&3), Some(&1));
    }

    #[tokio::test]
    async fn test_record_request_updates_log_timeline_counter() {
        let engine = engine();
        let entry = RequestLogEntry::new("203.0.113.7", "GET", "/data", "Unknown", "Unknown");
        let label = minute_label(entry.timestamp);

        engine.record_request(entry).await;

        assert_eq!(engine.total_requests().await, 1);
        assert_eq!(engine.request_timeline_count(&label).await, 1);
        assert_eq!(engine.logs(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_mutation_broadcasts_all_feeds() {
        let engine = engine();
        let mut rx = engine.broadcaster().subscribe();

        engine.manual_ban("203.0.113.7").await;

        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(rx.recv().await.unwrap().event);
        }
        assert!(events.contains(&EVENT_STATS.to_string()));
        assert!(events.contains(&EVENT_LOGS.to_string()));
        assert!(events.contains(&EVENT_GRAPH_DATA.to_string()));
        assert!(events.contains(&EVENT_RISKY_IPS.to_string()));
        assert!(events.contains(&EVENT_RISK_DISTRIBUTION.to_string()));
    }

    #[tokio::test]
    async fn test_stats_snapshot_field_names() {
        let engine = engine();
        engine.manual_ban("203.0.113.7").await;

        let value = serde_json::to_value(engine.stats().await).unwrap();
        assert_eq!(value["totalRequests"], 0);
        assert_eq!(value["bannedIPs"][0]["ip"], "203.0.113.7");
        assert_eq!(value["bannedIPs"][0]["riskScore"], 5.0);
        assert_eq!(value["activeRiskScores"]["203.0.113.7"], 5.0);
    }

    #[tokio::test]
    async fn test_clear_logs_empties_log_only() {
        let engine = engine();
        engine
            .record_request(RequestLogEntry::new("1.1.1.1", "GET", "/", "Unknown", "Unknown"))
            .await;
        engine.clear_logs().await;

        assert!(engine.logs(None).await.is_empty());
        assert_eq!(engine.total_requests().await, 1);
    }
}
