//! Vigil Gate
//!
//! Inline traffic-mitigation gateway. Every inbound request is scored against
//! a per-source-address reputation model; suspicious sources are throttled,
//! banned or fed decoys, and the resulting state streams live to observers
//! while legitimate traffic is forwarded to the origin.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── engine/        - Adaptive risk & mitigation engine
//! │   ├── risk.rs       - Scores, bans, decay, snapshots
//! │   ├── honeypot.rs   - Decoy-path detection
//! │   ├── timeline.rs   - Per-minute event buckets
//! │   └── request_log.rs - Bounded FIFO request log
//! ├── limiter.rs     - Per-route rate limiting
//! ├── metadata.rs    - Address metadata resolver & side cache
//! ├── broadcast.rs   - State fan-out to observers
//! └── api/           - HTTP surface
//!     ├── gate.rs    - Mitigation-gate middleware
//!     ├── admin.rs   - Manual ban/unban, ban list, log clearing
//!     ├── stats.rs   - Dashboard, logs, leaderboard, histogram, timelines
//!     ├── realtime.rs - WebSocket observer channel
//!     └── proxy.rs   - Fallback forwarder to the origin
//! ```

pub mod api;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod limiter;
pub mod metadata;

// Re-export main types for convenience
pub use api::{AppState, OriginForwarder, create_router};
pub use broadcast::{BroadcastConfig, BroadcastMessage, StateBroadcaster};
pub use config::{GateConfig, LoggingConfig, RateRuleConfig, RiskConfig, ServerConfig, UpstreamConfig};
pub use engine::{
    BanCheck, BannedAddress, GraphData, RequestLogEntry, RiskEngine, RiskThresholds, RiskyAddress,
    StatsSnapshot, Timeline, minute_label,
};
pub use limiter::{RateDecision, RateLimiterSet, RouteLimiter, RouteRule};
pub use metadata::{AddressMetadata, MetadataCache, MetadataConfig, MetadataService};
