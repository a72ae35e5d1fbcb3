//! The adaptive risk & mitigation engine: reputation scoring, the ban
//! lifecycle, decoy detection, timeline aggregation and the bounded request
//! log.

pub mod honeypot;
pub mod request_log;
pub mod risk;
pub mod timeline;

pub use honeypot::{DECOY_PATHS, HONEYPOT_ISP, HONEYPOT_LOCATION, is_decoy_path};
pub use request_log::{RequestLog, RequestLogEntry, UNKNOWN};
pub use risk::{
    BanCheck, BannedAddress, DEFAULT_LEADERBOARD_LIMIT, GraphData, RiskEngine, RiskThresholds,
    RiskyAddress, StatsSnapshot,
};
pub use timeline::{Timeline, minute_label};
