//! State broadcaster.
//!
//! Fans the engine's state out to every connected observer. Each mutating
//! event republishes the full set of dashboard feeds; observers that fall
//! behind drop messages rather than back-pressuring the request pipeline.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Event names pushed over the realtime channel.
pub const EVENT_STATS: &str = "updateStats";
pub const EVENT_LOGS: &str = "updateLogs";
pub const EVENT_GRAPH_DATA: &str = "updateGraphData";
pub const EVENT_RISKY_IPS: &str = "updateRiskyIPs";
pub const EVENT_RISK_DISTRIBUTION: &str = "updateRiskDistribution";

/// One message on the realtime channel.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMessage {
    pub event: String,
    pub data: Value,
}

impl BroadcastMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to a text frame for the wire.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Configuration for the broadcaster.
#[derive(Clone, Debug)]
pub struct BroadcastConfig {
    /// Maximum number of messages buffered per subscriber.
    pub buffer_size: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { buffer_size: 128 }
    }
}

/// Publishes state updates to all subscribed observers.
#[derive(Debug, Clone)]
pub struct StateBroadcaster {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self::with_config(BroadcastConfig::default())
    }

    pub fn with_config(config: BroadcastConfig) -> Self {
        let (sender, _) = broadcast::channel(config.buffer_size);
        Self { sender }
    }

    /// Subscribe to the stream of state updates.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }

    /// Publish one event. A send error only means no observer is connected.
    pub fn publish(&self, event: &str, data: Value) {
        let _ = self.sender.send(BroadcastMessage::new(event, data));
    }

    /// Number of currently subscribed observers.
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
