//! Bounded in-memory request log.
//!
//! Every request admitted past the mitigation gate is recorded here, enriched
//! with whatever location/ISP metadata could be resolved. The log is a FIFO
//! ring: once capacity is exceeded the oldest entry is dropped. Insertion
//! order is the only order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Sentinel used when metadata resolution failed or returned nothing.
pub const UNKNOWN: &str = "Unknown";

/// One observed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub location: String,
    pub isp: String,
}

impl RequestLogEntry {
    pub fn new(
        ip: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        location: impl Into<String>,
        isp: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            ip: ip.into(),
            method: method.into(),
            path: path.into(),
            location: location.into(),
            isp: isp.into(),
        }
    }
}

/// FIFO log with a hard capacity.
#[derive(Debug)]
pub struct RequestLog {
    entries: VecDeque<RequestLogEntry>,
    capacity: usize,
}

impl RequestLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one if the log is full.
    pub fn push(&mut self, entry: RequestLogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> Vec<RequestLogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Entries from one source address, in insertion order.
    pub fn entries_for(&self, ip: &str) -> Vec<RequestLogEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.ip == ip)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ip: &str, path: &str) -> RequestLogEntry {
        RequestLogEntry::new(ip, "GET", path, UNKNOWN, UNKNOWN)
    }

    #[test]
    fn test_push_and_filter() {
        let mut log = RequestLog::with_capacity(10);
        log.push(entry("1.1.1.1", "/a"));
        log.push(entry("2.2.2.2", "/b"));
        log.push(entry("1.1.1.1", "/c"));

        assert_eq!(log.len(), 3);
        let filtered = log.entries_for("1.1.1.1");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].path, "/a");
        assert_eq!(filtered[1].path, "/c");
    }

    #[test]
    fn test_capacity_evicts_oldest_only() {
        let mut log = RequestLog::with_capacity(3);
        for i in 0..4 {
            log.push(entry("1.1.1.1", &format!("/{}", i)));
        }

        assert_eq!(log.len(), 3);
        let paths: Vec<_> = log.entries().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["/1", "/2", "/3"]);
    }

    #[test]
    fn test_clear() {
        let mut log = RequestLog::with_capacity(3);
        log.push(entry("1.1.1.1", "/a"));
        log.clear();
        assert!(log.is_empty());
    }
}
