//! Source-address metadata: resolver and side cache.
//!
//! Resolution asks an external geolocation API for country/city/ISP and is
//! strictly best-effort: failures are logged and degrade to `Unknown`
//! sentinels, never to the requester. Results are kept in a key-value cache
//! persisted as one JSON document keyed by address; the in-memory map is
//! authoritative and the file is rewritten wholesale on each store, so a
//! persistence failure leaves the engine running on memory alone.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::engine::request_log::UNKNOWN;

/// Resolved metadata for one source address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressMetadata {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    /// When this entry was resolved.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AddressMetadata {
    /// Human-readable location, `Unknown` when nothing resolved.
    pub fn location(&self) -> String {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            _ => UNKNOWN.to_string(),
        }
    }

    pub fn isp_or_unknown(&self) -> String {
        self.isp.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }
}

/// Wire shape of the upstream geolocation API.
#[derive(Debug, Deserialize)]
struct ResolverResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

/// Configuration for the resolver and cache.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Base URL of the geolocation API; the address is appended as a path segment.
    pub api_url: String,
    /// Timeout for one resolution call.
    pub timeout_secs: u64,
    /// Path of the JSON cache file.
    pub cache_path: PathBuf,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            api_url: "http://ip-api.com/json".to_string(),
            timeout_secs: 10,
            cache_path: PathBuf::from("ip-metadata.json"),
        }
    }
}

/// Key-value cache of address metadata, persisted wholesale.
#[derive(Debug)]
pub struct MetadataCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, AddressMetadata>>,
}

impl MetadataCache {
    /// A cache with no backing file. Entries live only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Load the cache file, starting empty when it is missing or unreadable.
    pub async fn load(path: PathBuf) -> Self {
        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<HashMap<String, AddressMetadata>>(&raw) {
                Ok(entries) => {
                    debug!(entries = entries.len(), path = %path.display(), "Loaded metadata cache");
                    entries
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Metadata cache file is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    pub async fn get(&self, addr: &str) -> Option<AddressMetadata> {
        self.entries.read().await.get(addr).cloned()
    }

    /// Store an entry and rewrite the cache file. Persistence failures are
    /// logged; the in-memory entry survives either way.
    pub async fn set(&self, addr: &str, mut info: AddressMetadata) {
        info.timestamp = Some(Utc::now());

        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.insert(addr.to_string(), info);
            entries.clone()
        };

        if let Some(ref path) = self.path {
            if let Err(err) = Self::persist(path, &snapshot).await {
                warn!(path = %path.display(), error = %err, "Failed to persist metadata cache");
            }
        }
    }

    pub async fn get_all(&self) -> HashMap<String, AddressMetadata> {
        self.entries.read().await.clone()
    }

    async fn persist(path: &PathBuf, entries: &HashMap<String, AddressMetadata>) -> Result<()> {
        let raw = serde_json::to_vec_pretty(entries).context("Failed to serialize metadata cache")?;
        tokio::fs::write(path, raw)
            .await
            .context("Failed to write metadata cache file")?;
        Ok(())
    }
}

/// Resolver plus cache, the lookup surface used by the request pipeline.
#[derive(Clone)]
pub struct MetadataService {
    client: reqwest::Client,
    api_url: String,
    cache: Arc<MetadataCache>,
}

impl MetadataService {
    pub fn new(config: &MetadataConfig, cache: Arc<MetadataCache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("vigil-gate/0.3")
            .build()
            .context("Failed to create metadata HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    pub fn cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.cache)
    }

    /// Cache-first lookup. A miss triggers one resolution attempt; any failure
    /// degrades to `None` and will simply be retried on a later request.
    pub async fn lookup(&self, addr: &str) -> Option<AddressMetadata> {
        if let Some(cached) = self.cache.get(addr).await {
            return Some(cached);
        }

        match self.resolve(addr).await {
            Ok(info) => {
                self.cache.set(addr, info.clone()).await;
                Some(info)
            }
            Err(err) => {
                warn!(ip = %addr, error = %err, "Failed to resolve address metadata");
                None
            }
        }
    }

    async fn resolve(&self, addr: &str) -> Result<AddressMetadata> {
        let url = format!("{}/{}", self.api_url, addr);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Metadata request failed")?;

        let payload: ResolverResponse = response
            .json()
            .await
            .context("Metadata response was not valid JSON")?;

        if payload.status.as_deref() == Some("fail") {
            anyhow::bail!("Resolver reported failure for {}", addr);
        }

        Ok(AddressMetadata {
            country: payload.country,
            city: payload.city,
            isp: payload.isp,
            ip: payload.query,
            timestamp: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(city: &str, country: &str, isp: &str) -> AddressMetadata {
        AddressMetadata {
            country: Some(country.to_string()),
            city: Some(city.to_string()),
            isp: Some(isp.to_string()),
            ip: None,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_set_get() {
        let cache = MetadataCache::in_memory();
        cache.set("1.1.1.1", sample("Sydney", "Australia", "APNIC")).await;

        let entry = cache.get("1.1.1.1").await.unwrap();
        assert_eq!(entry.location(), "Sydney, Australia");
        assert!(entry.timestamp.is_some());
        assert!(cache.get("2.2.2.2").await.is_none());
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let path = std::env::temp_dir().join(format!("vigil-meta-{}.json", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let cache = MetadataCache::load(path.clone()).await;
        cache.set("9.9.9.9", sample("Berkeley", "United States", "Quad9")).await;

        let reloaded = MetadataCache::load(path.clone()).await;
        let entry = reloaded.get("9.9.9.9").await.unwrap();
        assert_eq!(entry.isp_or_unknown(), "Quad9");

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn test_unknown_sentinels() {
        let empty = AddressMetadata {
            country: None,
            city: None,
            isp: None,
            ip: None,
            timestamp: None,
        };
        assert_eq!(empty.location(), UNKNOWN);
        assert_eq!(empty.isp_or_unknown(), UNKNOWN);
    }
}
