//! Named cache partitions holding response snapshots.
//!
//! Two partitions exist concurrently: the asset partition, populated once
//! at install, and the API partition, updated opportunistically on
//! successful API responses. Anything else is purged at activation.

use bytes::Bytes;
use gallery_net::Response;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// A stored response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for storage.
    pub fn snapshot(method: &Method, url: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            url: url.to_string(),
            method: method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            stored_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Rebuild a response from this snapshot.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        Response::new(
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            Bytes::from(self.body.clone()),
        )
    }
}

/// A single named cache partition.
#[derive(Debug, Default)]
pub struct Cache {
    name: String,
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache partition.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Partition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an entry by key.
    pub fn match_key(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry. Last write wins per key.
    pub fn put(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Delete an entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the partition is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The set of named cache partitions owned by the worker.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a partition, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Check if a partition exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Get a partition without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Delete a partition.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All partition names.
    pub fn keys(&self) -> Vec<&str> {
        self.caches.keys().map(|s| s.as_str()).collect()
    }

    /// Look up a key across all partitions.
    pub fn match_any(&self, key: &str) -> Option<&CacheEntry> {
        self.caches.values().find_map(|cache| cache.match_key(key))
    }

    /// Delete every partition not in `valid`, returning the purged names.
    pub fn retain_partitions(&mut self, valid: &[&str]) -> Vec<String> {
        let stale: Vec<String> = self
            .caches
            .keys()
            .filter(|name| !valid.contains(&name.as_str()))
            .cloned()
            .collect();
        for name in &stale {
            self.caches.remove(name);
            debug!(partition = %name, "purged stale cache partition");
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    fn entry(url: &str) -> CacheEntry {
        let response = Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"body"),
        );
        CacheEntry::snapshot(&Method::GET, &Url::parse(url).unwrap(), &response)
    }

    #[test]
    fn test_put_and_match() {
        let mut cache = Cache::new("assets-cache");
        let url = "https://gallery.example/static/styles.css";
        cache.put(url, entry(url));

        assert!(cache.match_key(url).is_some());
        assert!(cache.match_key("https://gallery.example/other.css").is_none());
    }

    #[test]
    fn test_delete() {
        let mut cache = Cache::new("assets-cache");
        let url = "https://gallery.example/static/styles.css";
        cache.put(url, entry(url));

        assert!(cache.delete(url));
        assert!(!cache.delete(url));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = Response::new(
            StatusCode::CREATED,
            headers,
            Bytes::from_static(b"{\"ok\":true}"),
        );
        let url = Url::parse("https://gallery.example/api/data").unwrap();

        let rebuilt = CacheEntry::snapshot(&Method::POST, &url, &response).to_response();
        assert_eq!(rebuilt.status, StatusCode::CREATED);
        assert_eq!(rebuilt.header("content-type"), Some("application/json"));
        assert_eq!(rebuilt.body, response.body);
    }

    #[test]
    fn test_open_creates_partition() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("api-cache"));

        storage.open("api-cache");
        assert!(storage.has("api-cache"));
    }

    #[test]
    fn test_match_any_spans_partitions() {
        let mut storage = CacheStorage::new();
        let url = "https://gallery.example/static/styles.css";
        storage.open("assets-cache").put(url, entry(url));

        storage.open("api-cache");
        assert!(storage.match_any(url).is_some());
        assert!(storage.match_any("https://gallery.example/nope").is_none());
    }

    #[test]
    fn test_retain_partitions_purges_stale() {
        let mut storage = CacheStorage::new();
        storage.open("assets-cache");
        storage.open("api-cache");
        storage.open("gallery-v1");
        storage.open("gallery-v2");

        let purged = storage.retain_partitions(&["assets-cache", "api-cache"]);

        assert_eq!(purged.len(), 2);
        assert!(purged.contains(&"gallery-v1".to_string()));
        assert!(storage.has("assets-cache"));
        assert!(storage.has("api-cache"));
        assert!(!storage.has("gallery-v2"));
    }
}
