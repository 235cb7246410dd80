//! Worker configuration.

use std::time::Duration;

use gallery_common::{GalleryError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for the gallery service worker.
///
/// Paths are matched against the URL path of intercepted requests; the
/// origin is only needed to resolve asset-manifest entries at install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin the worker serves, e.g. `https://gallery.example`.
    pub origin: String,

    /// Paths precached into the asset partition at install.
    pub asset_manifest: Vec<String>,

    /// Name of the static asset cache partition.
    pub assets_cache_name: String,

    /// Name of the API response cache partition.
    pub api_cache_name: String,

    /// Path prefix for static assets.
    pub static_prefix: String,

    /// Login page path.
    pub login_path: String,

    /// Path prefix for API requests.
    pub api_prefix: String,

    /// Paths that only a live session may see.
    pub gated_paths: Vec<String>,

    /// Session validation endpoint path.
    pub session_check_path: String,

    /// Minimum spacing between session validation calls, in milliseconds.
    pub session_check_interval_ms: u64,

    /// How long to wait for a token reply from a client, in milliseconds.
    pub token_reply_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "https://gallery.example".to_string(),
            asset_manifest: vec![
                "/".to_string(),
                "/login".to_string(),
                "/static/styles.css".to_string(),
                "/static/script.js".to_string(),
                "/static/icon.png".to_string(),
                "/static/manifest.json".to_string(),
            ],
            assets_cache_name: "assets-cache".to_string(),
            api_cache_name: "api-cache".to_string(),
            static_prefix: "/static/".to_string(),
            login_path: "/login".to_string(),
            api_prefix: "/api/".to_string(),
            gated_paths: vec!["/".to_string(), "/dashboard".to_string()],
            session_check_path: "/api/check_session".to_string(),
            session_check_interval_ms: 60_000,
            token_reply_timeout_ms: 5000,
        }
    }
}

impl WorkerConfig {
    /// Minimum spacing between session validation calls.
    pub fn session_check_interval(&self) -> Duration {
        Duration::from_millis(self.session_check_interval_ms)
    }

    /// Budget for a single token reply wait.
    pub fn token_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.token_reply_timeout_ms)
    }

    /// The configured origin as a parsed URL.
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| GalleryError::config_with_source(format!("bad origin {}", self.origin), e))
    }

    /// Resolve a path from the asset manifest against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| GalleryError::config_with_source(format!("bad path {path}"), e))
    }

    /// Absolute URL of the session validation endpoint.
    pub fn session_check_url(&self) -> Result<Url> {
        self.resolve(&self.session_check_path)
    }

    /// The cache partition names the worker considers valid.
    pub fn valid_partitions(&self) -> [&str; 2] {
        [&self.assets_cache_name, &self.api_cache_name]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.assets_cache_name, "assets-cache");
        assert_eq!(config.api_cache_name, "api-cache");
        assert_eq!(config.session_check_interval(), Duration::from_secs(60));
        assert!(config.asset_manifest.contains(&"/login".to_string()));
    }

    #[test]
    fn test_resolve_joins_origin() {
        let config = WorkerConfig::default();
        let url = config.resolve("/static/styles.css").unwrap();
        assert_eq!(url.as_str(), "https://gallery.example/static/styles.css");
    }

    #[test]
    fn test_bad_origin_is_config_error() {
        let config = WorkerConfig {
            origin: "not a url".to_string(),
            ..Default::default()
        };
        let err = config.origin_url().unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_session_check_url() {
        let config = WorkerConfig::default();
        let url = config.session_check_url().unwrap();
        assert_eq!(url.path(), "/api/check_session");
    }
}
