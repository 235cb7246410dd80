//! Request classification and the three handling lanes.
//!
//! Every intercepted request is classified synchronously by URL path and
//! dispatched to an async handler; the fetch event is settled by that
//! handler's future. No request shape is left unhandled.

use std::sync::Arc;

use gallery_common::{GalleryError, Result, ResultExt};
use gallery_net::{Request, Response};
use http::StatusCode;
use tracing::{debug, trace, warn};

use crate::cache::CacheEntry;
use crate::{net_err, ServiceWorker, WorkerState};

/// Handling lane for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Static asset or the login page: cache-first, network results are
    /// not cached.
    Asset,
    /// API request: passthrough with opportunistic caching and cache
    /// fallback on network failure.
    Api,
    /// App root or dashboard: only a live session may pass.
    Gated,
    /// Everything else: same policy as assets.
    Fallback,
}

/// Classify a request path into its handling lane.
pub fn classify(config: &crate::WorkerConfig, path: &str) -> Route {
    if path.starts_with(&config.static_prefix) || path == config.login_path {
        Route::Asset
    } else if path.starts_with(&config.api_prefix) {
        Route::Api
    } else if config.gated_paths.iter().any(|gated| gated == path) {
        Route::Gated
    } else {
        Route::Fallback
    }
}

impl ServiceWorker {
    /// Route an intercepted request and produce its response.
    ///
    /// Errors are only returned when a request truly has no answer (a
    /// network failure with no cached fallback); every other path
    /// resolves to a response.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response> {
        if self.state().await != WorkerState::Activated {
            return Err(GalleryError::state("fetch routed to an inactive worker"));
        }
        let route = classify(&self.config, request.url.path());
        trace!(url = %request.url, ?route, "routing fetch");
        match route {
            Route::Asset | Route::Fallback => self.cache_first(request).await,
            Route::Api => self.handle_api(request).await,
            Route::Gated => self.handle_gated(request).await,
        }
    }

    /// Serve from cache when present, otherwise hit the network. The
    /// network result is not cached in this lane.
    async fn cache_first(&self, request: Request) -> Result<Response> {
        let key = request.url.to_string();
        let cached = self
            .caches
            .read()
            .await
            .match_any(&key)
            .map(CacheEntry::to_response);
        if let Some(response) = cached {
            trace!(url = %request.url, "cache hit");
            return Ok(response);
        }
        self.net.fetch(request).await.map_err(net_err)
    }

    /// API passthrough with opportunistic caching.
    async fn handle_api(&self, mut request: Request) -> Result<Response> {
        let is_session_check = request.url.path() == self.config.session_check_path;

        if is_session_check {
            if self.session.is_fresh().await {
                if let Some(status) = self.session.cached_status().await {
                    trace!("serving throttled session status from cache");
                    return Response::json_payload(&status)
                        .context("serializing cached session status");
                }
            }
            // Intent to check, recorded whether or not the fetch succeeds.
            self.session.mark_checked().await;
        }

        if !request.has_authorization() {
            if let Some(token) = self.broker.fetch_token().await {
                request = request.bearer(token.as_str());
            }
        }

        let key = request.cache_key();
        match self.net.fetch(request.clone()).await {
            Ok(response) => {
                if response.ok() {
                    self.store_api_response(&request, &response, key);
                    if is_session_check {
                        match response.json::<serde_json::Value>() {
                            Ok(status) => self.session.store_status(status).await,
                            Err(e) => {
                                warn!(error = %e, "session status payload was not valid JSON")
                            }
                        }
                    }
                }
                Ok(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "api fetch failed, trying cache");
                let cached = self
                    .caches
                    .read()
                    .await
                    .get(&self.config.api_cache_name)
                    .and_then(|cache| cache.match_key(&key))
                    .map(CacheEntry::to_response);
                match cached {
                    Some(response) => Ok(response),
                    None => Err(net_err(e)),
                }
            }
        }
    }

    /// Persist a successful API response without blocking the caller.
    fn store_api_response(&self, request: &Request, response: &Response, key: String) {
        let entry = CacheEntry::snapshot(&request.method, &request.url, response);
        let caches = Arc::clone(&self.caches);
        let partition = self.config.api_cache_name.clone();
        tokio::spawn(async move {
            caches.write().await.open(&partition).put(&key[..], entry);
            trace!(key = %key, "api response cached");
        });
    }

    /// Decide between serving the live request and a login redirect.
    async fn handle_gated(&self, request: Request) -> Result<Response> {
        match self.gate_session().await {
            Ok(Some(redirect)) => Ok(redirect),
            Ok(None) => self.net.fetch(request).await.map_err(net_err),
            Err(e) => {
                // Never block navigation on a broken gate.
                warn!(error = %e, "session gate failed, serving request unvalidated");
                self.net.fetch(request).await.map_err(net_err)
            }
        }
    }

    /// Session gate: `Some(redirect)` sends the caller to login, `None`
    /// lets the live request through.
    async fn gate_session(&self) -> Result<Option<Response>> {
        let Some(token) = self.broker.fetch_token().await else {
            debug!("no token available, redirecting to login");
            return Ok(Some(self.login_redirect()?));
        };

        if self.session.is_fresh().await {
            return Ok(None);
        }

        let endpoint = self.config.session_check_url()?;
        let probe = Request::get(endpoint).bearer(token.as_str());
        let response = self.net.fetch(probe).await.map_err(net_err)?;

        if response.status == StatusCode::UNAUTHORIZED {
            let notified = self.clients.read().await.broadcast_session_expired();
            debug!(clients = notified, "session expired, notified foreground contexts");
            return Ok(Some(self.login_redirect()?));
        }

        self.session.mark_checked().await;
        Ok(None)
    }

    fn login_redirect(&self) -> Result<Response> {
        Response::redirect(&self.config.login_path).map_err(net_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkerConfig;

    #[test]
    fn test_classify_lanes() {
        let config = WorkerConfig::default();
        assert_eq!(classify(&config, "/static/styles.css"), Route::Asset);
        assert_eq!(classify(&config, "/login"), Route::Asset);
        assert_eq!(classify(&config, "/api/check_session"), Route::Api);
        assert_eq!(classify(&config, "/api/data"), Route::Api);
        assert_eq!(classify(&config, "/"), Route::Gated);
        assert_eq!(classify(&config, "/dashboard"), Route::Gated);
        assert_eq!(classify(&config, "/about"), Route::Fallback);
        assert_eq!(classify(&config, "/staticfile"), Route::Fallback);
    }

    #[test]
    fn test_classify_prefix_boundaries() {
        let config = WorkerConfig::default();
        // "/dashboard" matches exactly, not as a prefix.
        assert_eq!(classify(&config, "/dashboard/settings"), Route::Fallback);
        // "/apiary" is not under the API prefix.
        assert_eq!(classify(&config, "/apiary"), Route::Fallback);
    }
}
