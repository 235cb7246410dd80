//! # Gallery Service Worker
//!
//! Request routing and session synchronization for the Gallery client:
//! the out-of-process worker that proxies network requests for open
//! tabs, keeps two cache partitions, and mediates bearer-token exchange
//! with foreground contexts.
//!
//! ## Features
//!
//! - **Lifecycle**: install (asset precache), activate (partition GC +
//!   client claim), fetch routing
//! - **Cache partitions**: `assets-cache` and `api-cache`
//! - **Token broker**: sequential `GET_TOKEN` round-trips, first
//!   non-empty reply wins
//! - **Session monitor**: throttled validation with `SESSION_EXPIRED`
//!   broadcasts
//!
//! ## Architecture
//!
//! ```text
//! network stack ──► ServiceWorker::handle_fetch
//!                        │
//!          ┌─────────────┼──────────────┐
//!          ▼             ▼              ▼
//!     cache-first    API handler   session gate
//!     (CacheStorage) (api-cache,   (TokenBroker,
//!                     throttle)     SessionMonitor)
//!                        │              │
//!                        └──── fetch ───┘
//!
//! TokenBroker ──GET_TOKEN──► foreground contexts (Clients)
//! SessionMonitor ──SESSION_EXPIRED──► every open context
//! ```
//!
//! All state lives on an explicitly constructed [`ServiceWorker`]
//! instance; the hosting runtime may terminate and respawn the worker at
//! any time, and a fresh instance starts from scratch.

use std::sync::Arc;

use gallery_common::{GalleryError, Result};
use gallery_net::{NetError, Network, Request};
use http::Method;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};
use url::Url;

pub mod broker;
pub mod cache;
pub mod clients;
pub mod config;
pub mod router;
pub mod session;

pub use broker::{Token, TokenBroker};
pub use cache::{Cache, CacheEntry, CacheStorage};
pub use clients::{ClientHandle, ClientId, ClientMessage, Clients, ForegroundPort};
pub use config::WorkerConfig;
pub use router::{classify, Route};
pub use session::SessionMonitor;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, nothing cached yet.
    New,
    /// Precaching the asset manifest.
    Installing,
    /// Assets cached, ready to activate.
    Installed,
    /// Purging stale partitions and claiming clients.
    Activating,
    /// Controlling pages and routing fetches.
    Activated,
    /// Install failed or the worker was replaced.
    Redundant,
}

/// The gallery service worker.
///
/// Owns the cache partitions, the client registry, the token broker and
/// the session monitor. One instance per worker lifetime.
pub struct ServiceWorker {
    config: WorkerConfig,
    lifecycle: RwLock<WorkerState>,
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    session: SessionMonitor,
    broker: TokenBroker,
    net: Arc<dyn Network>,
}

impl ServiceWorker {
    /// Create a worker over the given network backend.
    pub fn new(config: WorkerConfig, net: Arc<dyn Network>) -> Self {
        let clients = Arc::new(RwLock::new(Clients::new()));
        let broker = TokenBroker::new(Arc::clone(&clients), config.token_reply_timeout());
        let session = SessionMonitor::new(config.session_check_interval());
        Self {
            config,
            lifecycle: RwLock::new(WorkerState::New),
            caches: Arc::new(RwLock::new(CacheStorage::new())),
            clients,
            session,
            broker,
            net,
        }
    }

    /// The worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.lifecycle.read().await
    }

    /// The cache partitions.
    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.caches)
    }

    /// The session monitor.
    pub fn session(&self) -> &SessionMonitor {
        &self.session
    }

    /// Register a foreground context, returning its page-side port.
    pub async fn connect_client(&self, url: Url) -> ForegroundPort {
        self.clients.write().await.connect(url)
    }

    /// Remove a foreground context.
    pub async fn disconnect_client(&self, id: ClientId) -> bool {
        self.clients.write().await.disconnect(id)
    }

    /// Precache the asset manifest into the assets partition.
    ///
    /// Every manifest entry must fetch successfully; a single failure
    /// fails the install and leaves the worker redundant.
    pub async fn install(&self) -> Result<()> {
        self.transition(WorkerState::New, WorkerState::Installing)
            .await?;
        match self.precache_assets().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed).await;
                info!(assets = count, "install complete");
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Purge stale cache partitions and take control of open contexts.
    pub async fn activate(&self) -> Result<()> {
        self.transition(WorkerState::Installed, WorkerState::Activating)
            .await?;
        {
            let mut caches = self.caches.write().await;
            let valid = self.config.valid_partitions();
            let purged = caches.retain_partitions(&valid);
            if !purged.is_empty() {
                debug!(purged = purged.len(), "dropped stale cache partitions");
            }
            caches.open(&self.config.assets_cache_name);
            caches.open(&self.config.api_cache_name);
        }
        self.clients.write().await.claim();
        self.set_state(WorkerState::Activated).await;
        info!("worker activated");
        Ok(())
    }

    /// Probe session validity and broadcast expiry on rejection.
    pub async fn check_expiration(&self) {
        let endpoint = match self.config.session_check_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "session endpoint misconfigured");
                return;
            }
        };
        self.session
            .check_expiration(&self.broker, &self.clients, self.net.as_ref(), endpoint)
            .await;
    }

    /// Spawn the periodic session probe.
    ///
    /// The probe runs every throttle interval until the returned handle
    /// is stopped or dropped.
    pub fn spawn_session_timer(self: &Arc<Self>) -> SessionTimer {
        let worker = Arc::clone(self);
        let period = self.config.session_check_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(period) => worker.check_expiration().await,
                }
            }
        });
        SessionTimer {
            shutdown: Some(shutdown_tx),
        }
    }

    async fn precache_assets(&self) -> Result<usize> {
        let mut stored = 0;
        for path in &self.config.asset_manifest {
            let url = self.config.resolve(path)?;
            let response = self.net.fetch(Request::get(url.clone())).await.map_err(net_err)?;
            if !response.ok() {
                return Err(GalleryError::network(format!(
                    "precache of {path} returned {}",
                    response.status
                )));
            }
            let entry = CacheEntry::snapshot(&Method::GET, &url, &response);
            self.caches
                .write()
                .await
                .open(&self.config.assets_cache_name)
                .put(url.to_string(), entry);
            stored += 1;
        }
        Ok(stored)
    }

    async fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        let mut state = self.lifecycle.write().await;
        if *state != from {
            return Err(GalleryError::state(format!(
                "expected {from:?} worker, found {:?}",
                *state
            )));
        }
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: WorkerState) {
        *self.lifecycle.write().await = to;
    }
}

/// Handle to the periodic session probe.
pub struct SessionTimer {
    shutdown: Option<oneshot::Sender<()>>,
}

impl SessionTimer {
    /// Stop the probe loop. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Whether the probe has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_none()
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map a fetch failure into the worker's error space.
pub(crate) fn net_err(err: NetError) -> GalleryError {
    match err {
        NetError::Timeout(budget) => GalleryError::Timeout(budget),
        other => GalleryError::network_with_source("fetch failed", other),
    }
}
