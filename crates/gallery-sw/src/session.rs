//! Session validity tracking and the interval gate.
//!
//! The monitor is an explicitly constructed instance created at worker
//! start and reset on restart; a fresh instance has never checked, which
//! forces one validation on the first gated navigation regardless of
//! wall-clock time since the real last check.

use std::time::{Duration, Instant};

use gallery_net::{Network, Request};
use http::StatusCode;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::broker::TokenBroker;
use crate::clients::Clients;

#[derive(Debug, Default)]
struct SessionState {
    /// When a validation call was last begun. Monotonically
    /// non-decreasing within one worker lifetime.
    last_checked: Option<Instant>,

    /// Last-known session-validity payload.
    status: Option<Value>,
}

/// Tracks session validity and throttles validation calls.
pub struct SessionMonitor {
    interval: Duration,
    state: RwLock<SessionState>,
}

impl SessionMonitor {
    /// Create a monitor with the given throttle interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// The configured throttle interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether less than the throttle interval has elapsed since the
    /// last recorded check. A monitor that has never checked is stale.
    pub async fn is_fresh(&self) -> bool {
        self.state
            .read()
            .await
            .last_checked
            .is_some_and(|at| at.elapsed() < self.interval)
    }

    /// Record intent to check, not success of a check.
    pub async fn mark_checked(&self) {
        let now = Instant::now();
        let mut state = self.state.write().await;
        state.last_checked = Some(state.last_checked.map_or(now, |prev| prev.max(now)));
    }

    /// Store the last-known session-validity payload.
    pub async fn store_status(&self, status: Value) {
        self.state.write().await.status = Some(status);
    }

    /// The last-known session-validity payload, if any.
    pub async fn cached_status(&self) -> Option<Value> {
        self.state.read().await.status.clone()
    }

    /// Probe the validation endpoint and broadcast expiry on rejection.
    ///
    /// A missing token is a no-op (a logged-out client has nothing to
    /// expire). A 401 notifies every foreground context; any other
    /// outcome, including network failure, does nothing further — this
    /// is a health-check probe, not a session refresh, and it never
    /// advances the throttle gate.
    pub async fn check_expiration(
        &self,
        broker: &TokenBroker,
        clients: &RwLock<Clients>,
        net: &dyn Network,
        endpoint: Url,
    ) {
        let Some(token) = broker.fetch_token().await else {
            return;
        };
        let probe = Request::get(endpoint).bearer(token.as_str());
        match net.fetch(probe).await {
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                let notified = clients.read().await.broadcast_session_expired();
                debug!(clients = notified, "session expired, notified foreground contexts");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "session check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientMessage;
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use gallery_net::{NetError, Response};
    use http::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StatusNetwork {
        status: StatusCode,
        calls: AtomicUsize,
    }

    impl StatusNetwork {
        fn new(status: StatusCode) -> Self {
            Self {
                status,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Network for StatusNetwork {
        fn fetch(&self, _request: Request) -> BoxFuture<'static, Result<Response, NetError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.status;
            Box::pin(async move {
                Ok(Response::new(status, HeaderMap::new(), Bytes::new()))
            })
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://gallery.example/api/check_session").unwrap()
    }

    #[tokio::test]
    async fn test_fresh_monitor_is_stale() {
        let monitor = SessionMonitor::new(Duration::from_secs(60));
        assert!(!monitor.is_fresh().await);
    }

    #[tokio::test]
    async fn test_mark_checked_freshens_gate() {
        let monitor = SessionMonitor::new(Duration::from_secs(60));
        monitor.mark_checked().await;
        assert!(monitor.is_fresh().await);
    }

    #[tokio::test]
    async fn test_gate_goes_stale_after_interval() {
        let monitor = SessionMonitor::new(Duration::from_millis(20));
        monitor.mark_checked().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!monitor.is_fresh().await);
    }

    #[tokio::test]
    async fn test_status_storage() {
        let monitor = SessionMonitor::new(Duration::from_secs(60));
        assert!(monitor.cached_status().await.is_none());

        let payload = serde_json::json!({"status": "active"});
        monitor.store_status(payload.clone()).await;
        assert_eq!(monitor.cached_status().await, Some(payload));
    }

    #[tokio::test]
    async fn test_check_expiration_without_token_is_noop() {
        let monitor = SessionMonitor::new(Duration::from_secs(60));
        let clients = Arc::new(RwLock::new(Clients::new()));
        let broker = TokenBroker::new(Arc::clone(&clients), Duration::from_millis(50));
        let net = StatusNetwork::new(StatusCode::UNAUTHORIZED);

        monitor
            .check_expiration(&broker, &clients, &net, endpoint())
            .await;
        assert_eq!(net.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_check_expiration_broadcasts_on_401() {
        let monitor = SessionMonitor::new(Duration::from_secs(60));
        let clients = Arc::new(RwLock::new(Clients::new()));
        let mut port = clients
            .write()
            .await
            .connect(Url::parse("https://gallery.example/").unwrap());
        let broker = TokenBroker::new(Arc::clone(&clients), Duration::from_millis(200));
        let net = StatusNetwork::new(StatusCode::UNAUTHORIZED);

        let responder = tokio::spawn(async move {
            let mut expired = 0;
            while let Some(message) = port.recv().await {
                match message {
                    ClientMessage::GetToken { reply } => {
                        let _ = reply.send(Some("tok-1".to_string()));
                    }
                    ClientMessage::SessionExpired => {
                        expired += 1;
                        break;
                    }
                }
            }
            expired
        });

        monitor
            .check_expiration(&broker, &clients, &net, endpoint())
            .await;

        assert_eq!(net.calls.load(Ordering::SeqCst), 1);
        assert_eq!(responder.await.unwrap(), 1);
        // The probe never advances the gate.
        assert!(!monitor.is_fresh().await);
    }

    #[tokio::test]
    async fn test_check_expiration_ignores_success() {
        let monitor = SessionMonitor::new(Duration::from_secs(60));
        let clients = Arc::new(RwLock::new(Clients::new()));
        let mut port = clients
            .write()
            .await
            .connect(Url::parse("https://gallery.example/").unwrap());
        let broker = TokenBroker::new(Arc::clone(&clients), Duration::from_millis(200));
        let net = StatusNetwork::new(StatusCode::OK);

        tokio::spawn(async move {
            while let Some(message) = port.recv().await {
                match message {
                    ClientMessage::GetToken { reply } => {
                        let _ = reply.send(Some("tok-1".to_string()));
                    }
                    ClientMessage::SessionExpired => panic!("unexpected expiry broadcast"),
                }
            }
        });

        monitor
            .check_expiration(&broker, &clients, &net, endpoint())
            .await;
        assert_eq!(net.calls.load(Ordering::SeqCst), 1);
    }
}
