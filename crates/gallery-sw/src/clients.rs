//! Foreground contexts (open tabs/windows) and their message ports.
//!
//! The worker has no ownership over client lifecycle; a context may
//! appear or vanish between any two operations, so a closed port is
//! skipped rather than treated as an error.

use gallery_common::{GalleryError, Result};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};
use url::Url;

/// Unique identifier for a foreground context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Message sent from the worker to a foreground context.
///
/// The wire forms are `{ "type": "GET_TOKEN" }` (with an attached reply
/// channel) and `{ "type": "SESSION_EXPIRED" }` (broadcast, no reply).
#[derive(Debug)]
pub enum ClientMessage {
    /// Ask the context to supply its bearer token. The reply is the raw
    /// token string, or `None` for a logged-out context.
    GetToken {
        reply: oneshot::Sender<Option<String>>,
    },
    /// The session was rejected upstream; the context should clear its
    /// credentials and show the login view.
    SessionExpired,
}

impl ClientMessage {
    /// JSON envelope of this message (reply channel excluded).
    pub fn wire(&self) -> serde_json::Value {
        match self {
            ClientMessage::GetToken { .. } => serde_json::json!({ "type": "GET_TOKEN" }),
            ClientMessage::SessionExpired => serde_json::json!({ "type": "SESSION_EXPIRED" }),
        }
    }
}

/// Worker-side handle to a foreground context.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Client ID.
    pub id: ClientId,

    /// Client URL at connect time.
    pub url: Url,

    /// Whether this context is controlled by the active worker.
    controlled: bool,

    /// Sender half of the message port.
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ClientHandle {
    /// Post a message to the context.
    pub fn post(&self, message: ClientMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| GalleryError::state("foreground port closed"))
    }

    /// Whether this context is controlled by the active worker.
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }
}

/// Page-side endpoint of a client's message port.
#[derive(Debug)]
pub struct ForegroundPort {
    /// The connected client's ID.
    pub client_id: ClientId,
    rx: mpsc::UnboundedReceiver<ClientMessage>,
}

impl ForegroundPort {
    /// Receive the next message from the worker.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.rx.try_recv().ok()
    }
}

/// Registry of currently open foreground contexts.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, ClientHandle>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context, returning its page-side port.
    pub fn connect(&mut self, url: Url) -> ForegroundPort {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::new();
        let handle = ClientHandle {
            id,
            url,
            controlled: false,
            tx,
        };
        trace!(client = id.raw(), "foreground context connected");
        self.clients.insert(id, handle);
        ForegroundPort { client_id: id, rx }
    }

    /// Remove a context.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Number of open contexts.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no contexts are open.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Get a context by ID.
    pub fn get(&self, id: ClientId) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    /// Snapshot of all open contexts, in registration order.
    pub fn match_all(&self) -> Vec<ClientHandle> {
        let mut all: Vec<ClientHandle> = self.clients.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        all
    }

    /// Take control of every open context.
    pub fn claim(&mut self) {
        for handle in self.clients.values_mut() {
            handle.controlled = true;
        }
    }

    /// Broadcast `SESSION_EXPIRED` to every open context.
    ///
    /// Fire-and-forget: a closed port is logged and skipped. Returns the
    /// number of contexts notified.
    pub fn broadcast_session_expired(&self) -> usize {
        let mut notified = 0;
        for handle in self.match_all() {
            match handle.post(ClientMessage::SessionExpired) {
                Ok(()) => notified += 1,
                Err(_) => warn!(client = handle.id.raw(), "expiry broadcast to closed port"),
            }
        }
        notified
    }
}
