//! Token retrieval from foreground contexts.
//!
//! The worker never stores the bearer token; it is fetched fresh from a
//! foreground context on every use. The broker does not know which tab
//! is authoritative, so contexts are asked one at a time and the first
//! non-empty answer wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, RwLock};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::clients::{ClientMessage, Clients};

/// An opaque bearer credential supplied by a foreground context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a reply string, treating empty as absent.
    pub fn non_empty(raw: String) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Obtains the current bearer token via message round-trips.
///
/// Stateless per call; holds only the shared client registry and the
/// per-reply wait budget.
pub struct TokenBroker {
    clients: Arc<RwLock<Clients>>,
    reply_timeout: Duration,
}

impl TokenBroker {
    /// Create a broker over a shared client registry.
    pub fn new(clients: Arc<RwLock<Clients>>, reply_timeout: Duration) -> Self {
        Self {
            clients,
            reply_timeout,
        }
    }

    /// Fetch the current token, if any foreground context holds one.
    ///
    /// Contexts are queried sequentially in registration order; the first
    /// non-empty reply wins and later contexts are not contacted. No open
    /// contexts, all-absent replies, vanished contexts, and timed-out
    /// replies all yield `None` — a logged-out client is not an error.
    pub async fn fetch_token(&self) -> Option<Token> {
        let contexts = self.clients.read().await.match_all();
        if contexts.is_empty() {
            trace!("no foreground contexts, token unavailable");
            return None;
        }

        for client in contexts {
            let (tx, rx) = oneshot::channel();
            if client.post(ClientMessage::GetToken { reply: tx }).is_err() {
                // Context vanished between enumeration and send.
                continue;
            }
            let reply = match timeout(self.reply_timeout, rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => None,
                Err(_) => {
                    debug!(client = client.id.raw(), "token reply timed out");
                    None
                }
            };
            if let Some(token) = reply.and_then(Token::non_empty) {
                return Some(token);
            }
        }
        None
    }
}
