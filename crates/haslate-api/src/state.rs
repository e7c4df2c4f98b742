// ── Connection state ──
//
// Lifecycle of the hub session, published through one watch channel.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_subscribed(self) -> bool {
        self == Self::Subscribed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Subscribed => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// Single owner of the published [`ConnectionState`].
///
/// Created by whoever owns the session (the dashboard controller) and
/// handed to the client; clones share the same channel.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "hub connection state");
        }
    }
}
