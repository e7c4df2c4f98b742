//! Public surface of the hub client.
//!
//! [`HubClient::spawn`] starts the background session task and returns a
//! cloneable [`HubHandle`] for outbound commands plus the single
//! [`HubEventStream`] carrying everything the hub reports.
//!
//! ```rust,ignore
//! let tracker = ConnectionTracker::new();
//! let (handle, mut events) = HubClient::spawn(settings, tracker, cancel.child_token());
//! while let Some(event) = events.next().await {
//!     match event {
//!         HubEvent::Snapshot(states) => { /* replace remote entities */ }
//!         HubEvent::StateChanged(state) => { /* apply one */ }
//!         _ => {}
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use secrecy::SecretString;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::protocol::{HassState, ServiceCall};
use crate::state::{ConnectionState, ConnectionTracker};
use crate::websocket::{self, SessionContext};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_COMMAND_QUEUE: usize = 32;

// ── Settings ─────────────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Everything the session task needs to reach and talk to the hub.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub url: Url,
    pub token: SecretString,
    pub connect_timeout: Duration,
    pub auth_timeout: Duration,
    pub snapshot_timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// Capacity of the outbound command queue.
    pub command_queue: usize,
}

impl HubSettings {
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            snapshot_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            command_queue: DEFAULT_COMMAND_QUEUE,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Everything the session reports, in arrival order.
#[derive(Debug)]
pub enum HubEvent {
    /// The connection state changed.
    Connection(ConnectionState),
    /// Full entity listing; replaces all previously known remote entities.
    Snapshot(Vec<HassState>),
    /// One entity changed.
    StateChanged(HassState),
    /// The hub answered a submitted command.
    CommandResult { id: u64, outcome: Result<(), Error> },
    /// The token was refused; the session has stopped and will not retry.
    AuthRejected { message: String },
}

/// The session's event stream. Consumed once; ends when the session task
/// exits.
pub struct HubEventStream {
    inner: ReceiverStream<HubEvent>,
}

impl Stream for HubEventStream {
    type Item = HubEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

// ── Handle ───────────────────────────────────────────────────────────

pub(crate) struct PendingCall {
    pub id: u64,
    pub call: ServiceCall,
}

/// Cloneable handle for submitting commands to a running session.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<PendingCall>,
    next_id: Arc<AtomicU64>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl HubHandle {
    /// Queue a service call. Returns its correlation id; the outcome arrives
    /// later as [`HubEvent::CommandResult`].
    ///
    /// Fails immediately with [`Error::NotConnected`] unless the session is
    /// subscribed.
    pub fn submit(&self, call: ServiceCall) -> Result<u64, Error> {
        if !self.state.borrow().is_subscribed() {
            return Err(Error::NotConnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, domain = %call.domain, service = %call.service, "queueing service call");
        self.commands
            .try_send(PendingCall { id, call })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::QueueFull,
                mpsc::error::TrySendError::Closed(_) => Error::NotConnected,
            })?;
        Ok(id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Signal the session task to close the socket and stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Cancel the session and wait for its task to finish.
    pub async fn join(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

pub struct HubClient;

impl HubClient {
    /// Spawn the session task on the current tokio runtime.
    ///
    /// The first connection attempt happens asynchronously. `tracker` is the
    /// caller's connection-state publisher; `cancel` ends the session.
    pub fn spawn(
        settings: HubSettings,
        tracker: ConnectionTracker,
        cancel: CancellationToken,
    ) -> (HubHandle, HubEventStream) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(settings.command_queue.max(1));
        let next_id = Arc::new(AtomicU64::new(1));
        let state = tracker.subscribe();

        let ctx = SessionContext {
            settings,
            tracker,
            events: event_tx,
            commands: command_rx,
            next_id: Arc::clone(&next_id),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(websocket::hub_loop(ctx));

        let handle = HubHandle {
            commands: command_tx,
            next_id,
            state,
            cancel,
            task: Arc::new(std::sync::Mutex::new(Some(task))),
        };
        let stream = HubEventStream {
            inner: ReceiverStream::new(event_rx),
        };
        (handle, stream)
    }
}
