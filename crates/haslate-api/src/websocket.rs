//! Hub session loop with auto-reconnect.
//!
//! One task owns the socket: connect → authenticate → subscribe → stream.
//! Any transport or protocol failure drops the socket, publishes
//! `Reconnecting`, sleeps for the backoff delay and starts over. A refused
//! token ends the loop for good.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::client::{HubEvent, HubSettings, PendingCall, ReconnectConfig};
use crate::error::Error;
use crate::protocol::{HassState, Inbound, Outbound, STATE_CHANGED, StateChangedData};
use crate::state::{ConnectionState, ConnectionTracker};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

pub(crate) struct SessionContext {
    pub settings: HubSettings,
    pub tracker: ConnectionTracker,
    pub events: mpsc::Sender<HubEvent>,
    pub commands: mpsc::Receiver<PendingCall>,
    pub next_id: Arc<AtomicU64>,
    pub cancel: CancellationToken,
}

impl SessionContext {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn emit(&self, event: HubEvent) {
        // A dropped stream just means nobody is listening any more.
        let _ = self.events.send(event).await;
    }

    async fn transition(&self, state: ConnectionState) {
        self.tracker.set(state);
        self.emit(HubEvent::Connection(state)).await;
    }

    /// Drop commands queued for a connection that no longer exists.
    fn discard_queued(&mut self) {
        while let Ok(pending) = self.commands.try_recv() {
            tracing::warn!(
                id = pending.id,
                domain = %pending.call.domain,
                service = %pending.call.service,
                "discarding command queued before disconnect"
            );
        }
    }
}

/// A session only returns `Ok` when it was cancelled.
struct Cancelled;

// ── Background reconnection loop ─────────────────────────────────────

pub(crate) async fn hub_loop(mut ctx: SessionContext) {
    let mut attempt: u32 = 0;

    loop {
        ctx.transition(ConnectionState::Connecting).await;

        match run_session(&mut ctx, &mut attempt).await {
            Ok(Cancelled) => break,
            Err(Error::Authentication { message }) => {
                tracing::error!(%message, "hub rejected access token, not retrying");
                ctx.emit(HubEvent::AuthRejected { message }).await;
                break;
            }
            Err(e) => {
                attempt = attempt.saturating_add(1);
                tracing::warn!(error = %e, attempt, "hub session failed");
                ctx.transition(ConnectionState::Reconnecting { attempt })
                    .await;
                ctx.discard_queued();

                let delay = calculate_backoff(attempt, &ctx.settings.reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    ctx.discard_queued();
    ctx.transition(ConnectionState::Disconnected).await;
    tracing::debug!("hub session loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn run_session(ctx: &mut SessionContext, attempt: &mut u32) -> Result<Cancelled, Error> {
    let settings = &ctx.settings;
    tracing::info!(url = %settings.url, "connecting to hub");

    let connect = tokio::time::timeout(
        settings.connect_timeout,
        tokio_tungstenite::connect_async(settings.url.as_str()),
    );
    let connected = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return Ok(Cancelled),
        r = connect => r,
    };
    let (ws, _response) = connected.map_err(|_| timeout_error("connect", settings.connect_timeout))??;
    let (mut write, mut read) = ws.split();

    ctx.transition(ConnectionState::Authenticating).await;

    let auth = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => None,
        r = authenticate(&mut write, &mut read, &ctx.settings) => Some(r),
    };
    let Some(auth) = auth else {
        close(&mut write).await;
        return Ok(Cancelled);
    };
    if let Err(e) = auth {
        if e.is_auth_failure() {
            close(&mut write).await;
        }
        return Err(e);
    }
    tracing::info!("authenticated with hub");

    let subscription_id = ctx.next_id();
    send(
        &mut write,
        &Outbound::SubscribeEvents {
            id: subscription_id,
            event_type: STATE_CHANGED,
        },
    )
    .await?;
    let states_id = ctx.next_id();
    send(&mut write, &Outbound::GetStates { id: states_id }).await?;

    let snapshot = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => None,
        r = await_snapshot(&mut read, subscription_id, states_id, ctx.settings.snapshot_timeout) => Some(r),
    };
    let Some(snapshot) = snapshot else {
        close(&mut write).await;
        return Ok(Cancelled);
    };
    let (states, buffered) = snapshot?;

    let replay = newer_than_snapshot(&states, buffered);
    tracing::info!(
        entities = states.len(),
        replayed = replay.len(),
        "received state snapshot"
    );
    ctx.emit(HubEvent::Snapshot(states)).await;
    for state in replay {
        ctx.emit(HubEvent::StateChanged(state)).await;
    }

    *attempt = 0;
    ctx.transition(ConnectionState::Subscribed).await;

    stream_events(ctx, &mut write, &mut read, subscription_id).await
}

/// Wait for `auth_required`, answer with the token, wait for the verdict.
async fn authenticate(
    write: &mut WsWrite,
    read: &mut WsRead,
    settings: &HubSettings,
) -> Result<(), Error> {
    let timeout = settings.auth_timeout;

    match next_inbound(read, "auth_required", timeout).await? {
        Inbound::AuthRequired => {}
        other => {
            return Err(Error::Protocol {
                message: format!("expected auth_required, got {other:?}"),
            });
        }
    }

    send(
        write,
        &Outbound::Auth {
            access_token: settings.token.expose_secret(),
        },
    )
    .await?;

    match next_inbound(read, "auth_ok", timeout).await? {
        Inbound::AuthOk => Ok(()),
        Inbound::AuthInvalid { message } => Err(Error::Authentication { message }),
        other => Err(Error::Protocol {
            message: format!("expected auth_ok, got {other:?}"),
        }),
    }
}

/// Read until the `get_states` result arrives, buffering change events.
async fn await_snapshot(
    read: &mut WsRead,
    subscription_id: u64,
    states_id: u64,
    timeout: Duration,
) -> Result<(Vec<HassState>, Vec<HassState>), Error> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut buffered = Vec::new();

    loop {
        let text = tokio::select! {
            biased;
            () = &mut deadline => return Err(timeout_error("state snapshot", timeout)),
            t = next_text(read) => t?,
        };

        let frame = match serde_json::from_str::<Inbound>(&text) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed frame");
                continue;
            }
        };

        match frame {
            Inbound::Result {
                id, success, error, ..
            } if id == subscription_id => {
                if !success {
                    return Err(Error::Protocol {
                        message: format!(
                            "subscribe_events failed: {}",
                            error.map(|e| e.message).unwrap_or_default()
                        ),
                    });
                }
            }
            Inbound::Result {
                id,
                success,
                result,
                error,
            } if id == states_id => {
                if !success {
                    return Err(Error::Protocol {
                        message: format!(
                            "get_states failed: {}",
                            error.map(|e| e.message).unwrap_or_default()
                        ),
                    });
                }
                let states = serde_json::from_value::<Vec<HassState>>(
                    result.unwrap_or(serde_json::Value::Null),
                )
                .map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: text.clone(),
                })?;
                return Ok((states, buffered));
            }
            Inbound::Event { id, event } if id == subscription_id => {
                if let Some(state) = state_from_event(event.event_type.as_str(), event.data) {
                    buffered.push(state);
                }
            }
            other => tracing::trace!(?other, "ignoring frame during snapshot"),
        }
    }
}

/// Buffered events worth replaying on top of the snapshot.
fn newer_than_snapshot(snapshot: &[HassState], buffered: Vec<HassState>) -> Vec<HassState> {
    buffered
        .into_iter()
        .filter(|event| {
            snapshot
                .iter()
                .find(|s| s.entity_id == event.entity_id)
                .is_none_or(|s| event.is_newer_than(s))
        })
        .collect()
}

/// Steady state: forward events and command results, send queued commands.
async fn stream_events(
    ctx: &mut SessionContext,
    write: &mut WsWrite,
    read: &mut WsRead,
    subscription_id: u64,
) -> Result<Cancelled, Error> {
    loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                close(write).await;
                return Ok(Cancelled);
            }
            Some(pending) = ctx.commands.recv() => {
                tracing::debug!(id = pending.id, domain = %pending.call.domain, service = %pending.call.service, "sending service call");
                send(write, &Outbound::CallService { id: pending.id, call: &pending.call }).await?;
            }
            text = next_text(read) => {
                let text = text?;
                handle_frame(ctx, &text, subscription_id).await;
            }
        }
    }
}

async fn handle_frame(ctx: &SessionContext, text: &str, subscription_id: u64) {
    let frame = match serde_json::from_str::<Inbound>(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed frame");
            return;
        }
    };

    match frame {
        Inbound::Event { id, event } if id == subscription_id => {
            if let Some(state) = state_from_event(event.event_type.as_str(), event.data) {
                ctx.emit(HubEvent::StateChanged(state)).await;
            }
        }
        Inbound::Result {
            id, success, error, ..
        } => {
            let outcome = if success {
                Ok(())
            } else {
                let error = error.unwrap_or_default();
                tracing::warn!(id, code = %error.code, message = %error.message, "command rejected by hub");
                Err(Error::CommandRejected {
                    code: error.code,
                    message: error.message,
                })
            };
            ctx.emit(HubEvent::CommandResult { id, outcome }).await;
        }
        other => tracing::trace!(?other, "ignoring frame"),
    }
}

fn state_from_event(event_type: &str, data: serde_json::Value) -> Option<HassState> {
    if event_type != STATE_CHANGED {
        return None;
    }
    match serde_json::from_value::<StateChangedData>(data) {
        Ok(StateChangedData {
            new_state: Some(state),
            ..
        }) => Some(state),
        Ok(StateChangedData { entity_id, .. }) => {
            tracing::debug!(%entity_id, "entity removed on hub, keeping last known state");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed state_changed event");
            None
        }
    }
}

// ── Frame I/O ────────────────────────────────────────────────────────

async fn send(write: &mut WsWrite, frame: &Outbound<'_>) -> Result<(), Error> {
    write.send(Message::text(frame.to_json())).await?;
    Ok(())
}

async fn close(write: &mut WsWrite) {
    if let Err(e) = write.send(Message::Close(None)).await {
        tracing::debug!(error = %e, "close frame not delivered");
    }
}

/// Next text frame. Close frames and end of stream are failures.
async fn next_text(read: &mut WsRead) -> Result<String, Error> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "no close payload".to_owned(),
                    |cf| format!("{} {}", cf.code, cf.reason),
                );
                return Err(Error::Closed { reason });
            }
            Some(Ok(Message::Ping(_))) => {
                // tungstenite queues the pong itself
                tracing::trace!("hub ping");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(Error::Closed {
                    reason: "stream ended".into(),
                });
            }
        }
    }
}

/// Next frame during the handshake, where anything unparseable is fatal.
async fn next_inbound(
    read: &mut WsRead,
    phase: &'static str,
    timeout: Duration,
) -> Result<Inbound, Error> {
    let text = tokio::time::timeout(timeout, next_text(read))
        .await
        .map_err(|_| timeout_error(phase, timeout))??;
    serde_json::from_str(&text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text,
    })
}

fn timeout_error(phase: &'static str, timeout: Duration) -> Error {
    Error::Timeout {
        phase,
        timeout_secs: timeout.as_secs(),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with deterministic jitter.
///
/// `delay(n) = min(initial · 2^(n-1) · (1 + j(n)), max)` for `n ≥ 1`, where
/// `j(n)` lies in `[0, 0.25]`. The exponential term at least doubles per
/// attempt while the jitter factor varies by at most 1.25x, so the sequence
/// strictly increases until it reaches the cap.
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let n = attempt.max(1);
    let exponent = i32::try_from(n - 1).unwrap_or(i32::MAX).min(62);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);

    // Seeded from the attempt number so runs are reproducible.
    let jitter = 0.125 * (1.0 + (f64::from(n) * 7.3).sin());
    let delay = (base * (1.0 + jitter)).min(config.max_delay.as_secs_f64());

    Duration::from_secs_f64(delay.max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
