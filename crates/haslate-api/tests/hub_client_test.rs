#![allow(clippy::unwrap_used)]
// Integration tests for the hub session against an in-process fake hub.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use haslate_api::{
    ConnectionState, ConnectionTracker, Error, HubClient, HubEvent, HubEventStream, HubHandle,
    HubSettings, ReconnectConfig, ServiceCall,
};

const TOKEN: &str = "test-token";

// ── Helpers ─────────────────────────────────────────────────────────

async fn bind() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}/api/websocket")).unwrap();
    (listener, url)
}

fn settings(url: Url) -> HubSettings {
    let mut settings = HubSettings::new(url, SecretString::from(TOKEN));
    settings.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    };
    settings
}

fn spawn(url: Url) -> (HubHandle, HubEventStream, ConnectionTracker, CancellationToken) {
    spawn_with(settings(url))
}

fn spawn_with(
    settings: HubSettings,
) -> (HubHandle, HubEventStream, ConnectionTracker, CancellationToken) {
    let tracker = ConnectionTracker::new();
    let cancel = CancellationToken::new();
    let (handle, events) = HubClient::spawn(settings, tracker.clone(), cancel.clone());
    (handle, events, tracker, cancel)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn recv_message(ws: &mut WebSocketStream<TcpStream>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

async fn recv_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        if let Message::Text(text) = recv_message(ws).await {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_event(events: &mut HubEventStream) -> HubEvent {
    tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap()
}

async fn expect_state(events: &mut HubEventStream, expected: ConnectionState) {
    match next_event(events).await {
        HubEvent::Connection(state) => assert_eq!(state, expected),
        other => panic!("expected Connection({expected:?}), got {other:?}"),
    }
}

fn entity(entity_id: &str, state: &str, updated: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": {},
        "last_changed": updated,
        "last_updated": updated,
    })
}

fn state_changed(subscription: u64, new_state: &Value) -> Value {
    json!({
        "id": subscription,
        "type": "event",
        "event": {
            "event_type": "state_changed",
            "data": {
                "entity_id": new_state["entity_id"],
                "old_state": null,
                "new_state": new_state,
            },
        },
    })
}

/// Run auth and read the two subscription requests; returns their ids.
async fn handshake(ws: &mut WebSocketStream<TcpStream>) -> (u64, u64) {
    send_json(ws, json!({ "type": "auth_required", "ha_version": "2024.6.0" })).await;
    let auth = recv_json(ws).await;
    assert_eq!(auth, json!({ "type": "auth", "access_token": TOKEN }));
    send_json(ws, json!({ "type": "auth_ok", "ha_version": "2024.6.0" })).await;

    let subscribe = recv_json(ws).await;
    assert_eq!(subscribe["type"], "subscribe_events");
    assert_eq!(subscribe["event_type"], "state_changed");
    let get_states = recv_json(ws).await;
    assert_eq!(get_states["type"], "get_states");

    (
        subscribe["id"].as_u64().unwrap(),
        get_states["id"].as_u64().unwrap(),
    )
}

async fn finish_subscription(
    ws: &mut WebSocketStream<TcpStream>,
    subscription: u64,
    states_id: u64,
    snapshot: Value,
) {
    send_json(
        ws,
        json!({ "id": subscription, "type": "result", "success": true, "result": null }),
    )
    .await;
    send_json(
        ws,
        json!({ "id": states_id, "type": "result", "success": true, "result": snapshot }),
    )
    .await;
}

// ── Session ─────────────────────────────────────────────────────────

#[tokio::test]
async fn full_session_buffers_events_until_snapshot() {
    let (listener, url) = bind().await;
    let (_handle, mut events, tracker, cancel) = spawn(url);

    let mut ws = accept(&listener).await;
    let (subscription, states_id) = handshake(&mut ws).await;
    assert_eq!((subscription, states_id), (1, 2));

    // Arrive before the snapshot: one newer than the snapshot, one older.
    let newer_a = entity("sensor.a", "22.0", "2024-06-01T10:00:05+00:00");
    let older_b = entity("sensor.b", "stale", "2024-06-01T10:00:00+00:00");
    send_json(&mut ws, state_changed(subscription, &newer_a)).await;
    send_json(&mut ws, state_changed(subscription, &older_b)).await;

    finish_subscription(
        &mut ws,
        subscription,
        states_id,
        json!([
            entity("sensor.a", "21.0", "2024-06-01T10:00:01+00:00"),
            entity("sensor.b", "fresh", "2024-06-01T10:00:03+00:00"),
        ]),
    )
    .await;

    expect_state(&mut events, ConnectionState::Connecting).await;
    expect_state(&mut events, ConnectionState::Authenticating).await;

    match next_event(&mut events).await {
        HubEvent::Snapshot(states) => {
            let values: Vec<(&str, &str)> = states
                .iter()
                .map(|s| (s.entity_id.as_str(), s.state.as_str()))
                .collect();
            assert_eq!(values, [("sensor.a", "21.0"), ("sensor.b", "fresh")]);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
    match next_event(&mut events).await {
        HubEvent::StateChanged(state) => {
            assert_eq!(state.entity_id, "sensor.a");
            assert_eq!(state.state, "22.0");
        }
        other => panic!("expected replayed change, got {other:?}"),
    }
    expect_state(&mut events, ConnectionState::Subscribed).await;
    assert_eq!(tracker.current(), ConnectionState::Subscribed);

    // Live events flow straight through.
    let live = entity("light.hall", "on", "2024-06-01T10:01:00+00:00");
    send_json(&mut ws, state_changed(subscription, &live)).await;
    match next_event(&mut events).await {
        HubEvent::StateChanged(state) => assert_eq!(state.entity_id, "light.hall"),
        other => panic!("expected live change, got {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn commands_carry_fresh_ids_and_report_outcomes() {
    let (listener, url) = bind().await;
    let (handle, mut events, _tracker, cancel) = spawn(url);

    assert!(matches!(
        handle.submit(ServiceCall::toggle("switch.kitchen")),
        Err(Error::NotConnected)
    ));

    let mut ws = accept(&listener).await;
    let (subscription, states_id) = handshake(&mut ws).await;
    finish_subscription(&mut ws, subscription, states_id, json!([])).await;

    loop {
        if let HubEvent::Connection(ConnectionState::Subscribed) = next_event(&mut events).await {
            break;
        }
    }

    let first = handle.submit(ServiceCall::toggle("switch.kitchen")).unwrap();
    let call = recv_json(&mut ws).await;
    assert_eq!(
        call,
        json!({
            "id": first,
            "type": "call_service",
            "domain": "homeassistant",
            "service": "toggle",
            "service_data": { "entity_id": "switch.kitchen" },
        })
    );
    send_json(
        &mut ws,
        json!({
            "id": first,
            "type": "result",
            "success": false,
            "error": { "code": "not_found", "message": "Unable to find service" },
        }),
    )
    .await;
    match next_event(&mut events).await {
        HubEvent::CommandResult { id, outcome } => {
            assert_eq!(id, first);
            assert!(matches!(
                outcome,
                Err(Error::CommandRejected { code, .. }) if code == "not_found"
            ));
        }
        other => panic!("expected command result, got {other:?}"),
    }

    let second = handle.submit(ServiceCall::toggle("switch.kitchen")).unwrap();
    assert!(second > first);
    let call = recv_json(&mut ws).await;
    assert_eq!(call["id"].as_u64(), Some(second));
    send_json(
        &mut ws,
        json!({ "id": second, "type": "result", "success": true, "result": null }),
    )
    .await;
    match next_event(&mut events).await {
        HubEvent::CommandResult { id, outcome } => {
            assert_eq!(id, second);
            assert!(outcome.is_ok());
        }
        other => panic!("expected command result, got {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn rejected_token_is_terminal() {
    let (listener, url) = bind().await;
    let (handle, mut events, tracker, _cancel) = spawn(url);

    let mut ws = accept(&listener).await;
    send_json(&mut ws, json!({ "type": "auth_required" })).await;
    let _auth = recv_json(&mut ws).await;
    send_json(
        &mut ws,
        json!({ "type": "auth_invalid", "message": "Invalid access token" }),
    )
    .await;

    expect_state(&mut events, ConnectionState::Connecting).await;
    expect_state(&mut events, ConnectionState::Authenticating).await;
    match next_event(&mut events).await {
        HubEvent::AuthRejected { message } => assert_eq!(message, "Invalid access token"),
        other => panic!("expected auth rejection, got {other:?}"),
    }
    expect_state(&mut events, ConnectionState::Disconnected).await;
    assert!(
        tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(tracker.current(), ConnectionState::Disconnected);
    assert!(matches!(
        handle.submit(ServiceCall::toggle("switch.kitchen")),
        Err(Error::NotConnected)
    ));

    // No second attempt.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn unreachable_hub_backs_off_and_retries() {
    let (listener, url) = bind().await;
    drop(listener);

    let (_handle, mut events, _tracker, cancel) = spawn(url);

    expect_state(&mut events, ConnectionState::Connecting).await;
    expect_state(&mut events, ConnectionState::Reconnecting { attempt: 1 }).await;
    expect_state(&mut events, ConnectionState::Connecting).await;
    expect_state(&mut events, ConnectionState::Reconnecting { attempt: 2 }).await;
    expect_state(&mut events, ConnectionState::Connecting).await;

    cancel.cancel();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
        {
            Some(HubEvent::Connection(ConnectionState::Disconnected)) => break,
            Some(_) => {}
            None => panic!("stream ended before Disconnected"),
        }
    }
}

#[tokio::test]
async fn dropped_connection_resubscribes_with_fresh_snapshot() {
    let (listener, url) = bind().await;
    let (_handle, mut events, _tracker, cancel) = spawn(url);

    let mut ws = accept(&listener).await;
    let (subscription, states_id) = handshake(&mut ws).await;
    finish_subscription(
        &mut ws,
        subscription,
        states_id,
        json!([entity("light.a", "on", "2024-06-01T10:00:00+00:00")]),
    )
    .await;
    loop {
        if let HubEvent::Connection(ConnectionState::Subscribed) = next_event(&mut events).await {
            break;
        }
    }

    drop(ws);
    expect_state(&mut events, ConnectionState::Reconnecting { attempt: 1 }).await;
    expect_state(&mut events, ConnectionState::Connecting).await;

    let mut ws = accept(&listener).await;
    let (subscription, states_id) = handshake(&mut ws).await;
    assert!(subscription > 2, "ids keep increasing across sessions");
    finish_subscription(
        &mut ws,
        subscription,
        states_id,
        json!([entity("light.a", "off", "2024-06-01T10:05:00+00:00")]),
    )
    .await;

    expect_state(&mut events, ConnectionState::Authenticating).await;
    match next_event(&mut events).await {
        HubEvent::Snapshot(states) => assert_eq!(states[0].state, "off"),
        other => panic!("expected snapshot, got {other:?}"),
    }
    expect_state(&mut events, ConnectionState::Subscribed).await;

    cancel.cancel();
}

#[tokio::test]
async fn shutdown_sends_close_frame() {
    let (listener, url) = bind().await;
    let (handle, mut events, _tracker, _cancel) = spawn(url);

    let mut ws = accept(&listener).await;
    let (subscription, states_id) = handshake(&mut ws).await;
    finish_subscription(&mut ws, subscription, states_id, json!([])).await;
    loop {
        if let HubEvent::Connection(ConnectionState::Subscribed) = next_event(&mut events).await {
            break;
        }
    }

    let closing = tokio::spawn(async move {
        let message = recv_message(&mut ws).await;
        assert!(matches!(message, Message::Close(_)), "got {message:?}");
    });

    handle.join().await;
    closing.await.unwrap();

    expect_state(&mut events, ConnectionState::Disconnected).await;
    assert!(events.next().await.is_none());
}

// ── Error policy ────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_frames_after_auth_are_dropped() {
    let (listener, url) = bind().await;
    let (_handle, mut events, tracker, cancel) = spawn(url);

    let mut ws = accept(&listener).await;
    let (subscription, states_id) = handshake(&mut ws).await;
    finish_subscription(&mut ws, subscription, states_id, json!([])).await;
    loop {
        if let HubEvent::Connection(ConnectionState::Subscribed) = next_event(&mut events).await {
            break;
        }
    }

    ws.send(Message::text("{ this is not json")).await.unwrap();
    send_json(&mut ws, json!({ "type": "event", "id": "not-a-number" })).await;
    let live = entity("sensor.after", "1", "2024-06-01T10:02:00+00:00");
    send_json(&mut ws, state_changed(subscription, &live)).await;

    match next_event(&mut events).await {
        HubEvent::StateChanged(state) => assert_eq!(state.entity_id, "sensor.after"),
        other => panic!("expected the change after the garbage, got {other:?}"),
    }
    assert_eq!(tracker.current(), ConnectionState::Subscribed);

    cancel.cancel();
}

#[tokio::test]
async fn unanswered_snapshot_forces_reconnect() {
    let (listener, url) = bind().await;
    let mut settings = settings(url);
    settings.snapshot_timeout = Duration::from_millis(100);
    let (_handle, mut events, _tracker, cancel) = spawn_with(settings);

    let mut ws = accept(&listener).await;
    let (_subscription, _states_id) = handshake(&mut ws).await;

    expect_state(&mut events, ConnectionState::Connecting).await;
    expect_state(&mut events, ConnectionState::Authenticating).await;
    expect_state(&mut events, ConnectionState::Reconnecting { attempt: 1 }).await;
    expect_state(&mut events, ConnectionState::Connecting).await;
    let _retry = accept(&listener).await;

    cancel.cancel();
    drop(ws);
}

#[tokio::test]
async fn silent_hub_during_auth_forces_reconnect() {
    let (listener, url) = bind().await;
    let mut settings = settings(url);
    settings.auth_timeout = Duration::from_millis(100);
    let (_handle, mut events, _tracker, cancel) = spawn_with(settings);

    // Accept the socket but never send auth_required.
    let ws = accept(&listener).await;

    expect_state(&mut events, ConnectionState::Connecting).await;
    expect_state(&mut events, ConnectionState::Authenticating).await;
    expect_state(&mut events, ConnectionState::Reconnecting { attempt: 1 }).await;

    cancel.cancel();
    drop(ws);
}
