//! Home Assistant websocket message types.
//!
//! Every frame is a JSON object discriminated by `type`. Requests after
//! authentication carry a client-chosen `id`; the hub echoes it on the
//! matching `result` and on every `event` of a subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type subscribed to for entity updates.
pub const STATE_CHANGED: &str = "state_changed";

// ── Entity state ────────────────────────────────────────────────────

/// One entity as reported by the hub, in `get_states` results and in
/// `state_changed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassState {
    pub entity_id: String,

    /// Primary value, always a string on the wire (`"on"`, `"21.5"`, ...).
    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl HassState {
    /// Whether this reading is strictly newer than `other`.
    ///
    /// A reading without a timestamp never wins against one that has it.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        match (self.last_updated, other.last_updated) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

// ── Service calls ───────────────────────────────────────────────────

/// An outbound `call_service` request, minus its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub service_data: Map<String, Value>,
}

impl ServiceCall {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data: Map::new(),
        }
    }

    /// Target a single entity via `service_data.entity_id`.
    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.service_data
            .insert("entity_id".into(), Value::String(entity_id.into()));
        self
    }

    /// `homeassistant.toggle`, which works for any on/off entity.
    pub fn toggle(entity_id: impl Into<String>) -> Self {
        Self::new("homeassistant", "toggle").with_entity(entity_id)
    }
}

// ── Outbound frames ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Outbound<'a> {
    Auth {
        access_token: &'a str,
    },
    SubscribeEvents {
        id: u64,
        event_type: &'a str,
    },
    GetStates {
        id: u64,
    },
    CallService {
        id: u64,
        #[serde(flatten)]
        call: &'a ServiceCall,
    },
}

impl Outbound<'_> {
    pub(crate) fn to_json(&self) -> String {
        // Infallible for these shapes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ── Inbound frames ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Inbound {
    AuthRequired,
    AuthOk,
    AuthInvalid {
        #[serde(default)]
        message: String,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<HubErrorBody>,
    },
    Event {
        id: u64,
        event: EventBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HubErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventBody {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Payload of a `state_changed` event. `new_state` is null when the
/// entity was removed from the hub.
#[derive(Debug, Deserialize)]
pub(crate) struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<HassState>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn call_service_is_flat() {
        let call = ServiceCall::toggle("switch.kitchen");
        let frame: Value = serde_json::from_str(
            &Outbound::CallService {
                id: 7,
                call: &call,
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "call_service",
                "id": 7,
                "domain": "homeassistant",
                "service": "toggle",
                "service_data": { "entity_id": "switch.kitchen" }
            })
        );
    }

    #[test]
    fn auth_frame_has_no_id() {
        let frame: Value = serde_json::from_str(
            &Outbound::Auth {
                access_token: "secret",
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(frame, json!({ "type": "auth", "access_token": "secret" }));
    }

    #[test]
    fn inbound_variants_parse() {
        let required: Inbound =
            serde_json::from_str(r#"{"type":"auth_required","ha_version":"2024.6.0"}"#).unwrap();
        assert!(matches!(required, Inbound::AuthRequired));

        let invalid: Inbound =
            serde_json::from_str(r#"{"type":"auth_invalid","message":"Invalid password"}"#)
                .unwrap();
        assert!(matches!(invalid, Inbound::AuthInvalid { message } if message == "Invalid password"));

        let pong: Inbound = serde_json::from_str(r#"{"type":"pong","id":3}"#).unwrap();
        assert!(matches!(pong, Inbound::Other));

        let failed: Inbound = serde_json::from_str(
            r#"{"id":4,"type":"result","success":false,"error":{"code":"not_found","message":"Service not found."}}"#,
        )
        .unwrap();
        match failed {
            Inbound::Result {
                id, success, error, ..
            } => {
                assert_eq!(id, 4);
                assert!(!success);
                assert_eq!(error.unwrap().code, "not_found");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn state_changed_event_parses() {
        let frame = json!({
            "id": 1,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "sensor.outside",
                    "old_state": null,
                    "new_state": {
                        "entity_id": "sensor.outside",
                        "state": "21.3",
                        "attributes": { "unit_of_measurement": "°C" },
                        "last_changed": "2024-06-01T10:00:00.123456+00:00",
                        "last_updated": "2024-06-01T10:00:00.123456+00:00"
                    }
                },
                "origin": "LOCAL",
                "time_fired": "2024-06-01T10:00:00.123456+00:00"
            }
        });
        let Inbound::Event { id, event } = serde_json::from_value(frame).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(id, 1);
        assert_eq!(event.event_type, STATE_CHANGED);
        let data: StateChangedData = serde_json::from_value(event.data).unwrap();
        let state = data.new_state.unwrap();
        assert_eq!(state.state, "21.3");
        assert_eq!(state.attributes["unit_of_measurement"], "°C");
        assert!(state.last_updated.is_some());
    }

    #[test]
    fn newer_than_compares_last_updated() {
        let mut a: HassState = serde_json::from_value(json!({
            "entity_id": "light.hall",
            "state": "on",
            "last_updated": "2024-06-01T10:00:01+00:00"
        }))
        .unwrap();
        let b: HassState = serde_json::from_value(json!({
            "entity_id": "light.hall",
            "state": "off",
            "last_updated": "2024-06-01T10:00:00+00:00"
        }))
        .unwrap();
        assert!(a.is_newer_than(&b));
        assert!(!b.is_newer_than(&a));
        assert!(!a.is_newer_than(&a.clone()));
        a.last_updated = None;
        assert!(!a.is_newer_than(&b));
    }
}
