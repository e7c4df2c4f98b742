// ── API-to-domain type conversions ──
//
// Bridges raw `haslate_api` hub states into canonical `EntityState`s.
// Attribute values are flattened to scalars; timestamps fall back from
// `last_updated` to `last_changed` to the time of receipt.

use chrono::Utc;
use serde_json::Value;

use haslate_api::HassState;

use crate::model::{EntityId, EntityState, Scalar};

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Text(n.to_string())),
            Value::String(s) => Self::Text(s),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Text(nested.to_string()),
        }
    }
}

impl From<HassState> for EntityState {
    fn from(state: HassState) -> Self {
        Self {
            id: EntityId::from(state.entity_id),
            value: state.state,
            attributes: state
                .attributes
                .into_iter()
                .map(|(k, v)| (k, Scalar::from(v)))
                .collect(),
            updated_at: state
                .last_updated
                .or(state.last_changed)
                .unwrap_or_else(Utc::now),
        }
    }
}
