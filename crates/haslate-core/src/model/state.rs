// ── Entity state ──
//
// Immutable snapshots of one entity. The store hands out `Arc`s to these
// and replaces them wholesale on every update.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// An attribute value. Nested structures from the hub are kept as their
/// JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// One observation of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    /// Primary value as reported (`"on"`, `"21.34"`, `"unavailable"`).
    pub value: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Scalar>,
    pub updated_at: DateTime<Utc>,
}

impl EntityState {
    pub fn new(id: impl Into<EntityId>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            attributes: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Scalar> {
        self.attributes.get(key)
    }

    /// `Some(true)` for `on`, `Some(false)` for `off`, `None` otherwise
    /// (`unavailable`, `unknown`, anything else).
    pub fn is_on(&self) -> Option<bool> {
        match self.value.as_str() {
            "on" => Some(true),
            "off" => Some(false),
            _ => None,
        }
    }

    pub fn numeric(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    /// Same value and attributes, ignoring when they were observed.
    pub fn same_reading(&self, other: &Self) -> bool {
        self.value == other.value && self.attributes == other.attributes
    }
}

/// Where an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Origin {
    Remote,
    Local,
}

/// What readers get back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEntry {
    pub state: Arc<EntityState>,
    /// Remote entries are flagged while the hub connection is down.
    pub is_stale: bool,
    pub origin: Origin,
}
