// ── Entity identity ──
//
// Every entity, remote or local, is addressed by a dotted string key such
// as `sensor.outside_temperature`. Local pseudo-entities share the reserved
// `local.` domain.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Domain reserved for pseudo-entities fed by local sensors.
pub const LOCAL_DOMAIN: &str = "local";

/// Opaque lookup key for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn local_battery() -> Self {
        Self::new("local.battery")
    }

    pub fn local_wifi() -> Self {
        Self::new("local.wifi")
    }

    pub fn local_clock() -> Self {
        Self::new("local.clock")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `.` (the whole id when there is none).
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(d, _)| d)
    }

    /// Whether this id belongs to the local pseudo-entity namespace.
    pub fn is_local(&self) -> bool {
        self.domain() == LOCAL_DOMAIN
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_and_namespace() {
        let id = EntityId::from("sensor.outside_temperature");
        assert_eq!(id.domain(), "sensor");
        assert!(!id.is_local());

        assert!(EntityId::local_clock().is_local());
        assert_eq!(EntityId::from("bare").domain(), "bare");
        assert!(!EntityId::from("localized.thing").is_local());
    }
}
