// ── Local sensors ──
//
// Battery, wifi and clock readings are polled from the device and written
// into the store as `local.*` pseudo-entities. Widgets bind to them exactly
// like hub entities; unchanged readings do not notify.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::model::{EntityId, EntityState};
use crate::store::EntityStore;

const CHARGING: &str = "charging";
const CONNECTED: &str = "connected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    /// 0..=100.
    pub charge_percent: u8,
    pub is_charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiReading {
    pub connected: bool,
    /// Link quality, 0..=100.
    pub signal_strength: u8,
}

/// Source of device-local readings. `None` means the device has no such
/// sensor or it could not be read this time.
pub trait LocalSensors: Send + Sync {
    fn battery(&self) -> Option<BatteryReading>;

    fn wifi(&self) -> Option<WifiReading>;

    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

impl BatteryReading {
    pub fn to_state(reading: Option<Self>) -> EntityState {
        match reading {
            Some(r) => EntityState::new(EntityId::local_battery(), r.charge_percent.to_string())
                .with_attribute(CHARGING, r.is_charging),
            None => EntityState::new(EntityId::local_battery(), "unknown")
                .with_attribute(CHARGING, false),
        }
    }

    pub fn from_state(state: &EntityState) -> Option<Self> {
        Some(Self {
            charge_percent: state.value.trim().parse::<u8>().ok()?.min(100),
            is_charging: state
                .attribute(CHARGING)
                .and_then(|s| s.as_bool())
                .unwrap_or(false),
        })
    }
}

impl WifiReading {
    pub fn to_state(reading: Option<Self>) -> EntityState {
        match reading {
            Some(r) => EntityState::new(EntityId::local_wifi(), r.signal_strength.to_string())
                .with_attribute(CONNECTED, r.connected),
            None => EntityState::new(EntityId::local_wifi(), "unavailable")
                .with_attribute(CONNECTED, false),
        }
    }

    pub fn from_state(state: &EntityState) -> Option<Self> {
        Some(Self {
            signal_strength: state.value.trim().parse::<u8>().ok()?.min(100),
            connected: state
                .attribute(CONNECTED)
                .and_then(|s| s.as_bool())
                .unwrap_or(false),
        })
    }
}

pub fn clock_state(now: DateTime<FixedOffset>) -> EntityState {
    EntityState::new(
        EntityId::local_clock(),
        now.to_rfc3339_opts(SecondsFormat::Secs, false),
    )
}

/// Read every sensor once and record the results.
pub fn sample(sensors: &dyn LocalSensors, store: &EntityStore) {
    let readings = [
        BatteryReading::to_state(sensors.battery()),
        WifiReading::to_state(sensors.wifi()),
        clock_state(sensors.now()),
    ];
    for state in readings {
        if let Err(e) = store.apply_local(state) {
            warn!(error = %e, "dropping local sensor reading");
        }
    }
}

/// Sample immediately, then every `every` until cancelled.
pub async fn poll_task(
    sensors: Arc<dyn LocalSensors>,
    store: Arc<EntityStore>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => sample(sensors.as_ref(), &store),
        }
    }
    tracing::debug!("sensor poll task stopped");
}

/// A sensor source with no hardware behind it: only the clock ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensors;

impl LocalSensors for NoSensors {
    fn battery(&self) -> Option<BatteryReading> {
        None
    }

    fn wifi(&self) -> Option<WifiReading> {
        None
    }
}
