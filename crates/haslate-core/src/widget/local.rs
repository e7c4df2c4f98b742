// ── Local sensor widgets ──
//
// Clock, battery and wifi read the `local.*` pseudo-entities the sensor
// poller keeps in the store.

use std::fmt::Write as _;

use chrono::DateTime;
use chrono::format::{Item, StrftimeItems};
use haslate_config::WidgetSpec;

use super::{FALLBACK, WidgetBehavior, WidgetContent, choice};
use crate::model::EntityId;
use crate::sensors::{BatteryReading, WifiReading};
use crate::store::EntityStore;

const DEFAULT_CLOCK_FORMAT: &str = "%H:%M";

// ── Clock ────────────────────────────────────────────────────────────

/// `datetime`: strftime formatting of the local clock. A line break in the
/// format splits it into label and value formats.
#[derive(Debug, Clone)]
pub struct ClockWidget {
    label_format: Option<String>,
    value_format: String,
    label: String,
}

impl ClockWidget {
    pub fn new(spec: &WidgetSpec) -> Result<Self, String> {
        let format = spec.format.as_deref().unwrap_or(DEFAULT_CLOCK_FORMAT);
        let (label_format, value_format) = match format.split_once('\n') {
            Some((label, value)) => (Some(label.to_owned()), value.to_owned()),
            None => (None, format.to_owned()),
        };
        for f in label_format.iter().chain(std::iter::once(&value_format)) {
            if StrftimeItems::new(f).any(|item| matches!(item, Item::Error)) {
                return Err(format!("invalid strftime format '{f}'"));
            }
        }
        Ok(Self {
            label_format,
            value_format,
            label: spec.style.label.clone().unwrap_or_default(),
        })
    }
}

impl WidgetBehavior for ClockWidget {
    fn bindings(&self) -> Vec<EntityId> {
        vec![EntityId::local_clock()]
    }

    fn render(&self, store: &EntityStore) -> WidgetContent {
        let now = store
            .get(&EntityId::local_clock())
            .and_then(|e| DateTime::parse_from_rfc3339(&e.state.value).ok());
        let Some(now) = now else {
            return WidgetContent {
                label: self.label.clone(),
                value: FALLBACK.into(),
                ..WidgetContent::default()
            };
        };

        let strftime = |f: &str| {
            let mut out = String::new();
            match write!(out, "{}", now.format(f)) {
                Ok(()) => out,
                Err(_) => "!fmt".into(),
            }
        };
        WidgetContent {
            label: self
                .label_format
                .as_deref()
                .map_or_else(|| self.label.clone(), strftime),
            value: strftime(&self.value_format),
            ..WidgetContent::default()
        }
    }
}

// ── Battery ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rendering {
    Icon,
    Percent,
}

fn rendering(spec: &WidgetSpec) -> Result<Rendering, String> {
    Ok(match choice(spec, &["icon", "percent"])? {
        "percent" => Rendering::Percent,
        _ => Rendering::Icon,
    })
}

/// `battery`: charge level as an icon ladder or a percentage.
#[derive(Debug, Clone)]
pub struct BatteryWidget {
    rendering: Rendering,
    label: String,
}

impl BatteryWidget {
    pub fn new(spec: &WidgetSpec) -> Result<Self, String> {
        Ok(Self {
            rendering: rendering(spec)?,
            label: spec.style.label.clone().unwrap_or_default(),
        })
    }
}

pub(crate) fn battery_icon(reading: Option<BatteryReading>) -> &'static str {
    let Some(reading) = reading else {
        return "battery-unknown";
    };
    let charging = reading.is_charging;
    match reading.charge_percent / 10 * 10 {
        0 if charging => "battery-charging-outline",
        0 => "battery-alert",
        10 if charging => "battery-charging-10",
        10 => "battery-10",
        20 if charging => "battery-charging-20",
        20 => "battery-20",
        30 if charging => "battery-charging-30",
        30 => "battery-30",
        40 if charging => "battery-charging-40",
        40 => "battery-40",
        50 if charging => "battery-charging-50",
        50 => "battery-50",
        60 if charging => "battery-charging-60",
        60 => "battery-60",
        70 if charging => "battery-charging-70",
        70 => "battery-70",
        80 if charging => "battery-charging-80",
        80 => "battery-80",
        90 if charging => "battery-charging-90",
        90 => "battery-90",
        _ if charging => "battery-charging",
        _ => "battery",
    }
}

pub(crate) fn battery_percent(reading: Option<BatteryReading>) -> String {
    match reading {
        None => "???%".into(),
        Some(r) if r.is_charging => format!("+{}%", r.charge_percent),
        Some(r) => format!("{}%", r.charge_percent),
    }
}

impl WidgetBehavior for BatteryWidget {
    fn bindings(&self) -> Vec<EntityId> {
        vec![EntityId::local_battery()]
    }

    fn render(&self, store: &EntityStore) -> WidgetContent {
        let reading = store
            .get(&EntityId::local_battery())
            .and_then(|e| BatteryReading::from_state(&e.state));
        match self.rendering {
            Rendering::Icon => WidgetContent {
                label: self.label.clone(),
                icon: Some(battery_icon(reading).into()),
                ..WidgetContent::default()
            },
            Rendering::Percent => WidgetContent {
                label: self.label.clone(),
                value: battery_percent(reading),
                ..WidgetContent::default()
            },
        }
    }
}

// ── Wifi ─────────────────────────────────────────────────────────────

/// `wifi`: link quality as a signal-strength icon or a percentage.
#[derive(Debug, Clone)]
pub struct WifiWidget {
    rendering: Rendering,
    label: String,
}

impl WifiWidget {
    pub fn new(spec: &WidgetSpec) -> Result<Self, String> {
        Ok(Self {
            rendering: rendering(spec)?,
            label: spec.style.label.clone().unwrap_or_default(),
        })
    }
}

pub(crate) fn wifi_icon(reading: Option<WifiReading>) -> &'static str {
    match reading {
        Some(r) if r.connected => match r.signal_strength / 20 {
            0 => "wifi-strength-outline",
            1 => "wifi-strength-1",
            2 => "wifi-strength-2",
            3 => "wifi-strength-3",
            _ => "wifi-strength-4",
        },
        _ => "wifi-strength-off-outline",
    }
}

impl WidgetBehavior for WifiWidget {
    fn bindings(&self) -> Vec<EntityId> {
        vec![EntityId::local_wifi()]
    }

    fn render(&self, store: &EntityStore) -> WidgetContent {
        let reading = store
            .get(&EntityId::local_wifi())
            .and_then(|e| WifiReading::from_state(&e.state));
        match self.rendering {
            Rendering::Icon => WidgetContent {
                label: self.label.clone(),
                icon: Some(wifi_icon(reading).into()),
                ..WidgetContent::default()
            },
            Rendering::Percent => WidgetContent {
                label: self.label.clone(),
                value: match reading {
                    Some(r) if r.connected => format!("{}%", r.signal_strength),
                    _ => "???%".into(),
                },
                ..WidgetContent::default()
            },
        }
    }
}
