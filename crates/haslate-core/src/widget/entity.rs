// ── Hub-bound widgets ──
//
// Sensors show one entity's value through a template. Toggles show on/off
// state for switches, input booleans and lights, and flip it on tap.

use haslate_api::ServiceCall;
use haslate_config::WidgetSpec;

use super::{FALLBACK, Tone, ValueTemplate, WidgetAction, WidgetBehavior, WidgetContent, bound_entity};
use crate::model::{EntityEntry, EntityId, EntityState};
use crate::store::EntityStore;

const UNKNOWN_ICON: &str = "timelapse";

// ── Sensor ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Template {
    Valid(ValueTemplate),
    /// Kept so the widget can show that its format is broken.
    Invalid,
}

/// `hass_sensor`: one entity's value, formatted.
#[derive(Debug, Clone)]
pub struct SensorWidget {
    entity: EntityId,
    template: Template,
    label: String,
    icon: Option<String>,
}

impl SensorWidget {
    pub fn new(spec: &WidgetSpec) -> Result<Self, String> {
        let entity = bound_entity(spec)?;
        let template = match ValueTemplate::parse(spec.format.as_deref().unwrap_or("{v}")) {
            Ok(t) => Template::Valid(t),
            Err(reason) => {
                tracing::warn!(%entity, %reason, "sensor format will render as !fmt");
                Template::Invalid
            }
        };
        Ok(Self {
            entity,
            template,
            label: spec.style.label.clone().unwrap_or_default(),
            icon: spec.style.icon.clone(),
        })
    }
}

fn unit(state: &EntityState) -> Option<String> {
    state
        .attribute("unit_of_measurement")
        .or_else(|| state.attribute("unit"))
        .map(ToString::to_string)
}

impl WidgetBehavior for SensorWidget {
    fn bindings(&self) -> Vec<EntityId> {
        vec![self.entity.clone()]
    }

    fn render(&self, store: &EntityStore) -> WidgetContent {
        let entry = store.get(&self.entity);
        let value = match (&entry, &self.template) {
            (Some(e), Template::Valid(t)) if !e.is_stale => {
                t.render(&e.state.value, unit(&e.state).as_deref())
            }
            (Some(e), Template::Invalid) if !e.is_stale => "!fmt".into(),
            _ => FALLBACK.into(),
        };
        WidgetContent {
            label: self.label.clone(),
            value,
            icon: self.icon.clone(),
            tone: Tone::Normal,
            stale: entry.is_some_and(|e| e.is_stale),
        }
    }
}

// ── Toggle ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleKind {
    Switch,
    Light,
}

/// `hass_switch`, `hass_boolean` and `hass_light`.
#[derive(Debug, Clone)]
pub struct ToggleWidget {
    kind: ToggleKind,
    entity: EntityId,
    off_label: String,
    on_label: String,
    off_icon: String,
    on_icon: String,
    value: String,
}

impl ToggleWidget {
    pub fn switch(spec: &WidgetSpec) -> Result<Self, String> {
        Self::build(
            spec,
            ToggleKind::Switch,
            ("electric-switch", "electric-switch-closed"),
        )
    }

    pub fn light(spec: &WidgetSpec) -> Result<Self, String> {
        Self::build(spec, ToggleKind::Light, ("lightbulb", "lightbulb"))
    }

    fn build(
        spec: &WidgetSpec,
        kind: ToggleKind,
        (default_off, default_on): (&str, &str),
    ) -> Result<Self, String> {
        let entity = bound_entity(spec)?;
        let style = &spec.style;
        let label = style.label.clone().unwrap_or_default();
        let (off_label, on_label) = match label.split_once('\n') {
            Some((off, on)) => (off.to_owned(), on.to_owned()),
            None => (label.clone(), label),
        };
        let icon = style.icon.as_deref();
        Ok(Self {
            kind,
            entity,
            off_label,
            on_label,
            off_icon: style
                .off_icon
                .as_deref()
                .or(icon)
                .unwrap_or(default_off)
                .to_owned(),
            on_icon: style
                .on_icon
                .as_deref()
                .or(icon)
                .unwrap_or(default_on)
                .to_owned(),
            value: style.value.clone().unwrap_or_default(),
        })
    }

    /// `Some(on)` for a fresh on/off state, `None` when absent, stale or
    /// anything else.
    fn known_state(entry: Option<&EntityEntry>) -> Option<bool> {
        entry.filter(|e| !e.is_stale).and_then(|e| e.state.is_on())
    }

    fn unknown_label(&self) -> String {
        if self.off_label == self.on_label {
            format!("{}?", self.off_label)
        } else {
            format!("{}?{}?", self.off_label, self.on_label)
        }
    }
}

/// Light brightness (0..=255) as a percentage.
fn brightness_percent(state: &EntityState) -> Option<String> {
    let raw = state.attribute("brightness")?.as_f64()?;
    Some(format!("{:.0}%", (raw * 100.0 / 255.0).clamp(0.0, 100.0)))
}

impl WidgetBehavior for ToggleWidget {
    fn bindings(&self) -> Vec<EntityId> {
        vec![self.entity.clone()]
    }

    fn render(&self, store: &EntityStore) -> WidgetContent {
        let entry = store.get(&self.entity);
        let stale = entry.as_ref().is_some_and(|e| e.is_stale);

        let Some(on) = Self::known_state(entry.as_ref()) else {
            return WidgetContent {
                label: self.unknown_label(),
                value: self.value.clone(),
                icon: Some(UNKNOWN_ICON.into()),
                tone: if self.kind == ToggleKind::Light {
                    Tone::Dimmed
                } else {
                    Tone::Normal
                },
                stale,
            };
        };

        let (label, icon) = if on {
            (&self.on_label, &self.on_icon)
        } else {
            (&self.off_label, &self.off_icon)
        };
        let (value, tone) = match self.kind {
            ToggleKind::Switch => (self.value.clone(), Tone::Normal),
            ToggleKind::Light if on => (
                entry
                    .as_ref()
                    .and_then(|e| brightness_percent(&e.state))
                    .unwrap_or_else(|| self.value.clone()),
                Tone::Active,
            ),
            ToggleKind::Light => (self.value.clone(), Tone::Dimmed),
        };
        WidgetContent {
            label: label.clone(),
            value,
            icon: Some(icon.clone()),
            tone,
            stale,
        }
    }

    fn activate(&self, store: &EntityStore) -> WidgetAction {
        match Self::known_state(store.get(&self.entity).as_ref()) {
            Some(_) => WidgetAction::Command(ServiceCall::toggle(self.entity.as_str())),
            None => {
                tracing::debug!(entity = %self.entity, "ignoring tap on toggle in unknown state");
                WidgetAction::None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use haslate_config::{CellPos, CellSize, WidgetKind, WidgetStyle};
    use pretty_assertions::assert_eq;

    use super::*;

    fn spec(kind: WidgetKind, entity: &str, format: Option<&str>, style: WidgetStyle) -> WidgetSpec {
        WidgetSpec {
            at: CellPos { col: 1, row: 1 },
            size: CellSize::default(),
            kind,
            format: format.map(Into::into),
            data: BTreeMap::from([("entity".to_owned(), entity.to_owned())]),
            style,
        }
    }

    fn labelled(label: &str) -> WidgetStyle {
        WidgetStyle {
            label: Some(label.into()),
            ..WidgetStyle::default()
        }
    }

    #[test]
    fn sensor_formats_value_with_unit() {
        let store = EntityStore::new();
        store.apply_snapshot([EntityState::new("sensor.temp", "21.34")
            .with_attribute("unit_of_measurement", "°C")]);
        let widget = SensorWidget::new(&spec(
            WidgetKind::HassSensor,
            "sensor.temp",
            Some("{v:0.1f} {u}"),
            labelled("Living room"),
        ))
        .unwrap();

        let content = widget.render(&store);
        assert_eq!(content.value, "21.3 °C");
        assert_eq!(content.label, "Living room");
        assert!(!content.stale);
    }

    #[test]
    fn sensor_absent_or_stale_shows_fallback() {
        let store = EntityStore::new();
        let widget = SensorWidget::new(&spec(
            WidgetKind::HassSensor,
            "sensor.temp",
            None,
            WidgetStyle::default(),
        ))
        .unwrap();
        assert_eq!(widget.render(&store).value, FALLBACK);

        store.apply_snapshot([EntityState::new("sensor.temp", "20")]);
        assert_eq!(widget.render(&store).value, "20");

        store.mark_remote_stale();
        let content = widget.render(&store);
        assert_eq!(content.value, FALLBACK);
        assert!(content.stale);

        store.apply_snapshot([EntityState::new("sensor.temp", "20")]);
        assert_eq!(widget.render(&store).value, "20");
    }

    #[test]
    fn sensor_with_bad_format_renders_marker() {
        let store = EntityStore::new();
        store.apply_snapshot([EntityState::new("sensor.temp", "20")]);
        let widget = SensorWidget::new(&spec(
            WidgetKind::HassSensor,
            "sensor.temp",
            Some("{value}"),
            WidgetStyle::default(),
        ))
        .unwrap();
        assert_eq!(widget.render(&store).value, "!fmt");
    }

    #[test]
    fn sensor_with_huge_precision_renders_marker() {
        let store = EntityStore::new();
        store.apply_snapshot([EntityState::new("sensor.temp", "21.34")
            .with_attribute("unit_of_measurement", "C")]);
        let widget = SensorWidget::new(&spec(
            WidgetKind::HassSensor,
            "sensor.temp",
            Some("{v:.70000f} {u}"),
            WidgetStyle::default(),
        ))
        .unwrap();
        assert_eq!(widget.render(&store).value, "!fmt");
    }

    #[test]
    fn sensor_requires_entity() {
        let mut s = spec(WidgetKind::HassSensor, "", None, WidgetStyle::default());
        assert!(SensorWidget::new(&s).is_err());
        s.data.clear();
        assert!(SensorWidget::new(&s).is_err());
    }

    #[test]
    fn switch_labels_follow_state() {
        let store = EntityStore::new();
        let widget = ToggleWidget::switch(&spec(
            WidgetKind::HassSwitch,
            "switch.fan",
            None,
            labelled("Off\nOn"),
        ))
        .unwrap();

        let content = widget.render(&store);
        assert_eq!(content.label, "Off?On?");
        assert_eq!(content.icon.as_deref(), Some(UNKNOWN_ICON));

        store.apply_change(EntityState::new("switch.fan", "on")).unwrap();
        let content = widget.render(&store);
        assert_eq!(content.label, "On");
        assert_eq!(content.icon.as_deref(), Some("electric-switch-closed"));

        store.apply_change(EntityState::new("switch.fan", "off")).unwrap();
        assert_eq!(widget.render(&store).label, "Off");
    }

    #[test]
    fn single_label_unknown_gets_one_marker() {
        let widget = ToggleWidget::switch(&spec(
            WidgetKind::HassBoolean,
            "input_boolean.guest",
            None,
            labelled("Guest"),
        ))
        .unwrap();
        assert_eq!(widget.render(&EntityStore::new()).label, "Guest?");
    }

    #[test]
    fn light_shows_brightness_and_tone() {
        let store = EntityStore::new();
        let widget = ToggleWidget::light(&spec(
            WidgetKind::HassLight,
            "light.desk",
            None,
            labelled("Desk"),
        ))
        .unwrap();

        store
            .apply_change(EntityState::new("light.desk", "on").with_attribute("brightness", 128_i64))
            .unwrap();
        let content = widget.render(&store);
        assert_eq!(content.value, "50%");
        assert_eq!(content.tone, Tone::Active);
        assert_eq!(content.icon.as_deref(), Some("lightbulb"));

        store.apply_change(EntityState::new("light.desk", "off")).unwrap();
        let content = widget.render(&store);
        assert_eq!(content.value, "");
        assert_eq!(content.tone, Tone::Dimmed);
    }

    #[test]
    fn toggle_activation_needs_known_state() {
        let store = EntityStore::new();
        let widget = ToggleWidget::switch(&spec(
            WidgetKind::HassSwitch,
            "switch.fan",
            None,
            WidgetStyle::default(),
        ))
        .unwrap();
        assert_eq!(widget.activate(&store), WidgetAction::None);

        store
            .apply_change(EntityState::new("switch.fan", "unavailable"))
            .unwrap();
        assert_eq!(widget.activate(&store), WidgetAction::None);

        store.apply_change(EntityState::new("switch.fan", "off")).unwrap();
        assert_eq!(
            widget.activate(&store),
            WidgetAction::Command(ServiceCall::toggle("switch.fan"))
        );
    }
}
