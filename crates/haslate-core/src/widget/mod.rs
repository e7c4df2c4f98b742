//! Widget kinds.
//!
//! Each kind implements [`WidgetBehavior`]: which entities it reads, how it
//! turns their current state into display content, and what (if anything)
//! activating it does. [`Widget`] is the closed set of kinds the binding
//! engine dispatches over.

mod control;
mod entity;
mod format;
mod local;

use haslate_api::ServiceCall;
use haslate_config::{WidgetKind, WidgetSpec};

pub use control::{ActionWidget, StaticWidget};
pub use entity::{SensorWidget, ToggleWidget};
pub use format::ValueTemplate;
pub use local::{BatteryWidget, ClockWidget, WifiWidget};

use crate::model::EntityId;
use crate::store::EntityStore;

/// Shown in place of a value that is absent or stale.
pub const FALLBACK: &str = "—";

/// Visual emphasis hint for the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Tone {
    #[default]
    Normal,
    Active,
    Dimmed,
}

/// Everything a renderer needs to draw one widget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetContent {
    pub label: String,
    pub value: String,
    pub icon: Option<String>,
    pub tone: Tone,
    /// At least one bound entity is stale.
    pub stale: bool,
}

/// Local control actions an `action` widget can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LocalAction {
    Quit,
    NextPage,
    PreviousPage,
}

/// What activating a widget asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetAction {
    None,
    Command(ServiceCall),
    Local(LocalAction),
}

/// The capability every widget kind provides.
pub trait WidgetBehavior {
    /// Entities whose changes should trigger a redraw.
    fn bindings(&self) -> Vec<EntityId>;

    /// Compute display content from the current store contents.
    fn render(&self, store: &EntityStore) -> WidgetContent;

    /// React to a tap. Most kinds ignore it.
    fn activate(&self, _store: &EntityStore) -> WidgetAction {
        WidgetAction::None
    }
}

/// A built widget of any kind.
#[derive(Debug, Clone)]
pub enum Widget {
    Clock(ClockWidget),
    Battery(BatteryWidget),
    Wifi(WifiWidget),
    Sensor(SensorWidget),
    Toggle(ToggleWidget),
    Action(ActionWidget),
    Static(StaticWidget),
}

impl Widget {
    /// Build the widget described by `spec`, checking kind-specific fields.
    pub fn build(spec: &WidgetSpec) -> Result<Self, String> {
        let widget = match spec.kind {
            WidgetKind::Datetime => Self::Clock(ClockWidget::new(spec)?),
            WidgetKind::Battery => Self::Battery(BatteryWidget::new(spec)?),
            WidgetKind::Wifi => Self::Wifi(WifiWidget::new(spec)?),
            WidgetKind::HassSensor => Self::Sensor(SensorWidget::new(spec)?),
            WidgetKind::HassSwitch | WidgetKind::HassBoolean => {
                Self::Toggle(ToggleWidget::switch(spec)?)
            }
            WidgetKind::HassLight => Self::Toggle(ToggleWidget::light(spec)?),
            WidgetKind::Action => Self::Action(ActionWidget::new(spec)?),
            WidgetKind::Empty => Self::Static(StaticWidget::new(spec)),
        };
        Ok(widget)
    }

    fn behavior(&self) -> &dyn WidgetBehavior {
        match self {
            Self::Clock(w) => w,
            Self::Battery(w) => w,
            Self::Wifi(w) => w,
            Self::Sensor(w) => w,
            Self::Toggle(w) => w,
            Self::Action(w) => w,
            Self::Static(w) => w,
        }
    }
}

impl WidgetBehavior for Widget {
    fn bindings(&self) -> Vec<EntityId> {
        self.behavior().bindings()
    }

    fn render(&self, store: &EntityStore) -> WidgetContent {
        self.behavior().render(store)
    }

    fn activate(&self, store: &EntityStore) -> WidgetAction {
        self.behavior().activate(store)
    }
}

/// The `data.entity` id a remote-bound widget reads.
fn bound_entity(spec: &WidgetSpec) -> Result<EntityId, String> {
    match spec.data.get("entity").map(|s| s.trim()) {
        Some(id) if !id.is_empty() => Ok(EntityId::from(id)),
        _ => Err(format!("{} widget needs data.entity", spec.kind)),
    }
}

/// The `format` field as one of the given choices (first is the default).
fn choice<'a>(spec: &WidgetSpec, choices: &[&'a str]) -> Result<&'a str, String> {
    let Some(format) = spec.format.as_deref() else {
        return Ok(choices.first().copied().unwrap_or_default());
    };
    choices
        .iter()
        .copied()
        .find(|c| *c == format)
        .ok_or_else(|| format!("invalid format '{format}', expected one of {choices:?}"))
}
