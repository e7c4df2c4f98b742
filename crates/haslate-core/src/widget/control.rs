use std::str::FromStr;

use haslate_config::WidgetSpec;

use super::{LocalAction, WidgetAction, WidgetBehavior, WidgetContent};
use crate::model::EntityId;
use crate::store::EntityStore;

fn static_content(spec: &WidgetSpec) -> WidgetContent {
    WidgetContent {
        label: spec.style.label.clone().unwrap_or_default(),
        value: spec.style.value.clone().unwrap_or_default(),
        icon: spec.style.icon.clone(),
        ..WidgetContent::default()
    }
}

/// `action`: a button that triggers a local control action.
#[derive(Debug, Clone)]
pub struct ActionWidget {
    action: LocalAction,
    content: WidgetContent,
}

impl ActionWidget {
    pub fn new(spec: &WidgetSpec) -> Result<Self, String> {
        let name = spec
            .style
            .action
            .as_deref()
            .ok_or_else(|| "action widget needs widget.action".to_owned())?;
        let action =
            LocalAction::from_str(name).map_err(|_| format!("unknown action '{name}'"))?;
        Ok(Self {
            action,
            content: static_content(spec),
        })
    }
}

impl WidgetBehavior for ActionWidget {
    fn bindings(&self) -> Vec<EntityId> {
        Vec::new()
    }

    fn render(&self, _store: &EntityStore) -> WidgetContent {
        self.content.clone()
    }

    fn activate(&self, _store: &EntityStore) -> WidgetAction {
        WidgetAction::Local(self.action)
    }
}

/// `empty`: fixed label, value and icon.
#[derive(Debug, Clone)]
pub struct StaticWidget {
    content: WidgetContent,
}

impl StaticWidget {
    pub fn new(spec: &WidgetSpec) -> Self {
        Self {
            content: static_content(spec),
        }
    }
}

impl WidgetBehavior for StaticWidget {
    fn bindings(&self) -> Vec<EntityId> {
        Vec::new()
    }

    fn render(&self, _store: &EntityStore) -> WidgetContent {
        self.content.clone()
    }
}
