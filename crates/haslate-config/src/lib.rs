//! Dashboard configuration document.
//!
//! Typed model of the user-editable YAML file, loading through figment
//! (file first, `HASLATE_*` environment overrides on top), validation, and
//! the change signals that drive hot reload. The layout resolver in
//! `haslate-core` consumes [`ApplicationConfig`]; the hub client consumes
//! [`HubEndpoint`].

mod template;
mod watcher;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use template::{TEMPLATE, render_template, write_template};
pub use watcher::{ConfigSignal, ConfigWatcher};

/// Prefix for environment overrides, e.g. `HASLATE_APPLICATION__HUB_TOKEN`.
pub const ENV_PREFIX: &str = "HASLATE_";

const CONFIG_FILE_NAME: &str = "haslate.yaml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("config watcher failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Document model ──────────────────────────────────────────────────

/// Top-level configuration: device settings plus the dashboard itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,

    pub application: ApplicationConfig,
}

/// Device-level settings. Applying them is the host's job; the dashboard
/// only reports when they change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SystemConfig {
    pub hostname: Option<String>,

    pub wifi: Option<WifiConfig>,

    /// IANA timezone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            wifi: None,
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WifiConfig {
    pub ssid: String,

    pub password: Option<String>,

    #[serde(default)]
    pub force_wpa2: bool,
}

/// The dashboard: which hub to talk to and what to draw.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApplicationConfig {
    /// Hub event-stream endpoint, e.g. `ws://hub.local:8123/api/websocket`.
    #[serde(alias = "homeassistant_uri")]
    pub hub_uri: String,

    /// Long-lived access token.
    #[serde(alias = "homeassistant_token")]
    pub hub_token: String,

    pub grid: GridSpec,

    #[serde(default)]
    pub pages: Vec<PageConfig>,
}

/// Logical grid dimensions, written as `[columns, rows]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "(u16, u16)", into = "(u16, u16)")]
pub struct GridSpec {
    pub columns: u16,
    pub rows: u16,
}

impl From<(u16, u16)> for GridSpec {
    fn from((columns, rows): (u16, u16)) -> Self {
        Self { columns, rows }
    }
}

impl From<GridSpec> for (u16, u16) {
    fn from(grid: GridSpec) -> Self {
        (grid.columns, grid.rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub items: Vec<WidgetSpec>,
}

/// A 1-based grid cell, written as `[col, row]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "(u16, u16)", into = "(u16, u16)")]
pub struct CellPos {
    pub col: u16,
    pub row: u16,
}

impl From<(u16, u16)> for CellPos {
    fn from((col, row): (u16, u16)) -> Self {
        Self { col, row }
    }
}

impl From<CellPos> for (u16, u16) {
    fn from(pos: CellPos) -> Self {
        (pos.col, pos.row)
    }
}

/// Widget extent in cells, written as `[w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "(u16, u16)", into = "(u16, u16)")]
pub struct CellSize {
    pub width: u16,
    pub height: u16,
}

impl Default for CellSize {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }
}

impl From<(u16, u16)> for CellSize {
    fn from((width, height): (u16, u16)) -> Self {
        Self { width, height }
    }
}

impl From<CellSize> for (u16, u16) {
    fn from(size: CellSize) -> Self {
        (size.width, size.height)
    }
}

/// Every widget type the dashboard knows how to build.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WidgetKind {
    Datetime,
    Battery,
    Wifi,
    HassSensor,
    HassSwitch,
    HassBoolean,
    HassLight,
    Action,
    Empty,
}

/// One grid item as written in a page's `items` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WidgetSpec {
    pub at: CellPos,

    #[serde(default)]
    pub size: CellSize,

    #[serde(rename = "type")]
    pub kind: WidgetKind,

    pub format: Option<String>,

    #[serde(default)]
    pub data: BTreeMap<String, String>,

    #[serde(default, rename = "widget")]
    pub style: WidgetStyle,
}

/// Presentation overrides from an item's `widget` mapping.
///
/// Renderer hints (colours, sizes) are passed through untouched; `label`,
/// `value`, `icon`, `on_icon`, `off_icon` and `action` also feed the
/// widget's display logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WidgetStyle {
    pub label: Option<String>,
    pub value: Option<String>,
    pub icon: Option<String>,
    pub on_icon: Option<String>,
    pub off_icon: Option<String>,
    pub action: Option<String>,
    pub background: Option<String>,
    pub border_width: Option<u16>,
    pub label_size: Option<u16>,
    pub value_size: Option<u16>,
    pub icon_size: Option<u16>,
}

/// Resolved hub connection target.
#[derive(Debug, Clone)]
pub struct HubEndpoint {
    pub url: Url,
    pub token: SecretString,
}

// ── Behaviour ───────────────────────────────────────────────────────

impl Config {
    /// Parse and validate a YAML document (no environment overrides).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Yaml::string(yaml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that don't need screen geometry.
    ///
    /// Item positions and sizes, zero included, are checked by the layout
    /// resolver against the grid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let app = &self.application;

        if app.grid.columns == 0 || app.grid.rows == 0 {
            return Err(invalid(
                "/application/grid",
                format!(
                    "grid must be at least 1x1, got {}x{}",
                    app.grid.columns, app.grid.rows
                ),
            ));
        }

        let url = Url::parse(&app.hub_uri)
            .map_err(|e| invalid("/application/hub_uri", format!("{e}: {}", app.hub_uri)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(
                "/application/hub_uri",
                format!("expected a ws:// or wss:// URI, got '{}'", url.scheme()),
            ));
        }

        if app.hub_token.trim().is_empty() {
            return Err(invalid("/application/hub_token", "token is empty"));
        }

        Ok(())
    }

    /// Hub URL and token, ready for the client.
    pub fn hub_endpoint(&self) -> Result<HubEndpoint, ConfigError> {
        let url = Url::parse(&self.application.hub_uri).map_err(|e| {
            invalid(
                "/application/hub_uri",
                format!("{e}: {}", self.application.hub_uri),
            )
        })?;
        Ok(HubEndpoint {
            url,
            token: SecretString::from(self.application.hub_token.clone()),
        })
    }

    /// Whether switching to `other` requires a new hub session.
    pub fn hub_changed(&self, other: &Self) -> bool {
        self.application.hub_uri != other.application.hub_uri
            || self.application.hub_token != other.application.hub_token
    }

    /// Whether any device-level setting differs from `other`.
    pub fn system_changed(&self, other: &Self) -> bool {
        self.system != other.system
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "haslate", "haslate").map_or_else(
        || PathBuf::from("config").join(CONFIG_FILE_NAME),
        |dirs| dirs.config_dir().join(CONFIG_FILE_NAME),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the configuration at `path`, applying `HASLATE_*`
/// environment overrides (`__` separates nesting levels).
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let config: Config = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;

    config.validate()?;
    tracing::debug!(
        path = %path.display(),
        pages = config.application.pages.len(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
system:
  hostname: kitchen-slate
  wifi:
    ssid: home
    password: hunter2
  timezone: Europe/London
application:
  hub_uri: ws://hub.local:8123/api/websocket
  hub_token: abc123
  grid: [12, 8]
  pages:
    - name: main
      items:
        - at: [1, 1]
          size: [6, 2]
          type: datetime
          format: "%A\n%H:%M"
        - at: [7, 1]
          type: hass_sensor
          format: "{v:0.1f} {u}"
          data:
            entity: sensor.outside_temperature
          widget:
            label: Outside
            label_size: 14
            sparkle: true
"#;

    #[test]
    fn parses_full_document() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.system.hostname.as_deref(), Some("kitchen-slate"));
        assert_eq!(config.system.timezone, "Europe/London");
        assert!(!config.system.wifi.as_ref().unwrap().force_wpa2);

        let app = &config.application;
        assert_eq!(app.grid, GridSpec { columns: 12, rows: 8 });
        assert_eq!(app.pages.len(), 1);

        let items = &app.pages[0].items;
        assert_eq!(items[0].kind, WidgetKind::Datetime);
        assert_eq!(items[0].size, CellSize { width: 6, height: 2 });
        assert_eq!(items[0].format.as_deref(), Some("%A\n%H:%M"));

        assert_eq!(items[1].kind, WidgetKind::HassSensor);
        assert_eq!(items[1].size, CellSize::default());
        assert_eq!(
            items[1].data.get("entity").map(String::as_str),
            Some("sensor.outside_temperature")
        );
        assert_eq!(items[1].style.label.as_deref(), Some("Outside"));
        assert_eq!(items[1].style.label_size, Some(14));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let yaml = r"
future_section: { enabled: true }
application:
  hub_uri: ws://hub:8123/api/websocket
  hub_token: t
  grid: [2, 2]
  theme: dark
";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.system.timezone, "UTC");
        assert!(config.application.pages.is_empty());
    }

    #[test]
    fn legacy_key_names_are_accepted() {
        let yaml = r"
application:
  homeassistant_uri: wss://hub.example:443/api/websocket
  homeassistant_token: legacy
  grid: [4, 3]
";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.application.hub_uri,
            "wss://hub.example:443/api/websocket"
        );
        assert_eq!(config.application.hub_token, "legacy");
    }

    #[test]
    fn rejects_http_scheme() {
        let yaml = r"
application:
  hub_uri: http://hub:8123/api/websocket
  hub_token: t
  grid: [2, 2]
";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "/application/hub_uri"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_zero_grid_but_leaves_items_to_layout() {
        let zero_grid = r"
application:
  hub_uri: ws://hub/api/websocket
  hub_token: t
  grid: [0, 4]
";
        assert!(matches!(
            Config::from_yaml_str(zero_grid),
            Err(ConfigError::Validation { .. })
        ));

        let zero_size = r"
application:
  hub_uri: ws://hub/api/websocket
  hub_token: t
  grid: [4, 4]
  pages:
    - name: p
      items:
        - { at: [1, 1], size: [0, 1], type: empty }
";
        let config = Config::from_yaml_str(zero_size).unwrap();
        assert_eq!(config.application.pages[0].items[0].size.width, 0);
    }

    #[test]
    fn unknown_widget_type_fails_parse() {
        let yaml = r"
application:
  hub_uri: ws://hub/api/websocket
  hub_token: t
  grid: [4, 4]
  pages:
    - items:
        - { at: [1, 1], type: hologram }
";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::Figment(_))
        ));
    }

    #[test]
    fn change_detection_compares_sections() {
        let a = Config::from_yaml_str(SAMPLE).unwrap();
        let mut b = a.clone();
        assert!(!a.hub_changed(&b));
        assert!(!a.system_changed(&b));

        b.application.pages.clear();
        assert!(!a.hub_changed(&b));

        b.application.hub_token = "rotated".into();
        assert!(a.hub_changed(&b));

        b.system.timezone = "UTC".into();
        assert!(a.system_changed(&b));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(matches!(load(&path), Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load(&path).unwrap();
        let endpoint = config.hub_endpoint().unwrap();
        assert_eq!(endpoint.url.host_str(), Some("hub.local"));
        assert_eq!(endpoint.url.port(), Some(8123));
    }
}
