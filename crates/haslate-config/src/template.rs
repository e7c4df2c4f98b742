//! Starter configuration written on first boot.

use std::path::Path;

use crate::ConfigError;

const HOSTNAME_MARKER: &str = "$$HOSTNAME$$";

/// Commented starter document. `$$HOSTNAME$$` is replaced on write.
pub const TEMPLATE: &str = r#"# haslate dashboard configuration
#
# Edit this file, then eject the device (or press `r` in the terminal
# front-end) to apply the changes.

system:
  hostname: $$HOSTNAME$$
  # wifi:
  #   ssid: my-network
  #   password: secret
  #   force_wpa2: false
  timezone: UTC

application:
  # Home Assistant websocket endpoint and a long-lived access token.
  hub_uri: ws://homeassistant.local:8123/api/websocket
  hub_token: replace-me

  # [columns, rows]
  grid: [4, 3]

  pages:
    - name: main
      items:
        - at: [1, 1]
          size: [2, 1]
          type: datetime
          format: "%A %d %B\n%H:%M"
        - at: [3, 1]
          type: wifi
        - at: [4, 1]
          type: battery
        # - at: [1, 2]
        #   type: hass_switch
        #   data:
        #     entity: switch.kitchen
        #   widget:
        #     label: "Kitchen off\nKitchen on"
        # - at: [2, 2]
        #   type: hass_sensor
        #   format: "{v:.1f} {u}"
        #   data:
        #     entity: sensor.outside_temperature
"#;

/// The template with its placeholders filled in.
pub fn render_template(hostname: &str) -> String {
    TEMPLATE.replace(HOSTNAME_MARKER, hostname)
}

/// Write the starter configuration to `path`, creating parent directories.
///
/// An existing file is left alone and reported as an error.
pub fn write_template(path: &Path, hostname: &str) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_template(hostname))?;
    tracing::info!(path = %path.display(), "wrote configuration template");
    Ok(())
}
