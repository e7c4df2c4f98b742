//! Local sensors read from Linux pseudo-filesystems.
//!
//! Battery: the first `/sys/class/power_supply/*` whose `type` is
//! `Battery`. Wifi: the first interface row in `/proc/net/wireless`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use haslate_core::{BatteryReading, LocalSensors, WifiReading};

const POWER_SUPPLY: &str = "/sys/class/power_supply";
const WIRELESS: &str = "/proc/net/wireless";

/// Link quality maximum reported by most drivers.
const LINK_QUALITY_MAX: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct SysfsSensors {
    battery: Option<PathBuf>,
    wireless: PathBuf,
}

impl SysfsSensors {
    pub fn new() -> Self {
        Self::with_roots(Path::new(POWER_SUPPLY), PathBuf::from(WIRELESS))
    }

    fn with_roots(power_supply: &Path, wireless: PathBuf) -> Self {
        let battery = find_battery(power_supply);
        debug!(battery = ?battery, "local sensors");
        Self { battery, wireless }
    }
}

impl Default for SysfsSensors {
    fn default() -> Self {
        Self::new()
    }
}

fn read_value(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_lowercase())
}

fn find_battery(root: &Path) -> Option<PathBuf> {
    let mut supplies: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    supplies.sort();
    supplies
        .into_iter()
        .find(|p| read_value(&p.join("type")).as_deref() == Some("battery"))
}

fn parse_wireless(contents: &str) -> Option<WifiReading> {
    // Two header lines, then `iface: status quality. level. noise. ...`.
    let row = contents.lines().skip(2).find(|l| l.contains(':'))?;
    let (_, fields) = row.split_once(':')?;
    let quality: f64 = fields
        .split_whitespace()
        .nth(1)?
        .trim_end_matches('.')
        .parse()
        .ok()?;
    let percent = (quality * 100.0 / LINK_QUALITY_MAX).clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    let signal_strength = percent.round() as u8;
    Some(WifiReading {
        connected: true,
        signal_strength,
    })
}

impl LocalSensors for SysfsSensors {
    fn battery(&self) -> Option<BatteryReading> {
        let dir = self.battery.as_ref()?;
        let charge_percent = read_value(&dir.join("capacity"))?.parse::<u8>().ok()?;
        let is_charging = read_value(&dir.join("status")).as_deref() == Some("charging");
        Some(BatteryReading {
            charge_percent: charge_percent.min(100),
            is_charging,
        })
    }

    fn wifi(&self) -> Option<WifiReading> {
        match fs::read_to_string(&self.wireless) {
            Ok(contents) => Some(parse_wireless(&contents).unwrap_or(WifiReading {
                connected: false,
                signal_strength: 0,
            })),
            Err(_) => None,
        }
    }
}
