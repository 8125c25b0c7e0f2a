//! Configuration file
//!
//! TOML file with global defaults and one `[[devices]]` table per
//! controller:
//!
//! ```toml
//! poll_interval = 30
//! reconnect_delay = 5000
//!
//! [[devices]]
//! ip = "192.168.1.40"
//! family = "LD382A"
//!
//! [[devices]]
//! ip = "192.168.1.41"
//! family = "LW12"
//! connect_on_write = true
//!
//! [[devices]]
//! ip = "192.168.1.50"
//! name = "Mi-Light"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use wifilight_device::DeviceConfig;
use wifilight_transport::protocol::timing;
use wifilight_transport::{family_for_device_name, Family};

/// One configured controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Family name, e.g. `LD382A` or `MiLight`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Module name as reported by discovery, used when `family` is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Status poll interval in seconds, overrides the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
    /// Connect for every write instead of holding the connection open
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub connect_on_write: bool,
}

impl DeviceEntry {
    /// Family named by the entry, or inferred from the module name
    pub fn resolve_family(&self) -> Option<Family> {
        match &self.family {
            Some(family) => family.parse().ok(),
            None => self.name.as_deref().and_then(family_for_device_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default status poll interval in seconds (0 disables polling)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Delay before reconnecting after a lost connection, in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

fn default_poll_interval() -> u64 {
    timing::DEFAULT_POLL_INTERVAL_S
}

fn default_reconnect_delay() -> u64 {
    timing::RECONNECT_DELAY_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            reconnect_delay: default_reconnect_delay(),
            devices: Vec::new(),
        }
    }
}

/// Poll interval in seconds as used by a device: 0 disables polling,
/// anything shorter than the minimum is raised to it
pub fn normalize_poll_interval(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        s => Some(Duration::from_secs(s.max(timing::MIN_POLL_INTERVAL_S))),
    }
}

impl AppConfig {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wifilight")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save config to a file, creating its directory
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Device configurations after normalisation.
    ///
    /// Entries without a usable family are skipped with an error. Zoned
    /// families become one device per zone, and a repeated id keeps the
    /// first entry.
    pub fn device_configs(&self) -> Vec<DeviceConfig> {
        let reconnect_delay = Duration::from_millis(self.reconnect_delay);
        let mut seen = BTreeSet::new();
        let mut configs = Vec::new();

        for entry in &self.devices {
            let Some(family) = entry.resolve_family() else {
                let known: Vec<_> = Family::ALL.iter().map(|f| f.name()).collect();
                error!(
                    ip = %entry.ip,
                    family = ?entry.family,
                    name = ?entry.name,
                    "unknown device family, skipping; known families: {}",
                    known.join(", ")
                );
                continue;
            };

            let poll = normalize_poll_interval(entry.poll_interval.unwrap_or(self.poll_interval));
            let base = DeviceConfig::new(entry.ip.clone(), family)
                .with_poll_interval(poll)
                .with_reconnect_delay(reconnect_delay)
                .with_connect_per_write(entry.connect_on_write);
            let base = match entry.port {
                Some(port) => base.with_port(port),
                None => base,
            };

            let expanded: Vec<DeviceConfig> = match family.zones() {
                Some(zones) => zones.map(|zone| base.clone().with_zone(zone)).collect(),
                None => vec![base],
            };
            for config in expanded {
                if seen.insert(config.id.clone()) {
                    configs.push(config);
                } else {
                    warn!(id = %config.id, "duplicate device, ignoring");
                }
            }
        }
        configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_rules() {
        assert_eq!(normalize_poll_interval(0), None);
        assert_eq!(normalize_poll_interval(1), Some(Duration::from_secs(5)));
        assert_eq!(normalize_poll_interval(4), Some(Duration::from_secs(5)));
        assert_eq!(normalize_poll_interval(60), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_family_from_name() {
        let entry = DeviceEntry {
            ip: "10.0.0.1".into(),
            name: Some("HF-A11-ZJ002".into()),
            ..Default::default()
        };
        assert_eq!(entry.resolve_family(), Some(Family::Lw12));

        let entry = DeviceEntry {
            ip: "10.0.0.1".into(),
            family: Some("ld686".into()),
            name: Some("HF-A11-ZJ002".into()),
            ..Default::default()
        };
        assert_eq!(entry.resolve_family(), Some(Family::Ld686));
    }

    #[test]
    fn test_defaults_when_empty() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.poll_interval, 30);
        assert!(config.device_configs().is_empty());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("wifilight-test-missing/none.toml");
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
    }
}
