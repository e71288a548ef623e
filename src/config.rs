//! TOML-based monitor configuration and preset definitions.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::alert::Thresholds;
use crate::reading::{Layout, Node};
use crate::relay::retry::RetryPolicy;

/// Top-level monitor configuration parsed from TOML.
///
/// All sections have defaults. Load from TOML with
/// [`MonitorConfig::from_toml_file`] or start from a preset with
/// [`MonitorConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Where readings come from and how they are laid out.
    #[serde(default)]
    pub source: SourceConfig,
    /// Polling cadence.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Advisory rule table.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Automation webhook and relay devices.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Automatic load shedding.
    #[serde(default)]
    pub shedding: SheddingConfig,
}

/// Published sheet location and parsing options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// CSV export URL of the readings tab.
    pub url: String,
    /// CSV export URL of the schedule tab (empty when unused).
    pub schedule_url: String,
    /// Column naming convention.
    pub layout: Layout,
    /// Append a random `v=` query parameter to defeat caches.
    pub cache_bust: bool,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Read `01/02/2025` as 1 February instead of 2 January.
    pub day_first: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            schedule_url: String::new(),
            layout: Layout::SingleNode,
            cache_bust: true,
            timeout_secs: 15,
            day_first: false,
        }
    }
}

/// Polling cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    /// Seconds between refresh cycles (must be > 0).
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl RefreshConfig {
    /// Refresh period, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Automation webhook settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Web app URL accepting `action=...` GET requests.
    pub webhook_url: String,
    /// Seconds to wait after a command before re-reading the sheet.
    pub settle_delay_secs: u64,
    /// Power (W) above which a relay is inferred to be closed.
    pub confirm_threshold_w: f64,
    /// Total attempts per command, including the first (must be >= 1).
    pub max_attempts: u32,
    /// Backoff before the second attempt (ms).
    pub initial_backoff_ms: u64,
    /// Backoff ceiling (ms).
    pub max_backoff_ms: u64,
    /// Controllable devices.
    pub devices: Vec<DeviceConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            settle_delay_secs: 10,
            confirm_threshold_w: 5.0,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            devices: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    /// Looks up a device by id.
    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// One relay-controlled device.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Identifier sent to the webhook.
    pub id: String,
    /// Human-readable label.
    #[serde(default)]
    pub name: String,
    /// Node whose power reflects this relay's state.
    #[serde(default = "default_device_node")]
    pub node: Node,
}

fn default_device_node() -> Node {
    Node::Main
}

/// Automatic load-shedding settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheddingConfig {
    /// Switch `device` off when power exceeds the configured limit.
    pub enabled: bool,
    /// Relay device id to open.
    pub device: String,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"refresh.interval_secs"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl MonitorConfig {
    /// Single-circuit sheet with one load relay.
    pub fn single_node() -> Self {
        Self {
            relay: RelayConfig {
                devices: vec![DeviceConfig {
                    id: "relay_1".to_string(),
                    name: "Load relay".to_string(),
                    node: Node::Main,
                }],
                ..RelayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Main / essential / non-essential sheet with shedding on the
    /// non-essential circuit.
    pub fn three_node() -> Self {
        Self {
            source: SourceConfig {
                layout: Layout::ThreeNode,
                ..SourceConfig::default()
            },
            refresh: RefreshConfig { interval_secs: 30 },
            thresholds: Thresholds {
                power_limit_w: 5_000.0,
                ..Thresholds::default()
            },
            relay: RelayConfig {
                devices: vec![
                    DeviceConfig {
                        id: "essential".to_string(),
                        name: "Essential circuit".to_string(),
                        node: Node::Essential,
                    },
                    DeviceConfig {
                        id: "non_essential".to_string(),
                        name: "Non-essential circuit".to_string(),
                        node: Node::NonEssential,
                    },
                ],
                ..RelayConfig::default()
            },
            shedding: SheddingConfig {
                enabled: false,
                device: "non_essential".to_string(),
            },
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["single_node", "three_node"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "single_node" => Ok(Self::single_node()),
            "three_node" => Ok(Self::three_node()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let src = &self.source;
        for (field, url) in [
            ("source.url", &src.url),
            ("source.schedule_url", &src.schedule_url),
            ("relay.webhook_url", &self.relay.webhook_url),
        ] {
            if !url.is_empty() && !is_http_url(url) {
                errors.push(ConfigError::new(field, "must start with http:// or https://"));
            }
        }
        if src.timeout_secs == 0 {
            errors.push(ConfigError::new("source.timeout_secs", "must be > 0"));
        }
        if self.refresh.interval_secs == 0 {
            errors.push(ConfigError::new("refresh.interval_secs", "must be > 0"));
        }

        let t = &self.thresholds;
        if t.voltage_min_v >= t.voltage_max_v {
            errors.push(ConfigError::new(
                "thresholds.voltage_min_v",
                "must be < thresholds.voltage_max_v",
            ));
        }
        if t.current_max_a <= 0.0 {
            errors.push(ConfigError::new("thresholds.current_max_a", "must be > 0"));
        }
        if t.power_limit_w <= 0.0 {
            errors.push(ConfigError::new("thresholds.power_limit_w", "must be > 0"));
        }

        let r = &self.relay;
        if r.max_attempts == 0 {
            errors.push(ConfigError::new("relay.max_attempts", "must be >= 1"));
        }
        if r.initial_backoff_ms > r.max_backoff_ms {
            errors.push(ConfigError::new(
                "relay.initial_backoff_ms",
                "must be <= relay.max_backoff_ms",
            ));
        }
        if r.confirm_threshold_w < 0.0 {
            errors.push(ConfigError::new("relay.confirm_threshold_w", "must be >= 0"));
        }
        let mut seen = HashSet::new();
        for (i, d) in r.devices.iter().enumerate() {
            if d.id.trim().is_empty() {
                errors.push(ConfigError::new(
                    format!("relay.devices[{i}].id"),
                    "must not be empty",
                ));
            } else if !seen.insert(d.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("relay.devices[{i}].id"),
                    format!("duplicate device id \"{}\"", d.id),
                ));
            }
            if !src.layout.nodes().contains(&d.node) {
                errors.push(ConfigError::new(
                    format!("relay.devices[{i}].node"),
                    format!("node \"{}\" is not carried by the sheet layout", d.node.as_str()),
                ));
            }
        }

        let s = &self.shedding;
        if s.enabled {
            if r.device(&s.device).is_none() {
                errors.push(ConfigError::new(
                    "shedding.device",
                    format!("\"{}\" is not listed in relay.devices", s.device),
                ));
            }
            if r.webhook_url.is_empty() {
                errors.push(ConfigError::new(
                    "relay.webhook_url",
                    "required when shedding is enabled",
                ));
            }
        }

        errors
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_presets_are_valid() {
        for name in MonitorConfig::PRESETS {
            let cfg = MonitorConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = MonitorConfig::from_toml_str("[refresh]\ninterval_secs = 0\n").unwrap();
        assert_eq!(cfg.refresh.interval(), Duration::from_secs(1));
        assert!(!cfg.validate().is_empty());
    }

    #[test]
    fn from_preset_unknown() {
        let err = MonitorConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[source]
url = "https://docs.example.com/sheet/pub?output=csv"
schedule_url = "https://docs.example.com/sheet/pub?gid=2&output=csv"
layout = "three_node"
cache_bust = false
timeout_secs = 5
day_first = true

[refresh]
interval_secs = 15

[thresholds]
voltage_min_v = 180.0
voltage_max_v = 250.0
current_max_a = 32.0
temperature_max_c = 70.0
power_limit_w = 4500.0

[relay]
webhook_url = "https://script.example.com/exec"
settle_delay_secs = 5
max_attempts = 2

[[relay.devices]]
id = "ne"
name = "Non-essential"
node = "non_essential"

[shedding]
enabled = true
device = "ne"
"#;
        let cfg = MonitorConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.source.layout), Some(Layout::ThreeNode));
        assert_eq!(cfg.as_ref().map(|c| c.refresh.interval_secs), Some(15));
        assert_eq!(cfg.as_ref().map(|c| c.thresholds.power_limit_w), Some(4500.0));
        assert_eq!(
            cfg.as_ref().and_then(|c| c.relay.devices.first().map(|d| d.node)),
            Some(Node::NonEssential)
        );
        let errors = cfg.map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[refresh]
interval_secs = 10
bogus_field = true
"#;
        assert!(MonitorConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[thresholds]
power_limit_w = 2000.0
"#;
        let cfg = MonitorConfig::from_toml_str(toml).ok();
        assert_eq!(cfg.as_ref().map(|c| c.thresholds.power_limit_w), Some(2000.0));
        assert_eq!(cfg.as_ref().map(|c| c.thresholds.voltage_min_v), Some(170.0));
        assert_eq!(cfg.as_ref().map(|c| c.refresh.interval_secs), Some(60));
        assert_eq!(cfg.as_ref().map(|c| c.relay.max_attempts), Some(3));
    }

    #[test]
    fn validation_catches_zero_interval() {
        let mut cfg = MonitorConfig::single_node();
        cfg.refresh.interval_secs = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "refresh.interval_secs"));
    }

    #[test]
    fn validation_catches_inverted_voltage_band() {
        let mut cfg = MonitorConfig::single_node();
        cfg.thresholds.voltage_min_v = 260.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "thresholds.voltage_min_v"));
    }

    #[test]
    fn validation_catches_bad_url_scheme() {
        let mut cfg = MonitorConfig::single_node();
        cfg.source.url = "ftp://example.com/sheet.csv".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "source.url"));
    }

    #[test]
    fn validation_requires_known_shedding_device() {
        let mut cfg = MonitorConfig::three_node();
        cfg.shedding.enabled = true;
        cfg.shedding.device = "pump".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "shedding.device"));
        assert!(errors.iter().any(|e| e.field == "relay.webhook_url"));
    }

    #[test]
    fn validation_rejects_device_on_missing_node() {
        let mut cfg = MonitorConfig::single_node();
        cfg.relay.devices.push(DeviceConfig {
            id: "ne".to_string(),
            name: String::new(),
            node: Node::NonEssential,
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "relay.devices[1].node"));
    }

    #[test]
    fn validation_rejects_duplicate_device_ids() {
        let mut cfg = MonitorConfig::single_node();
        let dup = cfg.relay.devices[0].clone();
        cfg.relay.devices.push(dup);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }
}
