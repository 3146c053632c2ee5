use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde_yaml::{Mapping, Value};

use super::yaml::load_yaml;
use crate::{info, utility::default_plugin_dir, warn};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub log_level: String,
    pub desktop: DesktopSettings,
    pub plugins: PluginHostSettings,
    pub monitor: MonitorSettings,
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone)]
pub struct DesktopSettings {
    pub locate_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PluginHostSettings {
    pub directory: PathBuf,
    pub slow_callback_warn_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub enabled: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CleanupSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "warn".to_string(),
            desktop: DesktopSettings::default(),
            plugins: PluginHostSettings::default(),
            monitor: MonitorSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self { locate_timeout_ms: 1000 }
    }
}

impl Default for PluginHostSettings {
    fn default() -> Self {
        Self {
            directory: default_plugin_dir(),
            slow_callback_warn_ms: 250,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2000,
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_ms: 100,
        }
    }
}

impl DesktopSettings {
    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl CleanupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub const DEFAULT_CONFIG_YAML: &str = r#"debug: false
log_level: warn

desktop:
  locate_timeout_ms: 1000

plugins:
  slow_callback_warn_ms: 250

monitor:
  enabled: true
  interval_ms: 2000

cleanup:
  timeout_secs: 30
  poll_interval_ms: 100
"#;

impl AppConfig {
    /// Loads `path`, falling back to defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match load_yaml(path) {
            Some(value) => Self::from_yaml(&value).unwrap_or_else(|| {
                warn!("[CONFIG] {} is not a mapping; using defaults", path.display());
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Writes the default config if none exists yet.
    pub fn scaffold(path: &Path) {
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match fs::write(path, DEFAULT_CONFIG_YAML) {
            Ok(_) => info!("[CONFIG] Created {}", path.display()),
            Err(e) => warn!("[CONFIG] Failed to create {}: {e}", path.display()),
        }
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;
        let mut config = Self::default();

        config.debug = bool_any(map, &["debug", "debug_mode"]).unwrap_or(config.debug);
        config.log_level = str_any(map, &["log_level", "logging"])
            .unwrap_or(&config.log_level)
            .to_lowercase();

        if let Some(desktop) = mapping_at(map, "desktop") {
            config.desktop.locate_timeout_ms =
                u64_any(desktop, &["locate_timeout_ms", "spawn_timeout_ms", "timeout_ms"])
                    .unwrap_or(config.desktop.locate_timeout_ms)
                    .max(100);
        }

        if let Some(plugins) = mapping_at(map, "plugins") {
            if let Some(dir) = str_any(plugins, &["directory", "dir", "path"]) {
                if !dir.trim().is_empty() {
                    config.plugins.directory = PathBuf::from(dir.trim());
                }
            }
            config.plugins.slow_callback_warn_ms =
                u64_any(plugins, &["slow_callback_warn_ms", "slow_warn_ms"])
                    .unwrap_or(config.plugins.slow_callback_warn_ms);
        }

        if let Some(monitor) = mapping_at(map, "monitor") {
            config.monitor.enabled = bool_any(monitor, &["enabled", "show_usage"])
                .unwrap_or(config.monitor.enabled);
            config.monitor.interval_ms = u64_any(monitor, &["interval_ms", "sample_interval_ms"])
                .unwrap_or(config.monitor.interval_ms)
                .max(250);
        }

        if let Some(cleanup) = mapping_at(map, "cleanup") {
            config.cleanup.timeout_secs = u64_at(cleanup, "timeout_secs")
                .unwrap_or(config.cleanup.timeout_secs)
                .max(1);
            config.cleanup.poll_interval_ms = u64_at(cleanup, "poll_interval_ms")
                .unwrap_or(config.cleanup.poll_interval_ms)
                .clamp(10, 5000);
        }

        Some(config)
    }
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}
