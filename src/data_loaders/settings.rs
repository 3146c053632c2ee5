// ~/src/data_loaders/settings.rs

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use serde_yaml::{Mapping, Value};

use super::yaml::{load_yaml, save_yaml};
use crate::{error::WallpaperError, info};

pub const APP_NAMESPACE: &str = "Settings";
pub const PLUGIN_NAMESPACE: &str = "PluginSettings";

pub type SettingsMap = BTreeMap<String, Value>;

/// Namespaced key/value persistence. Writes are durable when `set` returns.
pub trait SettingsStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Option<Value>;

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), WallpaperError>;

    fn bool_or(&self, namespace: &str, key: &str, default: bool) -> bool {
        self.get(namespace, key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn string_or(&self, namespace: &str, key: &str, default: &str) -> String {
        self.get(namespace, key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    fn i64_or(&self, namespace: &str, key: &str, default: i64) -> i64 {
        self.get(namespace, key)
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }
}

pub type SharedSettings = Arc<dyn SettingsStore>;

pub fn plugin_enabled_key(plugin: &str) -> String {
    format!("plugins/{plugin}/enabled")
}

pub fn plugin_setting_key(plugin: &str, key: &str) -> String {
    format!("plugins/{plugin}/{key}")
}

/* =========================
   YAML FILE STORE
========================= */

pub struct YamlSettingsStore {
    path: PathBuf,
    doc: RwLock<Mapping>,
}

impl YamlSettingsStore {
    /// Opens `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: &Path) -> Self {
        let doc = load_yaml(path)
            .and_then(|v| v.as_mapping().cloned())
            .unwrap_or_default();

        info!("[SETTINGS] Opened {} ({} namespace(s))", path.display(), doc.len());

        Self {
            path: path.to_path_buf(),
            doc: RwLock::new(doc),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for YamlSettingsStore {
    fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let doc = self.doc.read().unwrap_or_else(PoisonError::into_inner);
        doc.get(namespace)?.as_mapping()?.get(key).cloned()
    }

    /// The in-memory document only changes once the file write succeeded.
    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), WallpaperError> {
        let mut doc = self.doc.write().unwrap_or_else(PoisonError::into_inner);

        let mut staged = doc.clone();
        let ns_key = Value::String(namespace.to_string());
        if !staged.get(&ns_key).map(Value::is_mapping).unwrap_or(false) {
            staged.insert(ns_key.clone(), Value::Mapping(Mapping::new()));
        }
        if let Some(Value::Mapping(section)) = staged.get_mut(&ns_key) {
            section.insert(Value::String(key.to_string()), value);
        }

        let staged = Value::Mapping(staged);
        save_yaml(&self.path, &staged).map_err(|e| WallpaperError::SettingsIo {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Value::Mapping(staged) = staged {
            *doc = staged;
        }
        Ok(())
    }
}

/* =========================
   IN-MEMORY STORE
========================= */

#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<(String, String), Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(&(namespace.to_string(), key.to_string())).cloned()
    }

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), WallpaperError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}

/* =========================
   PLUGIN-SCOPED VIEW
========================= */

/// Settings access confined to one plugin's keys.
#[derive(Clone)]
pub struct PluginSettings {
    store: SharedSettings,
    plugin: String,
}

impl PluginSettings {
    pub fn new(store: SharedSettings, plugin: &str) -> Self {
        Self {
            store,
            plugin: plugin.to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store
            .get(PLUGIN_NAMESPACE, &plugin_setting_key(&self.plugin, key))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), WallpaperError> {
        self.store
            .set(PLUGIN_NAMESPACE, &plugin_setting_key(&self.plugin, key), value)
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.store
            .string_or(PLUGIN_NAMESPACE, &plugin_setting_key(&self.plugin, key), default)
    }

    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.store
            .i64_or(PLUGIN_NAMESPACE, &plugin_setting_key(&self.plugin, key), default)
    }
}

/* =========================
   APP SETTINGS
========================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub video_path: String,
    pub loop_playback: bool,
    pub bat_path: String,
    pub minimize_to_tray: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            video_path: String::new(),
            loop_playback: true,
            bat_path: String::new(),
            minimize_to_tray: true,
        }
    }
}

impl AppSettings {
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            video_path: store.string_or(APP_NAMESPACE, "video_path", &defaults.video_path),
            loop_playback: store.bool_or(APP_NAMESPACE, "loop", defaults.loop_playback),
            bat_path: store.string_or(APP_NAMESPACE, "bat_path", &defaults.bat_path),
            minimize_to_tray: store.bool_or(APP_NAMESPACE, "minimize_to_tray", defaults.minimize_to_tray),
        }
    }

    pub fn validate(&self) -> Result<(), WallpaperError> {
        let video = self.video_path.trim();
        if video.is_empty() || !Path::new(video).is_file() {
            return Err(WallpaperError::InvalidVideoPath(PathBuf::from(video)));
        }

        let bat = self.bat_path.trim();
        if !bat.is_empty() && !Path::new(bat).is_file() {
            return Err(WallpaperError::LauncherMissing(PathBuf::from(bat)));
        }

        Ok(())
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<(), WallpaperError> {
        for (key, value) in self.to_map() {
            store.set(APP_NAMESPACE, &key, value)?;
        }
        Ok(())
    }

    pub fn to_map(&self) -> SettingsMap {
        let mut map = SettingsMap::new();
        map.insert("video_path".to_string(), Value::String(self.video_path.trim().to_string()));
        map.insert("loop".to_string(), Value::Bool(self.loop_playback));
        map.insert("bat_path".to_string(), Value::String(self.bat_path.trim().to_string()));
        map.insert("minimize_to_tray".to_string(), Value::Bool(self.minimize_to_tray));
        map
    }
}
