use std::{
    any::Any,
    fs,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Deserialize;
use serde_json::Value;

use super::{PluginContext, PluginEvent, PluginIdentity, WallpaperPlugin, MANIFEST_FILE};
use crate::{
    data_loaders::settings::{
        plugin_enabled_key, PluginSettings, SettingsMap, SharedSettings, APP_NAMESPACE,
    },
    error::WallpaperError,
    info,
    notify::Notifier,
    overlay::OverlaySurface,
    warn,
};

/// Compile-time entry point a plugin unit's manifest refers to by `id`.
#[derive(Clone, Copy)]
pub struct PluginFactory {
    pub id: &'static str,
    pub create: fn() -> Box<dyn WallpaperPlugin>,
}

pub struct PluginRecord {
    identity: PluginIdentity,
    unit: String,
    enabled: bool,
    instance: Box<dyn WallpaperPlugin>,
}

impl PluginRecord {
    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failures: Vec<WallpaperError>,
}

#[derive(Debug, Default)]
pub struct FanOutReport {
    pub delivered: Vec<String>,
    pub failures: Vec<WallpaperError>,
}

impl FanOutReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct PluginManifest {
    factory: String,
    #[serde(default)]
    settings: serde_json::Map<String, Value>,
}

pub struct PluginRegistry {
    directory: PathBuf,
    factories: Vec<PluginFactory>,
    settings: SharedSettings,
    notifier: Arc<dyn Notifier>,
    records: Vec<PluginRecord>,
    slow_threshold: Duration,
}

impl PluginRegistry {
    pub fn new(
        directory: PathBuf,
        factories: Vec<PluginFactory>,
        settings: SharedSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            directory,
            factories,
            settings,
            notifier,
            records: Vec::new(),
            slow_threshold: Duration::from_millis(250),
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn ensure_directory(&self) {
        if let Err(e) = fs::create_dir_all(&self.directory) {
            warn!("[PLUGINS] Failed to create {}: {e}", self.directory.display());
        }
    }

    pub fn records(&self) -> &[PluginRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.records
            .iter()
            .find(|r| r.identity.name == name)
            .map(|r| r.enabled)
    }

    /// Replaces the loaded set with every valid unit in the plugin directory,
    /// in file-name order. Broken units are logged and skipped.
    pub fn load_all(&mut self) -> LoadReport {
        self.records.clear();
        let mut report = LoadReport::default();

        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[PLUGINS] Cannot read plugin directory {}: {e}", self.directory.display());
                return report;
            }
        };

        let mut units: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        units.sort();

        for unit_dir in units {
            match self.materialize(&unit_dir) {
                Ok(record) => {
                    info!(
                        "[PLUGINS] Loaded {} from '{}' (enabled: {})",
                        record.identity, record.unit, record.enabled
                    );
                    report.loaded.push(record.identity.name.clone());
                    self.records.push(record);
                }
                Err(e) => {
                    warn!("[PLUGINS] {}", e);
                    report.failures.push(e);
                }
            }
        }

        info!(
            "[PLUGINS] {} plugin(s) loaded, {} unit(s) skipped from {}",
            report.loaded.len(),
            report.failures.len(),
            self.directory.display()
        );
        report
    }

    /// Cleans up the current plugins, then loads the directory afresh.
    pub fn reload(&mut self) -> LoadReport {
        self.cleanup_all();
        self.load_all()
    }

    fn materialize(&self, unit_dir: &Path) -> Result<PluginRecord, WallpaperError> {
        let unit = unit_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| unit_dir.display().to_string());
        let fail = |reason: String| WallpaperError::PluginLoadFailed {
            unit: unit.clone(),
            reason,
        };

        let raw = fs::read_to_string(unit_dir.join(MANIFEST_FILE))
            .map_err(|e| fail(format!("cannot read {MANIFEST_FILE}: {e}")))?;
        let manifest: PluginManifest = serde_json::from_str(&raw)
            .map_err(|e| fail(format!("malformed {MANIFEST_FILE}: {e}")))?;

        let factory = self
            .factories
            .iter()
            .find(|f| f.id == manifest.factory)
            .ok_or_else(|| fail(format!("no factory registered as '{}'", manifest.factory)))?;

        let create = factory.create;
        let mut instance = catch_unwind(create)
            .map_err(|payload| fail(format!("factory panicked: {}", panic_message(payload.as_ref()))))?;

        let identity = catch_unwind(AssertUnwindSafe(|| instance.identity()))
            .map_err(|payload| fail(format!("identity panicked: {}", panic_message(payload.as_ref()))))?;
        if identity.name.trim().is_empty() {
            return Err(fail("plugin identity has an empty name".to_string()));
        }
        if self.records.iter().any(|r| r.identity.name == identity.name) {
            warn!(
                "[PLUGINS] '{}' from unit '{}' shares its name with an already loaded plugin; both stay loaded and share one enabled flag",
                identity.name, unit
            );
        }

        let settings = PluginSettings::new(self.settings.clone(), &identity.name);
        for (key, value) in &manifest.settings {
            if settings.get(key).is_some() {
                continue;
            }
            match serde_yaml::to_value(value) {
                Ok(value) => {
                    if let Err(e) = settings.set(key, value) {
                        warn!("[PLUGINS] Could not seed default '{key}' for '{}': {e}", identity.name);
                    }
                }
                Err(e) => warn!("[PLUGINS] Unsupported default '{key}' for '{}': {e}", identity.name),
            }
        }

        let ctx = PluginContext::new(unit_dir.to_path_buf(), settings, self.notifier.clone());
        guarded(&identity.name, PluginEvent::Initialize, || instance.initialize(ctx))
            .map_err(|e| fail(e.to_string()))?;

        let enabled = self
            .settings
            .bool_or(APP_NAMESPACE, &plugin_enabled_key(&identity.name), true);

        Ok(PluginRecord {
            identity,
            unit,
            enabled,
            instance,
        })
    }

    /// Runs `call` on each enabled plugin in load order. Holding `&mut self`
    /// for the whole loop keeps the set fixed until the fan-out ends.
    fn fan_out<F>(&mut self, event: PluginEvent, include_disabled: bool, mut call: F) -> FanOutReport
    where
        F: FnMut(&mut dyn WallpaperPlugin) -> anyhow::Result<()>,
    {
        let mut report = FanOutReport::default();

        for record in self.records.iter_mut() {
            if !record.enabled && !include_disabled {
                continue;
            }

            let started = Instant::now();
            let outcome = guarded(&record.identity.name, event, || call(record.instance.as_mut()));
            let elapsed = started.elapsed();

            if elapsed > self.slow_threshold {
                warn!(
                    "[PLUGINS] {} took {}ms in {}",
                    record.identity,
                    elapsed.as_millis(),
                    event
                );
            }

            match outcome {
                Ok(()) => report.delivered.push(record.identity.name.clone()),
                Err(e) => {
                    warn!("[PLUGINS] {}", e);
                    report.failures.push(e);
                }
            }
        }

        report
    }

    pub fn notify_start(&mut self, video: &Path, looping: bool) -> FanOutReport {
        self.fan_out(PluginEvent::WallpaperStart, false, |p| p.on_wallpaper_start(video, looping))
    }

    pub fn notify_stop(&mut self, overlay: &OverlaySurface<'_>) -> FanOutReport {
        self.fan_out(PluginEvent::WallpaperStop, false, |p| p.on_wallpaper_stop(overlay))
    }

    pub fn notify_settings_changed(
        &mut self,
        settings: &SettingsMap,
        overlay: Option<&OverlaySurface<'_>>,
    ) -> FanOutReport {
        self.fan_out(PluginEvent::SettingsChanged, false, |p| p.on_settings_changed(settings, overlay))
    }

    pub fn notify_operate_on_window(&mut self, overlay: &OverlaySurface<'_>) -> FanOutReport {
        self.fan_out(PluginEvent::OperateOnWindow, false, |p| p.operate_on_window(overlay))
    }

    /// Lets every loaded plugin release its resources, enabled or not.
    pub fn cleanup_all(&mut self) -> FanOutReport {
        self.fan_out(PluginEvent::Cleanup, true, |p| p.cleanup())
    }

    /// Toggles and persists a plugin's enabled flag. Fires no lifecycle event.
    /// Returns false when no loaded plugin has that name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<bool, WallpaperError> {
        if !self.records.iter().any(|r| r.identity.name == name) {
            return Ok(false);
        }

        self.settings
            .set(APP_NAMESPACE, &plugin_enabled_key(name), serde_yaml::Value::Bool(enabled))?;

        for record in self.records.iter_mut().filter(|r| r.identity.name == name) {
            record.enabled = enabled;
        }
        info!("[PLUGINS] '{}' {}", name, if enabled { "enabled" } else { "disabled" });
        Ok(true)
    }

    pub fn show_settings_ui(&mut self, name: &str) -> Result<(), WallpaperError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.identity.name == name)
            .ok_or_else(|| WallpaperError::PluginNotFound(name.to_string()))?;

        guarded(&record.identity.name, PluginEvent::ShowSettings, || {
            record.instance.show_settings_ui()
        })
    }
}

/// Failure boundary around one plugin callback: both `Err` returns and
/// panics become `PluginCallbackFailed`.
fn guarded<F>(plugin: &str, event: PluginEvent, call: F) -> Result<(), WallpaperError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let reason = match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    Err(WallpaperError::PluginCallbackFailed {
        plugin: plugin.to_string(),
        event: event.to_string(),
        reason,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
