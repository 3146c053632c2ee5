//! Overlay plugins: the capability contract, the registry that loads and
//! notifies them, and the plugins that ship with the app.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    data_loaders::settings::{PluginSettings, SettingsMap},
    notify::Notifier,
    overlay::OverlaySurface,
};

pub mod builtin;
pub mod registry;

pub use registry::{FanOutReport, LoadReport, PluginFactory, PluginRecord, PluginRegistry};

pub const MANIFEST_FILE: &str = "plugin.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
}

impl PluginIdentity {
    pub fn new(name: &str, version: &str, author: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            author: author.to_string(),
            description: description.to_string(),
        }
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Handed to every plugin once at load time, enabled or not.
pub struct PluginContext {
    unit_dir: PathBuf,
    settings: PluginSettings,
    notifier: Arc<dyn Notifier>,
}

impl PluginContext {
    pub fn new(unit_dir: PathBuf, settings: PluginSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            unit_dir,
            settings,
            notifier,
        }
    }

    pub fn unit_dir(&self) -> &Path {
        &self.unit_dir
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEvent {
    Initialize,
    WallpaperStart,
    WallpaperStop,
    SettingsChanged,
    OperateOnWindow,
    Cleanup,
    ShowSettings,
}

impl PluginEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::WallpaperStart => "on_wallpaper_start",
            Self::WallpaperStop => "on_wallpaper_stop",
            Self::SettingsChanged => "on_settings_changed",
            Self::OperateOnWindow => "operate_on_window",
            Self::Cleanup => "cleanup",
            Self::ShowSettings => "show_settings_ui",
        }
    }
}

impl fmt::Display for PluginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract every overlay plugin implements.
///
/// Callbacks run synchronously on the thread driving the wallpaper session,
/// one plugin at a time. Errors and panics are contained by the registry and
/// never reach other plugins or the caller.
pub trait WallpaperPlugin {
    fn identity(&self) -> PluginIdentity;

    fn initialize(&mut self, ctx: PluginContext) -> anyhow::Result<()>;

    fn on_wallpaper_start(&mut self, video: &Path, looping: bool) -> anyhow::Result<()>;

    /// Runs while the overlay still exists; remove your own children here.
    /// The overlay is closed right after the stop fan-out.
    fn on_wallpaper_stop(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()>;

    /// `overlay` is `None` when no wallpaper is running.
    fn on_settings_changed(
        &mut self,
        _settings: &SettingsMap,
        _overlay: Option<&OverlaySurface<'_>>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn operate_on_window(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()>;

    fn cleanup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn show_settings_ui(&mut self) -> anyhow::Result<()>;
}
