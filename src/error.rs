use std::path::PathBuf;

use thiserror::Error;

use crate::desktop::SurfaceHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbedError {
    #[error("failed to reparent surface {surface:?}: {reason}")]
    ReparentFailed { surface: SurfaceHandle, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WallpaperError {
    #[error("desktop wallpaper host window (WorkerW) not found")]
    LocatorNotFound,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("render engine failed to initialise for '{}': {reason}", .path.display())]
    RenderEngineInit { path: PathBuf, reason: String },

    #[error("render engine error: {0}")]
    RenderEngine(String),

    #[error("failed to create surface: {0}")]
    SurfaceCreate(String),

    #[error("video file '{}' is missing or unreadable", .0.display())]
    InvalidVideoPath(PathBuf),

    #[error("failed to load plugin unit '{unit}': {reason}")]
    PluginLoadFailed { unit: String, reason: String },

    #[error("launcher script '{}' does not exist", .0.display())]
    LauncherMissing(PathBuf),

    #[error("plugin '{plugin}' failed during {event}: {reason}")]
    PluginCallbackFailed {
        plugin: String,
        event: String,
        reason: String,
    },

    #[error("no plugin named '{0}' is loaded")]
    PluginNotFound(String),

    #[error("settings I/O failed for '{}': {reason}", .path.display())]
    SettingsIo { path: PathBuf, reason: String },

    #[error("autostart: {0}")]
    Autostart(String),

    #[error("autostart entry is not registered")]
    NotRegistered,
}

pub type Result<T> = std::result::Result<T, WallpaperError>;
