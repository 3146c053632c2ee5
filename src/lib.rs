//! Video wallpaper host: embeds a video surface behind the desktop icons
//! and drives overlay plugins around the session lifecycle.

pub mod logging;

pub mod app;
pub mod autostart;
pub mod cleanup;
pub mod cli;
pub mod data_loaders;
pub mod desktop;
pub mod embedder;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod overlay;
pub mod plugins;
pub mod render;
pub mod session;
pub mod utility;

#[cfg(windows)]
pub mod win32;

#[cfg(test)]
mod testing;

pub const APP_NAME: &str = "VideoWallpaper";
pub const APP_DIR_NAME: &str = "VideoWallpaper";
pub const DEBUG_NAME: &str = "WALLPAPER";
