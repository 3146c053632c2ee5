use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;

use super::{PluginContext, PluginFactory, PluginIdentity, WallpaperPlugin};
use crate::{
    data_loaders::settings::SettingsMap,
    desktop::{Rect, Rgb, SurfaceHandle},
    notify::Severity,
    overlay::OverlaySurface,
    warn,
};

pub const TEXT_OVERLAY_FACTORY: &str = "text-overlay";
pub const SESSION_LOG_FACTORY: &str = "session-log";

pub fn builtin_factories() -> Vec<PluginFactory> {
    vec![
        PluginFactory {
            id: TEXT_OVERLAY_FACTORY,
            create: create_text_overlay,
        },
        PluginFactory {
            id: SESSION_LOG_FACTORY,
            create: create_session_log,
        },
    ]
}

fn create_text_overlay() -> Box<dyn WallpaperPlugin> {
    Box::new(TextOverlayPlugin::default())
}

fn create_session_log() -> Box<dyn WallpaperPlugin> {
    Box::new(SessionLogPlugin::default())
}

/* =========================
   TEXT OVERLAY
========================= */

const LABEL_WIDTH: i32 = 480;
const LABEL_HEIGHT: i32 = 48;
const DEFAULT_TEXT: &str = "Hello World!";
const DEFAULT_COLOR: &str = "#FFFFFF";

/// Draws one configurable line of text on the wallpaper overlay.
///
/// Settings: `text`, `color` (`#RRGGBB`), `position_x`, `position_y`.
#[derive(Default)]
pub struct TextOverlayPlugin {
    ctx: Option<PluginContext>,
    label: Option<SurfaceHandle>,
}

impl TextOverlayPlugin {
    fn text(&self) -> String {
        self.ctx
            .as_ref()
            .map(|ctx| ctx.settings().string_or("text", DEFAULT_TEXT))
            .unwrap_or_else(|| DEFAULT_TEXT.to_string())
    }

    fn color(&self) -> Rgb {
        let Some(ctx) = self.ctx.as_ref() else {
            return Rgb::WHITE;
        };
        let raw = ctx.settings().string_or("color", DEFAULT_COLOR);
        Rgb::parse_hex(&raw).unwrap_or_else(|| {
            warn!("[PLUGINS][TEXT] Ignoring color '{}'; expected #RRGGBB", raw);
            Rgb::WHITE
        })
    }

    fn position(&self) -> (i32, i32) {
        let Some(ctx) = self.ctx.as_ref() else {
            return (100, 100);
        };
        let x = ctx.settings().i64_or("position_x", 100);
        let y = ctx.settings().i64_or("position_y", 100);
        (clamp_i32(x), clamp_i32(y))
    }

    fn remove_label(&mut self, overlay: &OverlaySurface<'_>) {
        if let Some(previous) = self.label.take() {
            overlay.remove_child(previous);
        }
    }

    /// Replaces any label this plugin placed earlier.
    fn place_label(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        self.remove_label(overlay);
        let (x, y) = self.position();
        let bounds = Rect::new(x, y, LABEL_WIDTH, LABEL_HEIGHT);
        self.label = Some(overlay.add_label(&self.text(), bounds, self.color())?);
        Ok(())
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl WallpaperPlugin for TextOverlayPlugin {
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::new(
            "Text Overlay",
            "1.0",
            "Video Wallpaper",
            "Shows a line of text above the video",
        )
    }

    fn initialize(&mut self, ctx: PluginContext) -> anyhow::Result<()> {
        self.ctx = Some(ctx);
        Ok(())
    }

    fn on_wallpaper_start(&mut self, _video: &Path, _looping: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_wallpaper_stop(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        self.remove_label(overlay);
        Ok(())
    }

    fn on_settings_changed(
        &mut self,
        _settings: &SettingsMap,
        overlay: Option<&OverlaySurface<'_>>,
    ) -> anyhow::Result<()> {
        match overlay {
            Some(overlay) if self.label.is_some() => self.place_label(overlay),
            _ => Ok(()),
        }
    }

    fn operate_on_window(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        self.place_label(overlay)
    }

    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.label = None;
        self.ctx = None;
        Ok(())
    }

    fn show_settings_ui(&mut self) -> anyhow::Result<()> {
        let ctx = self.ctx.as_ref().context("plugin is not initialized")?;
        let (x, y) = self.position();
        ctx.notifier().notify(
            Severity::Info,
            "Text Overlay",
            &format!(
                "text: {}\ncolor: {}\nposition: {x}, {y}\n\nEdit plugins/Text Overlay/* under PluginSettings in settings.yaml.",
                self.text(),
                ctx.settings().string_or("color", DEFAULT_COLOR),
            ),
        );
        Ok(())
    }
}

/* =========================
   SESSION LOG
========================= */

const SESSION_LOG_FILE: &str = "session.log";

/// Appends one line per wallpaper lifecycle event to `session.log` in its
/// unit directory.
#[derive(Default)]
pub struct SessionLogPlugin {
    log_path: Option<PathBuf>,
    ctx: Option<PluginContext>,
}

impl SessionLogPlugin {
    fn append(&self, line: &str) -> anyhow::Result<()> {
        let path = self.log_path.as_ref().context("plugin is not initialized")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{ts} {line}").with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

impl WallpaperPlugin for SessionLogPlugin {
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::new(
            "Session Log",
            "1.0",
            "Video Wallpaper",
            "Records wallpaper start/stop history",
        )
    }

    fn initialize(&mut self, ctx: PluginContext) -> anyhow::Result<()> {
        fs::create_dir_all(ctx.unit_dir())
            .with_context(|| format!("create {}", ctx.unit_dir().display()))?;
        self.log_path = Some(ctx.unit_dir().join(SESSION_LOG_FILE));
        self.ctx = Some(ctx);
        Ok(())
    }

    fn on_wallpaper_start(&mut self, video: &Path, looping: bool) -> anyhow::Result<()> {
        self.append(&format!("start {} loop={looping}", video.display()))
    }

    fn on_wallpaper_stop(&mut self, _overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        self.append("stop")
    }

    fn on_settings_changed(
        &mut self,
        settings: &SettingsMap,
        _overlay: Option<&OverlaySurface<'_>>,
    ) -> anyhow::Result<()> {
        let keys: Vec<&str> = settings.keys().map(String::as_str).collect();
        self.append(&format!("settings {}", keys.join(",")))
    }

    fn operate_on_window(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        let b = overlay.bounds();
        self.append(&format!("overlay {}x{}", b.width, b.height))
    }

    fn show_settings_ui(&mut self) -> anyhow::Result<()> {
        let ctx = self.ctx.as_ref().context("plugin is not initialized")?;
        let path = self.log_path.as_ref().context("plugin is not initialized")?;
        ctx.notifier().notify(
            Severity::Info,
            "Session Log",
            &format!("Writing to {}", path.display()),
        );
        Ok(())
    }
}
