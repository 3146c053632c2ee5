use std::path::{Path, PathBuf};

use crate::{
    desktop::{Rect, SurfaceHandle},
    error::WallpaperError,
    utility::path_to_file_url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Repeat,
    Once,
}

impl PlaybackMode {
    pub fn from_loop(looping: bool) -> Self {
        if looping {
            Self::Repeat
        } else {
            Self::Once
        }
    }

    pub fn is_repeat(self) -> bool {
        self == Self::Repeat
    }
}

/// Engine-side playback resource bound to one video. Released by value, so
/// each surface can be released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderSurface {
    id: u64,
    video: PathBuf,
    mode: PlaybackMode,
}

impl RenderSurface {
    pub fn new(id: u64, video: PathBuf, mode: PlaybackMode) -> Self {
        Self { id, video, mode }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn video(&self) -> &Path {
        &self.video
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }
}

/// The media backend. The session only drives these five operations.
pub trait RenderEngine {
    /// Fails with [`WallpaperError::RenderEngineInit`] when the backend
    /// cannot start or the video is unreadable.
    fn create_render_surface(
        &mut self,
        video: &Path,
        mode: PlaybackMode,
    ) -> Result<RenderSurface, WallpaperError>;

    fn attach_to_native_surface(
        &mut self,
        surface: &RenderSurface,
        window: SurfaceHandle,
        bounds: Rect,
    ) -> Result<(), WallpaperError>;

    fn play(&mut self, surface: &RenderSurface) -> Result<(), WallpaperError>;

    fn stop(&mut self, surface: &RenderSurface) -> Result<(), WallpaperError>;

    fn release(&mut self, surface: RenderSurface) -> Result<(), WallpaperError>;
}

fn escape_attribute(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// HTML page that plays `video` full-bleed. Listens for `{"cmd":"play"}`
/// and `{"cmd":"stop"}` web messages from the host.
pub fn player_page(video: &Path, mode: PlaybackMode) -> String {
    let src = escape_attribute(&path_to_file_url(video));
    let loop_attr = if mode.is_repeat() { " loop" } else { "" };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
html, body {{ margin: 0; height: 100%; overflow: hidden; background: #000; }}
video {{ width: 100%; height: 100%; object-fit: cover; }}
</style>
</head>
<body>
<video id="player" src="{src}" autoplay muted{loop_attr}></video>
<script>
const player = document.getElementById("player");
if (window.chrome && window.chrome.webview) {{
  window.chrome.webview.addEventListener("message", (event) => {{
    const cmd = event.data && event.data.cmd;
    if (cmd === "play") {{
      player.play();
    }} else if (cmd === "stop") {{
      player.pause();
      player.currentTime = 0;
    }}
  }});
}}
</script>
</body>
</html>
"#
    )
}
