//! One wallpaper embedding at a time: render window, engine surface and
//! overlay, acquired on `start` and released in reverse on `stop`.

use std::path::{Path, PathBuf};

use crate::{
    debug,
    desktop::{DesktopSurfaceLocator, Rect, SurfaceHandle, SurfaceKind, WindowApi},
    embedder::SurfaceEmbedder,
    error::WallpaperError,
    info,
    overlay::OverlaySurface,
    plugins::PluginRegistry,
    render::{PlaybackMode, RenderEngine, RenderSurface},
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    /// Embedding failed; cleanup runs before returning to `Idle`.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingState {
    NotEmbedded,
    Embedded,
}

/// Everything `start` acquired so far, in acquisition order. Whatever is
/// present gets released in reverse by [`Acquisition::unwind`].
#[derive(Default)]
struct Acquisition {
    render_window: Option<SurfaceHandle>,
    original_parent: Option<SurfaceHandle>,
    surface: Option<RenderSurface>,
    overlay: Option<SurfaceHandle>,
}

impl Acquisition {
    fn unwind(&mut self, windows: &dyn WindowApi, engine: &mut dyn RenderEngine) -> bool {
        let mut clean = true;

        if let Some(overlay) = self.overlay.take() {
            if windows.exists(overlay) {
                if let Err(e) = windows.destroy(overlay) {
                    warn!("[WALLPAPER][SESSION] Failed to destroy overlay {:?}: {}", overlay, e);
                    clean = false;
                }
            }
        }

        if let Some(surface) = self.surface.take() {
            let id = surface.id();
            if let Err(e) = engine.release(surface) {
                warn!("[WALLPAPER][SESSION] Render surface #{} release reported: {}", id, e);
                clean = false;
            }
        }

        if let Some(render) = self.render_window.take() {
            if windows.exists(render) {
                if let Err(e) = windows.destroy(render) {
                    warn!("[WALLPAPER][SESSION] Failed to destroy render window {:?}: {}", render, e);
                    clean = false;
                }
            }
        }

        self.original_parent = None;
        clean
    }
}

struct ActiveEmbedding {
    resources: Acquisition,
    render: SurfaceHandle,
    overlay: SurfaceHandle,
    bounds: Rect,
    video: PathBuf,
    looping: bool,
}

pub struct WallpaperSession {
    windows: Box<dyn WindowApi>,
    engine: Box<dyn RenderEngine>,
    locator: DesktopSurfaceLocator,
    state: SessionState,
    embedding: EmbeddingState,
    active: Option<ActiveEmbedding>,
}

impl WallpaperSession {
    pub fn new(
        windows: Box<dyn WindowApi>,
        engine: Box<dyn RenderEngine>,
        locator: DesktopSurfaceLocator,
    ) -> Self {
        Self {
            windows,
            engine,
            locator,
            state: SessionState::Idle,
            embedding: EmbeddingState::NotEmbedded,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn embedding(&self) -> EmbeddingState {
        self.embedding
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Active && self.embedding == EmbeddingState::Embedded
    }

    pub fn current_video(&self) -> Option<(&Path, bool)> {
        self.active
            .as_ref()
            .map(|active| (active.video.as_path(), active.looping))
    }

    pub fn render_window(&self) -> Option<SurfaceHandle> {
        self.active.as_ref().map(|active| active.render)
    }

    pub fn overlay(&self) -> Option<OverlaySurface<'_>> {
        self.active
            .as_ref()
            .map(|active| OverlaySurface::new(active.overlay, active.bounds, self.windows.as_ref()))
    }

    /// Embeds `video` behind the desktop icons. A running session is fully
    /// stopped first, including its plugin stop fan-out.
    pub fn start(
        &mut self,
        plugins: &mut PluginRegistry,
        video: &Path,
        looping: bool,
    ) -> Result<(), WallpaperError> {
        if self.state == SessionState::Active {
            info!("[WALLPAPER][SESSION] Stopping current wallpaper before starting {}", video.display());
            self.stop(plugins);
        }

        self.state = SessionState::Starting;
        let mut acquired = Acquisition::default();

        let (render, overlay) = match self.bring_up(&mut acquired, video, looping) {
            Ok(surfaces) => surfaces,
            Err(e) => {
                if matches!(e, WallpaperError::Embed(_)) {
                    self.state = SessionState::Failed;
                }
                warn!("[WALLPAPER][SESSION] Start failed: {}", e);

                if self.embedding == EmbeddingState::Embedded {
                    self.unembed(&acquired);
                }
                acquired.unwind(self.windows.as_ref(), self.engine.as_mut());
                self.embedding = EmbeddingState::NotEmbedded;
                self.state = SessionState::Idle;
                return Err(e);
            }
        };

        self.windows.show(render);
        self.windows.show(overlay);
        let bounds = self.windows.screen_bounds();
        self.active = Some(ActiveEmbedding {
            resources: acquired,
            render,
            overlay,
            bounds,
            video: video.to_path_buf(),
            looping,
        });
        self.state = SessionState::Active;
        info!(
            "[WALLPAPER][SESSION] Active: {} (loop: {})",
            video.display(),
            looping
        );

        plugins.notify_start(video, looping);
        let overlay_view = OverlaySurface::new(overlay, bounds, self.windows.as_ref());
        plugins.notify_operate_on_window(&overlay_view);

        Ok(())
    }

    fn bring_up(
        &mut self,
        acquired: &mut Acquisition,
        video: &Path,
        looping: bool,
    ) -> Result<(SurfaceHandle, SurfaceHandle), WallpaperError> {
        let windows = self.windows.as_ref();
        let bounds = windows.screen_bounds();

        let render = windows
            .create_surface(SurfaceKind::Render, bounds)
            .map_err(WallpaperError::SurfaceCreate)?;
        acquired.render_window = Some(render);
        acquired.original_parent = windows.parent(render);

        let surface = self
            .engine
            .create_render_surface(video, PlaybackMode::from_loop(looping))?;
        let surface = acquired.surface.insert(surface);
        self.engine.attach_to_native_surface(surface, render, bounds)?;

        let overlay = windows
            .create_surface(SurfaceKind::Overlay, bounds)
            .map_err(WallpaperError::SurfaceCreate)?;
        acquired.overlay = Some(overlay);

        let shell = self
            .locator
            .locate(windows)
            .ok_or(WallpaperError::LocatorNotFound)?;

        SurfaceEmbedder::new(windows).embed(shell, render, overlay)?;
        self.embedding = EmbeddingState::Embedded;

        if let Some(surface) = acquired.surface.as_ref() {
            self.engine.play(surface)?;
        }
        debug!("[WALLPAPER][SESSION] Playback started in {:?}", render);
        Ok((render, overlay))
    }

    fn unembed(&mut self, acquired: &Acquisition) -> bool {
        let (Some(render), Some(overlay)) = (acquired.render_window, acquired.overlay) else {
            return true;
        };
        match SurfaceEmbedder::new(self.windows.as_ref()).unembed(render, overlay, acquired.original_parent) {
            Ok(()) => {
                self.embedding = EmbeddingState::NotEmbedded;
                true
            }
            Err(e) => {
                warn!("[WALLPAPER][SESSION] {}", e);
                self.embedding = EmbeddingState::NotEmbedded;
                false
            }
        }
    }

    /// Tears the running wallpaper down. Only acts from `Active`; returns
    /// false otherwise, and false when any cleanup step reported an error.
    /// The session always ends `Idle`.
    pub fn stop(&mut self, plugins: &mut PluginRegistry) -> bool {
        if self.state != SessionState::Active {
            debug!("[WALLPAPER][SESSION] stop() ignored in state {:?}", self.state);
            return false;
        }

        self.state = SessionState::Stopping;
        if let Some(overlay) = self.overlay() {
            plugins.notify_stop(&overlay);
        }

        let clean = self.teardown();
        self.state = SessionState::Idle;

        if clean {
            info!("[WALLPAPER][SESSION] Stopped");
        } else {
            warn!("[WALLPAPER][SESSION] Stopped with cleanup errors");
        }
        clean
    }

    fn teardown(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            self.embedding = EmbeddingState::NotEmbedded;
            return true;
        };

        let mut clean = true;
        if let Some(surface) = active.resources.surface.as_ref() {
            if let Err(e) = self.engine.stop(surface) {
                warn!("[WALLPAPER][SESSION] Failed to stop playback: {}", e);
                clean = false;
            }
        }

        clean &= self.unembed(&active.resources);
        clean &= active
            .resources
            .unwind(self.windows.as_ref(), self.engine.as_mut());
        clean
    }
}

impl Drop for WallpaperSession {
    fn drop(&mut self) {
        if self.active.is_some() {
            warn!("[WALLPAPER][SESSION] Dropped while active; releasing surfaces without plugin notification");
            self.teardown();
            self.state = SessionState::Idle;
        }
    }
}
