use crate::{
    desktop::{Rect, Rgb, SurfaceHandle, WindowApi},
    error::WallpaperError,
};

/// Borrowed view of the session's overlay surface handed to plugins for
/// `operate_on_window`, `on_settings_changed` and `on_wallpaper_stop`.
/// Children still present when the session stops die with the overlay.
pub struct OverlaySurface<'a> {
    handle: SurfaceHandle,
    bounds: Rect,
    api: &'a dyn WindowApi,
}

impl<'a> OverlaySurface<'a> {
    pub fn new(handle: SurfaceHandle, bounds: Rect, api: &'a dyn WindowApi) -> Self {
        Self { handle, bounds, api }
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn add_label(&self, text: &str, bounds: Rect, color: Rgb) -> Result<SurfaceHandle, WallpaperError> {
        self.api
            .create_label(self.handle, text, bounds, color)
            .map_err(WallpaperError::SurfaceCreate)
    }

    /// Destroys a child previously added to this overlay. Returns false for
    /// handles that are not (or no longer) children of it.
    pub fn remove_child(&self, child: SurfaceHandle) -> bool {
        if !self.api.exists(child) || self.api.parent(child) != Some(self.handle) {
            return false;
        }
        self.api.destroy(child).is_ok()
    }
}
