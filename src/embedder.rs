use crate::{
    debug,
    desktop::{DesktopShellHandle, SurfaceHandle, WindowApi},
    error::EmbedError,
    info, warn,
};

/// Reparents client surfaces into the desktop wallpaper host and back.
pub struct SurfaceEmbedder<'a> {
    api: &'a dyn WindowApi,
}

impl<'a> SurfaceEmbedder<'a> {
    pub fn new(api: &'a dyn WindowApi) -> Self {
        Self { api }
    }

    /// Parents both surfaces to `shell` and raises the overlay above the
    /// render surface without touching either one's geometry.
    pub fn embed(
        &self,
        shell: DesktopShellHandle,
        render: SurfaceHandle,
        overlay: SurfaceHandle,
    ) -> Result<(), EmbedError> {
        let host = shell.surface();

        for surface in [render, overlay] {
            self.api
                .set_parent(surface, Some(host))
                .map_err(|reason| EmbedError::ReparentFailed { surface, reason })?;
            debug!("[WALLPAPER][EMBED] {:?} reparented under {:?}", surface, host);
        }

        // A failed restack leaves the overlay usable, just possibly behind
        // the video.
        if let Err(e) = self.api.raise_in_place(overlay) {
            warn!("[WALLPAPER][EMBED] Failed to raise overlay {:?}: {}", overlay, e);
        }

        info!(
            "[WALLPAPER][EMBED] render={:?} overlay={:?} embedded into WorkerW {:?}",
            render, overlay, host
        );
        Ok(())
    }

    /// Restores `render` to the parent it had before embedding and closes the
    /// overlay. Surfaces already restored or closed are skipped.
    pub fn unembed(
        &self,
        render: SurfaceHandle,
        overlay: SurfaceHandle,
        original_parent: Option<SurfaceHandle>,
    ) -> Result<(), EmbedError> {
        let mut result = Ok(());

        if self.api.exists(overlay) {
            if let Err(reason) = self.api.destroy(overlay) {
                warn!("[WALLPAPER][EMBED] Failed to close overlay {:?}: {}", overlay, reason);
                result = Err(EmbedError::ReparentFailed { surface: overlay, reason });
            }
        }

        if self.api.exists(render) && self.api.parent(render) != original_parent {
            if let Err(reason) = self.api.set_parent(render, original_parent) {
                warn!(
                    "[WALLPAPER][EMBED] Failed to restore parent of {:?} to {:?}: {}",
                    render, original_parent, reason
                );
                result = Err(EmbedError::ReparentFailed { surface: render, reason });
            } else {
                debug!("[WALLPAPER][EMBED] {:?} restored to {:?}", render, original_parent);
            }
        }

        result
    }
}
