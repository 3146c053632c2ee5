//! Native window seam and desktop host discovery.
//!
//! Everything that touches the shell's window tree goes through
//! [`WindowApi`] so the discovery and embedding logic can run against an
//! in-memory tree in tests. The Win32 implementation lives in
//! `win32::shell`.

use std::time::Duration;

use crate::{debug, info, warn};

/// Undocumented Progman message that spawns the WorkerW behind the icons.
pub const SPAWN_WORKER_MESSAGE: u32 = 0x052C;

pub const PROGMAN_CLASS: &str = "Progman";
pub const DEFVIEW_CLASS: &str = "SHELLDLL_DefView";
pub const WORKERW_CLASS: &str = "WorkerW";

/// Raw native window handle value. Carries no ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub isize);

/// The WorkerW that hosts wallpaper windows. Only produced by
/// [`DesktopSurfaceLocator::locate`]; goes stale when explorer restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopShellHandle(SurfaceHandle);

impl DesktopShellHandle {
    pub fn surface(self) -> SurfaceHandle {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// Text colour for overlay labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB` (the `#` is optional).
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Opaque client area the render engine draws video into.
    Render,
    /// Transparent, input-capable area stacked above the render surface.
    Overlay,
}

pub trait WindowApi {
    fn find_top_level(&self, class: &str) -> Option<SurfaceHandle>;

    /// Sends `message` and waits at most `timeout`. False on timeout or failure.
    fn send_message_timeout(&self, target: SurfaceHandle, message: u32, timeout: Duration) -> bool;

    /// Every immediate child of the desktop root, in z-order.
    fn top_level_windows(&self) -> Vec<SurfaceHandle>;

    /// `FindWindowEx` semantics: searches the children of `parent` (top-level
    /// windows when `None`), starting after `after`.
    fn find_child(
        &self,
        parent: Option<SurfaceHandle>,
        after: Option<SurfaceHandle>,
        class: &str,
    ) -> Option<SurfaceHandle>;

    fn create_surface(&self, kind: SurfaceKind, bounds: Rect) -> Result<SurfaceHandle, String>;

    fn create_label(
        &self,
        parent: SurfaceHandle,
        text: &str,
        bounds: Rect,
        color: Rgb,
    ) -> Result<SurfaceHandle, String>;

    fn parent(&self, window: SurfaceHandle) -> Option<SurfaceHandle>;

    fn set_parent(&self, window: SurfaceHandle, parent: Option<SurfaceHandle>) -> Result<(), String>;

    /// Moves `window` to the top of its siblings without moving or resizing it.
    fn raise_in_place(&self, window: SurfaceHandle) -> Result<(), String>;

    fn show(&self, window: SurfaceHandle);

    fn destroy(&self, window: SurfaceHandle) -> Result<(), String>;

    fn exists(&self, window: SurfaceHandle) -> bool;

    fn screen_bounds(&self) -> Rect;
}

#[derive(Debug, Clone)]
pub struct DesktopSurfaceLocator {
    timeout: Duration,
}

impl Default for DesktopSurfaceLocator {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

impl DesktopSurfaceLocator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn locate(&self, api: &dyn WindowApi) -> Option<DesktopShellHandle> {
        let Some(progman) = api.find_top_level(PROGMAN_CLASS) else {
            warn!("[WALLPAPER][HOSTSEL] Progman not found; desktop shell may not be running");
            return None;
        };
        debug!("[WALLPAPER][HOSTSEL] Progman={:?}", progman);

        // The WorkerW may already exist from an earlier poke, so a timeout
        // here is not fatal.
        if !api.send_message_timeout(progman, SPAWN_WORKER_MESSAGE, self.timeout) {
            warn!(
                "[WALLPAPER][HOSTSEL] Progman did not answer 0x052C within {}ms; enumerating anyway",
                self.timeout.as_millis()
            );
        }

        for window in api.top_level_windows() {
            if api.find_child(Some(window), None, DEFVIEW_CLASS).is_none() {
                continue;
            }

            match api.find_child(None, Some(window), WORKERW_CLASS) {
                Some(worker) => {
                    info!(
                        "[WALLPAPER][HOSTSEL] DefView host={:?}, WorkerW sibling selected={:?}",
                        window, worker
                    );
                    return Some(DesktopShellHandle(worker));
                }
                None => debug!(
                    "[WALLPAPER][HOSTSEL] DefView host {:?} has no WorkerW sibling",
                    window
                ),
            }
        }

        // Newer shells parent the wallpaper WorkerW under Progman itself.
        if let Some(worker) = api.find_child(Some(progman), None, WORKERW_CLASS) {
            info!("[WALLPAPER][HOSTSEL] WorkerW under Progman selected={:?}", worker);
            return Some(DesktopShellHandle(worker));
        }

        warn!("[WALLPAPER][HOSTSEL] No WorkerW found after full enumeration");
        None
    }
}
