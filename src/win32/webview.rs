use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::mpsc,
};

use webview2_com::Microsoft::Web::WebView2::Win32::*;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{E_POINTER, HWND, RECT},
        System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED},
    },
};

use super::hwnd_of;
use crate::{
    debug,
    desktop::{Rect, SurfaceHandle},
    error::WallpaperError,
    info,
    render::{player_page, PlaybackMode, RenderEngine, RenderSurface},
    utility::{path_to_file_url, to_wstring},
    warn,
};

/// One WebView2 controller showing a player page inside a render window.
struct Player {
    controller: ICoreWebView2Controller,
    webview: ICoreWebView2,
}

impl Player {
    fn open(
        environment: &ICoreWebView2Environment,
        window: HWND,
        bounds: Rect,
        page_url: &str,
    ) -> Result<Self, String> {
        let controller = create_controller(environment, window)?;
        let rect = RECT {
            left: 0,
            top: 0,
            right: bounds.width,
            bottom: bounds.height,
        };

        let webview = unsafe {
            controller
                .SetBounds(rect)
                .map_err(|e| format!("SetBounds failed: {e:?}"))?;
            controller
                .SetIsVisible(true)
                .map_err(|e| format!("SetIsVisible failed: {e:?}"))?;
            controller
                .CoreWebView2()
                .map_err(|e| format!("CoreWebView2 unavailable: {e:?}"))?
        };

        // The wallpaper never takes input, so browser chrome stays off.
        if let Ok(settings) = unsafe { webview.Settings() } {
            unsafe {
                let _ = settings.SetAreDefaultContextMenusEnabled(false);
                let _ = settings.SetIsStatusBarEnabled(false);
                let _ = settings.SetIsZoomControlEnabled(false);
            }
        }

        let url = to_wstring(page_url);
        unsafe { webview.Navigate(PCWSTR(url.as_ptr())) }.map_err(|e| format!("Navigate failed: {e:?}"))?;
        info!("[WALLPAPER][WEBVIEW] {:?} navigating to '{}'", window, page_url);

        Ok(Self { controller, webview })
    }

    fn post(&self, payload: &str) -> Result<(), String> {
        let payload_wide = to_wstring(payload);
        unsafe { self.webview.PostWebMessageAsJson(PCWSTR(payload_wide.as_ptr())) }
            .map_err(|e| format!("PostWebMessageAsJson failed: {e:?}"))
    }

    fn close(self) {
        unsafe {
            let _ = self.controller.Close();
        }
    }
}

/// Plays videos through a WebView2 `<video>` element hosted in the render
/// window. One browser environment is shared by every player.
pub struct WebViewEngine {
    page_dir: PathBuf,
    next_id: u64,
    environment: Option<ICoreWebView2Environment>,
    pages: HashMap<u64, PathBuf>,
    players: HashMap<u64, Player>,
}

impl WebViewEngine {
    pub fn new(page_dir: PathBuf) -> Self {
        unsafe {
            let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        }
        Self {
            page_dir,
            next_id: 1,
            environment: None,
            pages: HashMap::new(),
            players: HashMap::new(),
        }
    }

    fn environment(&mut self) -> Result<&ICoreWebView2Environment, String> {
        if self.environment.is_none() {
            self.environment = Some(create_environment()?);
        }
        self.environment
            .as_ref()
            .ok_or_else(|| "WebView2 environment missing".to_string())
    }

    fn player(&self, surface: &RenderSurface) -> Result<&Player, WallpaperError> {
        self.players
            .get(&surface.id())
            .ok_or_else(|| WallpaperError::RenderEngine(format!("surface {} is not attached", surface.id())))
    }
}

impl RenderEngine for WebViewEngine {
    fn create_render_surface(
        &mut self,
        video: &Path,
        mode: PlaybackMode,
    ) -> Result<RenderSurface, WallpaperError> {
        let init_failed = |reason: String| WallpaperError::RenderEngineInit {
            path: video.to_path_buf(),
            reason,
        };

        if !video.is_file() {
            return Err(init_failed("file does not exist".to_string()));
        }
        let video = fs::canonicalize(video).map_err(|e| init_failed(e.to_string()))?;

        fs::create_dir_all(&self.page_dir).map_err(|e| init_failed(format!("page dir: {e}")))?;
        let id = self.next_id;
        let page = self.page_dir.join(format!("player-{id}.html"));
        fs::write(&page, player_page(&video, mode)).map_err(|e| init_failed(format!("write page: {e}")))?;

        self.next_id += 1;
        self.pages.insert(id, page);
        debug!("[WALLPAPER][WEBVIEW] surface {} prepared for {}", id, video.display());
        Ok(RenderSurface::new(id, video, mode))
    }

    fn attach_to_native_surface(
        &mut self,
        surface: &RenderSurface,
        window: SurfaceHandle,
        bounds: Rect,
    ) -> Result<(), WallpaperError> {
        let page = self
            .pages
            .get(&surface.id())
            .ok_or_else(|| WallpaperError::RenderEngine(format!("unknown surface {}", surface.id())))?;

        let url = path_to_file_url(page);

        let player = self
            .environment()
            .and_then(|env| Player::open(env, hwnd_of(window), bounds, &url))
            .map_err(|reason| WallpaperError::RenderEngineInit {
                path: surface.video().to_path_buf(),
                reason,
            })?;

        self.players.insert(surface.id(), player);
        Ok(())
    }

    fn play(&mut self, surface: &RenderSurface) -> Result<(), WallpaperError> {
        self.player(surface)?.post(r#"{"cmd":"play"}"#).map_err(WallpaperError::RenderEngine)
    }

    fn stop(&mut self, surface: &RenderSurface) -> Result<(), WallpaperError> {
        self.player(surface)?.post(r#"{"cmd":"stop"}"#).map_err(WallpaperError::RenderEngine)
    }

    fn release(&mut self, surface: RenderSurface) -> Result<(), WallpaperError> {
        let page = self.pages.remove(&surface.id());
        let player = self.players.remove(&surface.id());
        if page.is_none() && player.is_none() {
            return Err(WallpaperError::RenderEngine(format!("unknown surface {}", surface.id())));
        }

        if let Some(player) = player {
            player.close();
        }
        if let Some(page) = page {
            if let Err(e) = fs::remove_file(&page) {
                warn!("[WALLPAPER][WEBVIEW] could not remove {}: {e}", page.display());
            }
        }
        info!("[WALLPAPER][WEBVIEW] surface {} released", surface.id());
        Ok(())
    }
}

impl Drop for WebViewEngine {
    fn drop(&mut self) {
        for (_, player) in self.players.drain() {
            player.close();
        }
        for (_, page) in self.pages.drain() {
            let _ = fs::remove_file(page);
        }
    }
}

fn create_environment() -> Result<ICoreWebView2Environment, String> {
    let (tx, rx) = mpsc::channel();
    webview2_com::CreateCoreWebView2EnvironmentCompletedHandler::wait_for_async_operation(
        Box::new(|handler| unsafe {
            CreateCoreWebView2Environment(&handler).map_err(webview2_com::Error::WindowsError)
        }),
        Box::new(move |error_code, environment| {
            error_code?;
            let _ = tx.send(environment.ok_or_else(|| windows::core::Error::from(E_POINTER)));
            Ok(())
        }),
    )
    .map_err(|e| format!("CreateCoreWebView2Environment failed: {e:?}"))?;

    let environment = rx
        .recv()
        .map_err(|_| "WebView2 environment callback never ran".to_string())?
        .map_err(|e| format!("WebView2 runtime unavailable: {e:?}"))?;
    debug!("[WALLPAPER][WEBVIEW] environment created");
    Ok(environment)
}

fn create_controller(environment: &ICoreWebView2Environment, window: HWND) -> Result<ICoreWebView2Controller, String> {
    let environment = environment.clone();
    let (tx, rx) = mpsc::channel();
    webview2_com::CreateCoreWebView2ControllerCompletedHandler::wait_for_async_operation(
        Box::new(move |handler| unsafe {
            environment
                .CreateCoreWebView2Controller(window, &handler)
                .map_err(webview2_com::Error::WindowsError)
        }),
        Box::new(move |error_code, controller| {
            error_code?;
            let _ = tx.send(controller.ok_or_else(|| windows::core::Error::from(E_POINTER)));
            Ok(())
        }),
    )
    .map_err(|e| format!("CreateCoreWebView2Controller failed: {e:?}"))?;

    rx.recv()
        .map_err(|_| "WebView2 controller callback never ran".to_string())?
        .map_err(|e| format!("WebView2 controller unavailable for {window:?}: {e:?}"))
}
