use std::{ffi::c_void, ptr, sync::OnceLock, time::Duration};

use windows::{
    core::{w, BOOL, PCWSTR},
    Win32::{
        Foundation::{
            GetLastError, COLORREF, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT,
            WPARAM,
        },
        Graphics::Gdi::{CreateSolidBrush, SetBkColor, SetTextColor, HBRUSH, HDC},
        System::LibraryLoader::GetModuleHandleW,
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DestroyWindow, EnumWindows, FindWindowExW, FindWindowW,
            GetParent, GetSystemMetrics, GetWindowLongW, IsWindow, RegisterClassW, GWLP_USERDATA,
            WM_CTLCOLORSTATIC,
            SendMessageTimeoutW, SetLayeredWindowAttributes, SetParent, SetWindowLongW, SetWindowPos,
            ShowWindow, GWL_EXSTYLE, GWL_STYLE, HWND_TOP, LWA_COLORKEY, SMTO_NORMAL, SM_CXSCREEN,
            SM_CYSCREEN, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SW_SHOWNA,
            WINDOW_EX_STYLE, WINDOW_STYLE, WNDCLASSW, WS_CAPTION, WS_CHILD, WS_CLIPCHILDREN,
            WS_CLIPSIBLINGS, WS_EX_APPWINDOW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
            WS_MAXIMIZEBOX, WS_MINIMIZEBOX, WS_POPUP, WS_SYSMENU, WS_THICKFRAME, WS_VISIBLE,
        },
    },
};

use super::{handle_of, hwnd_of};
use crate::{
    debug,
    desktop::{Rect, Rgb, SurfaceHandle, SurfaceKind, WindowApi},
    utility::to_wstring,
    warn,
};

const RENDER_CLASS_NAME: PCWSTR = w!("VideoWallpaperRenderWindow");
const OVERLAY_CLASS_NAME: PCWSTR = w!("VideoWallpaperOverlayWindow");

/// Overlay pixels painted in this colour are see-through.
const OVERLAY_COLOR_KEY: COLORREF = COLORREF(0x00FF00FF);

fn colorref(color: Rgb) -> COLORREF {
    COLORREF(u32::from(color.r) | (u32::from(color.g) << 8) | (u32::from(color.b) << 16))
}

/// Background brush shared by the overlay class and its labels.
fn overlay_brush() -> HBRUSH {
    static BRUSH: OnceLock<usize> = OnceLock::new();
    let raw = *BRUSH.get_or_init(|| unsafe { CreateSolidBrush(OVERLAY_COLOR_KEY) }.0 as usize);
    HBRUSH(raw as *mut c_void)
}

/// `WindowApi` over the live Win32 window tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Desktop;

impl Win32Desktop {
    pub fn new() -> Result<Self, String> {
        ensure_classes()?;
        Ok(Self)
    }
}

pub(crate) fn module_instance() -> Result<HINSTANCE, String> {
    unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .map_err(|e| format!("GetModuleHandleW failed: {e:?}"))
    }
}

/// Registers `class`; a class left over from an earlier registration in
/// this process counts as success.
pub(crate) fn register_class(class: &WNDCLASSW, name: &str) -> Result<(), String> {
    unsafe {
        if RegisterClassW(class) != 0 {
            return Ok(());
        }
        let last = GetLastError();
        if last == ERROR_CLASS_ALREADY_EXISTS {
            debug!("[WALLPAPER][CLASS] {} already registered", name);
            return Ok(());
        }
        Err(format!("RegisterClassW({name}) failed: {last:?}"))
    }
}

fn ensure_classes() -> Result<(), String> {
    static CLASSES_ONCE: OnceLock<()> = OnceLock::new();
    if CLASSES_ONCE.get().is_some() {
        return Ok(());
    }

    let hinstance = module_instance()?;

    let render = WNDCLASSW {
        lpfnWndProc: Some(host_window_proc),
        hInstance: hinstance,
        lpszClassName: RENDER_CLASS_NAME,
        hbrBackground: HBRUSH::default(),
        ..Default::default()
    };
    let overlay = WNDCLASSW {
        lpfnWndProc: Some(host_window_proc),
        hInstance: hinstance,
        lpszClassName: OVERLAY_CLASS_NAME,
        hbrBackground: overlay_brush(),
        ..Default::default()
    };

    register_class(&render, "render")?;
    register_class(&overlay, "overlay")?;

    let _ = CLASSES_ONCE.set(());
    Ok(())
}

unsafe extern "system" fn host_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        // Labels keep their text colour in GWLP_USERDATA.
        WM_CTLCOLORSTATIC => {
            let hdc = HDC(wparam.0 as *mut c_void);
            let label = HWND(lparam.0 as *mut c_void);
            let color = GetWindowLongW(label, GWLP_USERDATA) as u32;
            SetTextColor(hdc, COLORREF(color));
            SetBkColor(hdc, OVERLAY_COLOR_KEY);
            LRESULT(overlay_brush().0 as isize)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

/// Switches a window between top-level popup and child styling so
/// reparenting does not leave a caption or taskbar button behind.
fn apply_parent_style(hwnd: HWND, as_child: bool) {
    unsafe {
        let style = GetWindowLongW(hwnd, GWL_STYLE) as u32;
        let mut new_style = style
            & !(WS_CAPTION.0 | WS_THICKFRAME.0 | WS_MINIMIZEBOX.0 | WS_MAXIMIZEBOX.0 | WS_SYSMENU.0);
        if as_child {
            new_style = (new_style & !WS_POPUP.0) | WS_CHILD.0;
        } else {
            new_style = (new_style & !WS_CHILD.0) | WS_POPUP.0;
        }
        let _ = SetWindowLongW(hwnd, GWL_STYLE, new_style as i32);

        let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
        let new_ex = (ex_style & !WS_EX_APPWINDOW.0) | WS_EX_TOOLWINDOW.0 | WS_EX_NOACTIVATE.0;
        let _ = SetWindowLongW(hwnd, GWL_EXSTYLE, new_ex as i32);

        debug!(
            "[WALLPAPER][STYLE] hwnd={:?} style 0x{:X} -> 0x{:X}, ex 0x{:X} -> 0x{:X}",
            hwnd, style, new_style, ex_style, new_ex
        );

        let _ = SetWindowPos(
            hwnd,
            None,
            0,
            0,
            0,
            0,
            SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_FRAMECHANGED,
        );
    }
}

impl WindowApi for Win32Desktop {
    fn find_top_level(&self, class: &str) -> Option<SurfaceHandle> {
        let class = to_wstring(class);
        unsafe { FindWindowW(PCWSTR(class.as_ptr()), None).ok().map(handle_of) }
    }

    fn send_message_timeout(&self, target: SurfaceHandle, message: u32, timeout: Duration) -> bool {
        let mut result = 0usize;
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let answered = unsafe {
            SendMessageTimeoutW(
                hwnd_of(target),
                message,
                WPARAM(0),
                LPARAM(0),
                SMTO_NORMAL,
                timeout_ms,
                Some(&mut result),
            )
        };
        answered.0 != 0
    }

    fn top_level_windows(&self) -> Vec<SurfaceHandle> {
        unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
            if let Some(out) = (lparam.0 as *mut Vec<SurfaceHandle>).as_mut() {
                out.push(handle_of(hwnd));
            }
            BOOL(1)
        }

        let mut windows = Vec::<SurfaceHandle>::new();
        unsafe {
            let _ = EnumWindows(
                Some(enum_proc),
                LPARAM((&mut windows) as *mut Vec<SurfaceHandle> as isize),
            );
        }
        windows
    }

    fn find_child(
        &self,
        parent: Option<SurfaceHandle>,
        after: Option<SurfaceHandle>,
        class: &str,
    ) -> Option<SurfaceHandle> {
        let class = to_wstring(class);
        unsafe {
            FindWindowExW(
                parent.map(hwnd_of),
                after.map(hwnd_of),
                PCWSTR(class.as_ptr()),
                None,
            )
            .ok()
            .map(handle_of)
        }
    }

    fn create_surface(&self, kind: SurfaceKind, bounds: Rect) -> Result<SurfaceHandle, String> {
        ensure_classes()?;
        let hinstance = module_instance()?;

        let (class, ex_style) = match kind {
            SurfaceKind::Render => (RENDER_CLASS_NAME, WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE),
            SurfaceKind::Overlay => (
                OVERLAY_CLASS_NAME,
                WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE | WS_EX_LAYERED,
            ),
        };
        let style = WINDOW_STYLE((WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN).0);

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(ex_style.0),
                class,
                PCWSTR::null(),
                style,
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                None,
                None,
                Some(hinstance),
                Some(ptr::null::<c_void>()),
            )
        }
        .map_err(|e| format!("CreateWindowExW failed: {e:?}"))?;

        if kind == SurfaceKind::Overlay {
            if let Err(e) = unsafe { SetLayeredWindowAttributes(hwnd, OVERLAY_COLOR_KEY, 0, LWA_COLORKEY) } {
                unsafe {
                    let _ = DestroyWindow(hwnd);
                }
                return Err(format!("SetLayeredWindowAttributes failed: {e:?}"));
            }
        }

        debug!(
            "[WALLPAPER][HOST] created {:?} window {:?} at ({}, {}) {}x{}",
            kind, hwnd, bounds.x, bounds.y, bounds.width, bounds.height
        );
        Ok(handle_of(hwnd))
    }

    fn create_label(
        &self,
        parent: SurfaceHandle,
        text: &str,
        bounds: Rect,
        color: Rgb,
    ) -> Result<SurfaceHandle, String> {
        let hinstance = module_instance()?;
        let text = to_wstring(text);
        let style = WINDOW_STYLE((WS_CHILD | WS_VISIBLE).0);

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("STATIC"),
                PCWSTR(text.as_ptr()),
                style,
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                Some(hwnd_of(parent)),
                None,
                Some(hinstance),
                Some(ptr::null::<c_void>()),
            )
        }
        .map_err(|e| format!("CreateWindowExW(STATIC) failed: {e:?}"))?;

        unsafe {
            let _ = SetWindowLongW(hwnd, GWLP_USERDATA, colorref(color).0 as i32);
        }
        Ok(handle_of(hwnd))
    }

    fn parent(&self, window: SurfaceHandle) -> Option<SurfaceHandle> {
        unsafe { GetParent(hwnd_of(window)).ok().map(handle_of) }
    }

    fn set_parent(&self, window: SurfaceHandle, parent: Option<SurfaceHandle>) -> Result<(), String> {
        let hwnd = hwnd_of(window);
        apply_parent_style(hwnd, parent.is_some());

        match unsafe { SetParent(hwnd, parent.map(hwnd_of)) } {
            Ok(_) => Ok(()),
            // A previous parent of NULL (top-level) also comes back as Err,
            // but without an error code.
            Err(e) if e.code().is_ok() => Ok(()),
            Err(e) => {
                apply_parent_style(hwnd, parent.is_none());
                Err(format!("SetParent failed: {e:?}"))
            }
        }
    }

    fn raise_in_place(&self, window: SurfaceHandle) -> Result<(), String> {
        unsafe {
            SetWindowPos(
                hwnd_of(window),
                Some(HWND_TOP),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| format!("SetWindowPos failed: {e:?}"))
    }

    fn show(&self, window: SurfaceHandle) {
        unsafe {
            let _ = ShowWindow(hwnd_of(window), SW_SHOWNA);
        }
    }

    fn destroy(&self, window: SurfaceHandle) -> Result<(), String> {
        unsafe { DestroyWindow(hwnd_of(window)) }.map_err(|e| {
            warn!("[WALLPAPER][HOST] DestroyWindow({:?}) failed: {e:?}", window);
            format!("DestroyWindow failed: {e:?}")
        })
    }

    fn exists(&self, window: SurfaceHandle) -> bool {
        unsafe { IsWindow(Some(hwnd_of(window))).as_bool() }
    }

    fn screen_bounds(&self) -> Rect {
        unsafe { Rect::new(0, 0, GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_a_class_twice_is_not_an_error() {
        let class = WNDCLASSW {
            lpfnWndProc: Some(host_window_proc),
            hInstance: module_instance().unwrap(),
            lpszClassName: w!("VideoWallpaperClassTwice"),
            ..Default::default()
        };

        assert_eq!(register_class(&class, "twice"), Ok(()));
        assert_eq!(register_class(&class, "twice"), Ok(()));
    }

    #[test]
    fn a_class_without_a_name_is_rejected() {
        let class = WNDCLASSW {
            lpfnWndProc: Some(host_window_proc),
            hInstance: module_instance().unwrap(),
            lpszClassName: PCWSTR::null(),
            ..Default::default()
        };

        let err = register_class(&class, "nameless").unwrap_err();
        assert!(err.starts_with("RegisterClassW(nameless) failed"), "{err}");
    }

    #[test]
    fn label_colors_use_win32_byte_order() {
        assert_eq!(colorref(Rgb::new(0x12, 0x34, 0x56)), COLORREF(0x0056_3412));
    }

    #[test]
    fn desktop_registers_its_classes() {
        assert!(Win32Desktop::new().is_ok());
    }
}
