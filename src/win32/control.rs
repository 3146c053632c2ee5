//! Message-only window that ends the message loop.
//!
//! `WM_CLOSE` (sent by `--quit` or any other process) and a logoff
//! `WM_ENDSESSION` both post `WM_QUIT`, after which `main` shuts down.

use windows::{
    core::{w, PCWSTR},
    Win32::{
        Foundation::{HWND, LPARAM, LRESULT, WPARAM},
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DestroyWindow, FindWindowExW, PostMessageW,
            PostQuitMessage, HWND_MESSAGE, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WM_DESTROY,
            WM_ENDSESSION, WNDCLASSW,
        },
    },
};

use super::shell::{module_instance, register_class};
use crate::{debug, info};

const CONTROL_CLASS_NAME: PCWSTR = w!("VideoWallpaperControl");

unsafe extern "system" fn control_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_CLOSE => {
            info!("[WALLPAPER][CONTROL] Close requested");
            let _ = DestroyWindow(hwnd);
            LRESULT(0)
        }
        WM_DESTROY => {
            PostQuitMessage(0);
            LRESULT(0)
        }
        WM_ENDSESSION if wparam.0 != 0 => {
            info!("[WALLPAPER][CONTROL] Session ending");
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

/// Owns the control window; destroying it on drop is a no-op once
/// `WM_CLOSE` has already taken it down.
pub struct ControlWindow {
    hwnd: HWND,
}

impl ControlWindow {
    pub fn create() -> Result<Self, String> {
        let hinstance = module_instance()?;
        let class = WNDCLASSW {
            lpfnWndProc: Some(control_window_proc),
            hInstance: hinstance,
            lpszClassName: CONTROL_CLASS_NAME,
            ..Default::default()
        };
        register_class(&class, "control")?;

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                CONTROL_CLASS_NAME,
                w!("Video Wallpaper"),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                Some(HWND_MESSAGE),
                None,
                Some(hinstance),
                None,
            )
        }
        .map_err(|e| format!("CreateWindowExW(control) failed: {e:?}"))?;

        debug!("[WALLPAPER][CONTROL] Control window {:?}", hwnd);
        Ok(Self { hwnd })
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }
}

impl Drop for ControlWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.hwnd);
        }
    }
}

/// Asks a running instance to close. Returns `false` when none is running.
pub fn request_quit() -> Result<bool, String> {
    let Ok(target) = (unsafe { FindWindowExW(Some(HWND_MESSAGE), None, CONTROL_CLASS_NAME, None) })
    else {
        return Ok(false);
    };
    unsafe { PostMessageW(Some(target), WM_CLOSE, WPARAM(0), LPARAM(0)) }
        .map_err(|e| format!("PostMessageW(WM_CLOSE) failed: {e:?}"))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, IsWindow, MSG, WM_QUIT,
    };

    /// Pumps until `WM_QUIT` and reports whether it arrived.
    fn pump_until_quit() -> bool {
        let mut msg = MSG::default();
        unsafe {
            loop {
                let got = GetMessageW(&mut msg, None, 0, 0);
                if got.0 == 0 {
                    return msg.message == WM_QUIT;
                }
                if got.0 == -1 {
                    return false;
                }
                DispatchMessageW(&msg);
            }
        }
    }

    #[test]
    fn close_message_ends_the_loop() {
        let control = ControlWindow::create().unwrap();
        unsafe { PostMessageW(Some(control.hwnd()), WM_CLOSE, WPARAM(0), LPARAM(0)) }.unwrap();

        assert!(pump_until_quit());
        assert!(!unsafe { IsWindow(Some(control.hwnd())) }.as_bool());
    }
}
