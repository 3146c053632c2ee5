//! Win32 implementations of the native seams.

use std::ffi::c_void;

use windows::Win32::Foundation::HWND;

use crate::desktop::SurfaceHandle;

pub mod control;
pub mod dialog;
pub mod process;
pub mod registry;
pub mod shell;
pub mod webview;

pub fn hwnd_of(handle: SurfaceHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

pub fn handle_of(hwnd: HWND) -> SurfaceHandle {
    SurfaceHandle(hwnd.0 as isize)
}
