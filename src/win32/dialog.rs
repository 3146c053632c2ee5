use windows::{
    core::PCWSTR,
    Win32::UI::WindowsAndMessaging::{
        MessageBoxW, MB_ICONERROR, MB_ICONINFORMATION, MB_ICONWARNING, MB_OK, MB_SETFOREGROUND,
    },
};

use crate::{
    notify::{LogNotifier, Notifier, Severity},
    utility::to_wstring,
};

/// Modal message box, mirrored into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageBoxNotifier;

impl Notifier for MessageBoxNotifier {
    fn notify(&self, severity: Severity, title: &str, message: &str) {
        LogNotifier.notify(severity, title, message);

        let icon = match severity {
            Severity::Info => MB_ICONINFORMATION,
            Severity::Warning => MB_ICONWARNING,
            Severity::Error => MB_ICONERROR,
        };
        let title = to_wstring(title);
        let message = to_wstring(message);
        unsafe {
            let _ = MessageBoxW(
                None,
                PCWSTR(message.as_ptr()),
                PCWSTR(title.as_ptr()),
                MB_OK | MB_SETFOREGROUND | icon,
            );
        }
    }
}
