use crate::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Synchronous, user-visible notification at the point of failure.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, title: &str, message: &str);
}

/// Writes notifications to the log only. Used where no desktop is available.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, severity: Severity, title: &str, message: &str) {
        match severity {
            Severity::Info => info!("[NOTIFY] {}: {}", title, message),
            Severity::Warning => warn!("[NOTIFY] {}: {}", title, message),
            Severity::Error => error!("[NOTIFY] {}: {}", title, message),
        }
    }
}
