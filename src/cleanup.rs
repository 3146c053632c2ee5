use std::{
    fs, io,
    path::PathBuf,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{debug, info, warn};

/// Grace period after the flag appears so the writer can finish with it.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// False when the wait ended by timeout.
    pub signalled: bool,
    pub removed: Vec<PathBuf>,
}

/// Waits on a background thread until `flag` exists (or `timeout` passes),
/// then deletes `artifacts` and the flag itself. Nothing is deleted before
/// one of the two happens.
pub fn spawn_cleanup_after_signal(
    flag: PathBuf,
    artifacts: Vec<PathBuf>,
    timeout: Duration,
    poll: Duration,
) -> io::Result<JoinHandle<CleanupOutcome>> {
    thread::Builder::new()
        .name("artifact-cleanup".to_string())
        .spawn(move || {
            let started = Instant::now();
            let mut signalled = false;

            while started.elapsed() < timeout {
                if flag.exists() {
                    signalled = true;
                    thread::sleep(SETTLE_DELAY);
                    break;
                }
                thread::sleep(poll);
            }

            if !signalled {
                warn!(
                    "[CLEANUP] No completion signal at {} after {}s; cleaning up anyway",
                    flag.display(),
                    timeout.as_secs()
                );
            }

            let mut removed = Vec::new();
            for path in artifacts.into_iter().chain(std::iter::once(flag)) {
                if !path.exists() {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("[CLEANUP] Removed {}", path.display());
                        removed.push(path);
                    }
                    Err(e) => warn!("[CLEANUP] Failed to remove {}: {e}", path.display()),
                }
            }

            info!("[CLEANUP] Done (signalled: {signalled}, removed: {})", removed.len());
            CleanupOutcome { signalled, removed }
        })
}
