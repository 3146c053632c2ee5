//! Per-user autorun entry (`HKCU\...\CurrentVersion\Run`).
//!
//! Reads go straight to the registry. Writes are done by a generated batch
//! script so the change is visible to the user as a normal `reg` call; the
//! script drops a completion flag and a cleanup thread removes both.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    cleanup::{spawn_cleanup_after_signal, CleanupOutcome},
    error::WallpaperError,
    info, warn,
};

pub const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
pub const SET_SCRIPT: &str = "set_autostart.bat";
pub const UNSET_SCRIPT: &str = "unset_autostart.bat";
pub const COMPLETION_FLAG: &str = "autostart_completed";

pub trait Autostart {
    fn enable(&self, app: &str, target: &Path) -> Result<(), WallpaperError>;

    /// Fails with [`WallpaperError::NotRegistered`] when there is no entry.
    fn disable(&self, app: &str) -> Result<(), WallpaperError>;

    fn is_enabled(&self, app: &str) -> bool {
        self.current_target(app).is_some()
    }

    fn current_target(&self, app: &str) -> Option<String>;
}

/// Read access to the run key.
pub trait RunKeyReader {
    fn read(&self, value_name: &str) -> Result<Option<String>, String>;
}

/// Starts a generated script without waiting for it.
pub trait ScriptRunner {
    fn launch(&self, script: &Path) -> io::Result<()>;
}

/* =========================
   SCRIPT TEXT
========================= */

/// Escapes text for use inside a double-quoted batch argument.
fn batch_escape(text: &str) -> String {
    text.replace('%', "%%").replace('"', "")
}

pub fn set_script(app: &str, target: &Path) -> String {
    let app = batch_escape(app);
    let target = batch_escape(&target.display().to_string().replace('/', "\\"));
    format!(
        "@echo off\r\n\
         chcp 65001 >nul\r\n\
         reg add \"HKCU\\{RUN_KEY}\" /v \"{app}\" /t REG_SZ /d \"\\\"{target}\\\"\" /f >nul\r\n\
         if %errorlevel% neq 0 echo Failed to register {app} for autostart.\r\n\
         echo completed > \"%~dp0{COMPLETION_FLAG}\"\r\n"
    )
}

pub fn unset_script(app: &str) -> String {
    let app = batch_escape(app);
    format!(
        "@echo off\r\n\
         chcp 65001 >nul\r\n\
         reg delete \"HKCU\\{RUN_KEY}\" /v \"{app}\" /f >nul\r\n\
         if %errorlevel% neq 0 echo No autostart entry named {app}.\r\n\
         echo completed > \"%~dp0{COMPLETION_FLAG}\"\r\n"
    )
}

/// Batch file that relaunches `exe` straight into wallpaper mode.
pub fn launcher_script(exe: &Path, video: &Path, looping: bool) -> String {
    let exe = batch_escape(&exe.display().to_string());
    let video = batch_escape(&video.display().to_string());
    let no_loop = if looping { "" } else { " --no-loop" };
    format!(
        "@echo off\r\n\
         chcp 65001 >nul\r\n\
         start \"\" \"{exe}\" --gui-with-video \"{video}\"{no_loop}\r\n"
    )
}

/* =========================
   SCRIPTED WRITER
========================= */

pub struct ScriptedAutostart<R, S> {
    reader: R,
    runner: S,
    work_dir: PathBuf,
    timeout: Duration,
    poll: Duration,
    pending: Mutex<Option<JoinHandle<CleanupOutcome>>>,
}

impl<R: RunKeyReader, S: ScriptRunner> ScriptedAutostart<R, S> {
    pub fn new(reader: R, runner: S, work_dir: PathBuf, timeout: Duration, poll: Duration) -> Self {
        Self {
            reader,
            runner,
            work_dir,
            timeout,
            poll,
            pending: Mutex::new(None),
        }
    }

    /// Blocks until the most recent cleanup thread has finished.
    pub fn wait_for_cleanup(&self) -> Option<CleanupOutcome> {
        let handle = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        handle.join().ok()
    }

    fn run_script(&self, name: &str, contents: &str) -> Result<(), WallpaperError> {
        let failed = |what: &str, e: io::Error| WallpaperError::Autostart(format!("{what}: {e}"));

        fs::create_dir_all(&self.work_dir).map_err(|e| failed("create work dir", e))?;
        let script = self.work_dir.join(name);
        let flag = self.work_dir.join(COMPLETION_FLAG);
        if flag.exists() {
            let _ = fs::remove_file(&flag);
        }

        fs::write(&script, contents).map_err(|e| failed("write script", e))?;

        if let Err(e) = self.runner.launch(&script) {
            let _ = fs::remove_file(&script);
            return Err(failed("launch script", e));
        }

        match spawn_cleanup_after_signal(flag, vec![script], self.timeout, self.poll) {
            Ok(handle) => {
                *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => warn!("[AUTOSTART] Could not start cleanup thread: {e}"),
        }
        Ok(())
    }
}

impl<R: RunKeyReader, S: ScriptRunner> Autostart for ScriptedAutostart<R, S> {
    fn enable(&self, app: &str, target: &Path) -> Result<(), WallpaperError> {
        if !target.is_file() {
            return Err(WallpaperError::LauncherMissing(target.to_path_buf()));
        }
        self.run_script(SET_SCRIPT, &set_script(app, target))?;
        info!("[AUTOSTART] Registering '{}' -> {}", app, target.display());
        Ok(())
    }

    fn disable(&self, app: &str) -> Result<(), WallpaperError> {
        if !self.is_enabled(app) {
            return Err(WallpaperError::NotRegistered);
        }
        self.run_script(UNSET_SCRIPT, &unset_script(app))?;
        info!("[AUTOSTART] Removing '{}'", app);
        Ok(())
    }

    fn current_target(&self, app: &str) -> Option<String> {
        match self.reader.read(app) {
            Ok(value) => value,
            Err(e) => {
                warn!("[AUTOSTART] Failed to read run key: {e}");
                None
            }
        }
    }
}

impl<R, S> Drop for ScriptedAutostart<R, S> {
    /// Lets an in-flight cleanup finish so no script is left behind on exit.
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = pending {
            let _ = handle.join();
        }
    }
}

/* =========================
   IN-MEMORY
========================= */

/// Run key kept in memory. Used off Windows and in tests.
#[derive(Default)]
pub struct MemoryAutostart {
    entries: Mutex<BTreeMap<String, String>>,
}

impl Autostart for MemoryAutostart {
    fn enable(&self, app: &str, target: &Path) -> Result<(), WallpaperError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app.to_string(), format!("\"{}\"", target.display()));
        Ok(())
    }

    fn disable(&self, app: &str) -> Result<(), WallpaperError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(app)
            .map(|_| ())
            .ok_or(WallpaperError::NotRegistered)
    }

    fn current_target(&self, app: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(app)
            .cloned()
    }
}
