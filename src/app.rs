//! Top-level owner of everything the process runs: config, settings,
//! plugins, the wallpaper session and the background monitor. Every
//! user-facing operation goes through [`WallpaperApp`].

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver},
        Arc,
    },
};

use crate::{
    autostart::{launcher_script, Autostart},
    data_loaders::{
        config::AppConfig,
        settings::{AppSettings, PluginSettings, SharedSettings, APP_NAMESPACE},
    },
    debug,
    desktop::{DesktopSurfaceLocator, WindowApi},
    error::WallpaperError,
    info,
    monitor::{ProcessSampler, ResourceMonitor, ResourceSnapshot},
    notify::{Notifier, Severity},
    plugins::{FanOutReport, LoadReport, PluginFactory, PluginRegistry},
    render::RenderEngine,
    session::WallpaperSession,
    warn, APP_NAME,
};

const TITLE: &str = "Video Wallpaper";

/// Native (or fake) collaborators the app is assembled from.
pub struct AppServices {
    pub windows: Box<dyn WindowApi>,
    pub engine: Box<dyn RenderEngine>,
    pub settings: SharedSettings,
    pub notifier: Arc<dyn Notifier>,
    pub autostart: Box<dyn Autostart>,
    pub factories: Vec<PluginFactory>,
}

pub struct WallpaperApp {
    config: AppConfig,
    settings: SharedSettings,
    notifier: Arc<dyn Notifier>,
    autostart: Box<dyn Autostart>,
    plugins: PluginRegistry,
    session: WallpaperSession,
    monitor: Option<ResourceMonitor>,
    snapshots: Option<Receiver<ResourceSnapshot>>,
    last_snapshot: Option<ResourceSnapshot>,
}

impl WallpaperApp {
    pub fn new(config: AppConfig, services: AppServices) -> Self {
        let AppServices {
            windows,
            engine,
            settings,
            notifier,
            autostart,
            factories,
        } = services;

        let mut plugins = PluginRegistry::new(
            config.plugins.directory.clone(),
            factories,
            settings.clone(),
            notifier.clone(),
        )
        .with_slow_threshold(std::time::Duration::from_millis(config.plugins.slow_callback_warn_ms));
        plugins.ensure_directory();
        plugins.load_all();

        let session = WallpaperSession::new(
            windows,
            engine,
            DesktopSurfaceLocator::new(config.desktop.locate_timeout()),
        );

        Self {
            config,
            settings,
            notifier,
            autostart,
            plugins,
            session,
            monitor: None,
            snapshots: None,
            last_snapshot: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn session(&self) -> &WallpaperSession {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn settings(&self) -> AppSettings {
        AppSettings::load(self.settings.as_ref())
    }

    /* =========================
       WALLPAPER
    ========================= */

    pub fn start_wallpaper(&mut self, video: &Path, looping: bool) -> Result<(), WallpaperError> {
        if !video.is_file() {
            let err = WallpaperError::InvalidVideoPath(video.to_path_buf());
            self.notifier.notify(Severity::Warning, TITLE, &err.to_string());
            return Err(err);
        }

        match self.session.start(&mut self.plugins, video, looping) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.notifier.notify(
                    Severity::Error,
                    TITLE,
                    &format!("Could not start the wallpaper:\n{e}"),
                );
                Err(e)
            }
        }
    }

    /// Starts with the persisted video and loop flag. Stays idle with a
    /// warning when no usable video is configured.
    pub fn start_from_settings(&mut self) -> Result<(), WallpaperError> {
        let settings = self.settings();
        let video = PathBuf::from(settings.video_path.trim());
        if settings.video_path.trim().is_empty() || !video.is_file() {
            warn!("[APP] Autostart requested but no valid video is saved ({:?})", settings.video_path);
            let err = WallpaperError::InvalidVideoPath(video);
            self.notifier.notify(
                Severity::Warning,
                TITLE,
                "No saved video to start. Choose a video and save the settings first.",
            );
            return Err(err);
        }
        self.start_wallpaper(&video, settings.loop_playback)
    }

    /// Returns false when nothing was running or cleanup was incomplete.
    pub fn stop_wallpaper(&mut self) -> bool {
        if !self.session.is_running() {
            return false;
        }

        let clean = self.session.stop(&mut self.plugins);
        if !clean {
            self.notifier.notify(
                Severity::Warning,
                TITLE,
                "Some resources could not be released cleanly while stopping the wallpaper.",
            );
        }
        clean
    }

    /* =========================
       SETTINGS & PLUGINS
    ========================= */

    pub fn save_settings(&mut self, settings: &AppSettings) -> Result<FanOutReport, WallpaperError> {
        if let Err(e) = settings.validate().and_then(|_| settings.save(self.settings.as_ref())) {
            self.notifier.notify(Severity::Warning, TITLE, &e.to_string());
            return Err(e);
        }
        info!("[APP] Settings saved");
        Ok(self
            .plugins
            .notify_settings_changed(&settings.to_map(), self.session.overlay().as_ref()))
    }

    /// Stores one value under a plugin's settings and lets every enabled
    /// plugin react, against the live overlay when a wallpaper is running.
    pub fn set_plugin_setting(
        &mut self,
        plugin: &str,
        key: &str,
        value: serde_yaml::Value,
    ) -> Result<FanOutReport, WallpaperError> {
        if let Err(e) = PluginSettings::new(self.settings.clone(), plugin).set(key, value) {
            self.notifier.notify(Severity::Warning, TITLE, &e.to_string());
            return Err(e);
        }
        debug!("[APP] Plugin setting {}/{} saved", plugin, key);
        let current = AppSettings::load(self.settings.as_ref()).to_map();
        Ok(self
            .plugins
            .notify_settings_changed(&current, self.session.overlay().as_ref()))
    }

    pub fn reload_plugins(&mut self) -> LoadReport {
        let report = self.plugins.reload();
        self.notifier.notify(
            Severity::Info,
            TITLE,
            &format!("Loaded {} plugin(s)", report.loaded.len()),
        );
        report
    }

    pub fn set_plugin_enabled(&mut self, name: &str, enabled: bool) -> Result<bool, WallpaperError> {
        self.plugins.set_enabled(name, enabled)
    }

    pub fn show_plugin_settings(&mut self, name: &str) -> Result<(), WallpaperError> {
        self.plugins.show_settings_ui(name).inspect_err(|e| {
            self.notifier.notify(Severity::Warning, TITLE, &e.to_string());
        })
    }

    /* =========================
       AUTOSTART & LAUNCHER
    ========================= */

    pub fn set_autostart(&self, target: &Path) -> Result<(), WallpaperError> {
        match self.autostart.enable(APP_NAME, target) {
            Ok(()) => {
                self.notifier.notify(Severity::Info, TITLE, "Autostart has been set.");
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(Severity::Error, TITLE, &e.to_string());
                Err(e)
            }
        }
    }

    pub fn unset_autostart(&self) -> Result<(), WallpaperError> {
        match self.autostart.disable(APP_NAME) {
            Ok(()) => {
                self.notifier.notify(Severity::Info, TITLE, "Autostart has been removed.");
                Ok(())
            }
            Err(WallpaperError::NotRegistered) => {
                self.notifier.notify(Severity::Info, TITLE, "Autostart is not set.");
                Err(WallpaperError::NotRegistered)
            }
            Err(e) => {
                self.notifier.notify(Severity::Error, TITLE, &e.to_string());
                Err(e)
            }
        }
    }

    pub fn autostart_status(&self) -> Option<String> {
        self.autostart.current_target(APP_NAME)
    }

    /// Writes a batch file that relaunches this executable with the saved
    /// video, and remembers it as the launcher.
    pub fn create_launch_script(&self, script: &Path) -> Result<PathBuf, WallpaperError> {
        let settings = self.settings();
        let video = PathBuf::from(settings.video_path.trim());
        if settings.video_path.trim().is_empty() || !video.is_file() {
            let err = WallpaperError::InvalidVideoPath(video);
            self.notifier.notify(Severity::Warning, TITLE, &err.to_string());
            return Err(err);
        }

        let io_err = |reason: String| WallpaperError::SettingsIo {
            path: script.to_path_buf(),
            reason,
        };
        let exe = env::current_exe().map_err(|e| io_err(e.to_string()))?;
        if let Some(parent) = script.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(e.to_string()))?;
        }
        fs::write(script, launcher_script(&exe, &video, settings.loop_playback))
            .map_err(|e| io_err(e.to_string()))?;

        self.settings.set(
            APP_NAMESPACE,
            "bat_path",
            serde_yaml::Value::String(script.display().to_string()),
        )?;
        info!("[APP] Launcher written to {}", script.display());
        Ok(script.to_path_buf())
    }

    /* =========================
       MONITOR
    ========================= */

    pub fn start_monitor(&mut self, sampler: Box<dyn ProcessSampler>) {
        if !self.config.monitor.enabled || self.monitor.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel();
        match ResourceMonitor::spawn(sampler, self.config.monitor.interval(), tx) {
            Ok(monitor) => {
                self.monitor = Some(monitor);
                self.snapshots = Some(rx);
            }
            Err(e) => warn!("[APP] Resource monitor unavailable: {e}"),
        }
    }

    /// Takes every queued snapshot and returns the newest one seen so far.
    pub fn drain_monitor(&mut self) -> Option<ResourceSnapshot> {
        if let Some(rx) = self.snapshots.as_ref() {
            while let Ok(snapshot) = rx.try_recv() {
                debug!(
                    "[MONITOR] CPU: {:.1}% | Memory: {:.1}MB",
                    snapshot.cpu_percent, snapshot.memory_mb
                );
                self.last_snapshot = Some(snapshot);
            }
        }
        self.last_snapshot
    }

    /// Stops the wallpaper, lets every plugin clean up and stops the monitor.
    pub fn shutdown(&mut self) {
        self.stop_wallpaper();
        self.plugins.cleanup_all();
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.snapshots = None;
        info!("[APP] Shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        autostart::MemoryAutostart,
        data_loaders::settings::MemorySettingsStore,
        testing::{probe_factories, write_unit, FakeDesktop, FakeEngine, Journal, RecordingNotifier},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Harness {
        dir: tempfile::TempDir,
        app: WallpaperApp,
        engine: FakeEngine,
        journal: Journal,
        notifier: Arc<RecordingNotifier>,
        settings: SharedSettings,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("plugins");
        write_unit(&plugin_dir, "01-one", "probe-one");

        let mut config = AppConfig::default();
        config.plugins.directory = plugin_dir;
        config.monitor.interval_ms = 250;

        let journal = Journal::default();
        let desktop = FakeDesktop::new();
        desktop.install_shell();
        let engine = FakeEngine::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let settings: SharedSettings = Arc::new(MemorySettingsStore::new());

        let app = WallpaperApp::new(
            config,
            AppServices {
                windows: Box::new(desktop),
                engine: Box::new(engine.clone()),
                settings: settings.clone(),
                notifier: notifier.clone(),
                autostart: Box::new(MemoryAutostart::default()),
                factories: probe_factories(&journal),
            },
        );
        journal.take();

        Harness {
            dir,
            app,
            engine,
            journal,
            notifier,
            settings,
        }
    }

    fn video(h: &Harness) -> PathBuf {
        let path = h.dir.path().join("clip.mp4");
        fs::write(&path, b"mp4").unwrap();
        path
    }

    #[test]
    fn missing_video_is_reported_and_nothing_starts() {
        let mut h = harness();

        let err = h
            .app
            .start_wallpaper(&h.dir.path().join("absent.mp4"), true)
            .unwrap_err();

        assert!(matches!(err, WallpaperError::InvalidVideoPath(_)));
        assert!(!h.app.is_running());
        assert_eq!(h.engine.outstanding(), 0);
        assert_eq!(h.notifier.messages()[0].0, Severity::Warning);
    }

    #[test]
    fn start_and_stop_round_trip() {
        let mut h = harness();
        let clip = video(&h);

        h.app.start_wallpaper(&clip, true).unwrap();
        assert!(h.app.is_running());

        assert!(h.app.stop_wallpaper());
        assert!(!h.app.stop_wallpaper());
        assert_eq!(h.engine.outstanding(), 0);
    }

    #[test]
    fn autostart_from_settings_uses_saved_values() {
        let mut h = harness();
        let clip = video(&h);
        let saved = AppSettings {
            video_path: clip.display().to_string(),
            loop_playback: false,
            ..AppSettings::default()
        };
        h.app.save_settings(&saved).unwrap();

        h.app.start_from_settings().unwrap();

        assert_eq!(h.app.session().current_video(), Some((clip.as_path(), false)));
    }

    #[test]
    fn autostart_without_saved_video_stays_idle() {
        let mut h = harness();

        assert!(h.app.start_from_settings().is_err());

        assert!(!h.app.is_running());
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[test]
    fn saving_settings_validates_then_fans_out() {
        let mut h = harness();
        let clip = video(&h);

        let bad = AppSettings::default();
        assert!(h.app.save_settings(&bad).is_err());
        assert!(h.journal.entries().is_empty());

        let good = AppSettings {
            video_path: clip.display().to_string(),
            ..AppSettings::default()
        };
        let report = h.app.save_settings(&good).unwrap();

        assert_eq!(report.delivered, vec!["one"]);
        assert_eq!(
            h.journal.take(),
            vec!["one:settings bat_path,loop,minimize_to_tray,video_path"]
        );
        assert_eq!(h.app.settings(), good);
    }

    #[test]
    fn plugin_setting_is_stored_then_fanned_out() {
        let mut h = harness();

        let report = h
            .app
            .set_plugin_setting("one", "color", serde_yaml::Value::String("#00FF00".into()))
            .unwrap();

        assert_eq!(report.delivered, vec!["one"]);
        assert_eq!(
            h.journal.take(),
            vec!["one:settings bat_path,loop,minimize_to_tray,video_path"]
        );
        assert_eq!(
            PluginSettings::new(h.settings.clone(), "one").get("color"),
            Some(serde_yaml::Value::String("#00FF00".into()))
        );
    }

    #[test]
    fn launcher_script_is_written_and_remembered() {
        let h = harness();
        let clip = video(&h);
        AppSettings {
            video_path: clip.display().to_string(),
            ..AppSettings::default()
        }
        .save(h.settings.as_ref())
        .unwrap();
        let script = h.dir.path().join("launch").join("start.bat");

        h.app.create_launch_script(&script).unwrap();

        let text = fs::read_to_string(&script).unwrap();
        assert!(text.contains("--gui-with-video"));
        assert!(text.contains(&clip.display().to_string()));
        assert_eq!(h.app.settings().bat_path, script.display().to_string());
    }

    #[test]
    fn autostart_round_trip_through_the_collaborator() {
        let h = harness();
        let launcher = h.dir.path().join("start.bat");

        h.app.set_autostart(&launcher).unwrap();
        assert!(h.app.autostart_status().is_some());

        h.app.unset_autostart().unwrap();
        assert_eq!(h.app.unset_autostart(), Err(WallpaperError::NotRegistered));
        assert_eq!(h.app.autostart_status(), None);
    }

    #[test]
    fn shutdown_stops_the_session_and_cleans_up_every_plugin() {
        let mut h = harness();
        let clip = video(&h);
        h.app.set_plugin_enabled("one", false).unwrap();
        h.app.start_wallpaper(&clip, true).unwrap();

        h.app.shutdown();

        assert!(!h.app.is_running());
        assert_eq!(h.engine.outstanding(), 0);
        assert_eq!(h.journal.take(), vec!["one:cleanup"]);
    }

    #[test]
    fn monitor_snapshots_are_drained_on_the_owner_thread() {
        struct Idle;
        impl ProcessSampler for Idle {
            fn cpu_time(&mut self) -> Result<Duration, String> {
                Ok(Duration::ZERO)
            }
            fn resident_bytes(&mut self) -> Result<u64, String> {
                Ok(10 * 1024 * 1024)
            }
        }

        let mut h = harness();
        h.app.start_monitor(Box::new(Idle));

        let mut snapshot = None;
        for _ in 0..40 {
            snapshot = h.app.drain_monitor();
            if snapshot.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        assert_eq!(snapshot.map(|s| s.memory_mb), Some(10.0));
        h.app.shutdown();
    }
}
