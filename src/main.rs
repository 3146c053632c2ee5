#![cfg_attr(windows, windows_subsystem = "windows")]

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
	native::run()
}

#[cfg(not(windows))]
fn main() {
	eprintln!("video-wallpaper only runs on Windows");
}

#[cfg(windows)]
mod native {
	use std::{sync::Arc, thread, time::Duration};

	use anyhow::Context;
	use clap::Parser;
	use windows::Win32::UI::HiDpi::{
		SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
	};
	use windows::Win32::UI::WindowsAndMessaging::{
		DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, WM_QUIT,
	};

	use video_wallpaper::{
		app::{AppServices, WallpaperApp},
		autostart::ScriptedAutostart,
		cli::{Cli, Launch, Maintenance},
		data_loaders::{config::AppConfig, settings::YamlSettingsStore},
		error, info, logging,
		plugins::builtin::builtin_factories,
		utility::{app_data_dir, config_path, log_file_path, settings_path},
		warn,
		win32::{
			control::{self, ControlWindow},
			dialog::MessageBoxNotifier,
			process::CurrentProcessSampler,
			registry::{CmdScriptRunner, HkcuRunKey},
			shell::Win32Desktop,
			webview::WebViewEngine,
		},
		DEBUG_NAME,
	};

	const TICK: Duration = Duration::from_millis(16);

	fn enable_per_monitor_dpi_awareness() {
		unsafe {
			if SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2).is_err() {
				warn!(
					"[{}] Failed to set process DPI awareness to PerMonitorV2; screen size may be scaled",
					DEBUG_NAME
				);
			}
		}
	}

	fn build_app(config: AppConfig) -> anyhow::Result<WallpaperApp> {
		let windows = Win32Desktop::new()
			.map_err(anyhow::Error::msg)
			.context("registering surface window classes")?;

		let autostart = ScriptedAutostart::new(
			HkcuRunKey,
			CmdScriptRunner,
			app_data_dir().join("scripts"),
			config.cleanup.timeout(),
			config.cleanup.poll_interval(),
		);

		let services = AppServices {
			windows: Box::new(windows),
			engine: Box::new(WebViewEngine::new(app_data_dir().join("player"))),
			settings: Arc::new(YamlSettingsStore::open(&settings_path())),
			notifier: Arc::new(MessageBoxNotifier),
			autostart: Box::new(autostart),
			factories: builtin_factories(),
		};

		Ok(WallpaperApp::new(config, services))
	}

	fn run_maintenance(app: &WallpaperApp, task: Maintenance) {
		let result = match &task {
			Maintenance::SetAutostart(target) => app.set_autostart(target),
			Maintenance::UnsetAutostart => app.unset_autostart(),
			Maintenance::CreateLauncher(script) => app.create_launch_script(script).map(|_| ()),
			Maintenance::Quit => return,
		};
		if let Err(e) = result {
			warn!("[{}] {:?} failed: {}", DEBUG_NAME, task, e);
		}
	}

	fn quit_running_instance() {
		match control::request_quit() {
			Ok(true) => info!("[{}] Asked the running instance to close", DEBUG_NAME),
			Ok(false) => info!("[{}] No running instance to close", DEBUG_NAME),
			Err(e) => warn!("[{}] Could not reach the running instance: {}", DEBUG_NAME, e),
		}
	}

	pub fn run() -> anyhow::Result<()> {
		let cli = Cli::parse();

		let config_path = config_path();
		AppConfig::scaffold(&config_path);
		let config = AppConfig::load_or_default(&config_path);

		logging::init(config.debug, &config.log_level, &log_file_path())
			.with_context(|| format!("opening log file {}", log_file_path().display()))?;
		std::panic::set_hook(Box::new(|panic_info| {
			error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
		}));

		info!("!---------- [{}] Starting Video Wallpaper ----------!", DEBUG_NAME);
		info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());

		if cli.maintenance() == Some(Maintenance::Quit) {
			quit_running_instance();
			return Ok(());
		}

		enable_per_monitor_dpi_awareness();

		let mut app = build_app(config)?;

		if let Some(task) = cli.maintenance() {
			run_maintenance(&app, task);
			app.shutdown();
			return Ok(());
		}

		let control = ControlWindow::create()
			.map_err(anyhow::Error::msg)
			.context("creating control window")?;

		let started = match cli.launch() {
			Launch::Idle => {
				info!("[{}] No video requested; waiting for --quit or logoff", DEBUG_NAME);
				Ok(())
			}
			Launch::Video { path, looping } => app.start_wallpaper(&path, looping),
			Launch::FromSettings => app.start_from_settings(),
		};

		// The app has already shown the failure to the user.
		if let Err(e) = started {
			warn!("[{}] Wallpaper did not start: {}", DEBUG_NAME, e);
		}

		app.start_monitor(Box::new(CurrentProcessSampler));

		loop {
			unsafe {
				let mut msg = MSG::default();
				while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
					if msg.message == WM_QUIT {
						info!("[{}] WM_QUIT received; shutting down", DEBUG_NAME);
						app.shutdown();
						drop(control);
						return Ok(());
					}
					let _ = TranslateMessage(&msg);
					DispatchMessageW(&msg);
				}
			}

			app.drain_monitor();
			thread::sleep(TICK);
		}
	}
}
