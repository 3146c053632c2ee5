use std::{
    env,
    path::{Path, PathBuf},
};

use crate::APP_DIR_NAME;

#[cfg(windows)]
pub fn to_wstring(s: &str) -> Vec<u16> {
    use std::{ffi::OsStr, os::windows::ffi::OsStrExt};

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Directory holding the executable, skipping a trailing `bin/`.
pub fn app_root_dir() -> Option<PathBuf> {
    let exe_path = env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    if exe_dir.file_name().and_then(|n| n.to_str()) == Some("bin") {
        return exe_dir.parent().map(Path::to_path_buf);
    }

    Some(exe_dir.to_path_buf())
}

/// `%APPDATA%\VideoWallpaper`, or the app root when APPDATA is unset.
pub fn app_data_dir() -> PathBuf {
    if let Ok(appdata) = env::var("APPDATA") {
        return PathBuf::from(appdata).join(APP_DIR_NAME);
    }

    app_root_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_plugin_dir() -> PathBuf {
    app_root_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plugins")
}

pub fn config_path() -> PathBuf {
    app_data_dir().join("config.yaml")
}

pub fn settings_path() -> PathBuf {
    app_data_dir().join("settings.yaml")
}

pub fn log_file_path() -> PathBuf {
    app_data_dir().join("video-wallpaper.log")
}

pub fn path_to_file_url(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    format!("file:///{trimmed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_urls_use_forward_slashes() {
        assert_eq!(
            path_to_file_url(Path::new(r"C:\Videos\sea side.mp4")),
            "file:///C:/Videos/sea side.mp4"
        );
        assert_eq!(path_to_file_url(Path::new("/tmp/a.mp4")), "file:///tmp/a.mp4");
    }
}
