use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        mpsc::{self, Sender},
        OnceLock,
    },
    thread,
};

/* =========================
   GLOBAL STATE
   ========================= */

static DEBUG: AtomicBool = AtomicBool::new(false);
static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_TX: OnceLock<Sender<String>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" | "all" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

/* =========================
   PUBLIC API
   ========================= */

/// Starts the writer thread. Later calls only update the filter.
pub fn init(debug: bool, level: &str, path: &Path) -> io::Result<()> {
    set_filter(debug, level);

    if LOG_TX.get().is_some() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = LOG_PATH.set(path.to_path_buf());

    let (tx, rx) = mpsc::channel::<String>();
    if LOG_TX.set(tx).is_err() {
        return Ok(());
    }

    thread::Builder::new()
        .name("log-writer".to_string())
        .spawn(move || {
            while let Ok(line) = rx.recv() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        })?;

    Ok(())
}

pub fn set_filter(debug: bool, level: &str) {
    DEBUG.store(debug, Ordering::Relaxed);
    let level = LogLevel::parse(level).unwrap_or(LogLevel::Warn);
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn log_path() -> Option<&'static Path> {
    LOG_PATH.get().map(PathBuf::as_path)
}

#[inline]
pub fn should_log(level: LogLevel) -> bool {
    if level <= LogLevel::Warn {
        return true;
    }
    DEBUG.load(Ordering::Relaxed) && (level as u8) <= THRESHOLD.load(Ordering::Relaxed).max(LogLevel::Info as u8)
}

/* =========================
   INTERNAL
   ========================= */

#[inline]
pub fn enqueue(level: LogLevel, msg: String) {
    if let Some(tx) = LOG_TX.get() {
        let ts = timestamp();
        let _ = tx.send(format!("{ts} [{}] {msg}", level.as_str()));
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::LogLevel::Debug) {
            $crate::logging::enqueue($crate::logging::LogLevel::Debug, format!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::LogLevel::Info) {
            $crate::logging::enqueue($crate::logging::LogLevel::Info, format!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue($crate::logging::LogLevel::Warn, format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue($crate::logging::LogLevel::Error, format!($($arg)*));
    }};
}
