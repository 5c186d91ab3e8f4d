use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;
use crate::app::error::AppError;

pub const APP_DIR_NAME: &str = "QuestAdbTool";

pub fn init_logging(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("logs")
}

pub fn resolve_log_dir(settings: &LoggingSettings) -> PathBuf {
    if settings.log_dir.trim().is_empty() {
        default_log_dir()
    } else {
        PathBuf::from(settings.log_dir.trim())
    }
}

/// Opens the session log per config; a file that cannot be opened degrades to
/// an in-memory log.
pub fn open_session_log(settings: &LoggingSettings) -> SessionLog {
    if !settings.log_to_file {
        return SessionLog::in_memory();
    }
    let dir = resolve_log_dir(settings);
    match SessionLog::open_in_dir(&dir) {
        Ok(log) => log,
        Err(err) => {
            warn!(error = %err.error, dir = %dir.display(), "session log file unavailable");
            SessionLog::in_memory()
        }
    }
}

pub fn format_log_line(timestamp: DateTime<Local>, text: &str) -> String {
    format!("[{}] {}", timestamp.format("%H:%M:%S"), text)
}

struct LogInner {
    lines: Vec<String>,
    file: Option<File>,
}

/// Append-only session log: an in-memory view plus an optional UTF-8 file
/// opened once for the lifetime of the session.
pub struct SessionLog {
    inner: Mutex<LogInner>,
    path: Option<PathBuf>,
}

impl SessionLog {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                lines: Vec::new(),
                file: None,
            }),
            path: None,
        }
    }

    pub fn open_in_dir(dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(dir)
            .map_err(|err| AppError::system(format!("Failed to create log dir: {err}"), ""))?;
        let started = Local::now();
        let path = dir.join(format!("log_{}.txt", started.format("%Y%m%d_%H%M%S")));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AppError::system(format!("Failed to open log file: {err}"), ""))?;

        let app_base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.display().to_string()))
            .unwrap_or_default();
        let header = format!(
            "=== {APP_DIR_NAME} Log ===\nTime: {}\nOS: {} {}\nAppBase: {app_base}\n========================\n\n",
            started.format("%Y-%m-%d %H:%M:%S"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        );
        if let Err(err) = file.write_all(header.as_bytes()) {
            warn!(error = %err, "failed to write log header");
        }

        let log = Self {
            inner: Mutex::new(LogInner {
                lines: Vec::new(),
                file: Some(file),
            }),
            path: Some(path.clone()),
        };
        log.append(&format!("[Log] Log file: {}", path.display()));
        Ok(log)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, text: &str) {
        let line = format_log_line(Local::now(), text);
        debug!(target: "session_log", "{line}");
        let mut inner = self.lock();
        if let Some(file) = inner.file.as_mut() {
            if let Err(err) = writeln!(file, "{line}") {
                warn!(error = %err, "failed to append to log file");
            }
        }
        inner.lines.push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    pub fn text(&self) -> String {
        let inner = self.lock();
        let mut text = inner.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Clears the in-memory view only; the file keeps its history.
    pub fn clear(&self) {
        self.lock().lines.clear();
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
