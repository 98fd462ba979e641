use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::get_create_kinhsach_dir;

const KEEP_LOG_FILES: usize = 5;

/// Log levels in order of increasing verbosity. Setting a level enables it
/// and every level below it, e.g. `Warn` logs warnings and errors.
///
/// Read from the `LOG_LEVEL` environment variable, default `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Silent = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Level {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "silent" => Some(Level::Silent),
            "error" => Some(Level::Error),
            "warn" => Some(Level::Warn),
            "info" => Some(Level::Info),
            "debug" => Some(Level::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Silent => "Silent",
            Level::Error => "Error",
            Level::Warn => "Warn",
            Level::Info => "Info",
            Level::Debug => "Debug",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Level::Silent => "",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Renames an existing log.txt to log.<modified time>.txt and removes all
/// but the newest rotated files.
fn rotate_log_files(log_file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !log_file.try_exists().unwrap_or(false) {
        return Ok(());
    }

    let modified = std::fs::metadata(log_file)?.modified()?;
    let datetime: DateTime<Local> = modified.into();

    let parent = log_file.parent().ok_or("No parent directory")?;
    let new_path = parent.join(format!("log.{}.txt", datetime.format("%Y-%m-%dT%H-%M-%S")));
    std::fs::rename(log_file, &new_path)?;

    let mut rotated: Vec<PathBuf> = std::fs::read_dir(parent)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("log.") && n.ends_with(".txt") && n != "log.txt")
        })
        .collect();

    // Timestamped names sort by date
    rotated.sort();

    if rotated.len() > KEEP_LOG_FILES {
        for file in &rotated[0..rotated.len() - KEEP_LOG_FILES] {
            if let Err(e) = std::fs::remove_file(file) {
                eprintln!("Failed to remove old log file {:?}: {}", file, e);
            }
        }
    }

    Ok(())
}

pub struct Logger {
    log_file: PathBuf,
    disable_log: bool,
    enable_print_log: bool,
    level: Mutex<Level>,
}

impl Logger {
    /// Logger writing to log.txt in the kinhsach data directory.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = get_create_kinhsach_dir()
            .map_err(|e| format!("Failed to get kinhsach_dir: {}", e))?;
        Logger::in_dir(&data_dir)
    }

    pub fn in_dir(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)?;
        let log_file = dir.join("log.txt");

        if let Err(e) = rotate_log_files(&log_file) {
            eprintln!("Failed to rotate log files: {}", e);
        }

        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Level::from_str(&v))
            .unwrap_or(Level::Info);

        Ok(Logger {
            log_file,
            disable_log: env_flag("DISABLE_LOG"),
            enable_print_log: env_flag("ENABLE_PRINT_LOG"),
            level: Mutex::new(level),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;

        Ok(())
    }

    fn write_to_file(&self, message: &str) -> Result<(), Box<dyn std::error::Error>> {
        if self.disable_log {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ");
        file.write_all(format!("[{}] {}\n", timestamp, message).as_bytes())?;

        Ok(())
    }

    pub fn log(&self, level: Level, msg: &str) {
        if level == Level::Silent || *self.level.lock() < level {
            return;
        }

        if self.enable_print_log {
            match level {
                Level::Error => tracing::error!("{}", msg),
                Level::Warn => tracing::warn!("{}", msg),
                Level::Info => tracing::info!("{}", msg),
                _ => tracing::debug!("{}", msg),
            }
        }

        if let Err(e) = self.write_to_file(&format!("{}: {}", level.prefix(), msg)) {
            eprintln!("Failed to write to log file: {}", e);
        }
    }

    pub fn get_level(&self) -> Level {
        *self.level.lock()
    }

    pub fn set_level(&self, new_level: Level) {
        *self.level.lock() = new_level;
    }
}

pub static LOGGER: OnceLock<Logger> = OnceLock::new();
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Set up tracing and the global logger in the given directory. Only the
/// first call has an effect; later calls and the free functions below reuse
/// the same logger.
pub fn init_in_dir(dir: &Path) {
    init_tracing_once();
    LOGGER.get_or_init(|| Logger::in_dir(dir).unwrap_or_else(|e| {
        eprintln!("Failed to create logger: {}", e);
        disabled_logger()
    }));
}

fn init_tracing_once() {
    TRACING_INITIALIZED.get_or_init(|| {
        if let Err(e) = Logger::init_tracing() {
            eprintln!("Failed to initialize tracing: {}", e);
        }
    });
}

fn disabled_logger() -> Logger {
    Logger {
        log_file: PathBuf::new(),
        disable_log: true,
        enable_print_log: false,
        level: Mutex::new(Level::Info),
    }
}

fn with_logger<F, R>(f: F) -> R
where
    F: FnOnce(&Logger) -> R,
{
    init_tracing_once();

    let logger = LOGGER.get_or_init(|| match Logger::new() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to create logger: {}", e);
            disabled_logger()
        }
    });

    f(logger)
}

pub fn info(msg: &str) {
    with_logger(|logger| logger.log(Level::Info, msg));
}

pub fn warn(msg: &str) {
    with_logger(|logger| logger.log(Level::Warn, msg));
}

pub fn error(msg: &str) {
    with_logger(|logger| logger.log(Level::Error, msg));
}

pub fn debug(msg: &str) {
    with_logger(|logger| logger.log(Level::Debug, msg));
}

pub fn get_log_level() -> Level {
    with_logger(|logger| logger.get_level())
}

pub fn set_log_level(level: Level) {
    with_logger(|logger| logger.set_level(level));
}

/// Returns false if the string is not a valid level.
pub fn set_log_level_str(level_str: &str) -> bool {
    match Level::from_str(level_str) {
        Some(level) => {
            set_log_level(level);
            true
        }
        None => false,
    }
}

/// HH:MM:SS
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
