//! Structured, best-effort logging.
//!
//! Entries are serialized as one JSON object per line into a small rotated
//! file inside the directory installed with [`init`]. Raw extractor output
//! goes to a separate rotated file. Without an installed directory entries
//! fall back to stderr, limited to warnings and errors unless
//! `GRABX_LOG_LEVEL` asks for more. Logging never fails the caller.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Maximum size of a log file before rotation (in bytes).
const MAX_LOG_BYTES: u64 = 1_000_000; // ~1 MB

const TOOL_LOG_FILE_NAME: &str = "grabx-yt-dlp.log";

const ENGINE_LOG_FILE_NAME: &str = "grabx-engine.log";

/// Environment variable to control log level filtering
pub const LOG_LEVEL_ENV_VAR: &str = "GRABX_LOG_LEVEL";

/// Default log level when not specified
const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Default level for the stderr fallback when no log directory is installed.
const DEFAULT_STDERR_LOG_LEVEL: LogLevel = LogLevel::Warn;

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Process,
    Probe,
    Scheduler,
    Playlist,
    Download,
    Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogEntry {
    timestamp: u128,
    level: LogLevel,
    category: ErrorCategory,
    message: String,
    context: Option<serde_json::Value>,
    error_details: Option<String>,
}

impl LogLevel {
    /// Numeric value for comparison (higher = more verbose)
    pub fn level_value(&self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warn => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
        }
    }

    /// Check if this level should be logged given the minimum level
    pub fn should_log(&self, min_level: &LogLevel) -> bool {
        self.level_value() <= min_level.level_value()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        DEFAULT_LOG_LEVEL
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl StructuredLogEntry {
    /// Returns the current timestamp in milliseconds since Unix epoch
    fn current_timestamp() -> u128 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
    }

    fn new(
        level: LogLevel,
        category: ErrorCategory,
        message: &str,
        context: Option<serde_json::Value>,
        error_details: Option<&str>,
    ) -> Self {
        Self {
            timestamp: Self::current_timestamp(),
            level,
            category,
            message: message.to_string(),
            context,
            error_details: error_details.map(|s| s.to_string()),
        }
    }

    pub fn error(
        category: ErrorCategory,
        message: &str,
        context: Option<serde_json::Value>,
        error_details: Option<&str>,
    ) -> Self {
        Self::new(LogLevel::Error, category, message, context, error_details)
    }

    pub fn warn(category: ErrorCategory, message: &str, context: Option<serde_json::Value>) -> Self {
        Self::new(LogLevel::Warn, category, message, context, None)
    }

    pub fn info(category: ErrorCategory, message: &str, context: Option<serde_json::Value>) -> Self {
        Self::new(LogLevel::Info, category, message, context, None)
    }

    pub fn debug(category: ErrorCategory, message: &str, context: Option<serde_json::Value>) -> Self {
        Self::new(LogLevel::Debug, category, message, context, None)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Install the log directory. Only the first call wins; returns false if a
/// directory was already installed.
pub fn init(dir: impl Into<PathBuf>) -> bool {
    LOG_DIR.set(dir.into()).is_ok()
}

fn resolve_tool_log_path() -> Option<PathBuf> {
    LOG_DIR.get().map(|dir| dir.join(TOOL_LOG_FILE_NAME))
}

fn resolve_engine_log_path() -> Option<PathBuf> {
    LOG_DIR.get().map(|dir| dir.join(ENGINE_LOG_FILE_NAME))
}

fn env_log_level() -> Option<LogLevel> {
    static LOG_LEVEL: OnceLock<Option<LogLevel>> = OnceLock::new();

    *LOG_LEVEL.get_or_init(|| std::env::var(LOG_LEVEL_ENV_VAR).ok().and_then(|s| s.parse().ok()))
}

/// Get the current log level from environment variable or default
pub fn current_log_level() -> LogLevel {
    env_log_level().unwrap_or(DEFAULT_LOG_LEVEL)
}

/// Level applied when entries go to stderr instead of a log file.
fn stderr_log_level(explicit: Option<LogLevel>) -> LogLevel {
    explicit.unwrap_or(DEFAULT_STDERR_LOG_LEVEL)
}

fn rotate_if_needed(path: &Path) -> io::Result<()> {
    if let Ok(meta) = fs::metadata(path)
        && meta.len() >= MAX_LOG_BYTES
    {
        // Single-file rotation: grabx-engine.log -> grabx-engine.log.1
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ENGINE_LOG_FILE_NAME.to_string());

        let rotated_path = path.with_file_name(format!("{}.1", file_name));

        let _ = fs::remove_file(&rotated_path);

        fs::rename(path, rotated_path)?;
    }

    Ok(())
}

fn open_for_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    rotate_if_needed(path)?;

    if path.exists() {
        OpenOptions::new().append(true).open(path)
    } else {
        File::create(path)
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = open_for_append(path)?;
    writeln!(file, "[{}] {}", StructuredLogEntry::current_timestamp(), line)
}

/// Append a line without timestamp prefix (for structured JSON entries)
fn append_line_raw(path: &Path, line: &str) -> io::Result<()> {
    let mut file = open_for_append(path)?;
    writeln!(file, "{}", line)
}

/// Append a single line of raw extractor output to the rotated tool log.
///
/// `item_key` identifies the probe or download the line belongs to.
pub fn append_tool_log(item_key: &str, line: &str) {
    let decorated_line = format!("[{}] {}", item_key, line);

    let Some(path) = resolve_tool_log_path() else {
        if stderr_log_level(env_log_level()) == LogLevel::Debug {
            eprintln!("[yt-dlp]{}", decorated_line);
        }
        return;
    };

    if let Err(e) = append_line(&path, &decorated_line) {
        eprintln!("Failed to write yt-dlp log entry to {}: {}", path.display(), e);
    }
}

/// Log a structured entry with level filtering
pub fn log_entry(entry: StructuredLogEntry) {
    if !entry.level.should_log(&current_log_level()) {
        return;
    }

    let Some(path) = resolve_engine_log_path() else {
        if !entry.level.should_log(&stderr_log_level(env_log_level())) {
            return;
        }
        match entry.to_json() {
            Ok(json_string) => eprintln!("[LOG] {}", json_string),
            Err(_) => eprintln!("[{}] {:?}", entry.level, entry),
        }
        return;
    };

    match entry.to_json() {
        Ok(json_line) => {
            if let Err(e) = append_line_raw(&path, &json_line) {
                eprintln!("Failed to write log entry to {}: {}", path.display(), e);
            }
        }
        Err(e) => {
            eprintln!("Failed to serialize log entry: {}", e);
        }
    }
}

/// Log errors with minimal boilerplate.
pub fn log_error_simple(category: ErrorCategory, message: &str, error_details: Option<&str>) {
    log_entry(StructuredLogEntry::error(category, message, None, error_details));
}

/// Log errors with context.
pub fn log_error_with_context(
    category: ErrorCategory,
    message: &str,
    context: serde_json::Value,
    error_details: Option<&str>,
) {
    log_entry(StructuredLogEntry::error(category, message, Some(context), error_details));
}

pub fn log_warning_simple(category: ErrorCategory, message: &str) {
    log_entry(StructuredLogEntry::warn(category, message, None));
}

pub fn log_warning_with_context(category: ErrorCategory, message: &str, context: serde_json::Value) {
    log_entry(StructuredLogEntry::warn(category, message, Some(context)));
}

pub fn log_info_simple(category: ErrorCategory, message: &str) {
    log_entry(StructuredLogEntry::info(category, message, None));
}

pub fn log_debug_simple(category: ErrorCategory, message: &str) {
    log_entry(StructuredLogEntry::debug(category, message, None));
}

pub fn log_debug_with_context(category: ErrorCategory, message: &str, context: serde_json::Value) {
    log_entry(StructuredLogEntry::debug(category, message, Some(context)));
}
