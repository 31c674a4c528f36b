//! Log rotation configuration and file naming

use chrono::{DateTime, Datelike, Utc};
use rotary_core::constants::{
    DEFAULT_FLUSH_SIZE, DEFAULT_LOG_MAX_SIZE, FILE_DATE_FORMAT, LOG_EXTENSION, MODULE_NAME,
};
use rotary_core::StreamKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Log rotation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationConfig {
    /// A file is rotated once it holds more than this many bytes
    pub max_size_bytes: u64,
    /// Buffered bytes that trigger a flush
    pub flush_size_bytes: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_LOG_MAX_SIZE,
            flush_size_bytes: DEFAULT_FLUSH_SIZE,
        }
    }
}

impl RotationConfig {
    pub fn new(max_size_bytes: i64, flush_size_bytes: i64) -> Self {
        Self {
            max_size_bytes: max_size(max_size_bytes),
            flush_size_bytes: flush_size(flush_size_bytes),
        }
    }
}

/// Correct a requested maximum file size
pub fn max_size(requested: i64) -> u64 {
    sanitize(requested, DEFAULT_LOG_MAX_SIZE, "Max file size")
}

/// Correct a requested flush threshold
pub fn flush_size(requested: i64) -> u64 {
    sanitize(requested, DEFAULT_FLUSH_SIZE, "Flush size")
}

fn sanitize(requested: i64, default: u64, what: &str) -> u64 {
    if requested < 0 {
        warn!("{} {} cannot be negative, converting to positive", MODULE_NAME, what);
    }
    match requested.unsigned_abs() {
        0 => {
            warn!("{} {} is smaller than 1 byte, using {}", MODULE_NAME, what, default);
            default
        }
        value => value,
    }
}

/// Folder holding the files opened at `now`: `root/YYYY/MM/DD[/stream]`
pub fn dated_dir(root: &Path, now: DateTime<Utc>, tag: Option<StreamKind>) -> PathBuf {
    let mut dir = root
        .join(now.year().to_string())
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    if let Some(kind) = tag {
        dir.push(kind.folder_name());
    }
    dir
}

/// File name for the `attempt`-th candidate opened within the same second
pub fn file_name(now: DateTime<Utc>, attempt: u32) -> String {
    let stamp = now.format(FILE_DATE_FORMAT);
    if attempt == 0 {
        format!("{}.{}", stamp, LOG_EXTENSION)
    } else {
        format!("{}_{}.{}", stamp, attempt, LOG_EXTENSION)
    }
}

/// True for paths naming a concrete log file rather than a folder
pub fn is_log_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == LOG_EXTENSION)
}
