//! Constants and default values for rotary

use std::path::PathBuf;

/// Tag used at the start of every diagnostic rotary writes itself
pub const MODULE_NAME: &str = "[rotary]";

/// Process exit status on success
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit status on failure (CLI errors and the "exit" broken-pipe policies)
pub const EXIT_FAILURE: i32 = 1;

pub const KB: u64 = 1024;
pub const MB: u64 = KB * 1024;
pub const GB: u64 = MB * 1024;

/// Default rotary home directory name
pub const ROTARY_DIR: &str = ".rotary";

/// Name every log folder must end with
pub const LOGS_DIR: &str = "logs";

/// Marker file created and removed to prove a folder is writable
pub const WRITE_PROBE_FILE: &str = ".rotary_write_test";

/// Longest accepted log folder path, in bytes
pub const MAX_FOLDER_PATH_LEN: usize = 255;

/// Default maximum log file size in bytes (2GB)
pub const DEFAULT_LOG_MAX_SIZE: u64 = 2 * GB;

/// Default number of buffered bytes that triggers a flush (8KB)
pub const DEFAULT_FLUSH_SIZE: u64 = 8 * KB;

/// strftime pattern for log file names, without extension
pub const FILE_DATE_FORMAT: &str = "%Y_%m_%dT%Hh%Mm%Ss";

/// Log file extension
pub const LOG_EXTENSION: &str = "log";

/// Environment variable enabling file logging
pub const ENV_LOG_TO_FILE: &str = "LOG_TO_FILE";

/// Environment variable naming the log folder
pub const ENV_LOG_FOLDER: &str = "LOG_FOLDER_NAME";

/// Environment variable overriding the maximum file size, in megabytes
pub const ENV_LOG_MAX_SIZE: &str = "LOG_MAX_SIZE";

/// Get the rotary home directory
pub fn rotary_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(ROTARY_DIR))
        .unwrap_or_else(|| PathBuf::from(ROTARY_DIR))
}

/// Get the default log folder
pub fn default_log_folder() -> PathBuf {
    rotary_home().join(LOGS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_folder() {
        let path = default_log_folder();
        assert!(path.ends_with(".rotary/logs"));
    }

    #[test]
    fn test_size_units() {
        assert_eq!(MB, 1_048_576);
        assert_eq!(DEFAULT_FLUSH_SIZE, 8192);
    }
}
