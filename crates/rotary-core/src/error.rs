//! Error types for rotary

use std::path::PathBuf;

/// rotary error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid log folder {path}: {reason}")]
    InvalidLogFolder { path: PathBuf, reason: String },

    #[error("The provided and default log folders are not writable: {0}")]
    NoWritableFolder(PathBuf),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Failed to write log file {path}: {source}")]
    FlushFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for rotary
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_folder<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::InvalidLogFolder {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_folder("/tmp/x", "Path too long");
        assert_eq!(err.to_string(), "Invalid log folder /tmp/x: Path too long");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
