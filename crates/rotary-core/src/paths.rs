//! Log folder validation
//!
//! A user supplied folder is made absolute, forced to end in `logs`, checked
//! for length and probed for writability. Any failure falls back to the
//! default folder; only an unusable default is fatal.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::{LOGS_DIR, MAX_FOLDER_PATH_LEN, MODULE_NAME, WRITE_PROBE_FILE};
use crate::error::{Error, Result};

/// Validate `raw`, falling back to `default` when it cannot be used
pub fn verify_log_folder(raw: &Path, default: &Path) -> Result<PathBuf> {
    match check_folder(raw) {
        Ok(folder) => Ok(folder),
        Err(e) => {
            warn!(
                "{} Invalid log folder ({:?}): {}. Falling back to default.",
                MODULE_NAME, raw, e
            );
            check_folder(default).map_err(|err| {
                debug!("Default log folder rejected: {}", err);
                Error::NoWritableFolder(default.to_path_buf())
            })
        }
    }
}

/// Validate a single candidate folder without any fallback
pub fn check_folder(raw: &Path) -> Result<PathBuf> {
    let mut candidate = normalize(&absolute(raw)?);

    if candidate.file_name().map_or(true, |name| name != LOGS_DIR) {
        candidate.push(LOGS_DIR);
    }

    if candidate.as_os_str().len() > MAX_FOLDER_PATH_LEN {
        return Err(Error::invalid_folder(candidate, "Path too long"));
    }

    fs::create_dir_all(&candidate)
        .map_err(|e| Error::invalid_folder(&candidate, format!("Path not writable: {}", e)))?;
    probe_writable(&candidate)
        .map_err(|e| Error::invalid_folder(&candidate, format!("Path not writable: {}", e)))?;

    Ok(candidate)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn probe_writable(folder: &Path) -> std::io::Result<()> {
    let probe = folder.join(WRITE_PROBE_FILE);
    {
        let mut file = fs::File::create(&probe)?;
        file.write_all(b"x")?;
    }
    fs::remove_file(&probe)
}
