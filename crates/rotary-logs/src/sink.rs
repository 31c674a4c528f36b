//! Buffered log sink with size based rotation
//!
//! Writers only ever hold the state lock long enough to append to the
//! pending buffer. A flush detaches the buffer under the lock, performs the
//! file I/O without it, then re-takes it to account for the bytes and decide
//! on rotation. Flushes themselves are serialized by a separate gate so
//! batches reach the file in the order they were detached.

use chrono::Utc;
use parking_lot::Mutex;
use rotary_core::constants::MODULE_NAME;
use rotary_core::{Encoding, Error, Prefix, Result, StreamKind, WriteMode};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::rotation::{self, RotationConfig};

/// I/O outcome tagged with the path it concerned
type PathResult<T> = std::result::Result<T, (PathBuf, io::Error)>;

/// Base file name of a generated path and the `_N` attempt it used
type Issued = (String, u32);

/// A log file opened by a sink
#[derive(Debug)]
pub struct LogFileHandle {
    path: PathBuf,
    file: Option<Arc<File>>,
    written_bytes: u64,
}

impl LogFileHandle {
    /// Open `path`, creating parent folders as needed
    pub fn open(path: PathBuf, mode: WriteMode) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        let file = options.open(&path)?;

        Self::from_file(path, file)
    }

    /// Wrap a file the caller already opened; its current size counts as written
    pub fn from_file(path: PathBuf, file: File) -> io::Result<Self> {
        let written_bytes = file.metadata()?.len();
        Ok(Self {
            path,
            file: Some(Arc::new(file)),
            written_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn write_all(&self, bytes: &[u8]) -> PathResult<()> {
        match &self.file {
            Some(file) => write_batch(file, bytes),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file is closed")),
        }
        .map_err(|e| (self.path.clone(), e))
    }

    fn close(&mut self) {
        self.file = None;
    }
}

/// Where a sink writes
#[derive(Debug)]
pub enum FileTarget {
    /// A root folder for dated files, or a concrete `*.log` file
    Path(PathBuf),
    /// A file that is already open
    Existing(LogFileHandle),
}

impl From<PathBuf> for FileTarget {
    fn from(path: PathBuf) -> Self {
        FileTarget::Path(path)
    }
}

impl From<&Path> for FileTarget {
    fn from(path: &Path) -> Self {
        FileTarget::Path(path.to_path_buf())
    }
}

/// Sink settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub encoding: Encoding,
    /// Applies to the first file only
    pub mode: WriteMode,
    pub rotation: RotationConfig,
    /// Subfolder tag, set for split mode
    pub stream_tag: Option<StreamKind>,
    pub prefix: Option<Prefix>,
    pub log_to_file: bool,
    /// Reopen a concrete target file on rotation instead of generating a new name
    pub keep_file_name: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            mode: WriteMode::default(),
            rotation: RotationConfig::default(),
            stream_tag: None,
            prefix: None,
            log_to_file: true,
            keep_file_name: false,
        }
    }
}

struct SinkState {
    config: SinkConfig,
    root: PathBuf,
    fixed_path: Option<PathBuf>,
    handle: Option<LogFileHandle>,
    buffer: Vec<String>,
    pending_bytes: u64,
    opened_any: bool,
    /// Last generated name, so a same-second rotation never reuses it
    last_issued: Option<Issued>,
}

impl SinkState {
    fn apply_target(&mut self, target: FileTarget) {
        self.handle = None;
        match target {
            FileTarget::Path(path) if rotation::is_log_file(&path) => {
                self.root = parent_or_self(&path);
                self.fixed_path = Some(path);
            }
            FileTarget::Path(path) => {
                self.root = path;
                self.fixed_path = None;
            }
            FileTarget::Existing(handle) => {
                self.root = parent_or_self(handle.path());
                self.fixed_path = Some(handle.path().to_path_buf());
                self.opened_any = true;
                self.handle = Some(handle);
            }
        }
    }

    fn live_file(&self) -> Option<(PathBuf, Arc<File>)> {
        let handle = self.handle.as_ref()?;
        let file = handle.file.clone()?;
        Some((handle.path.clone(), file))
    }

    fn open_request(&self) -> OpenRequest {
        OpenRequest {
            root: self.root.clone(),
            fixed: self
                .fixed_path
                .clone()
                .filter(|_| self.config.keep_file_name),
            tag: self.config.stream_tag,
            mode: if self.opened_any {
                WriteMode::Append
            } else {
                self.config.mode
            },
            fresh: self.opened_any,
            issued: self.last_issued.clone(),
        }
    }
}

fn parent_or_self(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

/// Everything needed to open a file without holding the state lock
#[derive(Debug, Clone)]
struct OpenRequest {
    root: PathBuf,
    fixed: Option<PathBuf>,
    tag: Option<StreamKind>,
    mode: WriteMode,
    /// Never land on a path that already exists
    fresh: bool,
    issued: Option<Issued>,
}

impl OpenRequest {
    fn retry(&self) -> Self {
        Self {
            mode: WriteMode::Append,
            fresh: true,
            ..self.clone()
        }
    }

    fn resolve_path(&self) -> (PathBuf, Option<Issued>) {
        if let Some(fixed) = &self.fixed {
            return (fixed.clone(), None);
        }

        let now = Utc::now();
        let dir = rotation::dated_dir(&self.root, now, self.tag);
        let base = rotation::file_name(now, 0);
        let mut attempt = match &self.issued {
            Some((last, used)) if *last == base => used + 1,
            _ => 0,
        };
        loop {
            let candidate = dir.join(rotation::file_name(now, attempt));
            if !self.fresh || !candidate.exists() {
                return (candidate, Some((base, attempt)));
            }
            attempt += 1;
        }
    }

    fn open(&self) -> PathResult<(LogFileHandle, Option<Issued>)> {
        let (path, issued) = self.resolve_path();
        debug!("Opening log file: {}", path.display());
        LogFileHandle::open(path.clone(), self.mode)
            .map(|handle| (handle, issued))
            .map_err(|e| (path, e))
    }
}

fn write_batch(mut file: &File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()
}

/// Buffered, size rotating log file writer
pub struct RotatingSink {
    state: Mutex<SinkState>,
    flush_gate: Mutex<()>,
}

impl RotatingSink {
    /// Create a sink with default settings
    pub fn new(target: impl Into<FileTarget>) -> Self {
        Self::with_config(target, SinkConfig::default())
    }

    pub fn with_config(target: impl Into<FileTarget>, config: SinkConfig) -> Self {
        let mut state = SinkState {
            config,
            root: PathBuf::new(),
            fixed_path: None,
            handle: None,
            buffer: Vec::new(),
            pending_bytes: 0,
            opened_any: false,
            last_issued: None,
        };
        state.apply_target(target.into());

        Self {
            state: Mutex::new(state),
            flush_gate: Mutex::new(()),
        }
    }

    /// Buffer `text`, flushing once the threshold is reached.
    ///
    /// Never fails: a failed flush is logged and the text stays buffered.
    pub fn write(&self, text: &str) {
        let should_flush = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.config.log_to_file || text.is_empty() {
                return;
            }
            state.pending_bytes += state.config.encoding.encoded_len(text) as u64;
            state.buffer.push(text.to_owned());
            state.pending_bytes >= state.config.rotation.flush_size_bytes
        };

        if should_flush {
            if let Err(e) = self.flush() {
                warn!("{} Failed to flush log buffer: {}", MODULE_NAME, e);
            }
        }
    }

    /// Persist everything buffered so far
    pub fn flush(&self) -> Result<()> {
        let _gate = self.flush_gate.lock();

        let (batch, bytes, live, request) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.buffer.is_empty() {
                return Ok(());
            }
            let batch = std::mem::take(&mut state.buffer);
            state.pending_bytes = 0;

            let mut bytes = Vec::new();
            for fragment in &batch {
                state.config.encoding.encode_into(fragment, &mut bytes);
            }
            (batch, bytes, state.live_file(), state.open_request())
        };

        match Self::persist(&bytes, live, &request) {
            Ok(opened) => {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                if let Some((handle, issued)) = opened {
                    state.opened_any = true;
                    if issued.is_some() {
                        state.last_issued = issued;
                    }
                    state.handle = Some(handle);
                }
                if let Some(handle) = state.handle.as_mut() {
                    handle.written_bytes += bytes.len() as u64;
                    if handle.written_bytes > state.config.rotation.max_size_bytes {
                        debug!(
                            "Rotating log file: {} ({} bytes)",
                            handle.path.display(),
                            handle.written_bytes
                        );
                        handle.close();
                    }
                }
                Ok(())
            }
            Err((path, source)) => {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                let mut restored = batch;
                restored.append(&mut state.buffer);
                state.pending_bytes = restored
                    .iter()
                    .map(|f| state.config.encoding.encoded_len(f) as u64)
                    .sum();
                state.buffer = restored;
                Err(Error::FlushFailed { path, source })
            }
        }
    }

    /// Write `bytes` to the live file (or a newly opened one), retrying once on a fresh file.
    /// Returns the handle to install when a file had to be opened.
    fn persist(
        bytes: &[u8],
        live: Option<(PathBuf, Arc<File>)>,
        request: &OpenRequest,
    ) -> PathResult<Option<(LogFileHandle, Option<Issued>)>> {
        let first = match live {
            Some((path, file)) => write_batch(&file, bytes)
                .map(|_| None)
                .map_err(|e| (path, e)),
            None => request
                .open()
                .and_then(|opened| opened.0.write_all(bytes).map(|_| Some(opened))),
        };

        first.or_else(|(path, e)| -> PathResult<Option<(LogFileHandle, Option<Issued>)>> {
            warn!(
                "{} Log write to {} failed ({}), retrying on a fresh file",
                MODULE_NAME,
                path.display(),
                e
            );
            let opened = request.retry().open()?;
            opened.0.write_all(bytes)?;
            Ok(Some(opened))
        })
    }

    /// Prefix for text coming from `kind`, empty when file logging is off
    pub fn line_prefix(&self, kind: StreamKind) -> &'static str {
        let state = self.state.lock();
        if !state.config.log_to_file {
            return "";
        }
        state.config.prefix.map_or("", |prefix| prefix.tag_for(kind))
    }

    /// Point the sink somewhere else, closing the current file
    pub fn set_target(&self, target: impl Into<FileTarget>) {
        let _gate = self.flush_gate.lock();
        self.state.lock().apply_target(target.into());
    }

    pub fn set_encoding(&self, encoding: Encoding) {
        self.state.lock().config.encoding = encoding;
    }

    pub fn set_mode(&self, mode: WriteMode) {
        self.state.lock().config.mode = mode;
    }

    pub fn set_max_size(&self, max_size_bytes: i64) {
        self.state.lock().config.rotation.max_size_bytes = rotation::max_size(max_size_bytes);
    }

    pub fn set_flush_size(&self, flush_size_bytes: i64) {
        self.state.lock().config.rotation.flush_size_bytes = rotation::flush_size(flush_size_bytes);
    }

    pub fn set_stream_tag(&self, tag: Option<StreamKind>) {
        self.state.lock().config.stream_tag = tag;
    }

    pub fn set_prefix(&self, prefix: Option<Prefix>) {
        self.state.lock().config.prefix = prefix;
    }

    pub fn set_log_to_file(&self, enabled: bool) {
        self.state.lock().config.log_to_file = enabled;
    }

    pub fn set_keep_file_name(&self, keep: bool) {
        self.state.lock().config.keep_file_name = keep;
    }

    /// Snapshot of the current settings
    pub fn config(&self) -> SinkConfig {
        self.state.lock().config.clone()
    }

    pub fn log_to_file(&self) -> bool {
        self.state.lock().config.log_to_file
    }

    /// Path of the most recently opened file
    pub fn current_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .handle
            .as_ref()
            .map(|h| h.path.clone())
    }

    /// Bytes accounted to the current file
    pub fn written_bytes(&self) -> u64 {
        self.state.lock().handle.as_ref().map_or(0, |h| h.written_bytes)
    }

    /// Encoded bytes waiting for the next flush
    pub fn pending_bytes(&self) -> u64 {
        self.state.lock().pending_bytes
    }
}

impl Drop for RotatingSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            debug!("Dropping log sink with unflushed data: {}", e);
        }
        self.state.lock().handle = None;
    }
}
