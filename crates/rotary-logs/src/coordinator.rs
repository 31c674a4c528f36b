//! Installs stream mirrors as the process output and manages their lifecycle

use parking_lot::Mutex;
use rotary_core::{paths, Config, Result, StreamKind};
use std::io::{self, StdinLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::mirror::StreamMirror;
use crate::rotation::RotationConfig;
use crate::shutdown::{self, HookId};
use crate::sink::{RotatingSink, SinkConfig};
use crate::stream::{Discard, InputHandle, OutputSlots, StreamHandle, TextStream};

/// Per-call overrides for [`Coordinator::start`]
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub folder: Option<PathBuf>,
    /// Maximum file size in bytes
    pub max_size: Option<i64>,
    pub merged: Option<bool>,
    pub log_to_file: Option<bool>,
    /// Also record what is read through [`Coordinator::stdin`]
    pub log_stdin: bool,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn max_size(mut self, bytes: i64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn merged(mut self, merged: bool) -> Self {
        self.merged = Some(merged);
        self
    }

    pub fn log_to_file(mut self, enabled: bool) -> Self {
        self.log_to_file = Some(enabled);
        self
    }

    pub fn log_stdin(mut self, enabled: bool) -> Self {
        self.log_stdin = enabled;
        self
    }
}

/// Lifecycle state of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    Stopped,
    Running,
    Paused,
}

impl LoggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggerState::Stopped => "stopped",
            LoggerState::Running => "running",
            LoggerState::Paused => "paused",
        }
    }
}

impl std::fmt::Display for LoggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Default, Clone)]
struct Mirrors {
    stdin: Option<Arc<StreamMirror>>,
    stdout: Option<Arc<StreamMirror>>,
    stderr: Option<Arc<StreamMirror>>,
}

impl Mirrors {
    fn get(&self, kind: StreamKind) -> Option<&Arc<StreamMirror>> {
        match kind {
            StreamKind::In => self.stdin.as_ref(),
            StreamKind::Out => self.stdout.as_ref(),
            StreamKind::Err => self.stderr.as_ref(),
            StreamKind::Unknown => None,
        }
    }

    fn all(&self) -> Vec<Arc<StreamMirror>> {
        [&self.stdin, &self.stdout, &self.stderr]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }
}

/// One start..stop cycle
struct Activation {
    folder: PathBuf,
    mirrors: Mirrors,
    original_out: Arc<dyn TextStream>,
    original_err: Arc<dyn TextStream>,
    hooks: Vec<HookId>,
}

#[derive(Default)]
struct CoordinatorState {
    active: Option<Activation>,
    paused: bool,
}

/// Swaps mirrors in and out of the output slots
pub struct Coordinator {
    config: Config,
    slots: Arc<OutputSlots>,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    /// Coordinator driving the process-wide output slots
    pub fn new(config: Config) -> Self {
        Self::with_slots(config, OutputSlots::process())
    }

    pub fn with_slots(config: Config, slots: Arc<OutputSlots>) -> Self {
        Self {
            config,
            slots,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slots(&self) -> &Arc<OutputSlots> {
        &self.slots
    }

    /// Start mirroring. Starting while active replaces the current mirrors.
    /// Returns the folder logs are written to.
    pub fn start(&self, options: StartOptions) -> Result<PathBuf> {
        let raw_folder = options
            .folder
            .clone()
            .unwrap_or_else(|| self.config.log_folder.clone());
        let folder = paths::verify_log_folder(&raw_folder, &self.config.default_log_folder)?;
        let sink_config = self.sink_config(&options);
        let merged = options.merged.unwrap_or(self.config.merge_streams);

        let previous = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let previous = state.active.take();

            let (original_out, original_err) = match &previous {
                Some(prev) => (prev.original_out.clone(), prev.original_err.clone()),
                None => (
                    self.current(StreamKind::Out),
                    self.current(StreamKind::Err),
                ),
            };
            if let Some(prev) = &previous {
                for id in &prev.hooks {
                    shutdown::unregister(*id);
                }
            }

            let mirrors = self.build_mirrors(
                &folder,
                sink_config,
                merged,
                options.log_stdin,
                &original_out,
                &original_err,
            );
            self.install_mirrors(&mirrors);

            let hooks = mirrors
                .all()
                .into_iter()
                .map(|mirror| shutdown::register(mirror))
                .collect();

            state.active = Some(Activation {
                folder: folder.clone(),
                mirrors,
                original_out,
                original_err,
                hooks,
            });
            state.paused = false;
            previous
        };

        if let Some(prev) = previous {
            debug!("Replaced previous activation in {}", prev.folder.display());
            flush_all(&prev.mirrors.all());
        }

        info!(
            "Mirroring output to {} ({})",
            folder.display(),
            if merged { "merged" } else { "split" }
        );
        Ok(folder)
    }

    /// Reinstall the original streams, keeping mirrors and buffered data.
    /// Returns the resulting paused flag.
    pub fn pause(&self) -> bool {
        let mirrors = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(active) = state.active.as_ref() else {
                return state.paused;
            };
            if !state.paused {
                self.install_originals(active);
                state.paused = true;
                debug!("Paused output mirroring");
            }
            active.mirrors.all()
        };

        flush_all(&mirrors);
        true
    }

    /// Reinstall the same mirrors that were paused. Returns the resulting paused flag.
    pub fn resume(&self) -> bool {
        let mirrors = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(active) = state.active.as_ref() else {
                return state.paused;
            };
            if state.paused {
                self.install_mirrors(&active.mirrors);
                state.paused = false;
                debug!("Resumed output mirroring");
            }
            active.mirrors.all()
        };

        flush_all(&mirrors);
        false
    }

    /// Restore the original streams and flush everything
    pub fn stop(&self) {
        let stopped = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(active) = state.active.take() else {
                return;
            };
            self.install_originals(&active);
            for id in &active.hooks {
                shutdown::unregister(*id);
            }
            state.paused = false;
            active
        };

        flush_all(&stopped.mirrors.all());
        debug!("Stopped mirroring to {}", stopped.folder.display());
    }

    pub fn state(&self) -> LoggerState {
        let state = self.state.lock();
        match (&state.active, state.paused) {
            (None, _) => LoggerState::Stopped,
            (Some(_), true) => LoggerState::Paused,
            (Some(_), false) => LoggerState::Running,
        }
    }

    /// True while mirrors are installed and not paused
    pub fn is_logging(&self) -> bool {
        let state = self.state.lock();
        !state.paused
            && state
                .active
                .as_ref()
                .map_or(false, |active| !active.mirrors.is_empty())
    }

    /// True while a mirror for `kind` is tracked, paused or not
    pub fn is_redirected(&self, kind: StreamKind) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .map_or(false, |active| active.mirrors.get(kind).is_some())
    }

    /// Mirror currently tracked for `kind`
    pub fn mirror(&self, kind: StreamKind) -> Option<Arc<StreamMirror>> {
        self.state
            .lock()
            .active
            .as_ref()
            .and_then(|active| active.mirrors.get(kind).cloned())
    }

    /// Folder of the current activation
    pub fn folder(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|active| active.folder.clone())
    }

    /// Shutdown hooks registered by the current activation
    pub fn hook_ids(&self) -> Vec<HookId> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|active| active.hooks.clone())
            .unwrap_or_default()
    }

    pub fn stdout(&self) -> StreamHandle {
        self.slots.handle(StreamKind::Out)
    }

    pub fn stderr(&self) -> StreamHandle {
        self.slots.handle(StreamKind::Err)
    }

    /// Locked process stdin, recorded while a stdin mirror is installed
    pub fn stdin(&self) -> InputHandle<StdinLock<'static>> {
        self.slots.input(io::stdin().lock())
    }

    fn current(&self, kind: StreamKind) -> Arc<dyn TextStream> {
        self.slots
            .current(kind)
            .unwrap_or_else(|| Arc::new(Discard))
    }

    fn sink_config(&self, options: &StartOptions) -> SinkConfig {
        let max_size = options
            .max_size
            .unwrap_or_else(|| self.config.max_size_bytes());
        SinkConfig {
            encoding: self.config.encoding,
            mode: self.config.write_mode(),
            rotation: RotationConfig::new(max_size, self.config.flush_size),
            stream_tag: None,
            prefix: Some(self.config.prefix),
            log_to_file: options.log_to_file.unwrap_or(self.config.log_to_file),
            keep_file_name: false,
        }
    }

    fn build_mirrors(
        &self,
        folder: &Path,
        config: SinkConfig,
        merged: bool,
        log_stdin: bool,
        original_out: &Arc<dyn TextStream>,
        original_err: &Arc<dyn TextStream>,
    ) -> Mirrors {
        let policy = self.config.broken_pipe;
        let mirror = |original: &Arc<dyn TextStream>, sink: &Arc<RotatingSink>, kind| {
            Arc::new(StreamMirror::new(original.clone(), sink.clone(), kind).with_policy(policy))
        };
        let discard: Arc<dyn TextStream> = Arc::new(Discard);

        if merged {
            let sink = Arc::new(RotatingSink::with_config(folder.to_path_buf(), config));
            Mirrors {
                stdin: log_stdin.then(|| mirror(&discard, &sink, StreamKind::In)),
                stdout: Some(mirror(original_out, &sink, StreamKind::Out)),
                stderr: Some(mirror(original_err, &sink, StreamKind::Err)),
            }
        } else {
            let tagged = |kind| {
                Arc::new(RotatingSink::with_config(
                    folder.to_path_buf(),
                    SinkConfig {
                        stream_tag: Some(kind),
                        ..config.clone()
                    },
                ))
            };
            Mirrors {
                stdin: log_stdin.then(|| mirror(&discard, &tagged(StreamKind::In), StreamKind::In)),
                stdout: Some(mirror(original_out, &tagged(StreamKind::Out), StreamKind::Out)),
                stderr: Some(mirror(original_err, &tagged(StreamKind::Err), StreamKind::Err)),
            }
        }
    }

    /// The stdin tap is always replaced, so a previous tap never outlives its activation
    fn install_mirrors(&self, mirrors: &Mirrors) {
        let tap = mirrors
            .stdin
            .clone()
            .map(|mirror| mirror as Arc<dyn TextStream>);
        self.slots.install(StreamKind::In, tap);

        for kind in [StreamKind::Out, StreamKind::Err] {
            if let Some(mirror) = mirrors.get(kind) {
                let stream: Arc<dyn TextStream> = mirror.clone();
                self.slots.install(kind, Some(stream));
            }
        }
    }

    fn install_originals(&self, active: &Activation) {
        self.slots
            .install(StreamKind::Out, Some(active.original_out.clone()));
        self.slots
            .install(StreamKind::Err, Some(active.original_err.clone()));
        self.slots.install(StreamKind::In, None);
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush_all(mirrors: &[Arc<StreamMirror>]) {
    for mirror in mirrors {
        mirror.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use rotary_core::Prefix;
    use std::fs;
    use std::io::{BufRead, Cursor};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        root: PathBuf,
        out: Arc<MemoryStream>,
        err: Arc<MemoryStream>,
        coordinator: Coordinator,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let out = Arc::new(MemoryStream::new());
        let err = Arc::new(MemoryStream::new());
        let slots = Arc::new(OutputSlots::new(out.clone(), err.clone()));
        let config = Config {
            log_folder: root.join("primary"),
            default_log_folder: root.join("fallback"),
            prefix: Prefix::none(),
            ..Config::default()
        };
        Harness {
            _dir: dir,
            root,
            out,
            err,
            coordinator: Coordinator::with_slots(config, slots),
        }
    }

    fn log_files(root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        if let Ok(entries) = fs::read_dir(root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    found.extend(log_files(&path));
                } else if path.extension().map_or(false, |e| e == "log") {
                    found.push(path);
                }
            }
        }
        found
    }

    #[test]
    fn test_split_mode_scenario() {
        let h = harness();
        let folder = h.coordinator.start(StartOptions::new().merged(false)).unwrap();
        assert_eq!(folder, h.root.join("primary").join("logs"));

        h.coordinator.stdout().write_str("OUT: hello split\n").unwrap();
        h.coordinator.stderr().write_str("ERR: goodbye split\n").unwrap();
        h.coordinator.stdout().flush().unwrap();
        h.coordinator.stderr().flush().unwrap();

        let files = log_files(&folder);
        assert_eq!(files.len(), 2);
        for file in files {
            let text = fs::read_to_string(&file).unwrap();
            match file.parent().unwrap().file_name().unwrap().to_str().unwrap() {
                "stdout" => assert_eq!(text, "OUT: hello split\n"),
                "stderr" => assert_eq!(text, "ERR: goodbye split\n"),
                other => panic!("unexpected subfolder {}", other),
            }
        }

        assert_eq!(h.out.contents(), "OUT: hello split\n");
        assert_eq!(h.err.contents(), "ERR: goodbye split\n");

        let out_sink = h.coordinator.mirror(StreamKind::Out).unwrap().sink().clone();
        let err_sink = h.coordinator.mirror(StreamKind::Err).unwrap().sink().clone();
        assert!(!Arc::ptr_eq(&out_sink, &err_sink));
    }

    #[test]
    fn test_merged_mode_shares_sink() {
        let h = harness();
        let folder = h.coordinator.start(StartOptions::new().merged(true)).unwrap();

        let out_sink = h.coordinator.mirror(StreamKind::Out).unwrap().sink().clone();
        let err_sink = h.coordinator.mirror(StreamKind::Err).unwrap().sink().clone();
        assert!(Arc::ptr_eq(&out_sink, &err_sink));

        h.coordinator.stdout().write_str("first\n").unwrap();
        h.coordinator.stderr().write_str("second\n").unwrap();
        h.coordinator.stdout().write_str("third\n").unwrap();
        h.coordinator.stop();

        let files = log_files(&folder);
        assert_eq!(files.len(), 1);
        assert_ne!(files[0].parent().unwrap().file_name().unwrap(), "stdout");
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), "first\nsecond\nthird\n");
    }

    #[test]
    fn test_merged_mode_prefixes() {
        let dir = TempDir::new().unwrap();
        let slots = Arc::new(OutputSlots::new(
            Arc::new(MemoryStream::new()),
            Arc::new(MemoryStream::new()),
        ));
        let config = Config {
            log_folder: dir.path().to_path_buf(),
            default_log_folder: dir.path().join("fallback"),
            ..Config::default()
        };
        let coordinator = Coordinator::with_slots(config, slots);
        let folder = coordinator.start(StartOptions::new()).unwrap();

        coordinator.stdout().write_str("out\n").unwrap();
        coordinator.stderr().write_str("err\n").unwrap();
        coordinator.stop();

        let files = log_files(&folder);
        assert_eq!(
            fs::read_to_string(&files[0]).unwrap(),
            "[STDOUT] out\n[STDERR] err\n"
        );
    }

    #[test]
    fn test_pause_resume_keeps_mirrors() {
        let h = harness();
        let folder = h.coordinator.start(StartOptions::new()).unwrap();
        let before = h.coordinator.mirror(StreamKind::Out).unwrap();

        h.coordinator.stdout().write_str("logged\n").unwrap();
        assert!(h.coordinator.pause());
        assert!(!h.coordinator.is_logging());
        h.coordinator.stdout().write_str("terminal only\n").unwrap();

        assert!(!h.coordinator.resume());
        assert!(h.coordinator.is_logging());
        h.coordinator.stdout().write_str("logged again\n").unwrap();

        let after = h.coordinator.mirror(StreamKind::Out).unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        h.coordinator.stop();
        let files = log_files(&folder);
        assert_eq!(files.len(), 1);
        assert_eq!(
            fs::read_to_string(&files[0]).unwrap(),
            "logged\nlogged again\n"
        );
        assert_eq!(h.out.contents(), "logged\nterminal only\nlogged again\n");
    }

    #[test]
    fn test_pause_resume_idempotent() {
        let h = harness();
        assert_eq!(h.coordinator.state(), LoggerState::Stopped);
        h.coordinator.start(StartOptions::new()).unwrap();

        h.coordinator.pause();
        h.coordinator.pause();
        assert_eq!(h.coordinator.state(), LoggerState::Paused);
        assert!(h.coordinator.is_redirected(StreamKind::Out));

        h.coordinator.resume();
        h.coordinator.resume();
        assert_eq!(h.coordinator.state(), LoggerState::Running);
        assert!(h.coordinator.is_logging());
    }

    #[test]
    fn test_pause_when_stopped_is_noop() {
        let h = harness();
        assert!(!h.coordinator.pause());
        assert!(!h.coordinator.resume());
        assert_eq!(h.coordinator.state(), LoggerState::Stopped);
        assert!(!h.coordinator.is_logging());
    }

    #[test]
    fn test_stop_restores_originals_and_hooks() {
        let h = harness();
        h.coordinator.start(StartOptions::new()).unwrap();

        let hooks = h.coordinator.hook_ids();
        assert_eq!(hooks.len(), 2);
        assert!(hooks
            .iter()
            .all(|id| shutdown::ShutdownHooks::global().is_registered(*id)));

        h.coordinator.stop();
        assert_eq!(h.coordinator.state(), LoggerState::Stopped);
        assert!(!h.coordinator.is_redirected(StreamKind::Out));
        assert!(hooks
            .iter()
            .all(|id| !shutdown::ShutdownHooks::global().is_registered(*id)));

        let current = h.coordinator.slots().current(StreamKind::Out).unwrap();
        let original: Arc<dyn TextStream> = h.out.clone();
        assert_eq!(
            Arc::as_ptr(&current) as *const (),
            Arc::as_ptr(&original) as *const ()
        );

        // stopping twice is harmless
        h.coordinator.stop();
    }

    #[test]
    fn test_restart_does_not_nest_mirrors() {
        let h = harness();
        h.coordinator.start(StartOptions::new()).unwrap();
        let first_hooks = h.coordinator.hook_ids();
        h.coordinator.start(StartOptions::new().merged(false)).unwrap();

        h.coordinator.stdout().write_str("once\n").unwrap();
        assert_eq!(h.out.contents(), "once\n");

        let hooks = h.coordinator.hook_ids();
        assert_eq!(hooks.len(), 2);
        assert!(first_hooks
            .iter()
            .all(|id| !shutdown::ShutdownHooks::global().is_registered(*id)));

        h.coordinator.stop();
        assert_eq!(h.out.contents(), "once\n");
    }

    #[test]
    fn test_stdin_mirror() {
        let h = harness();
        let folder = h
            .coordinator
            .start(StartOptions::new().log_stdin(true))
            .unwrap();
        assert!(h.coordinator.is_redirected(StreamKind::In));

        let input = h.coordinator.slots().input(Cursor::new("typed\n"));
        let lines: Vec<String> = input.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["typed"]);

        h.coordinator.stop();
        let files = log_files(&folder);
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), "typed\n");
        assert_eq!(h.out.contents(), "");
    }

    #[test]
    fn test_restart_without_stdin_clears_tap() {
        let h = harness();
        let first = h
            .coordinator
            .start(StartOptions::new().log_stdin(true).folder(h.root.join("first")))
            .unwrap();
        let second = h
            .coordinator
            .start(StartOptions::new().folder(h.root.join("second")))
            .unwrap();

        assert!(!h.coordinator.is_redirected(StreamKind::In));
        assert!(h.coordinator.slots().current(StreamKind::In).is_none());

        let input = h.coordinator.slots().input(Cursor::new("secret\n"));
        let lines: Vec<String> = input.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["secret"]);
        h.coordinator.stop();

        for file in log_files(&first).into_iter().chain(log_files(&second)) {
            assert!(!fs::read_to_string(&file).unwrap().contains("secret"));
        }
    }

    #[test]
    fn test_falls_back_to_default_folder() {
        let h = harness();
        let blocker = h.root.join("blocker");
        fs::write(&blocker, "file").unwrap();

        let folder = h
            .coordinator
            .start(StartOptions::new().folder(blocker.join("sub")))
            .unwrap();
        assert_eq!(folder, h.root.join("fallback").join("logs"));
        assert_eq!(h.coordinator.folder(), Some(folder));
    }

    #[test]
    fn test_log_to_file_disabled() {
        let h = harness();
        let folder = h
            .coordinator
            .start(StartOptions::new().log_to_file(false))
            .unwrap();

        h.coordinator.stdout().write_str("screen\n").unwrap();
        h.coordinator.stop();

        assert_eq!(h.out.contents(), "screen\n");
        assert!(log_files(&folder).is_empty());
    }

    #[test]
    fn test_max_size_option_rotates() {
        let h = harness();
        let folder = h
            .coordinator
            .start(StartOptions::new().max_size(1))
            .unwrap();

        h.coordinator.stdout().write_str("one\n").unwrap();
        h.coordinator.stdout().flush().unwrap();
        h.coordinator.stdout().write_str("two\n").unwrap();
        h.coordinator.stdout().flush().unwrap();
        h.coordinator.stop();

        assert_eq!(log_files(&folder).len(), 2);
    }
}
