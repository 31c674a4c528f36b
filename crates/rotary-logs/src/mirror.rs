//! Mirror a text stream to a rotating sink while keeping terminal output

use rotary_core::constants::{EXIT_FAILURE, MODULE_NAME};
use rotary_core::{BrokenPipePolicy, PipeAction, StreamKind};
use std::io;
use std::sync::Arc;
use tracing::debug;

use crate::shutdown::{self, Flushable};
use crate::sink::RotatingSink;
use crate::stream::{Terminal, TextStream};

/// Duplicates every write to the original stream and to a sink
pub struct StreamMirror {
    original: Arc<dyn TextStream>,
    sink: Arc<RotatingSink>,
    kind: StreamKind,
    policy: BrokenPipePolicy,
    diagnostics: Arc<dyn TextStream>,
}

impl StreamMirror {
    pub fn new(original: Arc<dyn TextStream>, sink: Arc<RotatingSink>, kind: StreamKind) -> Self {
        Self {
            original,
            sink,
            kind,
            policy: BrokenPipePolicy::default(),
            diagnostics: Arc::new(Terminal::Stderr),
        }
    }

    pub fn with_policy(mut self, policy: BrokenPipePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Send rotary's own diagnostics somewhere other than the real stderr
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn TextStream>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn policy(&self) -> BrokenPipePolicy {
        self.policy
    }

    pub fn sink(&self) -> &Arc<RotatingSink> {
        &self.sink
    }

    pub fn original(&self) -> &Arc<dyn TextStream> {
        &self.original
    }

    /// Write to the original stream, then buffer `prefix + text` in the sink
    pub fn write(&self, text: &str) {
        if let Err(e) = self.original.write_str(text) {
            self.handle_terminal_error(e, text);
        }
        self.log(text);
    }

    fn log(&self, text: &str) {
        if !self.sink.log_to_file() {
            return;
        }

        let prefix = self.sink.line_prefix(self.kind);
        if prefix.is_empty() {
            self.sink.write(text);
        } else {
            self.sink.write(&format!("{}{}", prefix, text));
        }
    }

    /// Best-effort flush of the original stream and the sink
    pub fn flush(&self) {
        if !self.original.is_closed() {
            if let Err(e) = self.original.flush() {
                self.report(&format!(
                    "{} I/O error flushing original {}: {}\n",
                    MODULE_NAME, self.kind, e
                ));
            }
        }

        if let Err(e) = self.sink.flush() {
            debug!("Best-effort flush of {} sink failed: {}", self.kind, e);
        }
    }

    /// `text` is what failed to reach the terminal; the exit policies still log it
    fn handle_terminal_error(&self, error: io::Error, text: &str) {
        if error.kind() != io::ErrorKind::BrokenPipe {
            self.report(&format!(
                "{} I/O error writing to original {}: {}\n",
                MODULE_NAME, self.kind, error
            ));
            return;
        }

        match self.policy.action(self.original.is_pipe()) {
            PipeAction::Ignore => {}
            PipeAction::Warn => {
                self.report(&format!("{} Broken pipe on {}\n", MODULE_NAME, self.kind));
            }
            PipeAction::Exit => {
                self.log(text);
                if let Err(e) = self.sink.flush() {
                    debug!("Flush before exit failed: {}", e);
                }
                shutdown::run_hooks();
                std::process::exit(EXIT_FAILURE);
            }
        }
    }

    fn report(&self, message: &str) {
        let _ = self.diagnostics.write_str(message);
    }
}

impl TextStream for StreamMirror {
    fn write_str(&self, text: &str) -> io::Result<()> {
        self.write(text);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        StreamMirror::flush(self);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.original.is_closed()
    }

    fn is_pipe(&self) -> bool {
        self.original.is_pipe()
    }
}

impl Flushable for StreamMirror {
    fn flush_now(&self) {
        StreamMirror::flush(self);
    }
}

impl Drop for StreamMirror {
    fn drop(&mut self) {
        StreamMirror::flush(self);
    }
}
