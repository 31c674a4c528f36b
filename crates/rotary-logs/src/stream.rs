//! Text streams and the swappable output slots application code writes through

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rotary_core::StreamKind;
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

/// Anything a mirror can forward text to
pub trait TextStream: Send + Sync {
    fn write_str(&self, text: &str) -> io::Result<()>;

    fn flush(&self) -> io::Result<()>;

    fn is_closed(&self) -> bool {
        false
    }

    /// True when the stream is connected to a pipe rather than a terminal
    fn is_pipe(&self) -> bool {
        false
    }
}

/// The real process streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Stdout,
    Stderr,
}

impl TextStream for Terminal {
    fn write_str(&self, text: &str) -> io::Result<()> {
        match self {
            Terminal::Stdout => io::stdout().lock().write_all(text.as_bytes()),
            Terminal::Stderr => io::stderr().lock().write_all(text.as_bytes()),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self {
            Terminal::Stdout => io::stdout().flush(),
            Terminal::Stderr => io::stderr().flush(),
        }
    }

    fn is_pipe(&self) -> bool {
        match self {
            Terminal::Stdout => !atty::is(atty::Stream::Stdout),
            Terminal::Stderr => !atty::is(atty::Stream::Stderr),
        }
    }
}

/// Stream that drops everything; the terminal side of a stdin mirror
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl TextStream for Discard {
    fn write_str(&self, _text: &str) -> io::Result<()> {
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory stream, handy for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStream {
    contents: Mutex<String>,
    failure: Mutex<Option<io::ErrorKind>>,
    pipe: bool,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A memory stream that reports itself as a pipe
    pub fn pipe() -> Self {
        Self {
            pipe: true,
            ..Self::default()
        }
    }

    /// Make every following write fail with `kind` (`None` to recover)
    pub fn fail_with(&self, kind: Option<io::ErrorKind>) {
        *self.failure.lock() = kind;
    }

    pub fn contents(&self) -> String {
        self.contents.lock().clone()
    }
}

impl TextStream for MemoryStream {
    fn write_str(&self, text: &str) -> io::Result<()> {
        if let Some(kind) = *self.failure.lock() {
            return Err(io::Error::new(kind, "simulated stream failure"));
        }
        self.contents.lock().push_str(text);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn is_pipe(&self) -> bool {
        self.pipe
    }
}

static PROCESS_SLOTS: Lazy<Arc<OutputSlots>> = Lazy::new(|| Arc::new(OutputSlots::terminal()));

/// The current stdout/stderr streams and the stdin tap.
///
/// Only the coordinator swaps slot contents; everything else reads them.
pub struct OutputSlots {
    stdout: RwLock<Arc<dyn TextStream>>,
    stderr: RwLock<Arc<dyn TextStream>>,
    stdin_tap: RwLock<Option<Arc<dyn TextStream>>>,
}

impl OutputSlots {
    pub fn new(stdout: Arc<dyn TextStream>, stderr: Arc<dyn TextStream>) -> Self {
        Self {
            stdout: RwLock::new(stdout),
            stderr: RwLock::new(stderr),
            stdin_tap: RwLock::new(None),
        }
    }

    /// Slots holding the real terminal streams
    pub fn terminal() -> Self {
        Self::new(Arc::new(Terminal::Stdout), Arc::new(Terminal::Stderr))
    }

    /// Slots shared by the whole process
    pub fn process() -> Arc<Self> {
        Arc::clone(&PROCESS_SLOTS)
    }

    /// Stream currently installed for `kind`; for `In` this is the tap, if any
    pub fn current(&self, kind: StreamKind) -> Option<Arc<dyn TextStream>> {
        match kind {
            StreamKind::Out => Some(self.stdout.read().clone()),
            StreamKind::Err => Some(self.stderr.read().clone()),
            StreamKind::In => self.stdin_tap.read().clone(),
            StreamKind::Unknown => None,
        }
    }

    /// Install `stream` for `kind`, returning what was there before
    pub(crate) fn install(
        &self,
        kind: StreamKind,
        stream: Option<Arc<dyn TextStream>>,
    ) -> Option<Arc<dyn TextStream>> {
        match (kind, stream) {
            (StreamKind::Out, Some(stream)) => Some(std::mem::replace(&mut *self.stdout.write(), stream)),
            (StreamKind::Err, Some(stream)) => Some(std::mem::replace(&mut *self.stderr.write(), stream)),
            (StreamKind::In, stream) => std::mem::replace(&mut *self.stdin_tap.write(), stream),
            _ => None,
        }
    }

    pub fn handle(self: &Arc<Self>, kind: StreamKind) -> StreamHandle {
        StreamHandle {
            slots: Arc::clone(self),
            kind,
        }
    }

    pub fn input<R: BufRead>(self: &Arc<Self>, inner: R) -> InputHandle<R> {
        InputHandle {
            slots: Arc::clone(self),
            inner,
        }
    }
}

/// Writer bound to one output slot. Each write goes to whatever stream the
/// slot holds at that moment; the slot lock is released before the I/O.
#[derive(Clone)]
pub struct StreamHandle {
    slots: Arc<OutputSlots>,
    kind: StreamKind,
}

impl StreamHandle {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn write_str(&self, text: &str) -> io::Result<()> {
        match self.slots.current(self.kind) {
            Some(stream) => stream.write_str(text),
            None => Ok(()),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match self.slots.current(self.kind) {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }
}

impl Write for StreamHandle {
    /// Invalid UTF-8 is replaced, since mirrors operate on text.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_str(&String::from_utf8_lossy(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        StreamHandle::flush(self)
    }
}

/// Reader over stdin (or any `BufRead`) that copies what it hands out into
/// the stdin tap while one is installed
pub struct InputHandle<R> {
    slots: Arc<OutputSlots>,
    inner: R,
}

impl<R> InputHandle<R> {
    fn tap(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(tap) = self.slots.current(StreamKind::In) {
            let _ = tap.write_str(&String::from_utf8_lossy(bytes));
        }
    }
}

impl<R: BufRead> Read for InputHandle<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.tap(&buf[..n]);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for InputHandle<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if let Some(tap) = self.slots.current(StreamKind::In) {
            if let Ok(buf) = self.inner.fill_buf() {
                let end = amt.min(buf.len());
                if end > 0 {
                    let _ = tap.write_str(&String::from_utf8_lossy(&buf[..end]));
                }
            }
        }
        self.inner.consume(amt);
    }
}
